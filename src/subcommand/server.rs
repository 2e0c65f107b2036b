use {super::*, error::ServerResult};

mod error;

/// CLI arguments for server subcommand
#[derive(Clone, Debug, Parser)]
pub(crate) struct ServerConfig {
    #[arg(long, help = "Listen at <ADDRESS>.")]
    address: Option<String>,
    #[arg(long, help = "Listen on <PORT>.")]
    port: Option<u16>,
    #[arg(long, help = "Request ACME TLS certificate for <ACME_DOMAIN>.")]
    acme_domain: Vec<String>,
    #[arg(long, help = "Provide ACME contact <ACME_CONTACT>.")]
    acme_contact: Vec<String>,
    #[arg(
        long,
        help = "Abort generation calls after <GENERATION_TIMEOUT> seconds."
    )]
    generation_timeout: Option<u64>,
}

impl ServerConfig {
    /// Merge CLI args with Settings to produce resolved config
    pub(crate) fn resolve(self, settings: Settings) -> ResolvedServerConfig {
        ResolvedServerConfig {
            settings,
            address: self.address,
            port: self.port,
            acme_domain: self.acme_domain,
            acme_contact: self.acme_contact,
            generation_timeout: self.generation_timeout,
        }
    }
}

/// Resolved server configuration (merged from all sources)
#[derive(Clone, Debug)]
pub(crate) struct ResolvedServerConfig {
    settings: Settings,
    // CLI overrides
    address: Option<String>,
    port: Option<u16>,
    acme_domain: Vec<String>,
    acme_contact: Vec<String>,
    generation_timeout: Option<u64>,
}

impl ResolvedServerConfig {
    pub(crate) fn address(&self) -> String {
        self.address
            .clone()
            .or(self.settings.server_address.clone())
            .unwrap_or_else(|| "0.0.0.0".into())
    }

    pub(crate) fn port(&self) -> Option<u16> {
        self.port.or(self.settings.server_port)
    }

    pub(crate) fn data_dir(&self) -> PathBuf {
        self.settings.data_dir.clone().unwrap_or_default()
    }

    pub(crate) fn acme_cache(&self) -> PathBuf {
        self.data_dir().join("acme-cache")
    }

    pub(crate) fn acme_domains(&self) -> Vec<String> {
        if !self.acme_domain.is_empty() {
            self.acme_domain.clone()
        } else {
            self.settings.server_acme_domain.clone().unwrap_or_default()
        }
    }

    pub(crate) fn acme_contacts(&self) -> Vec<String> {
        if !self.acme_contact.is_empty() {
            self.acme_contact.clone()
        } else {
            self.settings
                .server_acme_contact
                .clone()
                .unwrap_or_default()
        }
    }

    pub(crate) fn tls_enabled(&self) -> bool {
        !self.acme_domains().is_empty() && !self.acme_contacts().is_empty()
    }

    pub(crate) fn api_key(&self) -> Result<String> {
        self.settings.api_key.clone().ok_or_else(|| {
            anyhow!(
                "GEMINI_API_KEY environment variable not set: provide the credential via GEMINI_API_KEY, MIRAGE_API_KEY, --api-key, or the config file"
            )
        })
    }

    pub(crate) fn model(&self) -> String {
        self.settings
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.into())
    }

    pub(crate) fn api_url(&self) -> String {
        self.settings
            .api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.into())
    }

    pub(crate) fn generation_timeout(&self) -> Duration {
        Duration::from_secs(
            self.generation_timeout
                .or(self.settings.server_generation_timeout)
                .unwrap_or(DEFAULT_GENERATION_TIMEOUT),
        )
    }

    /// Origin of the incoming request, no trailing slash. Prefers the Host
    /// header, falls back to the configured listen address.
    pub(crate) fn base_url(&self, headers: &HeaderMap) -> String {
        let scheme = if self.tls_enabled() { "https" } else { "http" };

        let default_port = if self.tls_enabled() { 443 } else { 80 };

        let authority = headers
            .get(HOST)
            .and_then(|host| host.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!("{}:{}", self.address(), self.port().unwrap_or(default_port))
            });

        format!("{scheme}://{authority}")
    }
}

#[derive(Clone, Debug, Parser)]
pub(crate) struct Server {
    #[command(flatten)]
    pub(crate) config: ServerConfig,
}

impl Server {
    pub(crate) async fn run(self, settings: Settings, cancel_token: CancellationToken) -> Result {
        let config = Arc::new(self.config.resolve(settings));

        let client = GeminiClient::new(
            config.api_url(),
            config.api_key()?,
            config.model(),
            config.generation_timeout(),
        )?;

        let synthesizer = Synthesizer::new(Arc::new(client));

        let router = Router::new()
            .route("/", get(Self::root))
            .route("/{*path}", get(Self::page))
            .layer(SetResponseHeaderLayer::overriding(
                CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            ))
            .layer(Extension(config.clone()))
            .layer(Extension(synthesizer));

        let handle = Handle::new();

        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            cancel_token.cancelled().await;
            info!("Shutting down page server");
            shutdown_handle.shutdown();
        });

        Self::spawn(config, router, handle)?.await??;

        Ok(())
    }

    async fn root(
        Extension(config): Extension<Arc<ResolvedServerConfig>>,
        Extension(synthesizer): Extension<Synthesizer>,
        headers: HeaderMap,
    ) -> ServerResult<Response> {
        Self::generate(&config, &synthesizer, &headers, "/".into()).await
    }

    async fn page(
        Extension(config): Extension<Arc<ResolvedServerConfig>>,
        Extension(synthesizer): Extension<Synthesizer>,
        headers: HeaderMap,
        Path(path): Path<String>,
    ) -> ServerResult<Response> {
        Self::generate(&config, &synthesizer, &headers, format!("/{path}")).await
    }

    async fn generate(
        config: &ResolvedServerConfig,
        synthesizer: &Synthesizer,
        headers: &HeaderMap,
        route_path: String,
    ) -> ServerResult<Response> {
        info!("Accessed route: {route_path}");

        let base_url = config.base_url(headers);

        let html = synthesizer.synthesize(&route_path, &base_url).await?;

        Ok(html.into_response())
    }

    fn spawn(
        config: Arc<ResolvedServerConfig>,
        router: Router,
        handle: Handle<std::net::SocketAddr>,
    ) -> Result<JoinHandle<io::Result<()>>> {
        let acme_cache = config.acme_cache();
        let acme_domains = config.acme_domains();
        let acme_contacts = config.acme_contacts();
        let address = config.address();

        Ok(tokio::spawn(async move {
            if !acme_domains.is_empty() && !acme_contacts.is_empty() {
                info!(
                    "Getting certificate for {} using contact email {}",
                    acme_domains[0], acme_contacts[0]
                );

                let addr = (address, config.port().unwrap_or(443))
                    .to_socket_addrs()?
                    .next()
                    .unwrap();

                info!("Listening on https://{addr}");

                axum_server::Server::bind(addr)
                    .handle(handle)
                    .acceptor(Self::acceptor(acme_domains, acme_contacts, acme_cache).unwrap())
                    .serve(router.into_make_service())
                    .await
            } else {
                let addr = (address, config.port().unwrap_or(80))
                    .to_socket_addrs()?
                    .next()
                    .unwrap();

                info!("Listening on http://{addr}");

                axum_server::Server::bind(addr)
                    .handle(handle)
                    .serve(router.into_make_service())
                    .await
            }
        }))
    }

    fn acceptor(
        acme_domain: Vec<String>,
        acme_contact: Vec<String>,
        acme_cache: PathBuf,
    ) -> Result<AxumAcceptor> {
        static RUSTLS_PROVIDER_INSTALLED: LazyLock<bool> = LazyLock::new(|| {
            rustls::crypto::ring::default_provider()
                .install_default()
                .is_ok()
        });

        let config = AcmeConfig::new(acme_domain)
            .contact(acme_contact)
            .cache_option(Some(DirCache::new(acme_cache)))
            .directory(if cfg!(test) {
                LETS_ENCRYPT_STAGING_DIRECTORY
            } else {
                LETS_ENCRYPT_PRODUCTION_DIRECTORY
            });

        let mut state = config.state();

        ensure! {
          *RUSTLS_PROVIDER_INSTALLED,
          "failed to install rustls ring crypto provider",
        }

        let mut server_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_cert_resolver(state.resolver());

        server_config.alpn_protocols = vec!["h2".into(), "http/1.1".into()];

        let acceptor = state.axum_acceptor(Arc::new(server_config));

        tokio::spawn(async move {
            while let Some(result) = state.next().await {
                match result {
                    Ok(ok) => info!("ACME event: {:?}", ok),
                    Err(err) => error!("ACME error: {:?}", err),
                }
            }
        });

        Ok(acceptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_server_config(args: &str) -> ServerConfig {
        match Arguments::try_parse_from(args.split_whitespace()) {
            Ok(arguments) => match arguments.subcommand {
                Subcommand::Server(server) => server.config,
                subcommand => panic!("unexpected subcommand: {subcommand:?}"),
            },
            Err(err) => panic!("error parsing arguments: {err}"),
        }
    }

    fn default_settings() -> Settings {
        Settings::merge(crate::options::Options::default(), Default::default()).unwrap()
    }

    #[test]
    fn default_address() {
        let config = parse_server_config("mirage server").resolve(default_settings());
        assert_eq!(config.address(), "0.0.0.0");
    }

    #[test]
    fn override_address() {
        let config =
            parse_server_config("mirage server --address 127.0.0.1").resolve(default_settings());
        assert_eq!(config.address(), "127.0.0.1");
    }

    #[test]
    fn default_port() {
        let config = parse_server_config("mirage server").resolve(default_settings());
        assert_eq!(config.port(), None);
    }

    #[test]
    fn override_port() {
        let config = parse_server_config("mirage server --port 5001").resolve(default_settings());
        assert_eq!(config.port(), Some(5001));
    }

    #[test]
    fn default_acme_cache() {
        let config = parse_server_config("mirage server").resolve(default_settings());
        assert!(config.acme_cache().ends_with("acme-cache"));
    }

    #[test]
    fn override_acme_domains() {
        let config =
            parse_server_config("mirage server --acme-domain example.com --acme-domain foo.bar")
                .resolve(default_settings());
        assert_eq!(
            config.acme_domains(),
            vec!["example.com".to_string(), "foo.bar".to_string()]
        );
    }

    #[test]
    fn default_acme_contacts() {
        let config = parse_server_config("mirage server").resolve(default_settings());
        assert!(config.acme_contacts().is_empty());
    }

    #[test]
    fn override_acme_contacts() {
        let config = parse_server_config("mirage server --acme-contact admin@example.com")
            .resolve(default_settings());
        assert_eq!(
            config.acme_contacts(),
            vec!["admin@example.com".to_string()]
        );
    }

    #[test]
    fn tls_requires_domain_and_contact() {
        let config = parse_server_config("mirage server --acme-domain example.com")
            .resolve(default_settings());
        assert!(!config.tls_enabled());

        let config = parse_server_config(
            "mirage server --acme-domain example.com --acme-contact admin@example.com",
        )
        .resolve(default_settings());
        assert!(config.tls_enabled());
    }

    #[test]
    fn default_model_and_api_url() {
        let config = parse_server_config("mirage server").resolve(default_settings());
        assert_eq!(config.model(), DEFAULT_MODEL);
        assert_eq!(config.api_url(), DEFAULT_API_URL);
    }

    #[test]
    fn default_generation_timeout() {
        let config = parse_server_config("mirage server").resolve(default_settings());
        assert_eq!(
            config.generation_timeout(),
            Duration::from_secs(DEFAULT_GENERATION_TIMEOUT)
        );
    }

    #[test]
    fn override_generation_timeout() {
        let config = parse_server_config("mirage server --generation-timeout 5")
            .resolve(default_settings());
        assert_eq!(config.generation_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn missing_api_key_names_the_variable() {
        let config = parse_server_config("mirage server").resolve(Settings::default());
        let err = config.api_key().unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn api_key_from_settings() {
        let config = parse_server_config("mirage server").resolve(Settings {
            api_key: Some("sk-test".into()),
            ..Default::default()
        });
        assert_eq!(config.api_key().unwrap(), "sk-test");
    }

    #[test]
    fn base_url_from_host_header() {
        let config = parse_server_config("mirage server").resolve(default_settings());

        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("pages.example.com:5001"));

        assert_eq!(
            config.base_url(&headers),
            "http://pages.example.com:5001"
        );
    }

    #[test]
    fn base_url_falls_back_to_listen_address() {
        let config = parse_server_config("mirage server --address 127.0.0.1 --port 5001")
            .resolve(default_settings());

        assert_eq!(config.base_url(&HeaderMap::new()), "http://127.0.0.1:5001");
    }

    #[test]
    fn base_url_uses_https_when_tls_enabled() {
        let config = parse_server_config(
            "mirage server --acme-domain example.com --acme-contact admin@example.com",
        )
        .resolve(default_settings());

        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("example.com"));

        assert_eq!(config.base_url(&headers), "https://example.com");
    }

    #[test]
    fn base_url_has_no_trailing_slash() {
        let config = parse_server_config("mirage server").resolve(default_settings());

        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("example.com"));

        assert!(!config.base_url(&headers).ends_with('/'));
    }
}
