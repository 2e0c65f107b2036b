use super::*;

/// TOML config file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    // Global settings
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub model: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,

    // Subcommand sections
    pub server: Option<ServerSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub acme_domain: Option<Vec<String>>,
    pub acme_contact: Option<Vec<String>>,
    pub generation_timeout: Option<u64>,
}

/// Unified settings struct with all resolved configuration
#[derive(Debug, Clone, Default, Serialize)]
pub struct Settings {
    // Global / shared settings
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub model: Option<String>,
    pub config: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,

    // Server settings
    pub server_address: Option<String>,
    pub server_port: Option<u16>,
    pub server_acme_domain: Option<Vec<String>>,
    pub server_acme_contact: Option<Vec<String>>,
    pub server_generation_timeout: Option<u64>,
}

impl Settings {
    /// Load settings from all sources with proper priority
    pub fn load(options: crate::options::Options) -> Result<Self> {
        let mut env = BTreeMap::<String, String>::new();

        for (var, value) in std::env::vars_os() {
            let Some(var) = var.to_str() else {
                continue;
            };

            let Some(key) = var.strip_prefix("MIRAGE_") else {
                continue;
            };

            env.insert(
                key.into(),
                value.into_string().map_err(|value| {
                    anyhow!(
                        "environment variable `{var}` not valid unicode: `{}`",
                        value.to_string_lossy()
                    )
                })?,
            );
        }

        Self::merge(options, env)
    }

    /// Merge all configuration sources
    pub fn merge(options: crate::options::Options, env: BTreeMap<String, String>) -> Result<Self> {
        // Start with CLI options (highest priority)
        let settings = Self::from_options(&options);

        // Merge with environment variables
        let settings = settings.or(Self::from_env(&env)?);

        // Determine config path
        let config_path = Self::find_config_path(&settings)?;

        // Load and merge config file
        let config = if let Some(config_path) = config_path {
            let contents = anyhow::Context::context(
                fs::read_to_string(&config_path),
                anyhow!("failed to open config file `{}`", config_path.display()),
            )?;
            anyhow::Context::context(
                toml::from_str(&contents),
                anyhow!("failed to deserialize config file `{}`", config_path.display()),
            )?
        } else {
            Config::default()
        };

        // Merge with config file and apply defaults
        let settings = settings.or(Self::from_config(&config)).or_defaults()?;

        Ok(settings)
    }

    fn find_config_path(settings: &Self) -> Result<Option<PathBuf>> {
        // 1. Explicit --config flag
        if let Some(path) = &settings.config {
            return Ok(Some(path.clone()));
        }

        // 2. --config-dir/mirage.toml
        if let Some(dir) = &settings.config_dir {
            let path = dir.join("mirage.toml");
            if path.exists() {
                return Ok(Some(path));
            }
        }

        // 3. --data-dir/mirage.toml
        if let Some(dir) = &settings.data_dir {
            let path = dir.join("mirage.toml");
            if path.exists() {
                return Ok(Some(path));
            }
        }

        // 4. XDG config dir (~/.config/mirage/mirage.toml)
        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("mirage").join("mirage.toml");
            if path.exists() {
                return Ok(Some(path));
            }
        }

        Ok(None)
    }

    pub fn from_options(options: &crate::options::Options) -> Self {
        Self {
            api_key: options.api_key.clone(),
            api_url: options.api_url.clone(),
            model: options.model.clone(),
            config: options.config.clone(),
            config_dir: options.config_dir.clone(),
            data_dir: options.data_dir.clone(),
            ..Default::default()
        }
    }

    pub fn from_env(env: &BTreeMap<String, String>) -> Result<Self> {
        let get_string = |key: &str| env.get(key).cloned();

        let get_path = |key: &str| env.get(key).map(PathBuf::from);

        let get_u16 = |key: &str| -> Result<Option<u16>> {
            anyhow::Context::with_context(
                env.get(key).map(|int| int.parse::<u16>()).transpose(),
                || format!("failed to parse environment variable MIRAGE_{key} as u16"),
            )
        };

        let get_u64 = |key: &str| -> Result<Option<u64>> {
            anyhow::Context::with_context(
                env.get(key).map(|int| int.parse::<u64>()).transpose(),
                || format!("failed to parse environment variable MIRAGE_{key} as u64"),
            )
        };

        let get_vec = |key: &str| -> Option<Vec<String>> {
            env.get(key).map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
        };

        Ok(Self {
            // Global
            api_key: get_string("API_KEY"),
            api_url: get_string("API_URL"),
            model: get_string("MODEL"),
            config: get_path("CONFIG"),
            config_dir: get_path("CONFIG_DIR"),
            data_dir: get_path("DATA_DIR"),

            // Server
            server_address: get_string("SERVER_ADDRESS"),
            server_port: get_u16("SERVER_PORT")?,
            server_acme_domain: get_vec("SERVER_ACME_DOMAIN"),
            server_acme_contact: get_vec("SERVER_ACME_CONTACT"),
            server_generation_timeout: get_u64("SERVER_GENERATION_TIMEOUT")?,
        })
    }

    pub fn from_config(config: &Config) -> Self {
        let server = config.server.as_ref();

        Self {
            // Global settings
            api_key: config.api_key.clone(),
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            config: config.config.clone(),
            config_dir: config.config_dir.clone(),
            data_dir: config.data_dir.clone(),

            // Server
            server_address: server.and_then(|s| s.address.clone()),
            server_port: server.and_then(|s| s.port),
            server_acme_domain: server.and_then(|s| s.acme_domain.clone()),
            server_acme_contact: server.and_then(|s| s.acme_contact.clone()),
            server_generation_timeout: server.and_then(|s| s.generation_timeout),
        }
    }

    /// Merge self with another Settings, self takes priority
    pub fn or(self, other: Self) -> Self {
        Self {
            // Global
            api_key: self.api_key.or(other.api_key),
            api_url: self.api_url.or(other.api_url),
            model: self.model.or(other.model),
            config: self.config.or(other.config),
            config_dir: self.config_dir.or(other.config_dir),
            data_dir: self.data_dir.or(other.data_dir),

            // Server
            server_address: self.server_address.or(other.server_address),
            server_port: self.server_port.or(other.server_port),
            server_acme_domain: self.server_acme_domain.or(other.server_acme_domain),
            server_acme_contact: self.server_acme_contact.or(other.server_acme_contact),
            server_generation_timeout: self
                .server_generation_timeout
                .or(other.server_generation_timeout),
        }
    }

    fn or_defaults(self) -> Result<Self> {
        let data_dir = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .ok_or_else(|| anyhow!("could not get data dir"))?
                .join("mirage"),
        };

        Ok(Self {
            api_key: self.api_key,
            api_url: Some(self.api_url.unwrap_or_else(|| DEFAULT_API_URL.into())),
            model: Some(self.model.unwrap_or_else(|| DEFAULT_MODEL.into())),
            config: None,
            config_dir: None,
            data_dir: Some(data_dir),

            server_address: Some(self.server_address.unwrap_or_else(|| "0.0.0.0".into())),
            server_port: self.server_port,
            server_acme_domain: self.server_acme_domain,
            server_acme_contact: self.server_acme_contact,
            server_generation_timeout: Some(
                self.server_generation_timeout
                    .unwrap_or(DEFAULT_GENERATION_TIMEOUT),
            ),
        })
    }
}
