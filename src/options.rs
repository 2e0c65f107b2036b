use super::*;

#[derive(Clone, Default, Debug, Parser)]
pub struct Options {
    #[arg(long, global = true, help = "Load configuration from <CONFIG>.")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        help = "Load configuration from <CONFIG_DIR>/mirage.toml."
    )]
    pub config_dir: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        alias = "datadir",
        help = "Store data in <DATA_DIR>."
    )]
    pub data_dir: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "GEMINI_API_KEY",
        hide_env_values = true,
        help = "Authenticate to the generation service with <API_KEY>."
    )]
    pub api_key: Option<String>,

    #[arg(
        long,
        global = true,
        help = "Generate pages with <MODEL>. [default: gemini-flash-latest]"
    )]
    pub model: Option<String>,

    #[arg(long, global = true, help = "Send generation requests to <API_URL>.")]
    pub api_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let opts = Options::default();
        assert!(opts.api_key.is_none());
        assert!(opts.model.is_none());
        assert!(opts.api_url.is_none());
    }

    #[test]
    fn parse_api_key() {
        let opts = Options::try_parse_from(["mirage", "--api-key", "sk-test"]).unwrap();
        assert_eq!(opts.api_key, Some("sk-test".into()));
    }

    #[test]
    fn parse_model() {
        let opts = Options::try_parse_from(["mirage", "--model", "gemini-pro-latest"]).unwrap();
        assert_eq!(opts.model, Some("gemini-pro-latest".into()));
    }

    #[test]
    fn parse_api_url() {
        let opts =
            Options::try_parse_from(["mirage", "--api-url", "http://localhost:8080"]).unwrap();
        assert_eq!(opts.api_url, Some("http://localhost:8080".into()));
    }

    #[test]
    fn datadir_alias() {
        let opts = Options::try_parse_from(["mirage", "--datadir", "/var/mirage"]).unwrap();
        assert_eq!(opts.data_dir, Some(PathBuf::from("/var/mirage")));
    }

    #[test]
    fn global_options_parse_after_subcommand() {
        let arguments = crate::arguments::Arguments::try_parse_from([
            "mirage",
            "server",
            "--model",
            "gemini-pro-latest",
        ])
        .unwrap();
        assert_eq!(arguments.options.model, Some("gemini-pro-latest".into()));
    }
}
