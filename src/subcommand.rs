use super::*;

pub(crate) mod server;
mod settings_cmd;

#[derive(Debug, Parser)]
pub(crate) enum Subcommand {
    #[command(about = "Run the page server")]
    Server(server::Server),
    #[command(about = "Print resolved settings")]
    Settings(settings_cmd::SettingsCmd),
}

impl Subcommand {
    pub(crate) async fn run(self, settings: Settings, cancel_token: CancellationToken) -> Result {
        match self {
            Self::Server(server) => server.run(settings, cancel_token).await,
            Self::Settings(settings_cmd) => settings_cmd.run(settings).await,
        }
    }
}
