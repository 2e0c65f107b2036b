use {
    anyhow::{Context, Error, anyhow, ensure},
    arguments::Arguments,
    async_trait::async_trait,
    axum::{
        Extension, Router,
        extract::Path,
        http::{
            HeaderMap, HeaderValue, StatusCode,
            header::{CONTENT_TYPE, HOST},
        },
        response::{IntoResponse, Response},
        routing::get,
    },
    axum_server::Handle,
    clap::Parser,
    futures::StreamExt,
    gemini::{GeminiClient, GenerateError, GenerateResponse, TextGenerator},
    rustls_acme::{
        AcmeConfig,
        acme::{LETS_ENCRYPT_PRODUCTION_DIRECTORY, LETS_ENCRYPT_STAGING_DIRECTORY},
        axum::AxumAcceptor,
        caches::DirCache,
    },
    serde::{Deserialize, Serialize},
    settings::Settings,
    snafu::{ResultExt, Snafu},
    std::{
        collections::BTreeMap,
        env, fs, io,
        net::ToSocketAddrs,
        path::PathBuf,
        process,
        sync::{Arc, LazyLock},
        time::Duration,
    },
    synthesizer::Synthesizer,
    tokio::{runtime::Runtime, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tower_http::set_header::SetResponseHeaderLayer,
    tracing::{error, info},
    tracing_appender::non_blocking,
    tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt},
};

mod arguments;
mod gemini;
mod logs;
mod options;
mod settings;
mod signal;
mod subcommand;
mod synthesizer;

pub const USER_AGENT: &str = "mirage/0.1.0";
pub const DEFAULT_MODEL: &str = "gemini-flash-latest";
pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GENERATION_TIMEOUT: u64 = 30;

type Result<T = (), E = Error> = std::result::Result<T, E>;

pub fn main() {
    let _guard = logs::init();

    let args = Arguments::parse();

    Runtime::new()
        .expect("Failed to create tokio runtime")
        .block_on(async {
            let cancel_token = signal::setup_signal_handler();

            match args.run(cancel_token).await {
                Err(err) => {
                    eprintln!("error: {err}");

                    for (i, cause) in err.chain().skip(1).enumerate() {
                        if i == 0 {
                            eprintln!();
                            eprintln!("because:");
                        }
                        eprintln!("- {cause}");
                    }

                    if env::var_os("RUST_BACKTRACE")
                        .map(|val| val == "1")
                        .unwrap_or_default()
                    {
                        eprintln!();
                        eprintln!("{}", err.backtrace());
                    }
                    process::exit(1);
                }
                Ok(_) => {
                    process::exit(0);
                }
            }
        });
}
