mod cli;
mod simulate;
mod watch;

use std::path::Path;

use spaces_common::SpacesError;
use spaces_config::SpacesConfig;
use tracing_subscriber::EnvFilter;

use cli::Command;

#[tokio::main]
async fn main() {
    let args = cli::parse();

    let config = load(args.config.as_deref());

    // Initialize logging
    let log_directive = args
        .log_level
        .clone()
        .unwrap_or_else(|| format!("spaces_session={}", config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(
                log_directive
                    .parse()
                    .unwrap_or_else(|_| "spaces_session=info".parse().unwrap()),
            ),
        )
        .init();

    tracing::info!("Spaces v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = match args.command {
        Command::Config => {
            println!("{}", spaces_config::config_to_json(&config));
            Ok(())
        }
        Command::Simulate {
            topic,
            record,
            seconds,
        } => simulate::run(config, topic, record, seconds).await,
        Command::Watch { host, user } => watch::run(config, &host, &user).await,
    };

    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn load(path: Option<&str>) -> SpacesConfig {
    let loaded: Result<SpacesConfig, SpacesError> = match path {
        Some(path) => spaces_config::load_config_from(Path::new(path)).map_err(Into::into),
        None => spaces_config::load_config().map_err(Into::into),
    };
    loaded.unwrap_or_else(|e| {
        eprintln!("Config load failed, using defaults: {e}");
        SpacesConfig::default()
    })
}
