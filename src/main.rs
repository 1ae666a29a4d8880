use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keystone::cli::{self, Cli, Commands};
use keystone::config::Config;
use keystone::notifications::MailService;
use keystone::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::GenCert {
            cert_dir,
            days,
            force,
        } => cli::gen_cert(&config, cert_dir, days, force),
        Commands::ShowConfig => {
            cli::show_config(&config);
            Ok(())
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!(
        environment = config.server.environment.as_str(),
        "Starting Keystone v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Initialize database
    let db = keystone::db::init(&config.database).await?;

    let mail = MailService::from_config(&config.email);
    if !mail.is_enabled() {
        tracing::warn!("SMTP is not configured, login codes will not be emailed");
    }

    let state = Arc::new(AppState::new(config.clone(), db, mail));
    let app = keystone::api::create_router(state);

    keystone::server::serve(app, &config).await
}
