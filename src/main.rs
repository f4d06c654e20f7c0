//! AMQP dev services - main entry point.

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use amqp_devservices::cli::{Cli, Command, run_check_command, run_up_command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env feeds both clap's env-backed flags and the environment property layer
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("amqp_devservices=info"));

    if cli.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }

    match cli.command {
        Command::Up(args) => run_up_command(args).await,
        Command::Check(args) => run_check_command(args).await,
    }
}
