//! CLI command handling.
//!
//! Provides subcommands for:
//! - Running the dev service against a property file (`up`)
//! - Showing what a cycle would decide without starting anything (`check`)

mod check;
mod up;

pub use check::{CheckArgs, CheckReport, run_check_command};
pub use up::{UpArgs, run_up_command};

use std::path::Path;

use clap::{ColorChoice, Parser, Subcommand};

use crate::config::{EnvPropertySource, LayeredPropertySource, PropertyMap};
use crate::error::ConfigError;

#[derive(Parser, Debug)]
#[command(name = "amqp-devservices")]
#[command(about = "Throwaway AMQP broker for development and test runs")]
#[command(
    long_about = "Starts an Artemis AMQP broker container when the application's messaging \
                  channels need one, and keeps it across reloads.\nExamples:\n  \
                  amqp-devservices up --config app.toml  # Start and wait for Ctrl-C\n  \
                  amqp-devservices check --config app.toml --json  # Show the decision"
)]
#[command(version)]
#[command(color = ColorChoice::Auto)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "AMQP_DEVSERVICES_LOG_JSON")]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run dev-service cycles until interrupted
    #[command(
        about = "Start the dev broker",
        long_about = "Runs one cycle, prints the broker coordinates and waits for Ctrl-C.\n\
                      With --watch the property file is re-read and a new cycle runs every N seconds.\n\
                      Example: amqp-devservices up --config app.toml --watch 5"
    )]
    Up(UpArgs),

    /// Resolve configuration and print the decision
    #[command(
        about = "Show the dev-service decision",
        long_about = "Resolves configuration and reports what a fresh cycle would do.\n\
                      Example: amqp-devservices check --config app.toml"
    )]
    Check(CheckArgs),
}

/// Build the property stack: environment first, then the optional TOML file.
pub fn load_properties(config: Option<&Path>) -> Result<LayeredPropertySource, ConfigError> {
    let mut properties = LayeredPropertySource::new().with_layer(EnvPropertySource);
    if let Some(path) = config {
        properties = properties.with_layer(PropertyMap::from_toml_file(path)?);
    }
    Ok(properties)
}
