//! `check`: report what a fresh cycle would do, without starting anything.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use serde::Serialize;

use crate::cli::load_properties;
use crate::config::{DevServicesConfig, LaunchMode};
use crate::devservices::{
    Decision, DevServiceController, InMemoryPublisher, has_channel_needing_discovery,
};
use crate::runtime::{DockerDetection, DockerRuntime, check_docker};

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// TOML property file (environment variables override it)
    #[arg(short, long, env = "AMQP_DEVSERVICES_CONFIG")]
    pub config: Option<PathBuf>,

    /// Launch mode to evaluate
    #[arg(long, default_value_t = LaunchMode::Development)]
    pub mode: LaunchMode,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Outcome of a `check` run.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub mode: String,
    pub enabled: bool,
    pub image_name: String,
    pub fixed_port: Option<u16>,
    pub extra_args: String,
    pub startup_timeout_secs: u64,
    pub needs_discovery: bool,
    pub decision: String,
    pub docker: &'static str,
    pub hint: Option<String>,
}

impl CheckReport {
    pub fn new(
        mode: LaunchMode,
        config: &DevServicesConfig,
        needs_discovery: bool,
        decision: &Decision,
        docker: DockerDetection,
    ) -> Self {
        Self {
            mode: mode.to_string(),
            enabled: config.enabled,
            image_name: config.image_name.clone(),
            fixed_port: config.fixed_port,
            extra_args: config.extra_args.clone(),
            startup_timeout_secs: config.startup_timeout.as_secs(),
            needs_discovery,
            decision: decision.to_string(),
            docker: docker.status.as_str(),
            hint: docker.hint(),
        }
    }

    fn print_text(&self) {
        println!("AMQP dev service check ({} mode)", self.mode);
        println!("  enabled            {}", self.enabled);
        println!("  image              {}", self.image_name);
        match self.fixed_port {
            Some(port) => println!("  port               {port}"),
            None => println!("  port               random"),
        }
        println!("  extra args         {}", self.extra_args);
        println!("  startup timeout    {}s", self.startup_timeout_secs);
        println!("  needs discovery    {}", self.needs_discovery);
        println!("  docker             {}", self.docker);
        println!("  decision           {}", self.decision);
        if let Some(hint) = &self.hint {
            println!();
            println!("  {hint}");
        }
    }
}

/// Run the `check` command.
pub async fn run_check_command(args: CheckArgs) -> anyhow::Result<()> {
    let properties = load_properties(args.config.as_deref())?;
    let controller = DevServiceController::new(
        Arc::new(DockerRuntime::new()),
        Arc::new(InMemoryPublisher::new()),
        vec![],
    );

    let (config, decision) = controller.plan(&properties, args.mode).await?;
    let needs_discovery = has_channel_needing_discovery(&properties);
    let docker = check_docker().await;
    let report = CheckReport::new(args.mode, &config, needs_discovery, &decision, docker);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print_text();
    }
    Ok(())
}
