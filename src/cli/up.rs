//! `up`: run dev-service cycles until the process is asked to stop.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use crate::cli::load_properties;
use crate::config::LaunchMode;
use crate::devservices::{
    ApplyOutcome, BrokerParams, ConfigPublisher, DevServiceController, EnvFilePublisher,
    InMemoryPublisher,
};
use crate::runtime::{ContainerRuntime, DockerRuntime};
use crate::shutdown::{ShutdownNotifier, ShutdownSignal, wait_for_termination};

#[derive(Args, Debug, Clone)]
pub struct UpArgs {
    /// TOML property file (environment variables override it)
    #[arg(short, long, env = "AMQP_DEVSERVICES_CONFIG")]
    pub config: Option<PathBuf>,

    /// Launch mode: development or test
    #[arg(long, default_value_t = LaunchMode::Development)]
    pub mode: LaunchMode,

    /// Re-read the property file and run a new cycle every N seconds
    #[arg(long, value_name = "SECS")]
    pub watch: Option<u64>,

    /// Also write the broker coordinates to this .env file
    #[arg(long, env = "AMQP_DEVSERVICES_ENV_FILE")]
    pub env_file: Option<PathBuf>,
}

/// Run the `up` command.
pub async fn run_up_command(args: UpArgs) -> anyhow::Result<()> {
    if let Some(path) = &args.env_file {
        let cwd = std::env::current_dir()?;
        if reloaded_as_dotenv(path, &cwd) {
            anyhow::bail!(
                "--env-file {} would be loaded back as .env on the next run, where \
                 AMQP_HOST/AMQP_PORT count as an external broker and the dev service \
                 would never start again; choose another file name",
                path.display()
            );
        }
    }

    // Listen before the first cycle: provisioning can take a while and must
    // not be cut short by the default SIGINT handling.
    let terminate = wait_for_termination();
    tokio::pin!(terminate);

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::new());
    let sink: Arc<dyn ConfigPublisher> = match &args.env_file {
        Some(path) => Arc::new(EnvFilePublisher::new(path)),
        None => Arc::new(InMemoryPublisher::new()),
    };

    let process = Arc::new(ShutdownSignal::new("process"));
    let context = Arc::new(ShutdownSignal::new("application-context"));
    let notifiers: Vec<Arc<dyn ShutdownNotifier>> = vec![
        Arc::clone(&process) as Arc<dyn ShutdownNotifier>,
        Arc::clone(&context) as Arc<dyn ShutdownNotifier>,
    ];
    let controller = DevServiceController::new(runtime, sink, notifiers);

    let result = match args.watch {
        None => match run_cycle(&controller, args.config.as_deref(), args.mode).await {
            Ok(()) => {
                println!("Press Ctrl-C to stop.");
                terminate.await;
                Ok(())
            }
            Err(e) => Err(e),
        },
        Some(secs) => {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
            loop {
                tokio::select! {
                    _ = &mut terminate => break,
                    _ = ticker.tick() => {
                        if let Err(e) = run_cycle(&controller, args.config.as_deref(), args.mode).await {
                            tracing::error!("Dev service cycle failed: {:#}", e);
                        }
                    }
                }
            }
            Ok(())
        }
    };

    tracing::info!("Shutting down");
    process.fire().await;
    result
}

/// Whether `dotenvy::dotenv()` run from `cwd` could load `path` on startup.
///
/// dotenvy looks for `.env` in the working directory and its ancestors.
fn reloaded_as_dotenv(path: &Path, cwd: &Path) -> bool {
    if path.file_name() != Some(OsStr::new(".env")) {
        return false;
    }
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => cwd.join(parent),
        _ => cwd.to_path_buf(),
    };
    let dir = std::fs::canonicalize(&dir).unwrap_or(dir);
    let cwd = std::fs::canonicalize(cwd).unwrap_or_else(|_| cwd.to_path_buf());
    cwd.starts_with(dir)
}

async fn run_cycle(
    controller: &DevServiceController,
    config: Option<&Path>,
    mode: LaunchMode,
) -> anyhow::Result<()> {
    let properties = load_properties(config)?;
    match controller.run_cycle(&properties, mode).await? {
        ApplyOutcome::Started(params) => print_params("started", &params),
        ApplyOutcome::Reused(params) => {
            tracing::debug!("Keeping broker at {}:{}", params.host, params.port)
        }
        ApplyOutcome::Inactive => println!("No AMQP dev service running."),
    }
    Ok(())
}

fn print_params(verb: &str, params: &BrokerParams) {
    println!("AMQP broker {verb}");
    println!("  amqp-host      {}", params.host);
    println!("  amqp-port      {}", params.port);
    println!("  amqp-user      {}", params.user);
    println!("  amqp-password  {}", params.password());
}
