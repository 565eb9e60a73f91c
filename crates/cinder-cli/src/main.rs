use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cinder_host::{load_config, HostConfig};
use cinder_runtime::EngineKind;

#[derive(Parser)]
#[command(name = "cinder", version, about = "WebAssembly HTTP function host")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the configured deployments
    Serve {
        /// Path to the host config YAML file
        config: PathBuf,
    },
    /// Validate configuration and deployment artifacts without serving
    Check {
        /// Path to the host config YAML file
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    match cli.command {
        Commands::Serve { config } => {
            let config = load_config(&config)?;
            cinder_host::serve(config).await
        }
        Commands::Check { config } => check(&config),
    }
}

/// `RUST_LOG` takes precedence; otherwise `--log-level` applies to the
/// cinder crates and everything below them. Guest stderr is passed
/// through untouched, so the host's own lines carry timestamps and level
/// to stay distinguishable.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{level},wasmtime=warn,cranelift_codegen=warn"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn check(path: &Path) -> anyhow::Result<()> {
    let config = load_config(path)?;
    check_artifacts(&config)?;

    // Building the host exercises engine construction and, when
    // configured, the scripted-runtime module read.
    cinder_host::build_host(&config)?;

    tracing::info!(
        deployments = config.deployments.len(),
        listen = %config.listen,
        "configuration OK"
    );
    Ok(())
}

fn check_artifacts(config: &HostConfig) -> anyhow::Result<()> {
    let mut scripted = 0usize;
    for deployment in &config.deployments {
        std::fs::metadata(&deployment.artifact).with_context(|| {
            format!(
                "deployment {} artifact {} is not readable",
                deployment.id,
                deployment.artifact.display()
            )
        })?;
        if deployment.engine == EngineKind::Scripted {
            scripted += 1;
        }
    }
    if scripted > 0 && config.script_runtime.is_none() {
        anyhow::bail!(
            "{scripted} scripted deployment(s) configured but no script_runtime module is set"
        );
    }
    Ok(())
}
