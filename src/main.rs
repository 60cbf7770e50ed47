//! Cluster Storage Add-on CLI
//!
//! Enables and disables the container storage extension on a managed
//! Kubernetes cluster, and plans container apps from compose files.
//!
//! ```text
//! cluster-storage-addon enable  -g <rg> -n <cluster> --storage-pool-type azureDisk
//! cluster-storage-addon disable -g <rg> -n <cluster> [--yes | --skip-validation]
//! cluster-storage-addon compose plan --compose-file-path <file> --environment <id>
//! ```

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cluster_storage_addon::adapters::{
    AdapterFactory, AdapterKind, ArmConfig, CloudPorts, TerminalPrompter, TracingReporter,
};
use cluster_storage_addon::commands::{self, Command, CommandContext};
use cluster_storage_addon::{AddonConfig, EnableOutcome, Error, Result};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Cluster Storage Add-on - container storage extension lifecycle for managed clusters
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subscription holding the cluster
    #[arg(long, global = true, env = "AZURE_SUBSCRIPTION_ID")]
    subscription: Option<String>,

    /// Bearer token for the resource manager
    #[arg(long, global = true, env = "AZURE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Resource manager endpoint
    #[arg(
        long,
        global = true,
        env = "ARM_ENDPOINT",
        default_value = "https://management.azure.com"
    )]
    arm_endpoint: String,

    /// Run against an in-memory cloud
    #[arg(long, global = true, env = "STANDALONE")]
    standalone: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(&cli);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    info!("Cluster Storage Add-on {}", cluster_storage_addon::VERSION);

    match &cli.command {
        Command::Compose(commands::ComposeCommand::Plan(args)) => {
            let plans = commands::run_compose_plan(args).with_context(|| {
                format!("Unable to plan {}", args.compose_file_path.display())
            })?;
            println!("{}", serde_json::to_string_pretty(&plans)?);
            Ok(())
        }
        Command::Enable(args) => {
            let ctx = context(&cli, &args.resource_group, &args.cluster_name)?;
            match commands::run_enable(&ctx, args).await? {
                EnableOutcome::Installed { settings } => {
                    println!("{}", serde_json::to_string_pretty(&settings.to_wire_map())?);
                }
                outcome => info!("Enable finished: {:?}", outcome),
            }
            Ok(())
        }
        Command::Disable(args) => {
            let ctx = context(&cli, &args.resource_group, &args.cluster_name)?;
            let outcome = commands::run_disable(&ctx, args).await?;
            info!(
                "Disable finished (validated: {}, roles revoked: {})",
                outcome.validated, outcome.roles_revoked
            );
            Ok(())
        }
    }
}

fn context(cli: &Cli, resource_group: &str, cluster_name: &str) -> Result<CommandContext> {
    let subscription_id = match (&cli.subscription, cli.standalone) {
        (Some(id), _) => id.clone(),
        (None, true) => "00000000-0000-0000-0000-000000000000".to_string(),
        (None, false) => {
            return Err(Error::Configuration(
                "--subscription or AZURE_SUBSCRIPTION_ID is required".into(),
            ))
        }
    };

    let ports: CloudPorts = if cli.standalone {
        info!("Standalone mode: using an in-memory cloud");
        AdapterFactory::standalone(resource_group, cluster_name)
    } else {
        let config = ArmConfig {
            endpoint: cli.arm_endpoint.clone(),
            access_token: cli.access_token.clone().unwrap_or_default(),
            subscription_id: subscription_id.clone(),
            ..Default::default()
        };
        AdapterFactory::create(AdapterKind::Arm, config)?
    };

    Ok(CommandContext {
        subscription_id,
        ports,
        reporter: Arc::new(TracingReporter),
        prompter: Arc::new(TerminalPrompter),
        config: AddonConfig::default(),
    })
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(cli: &Cli) {
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=info", "rustls=warn"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }

    if cli.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
