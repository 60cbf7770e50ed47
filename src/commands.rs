//! CLI Commands
//!
//! Argument types for each subcommand and the code that runs them against a
//! set of cloud ports.

use crate::adapters::CloudPorts;
use crate::addon::{
    validate_pool_parameters, AddonConfig, AddonOrchestrator, DisableOutcome, DisableRequest,
    EnableOutcome, EnableRequest, StoragePoolOption, StoragePoolRequest, StoragePoolType,
};
use crate::compose::{ComposeFile, ContainerAppPlan};
use crate::domain::ports::{PrompterRef, ReporterRef};
use crate::error::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;
use tracing::info;

const VALIDATION_PROMPT: &str = "Disabling Azure Container Storage will forcefully delete all the \
    storagepools on the cluster and affect the applications using them. Do you want to validate \
    whether any of the storagepools are in use before disabling Azure Container Storage?";

// =============================================================================
// Arguments
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install the container storage extension on a cluster
    Enable(EnableArgs),

    /// Remove the container storage extension from a cluster
    Disable(DisableArgs),

    /// Work with compose files
    #[command(subcommand)]
    Compose(ComposeCommand),
}

#[derive(Args, Debug, Clone)]
pub struct EnableArgs {
    #[arg(long, short = 'g')]
    pub resource_group: String,

    #[arg(long, short = 'n')]
    pub cluster_name: String,

    /// azureDisk, elasticSan or ephemeralDisk
    #[arg(long)]
    pub storage_pool_type: StoragePoolType,

    #[arg(long)]
    pub storage_pool_name: Option<String>,

    /// Pool capacity, e.g. 512Gi or 2Ti
    #[arg(long)]
    pub storage_pool_size: Option<String>,

    #[arg(long)]
    pub storage_pool_sku: Option<String>,

    /// NVMe or Temp (ephemeralDisk only)
    #[arg(long)]
    pub storage_pool_option: Option<StoragePoolOption>,

    /// Comma separated nodepool names
    #[arg(long)]
    pub nodepools: Option<String>,

    /// The cluster is being created in the same operation
    #[arg(long)]
    pub cluster_create: bool,
}

impl EnableArgs {
    pub fn pool_request(&self) -> StoragePoolRequest {
        StoragePoolRequest {
            name: self.storage_pool_name.clone(),
            pool_type: self.storage_pool_type,
            size: self.storage_pool_size.clone(),
            sku: self.storage_pool_sku.clone(),
            option: self.storage_pool_option,
            nodepool_names: self.nodepools.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DisableArgs {
    #[arg(long, short = 'g')]
    pub resource_group: String,

    #[arg(long, short = 'n')]
    pub cluster_name: String,

    /// Run pre-uninstall validation without prompting
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Delete without pre-uninstall validation
    #[arg(long, conflicts_with = "yes")]
    pub skip_validation: bool,
}

#[derive(Subcommand, Debug)]
pub enum ComposeCommand {
    /// Print container app plans for a compose file as JSON
    Plan(ComposePlanArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ComposePlanArgs {
    #[arg(long)]
    pub compose_file_path: PathBuf,

    /// Container apps environment resource id
    #[arg(long)]
    pub environment: String,
}

// =============================================================================
// Execution
// =============================================================================

/// Shared state of a command run
pub struct CommandContext {
    pub subscription_id: String,
    pub ports: CloudPorts,
    pub reporter: ReporterRef,
    pub prompter: PrompterRef,
    pub config: AddonConfig,
}

impl CommandContext {
    fn orchestrator(&self) -> AddonOrchestrator {
        AddonOrchestrator::new(self.config.clone(), self.ports.addon_ports(self.reporter.clone()))
    }
}

pub async fn run_enable(ctx: &CommandContext, args: &EnableArgs) -> Result<EnableOutcome> {
    let pool = args.pool_request();
    validate_pool_parameters(&pool)?;

    let cluster = ctx
        .ports
        .clusters
        .managed_cluster(&ctx.subscription_id, &args.resource_group, &args.cluster_name)
        .await?;

    let request = EnableRequest::for_cluster(&ctx.subscription_id, &cluster, pool, args.cluster_create);
    ctx.orchestrator().enable(&request).await
}

pub async fn run_disable(ctx: &CommandContext, args: &DisableArgs) -> Result<DisableOutcome> {
    let perform_validation = if args.skip_validation {
        false
    } else if args.yes {
        true
    } else {
        ctx.prompter.confirm(VALIDATION_PROMPT, true)?
    };
    info!("Pre-uninstall validation: {}", perform_validation);

    let cluster = ctx
        .ports
        .clusters
        .managed_cluster(&ctx.subscription_id, &args.resource_group, &args.cluster_name)
        .await?;

    let request = DisableRequest::for_cluster(&ctx.subscription_id, &cluster, perform_validation);
    ctx.orchestrator().disable(&request).await
}

pub fn run_compose_plan(args: &ComposePlanArgs) -> Result<Vec<ContainerAppPlan>> {
    let file = ComposeFile::load(&args.compose_file_path)?;
    Ok(ContainerAppPlan::from_compose(&file, &args.environment))
}
