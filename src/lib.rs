//! Cluster Storage Add-on
//!
//! Lifecycle of the container storage extension on a managed Kubernetes
//! cluster: provider registration, role grants on the managed resource group,
//! storage pool settings, install, pre-uninstall validation and removal.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                         Add-on Orchestrator                           │
//! │  ┌────────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌───────────┐  │
//! │  │ Provider   │ │ Presence │ │ Decision │ │ Settings │ │ Lifecycle │  │
//! │  │ Registrar  │ │ Checker  │ │ Engine   │ │          │ │ Driver    │  │
//! │  └─────┬──────┘ └────┬─────┘ └────┬─────┘ └──────────┘ └─────┬─────┘  │
//! │        │             │            │ Access Grants            │        │
//! ├────────┴─────────────┴────────────┴──────────────────────────┴────────┤
//! │                          Domain Ports                                  │
//! ├───────────────────────────────────┬────────────────────────────────────┤
//! │   ARM Adapter (REST)              │   In-memory Adapter (standalone)   │
//! └───────────────────────────────────┴────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`addon`]: Enable/disable workflows and their steps
//! - [`adapters`]: Resource manager, in-memory and console adapters
//! - [`compose`]: Container app plans from compose files
//! - [`commands`]: CLI subcommands
//! - [`domain`]: Core domain types and ports
//! - [`error`]: Error types and handling

pub mod adapters;
pub mod addon;
pub mod commands;
pub mod compose;
pub mod domain;
pub mod error;

// Re-export commonly used types
pub use addon::{
    AddonConfig, AddonOrchestrator, AddonPorts, DisableOutcome, DisableRequest, EnableOutcome,
    EnableRequest, RegistrationConfig, StoragePoolOption, StoragePoolRequest, StoragePoolType,
};

pub use adapters::{AdapterFactory, AdapterKind, ArmClient, ArmConfig, CloudPorts, InMemoryCloud};

pub use compose::{ComposeFile, ContainerAppPlan};

pub use domain::ports::{
    ClusterInspector, ConfigurationSettings, ExtensionClient, ManagedClusterInfo, ManagedRole,
    Prompter, ProviderRegistry, ProvisioningState, Reporter, RoleAssigner,
};

pub use error::{Error, ErrorTier, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
