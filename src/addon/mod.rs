//! Container Storage Add-on
//!
//! Enable and disable of the container storage extension on a managed
//! cluster, split into the steps the orchestrator drives.

pub mod access;
pub mod config;
pub mod decision;
pub mod lifecycle;
pub mod pool;
pub mod presence;
pub mod registration;
pub mod settings;
pub mod validation;
pub mod workflow;

pub use access::AccessGrantManager;
pub use config::{AddonConfig, RegistrationConfig};
pub use decision::{DecisionContext, DecisionEngine};
pub use lifecycle::LifecycleDriver;
pub use pool::{StoragePoolOption, StoragePoolRequest, StoragePoolType};
pub use presence::{ExtensionInstallationState, PresenceChecker};
pub use registration::ProviderRegistrator;
pub use validation::{validate_nodepool_names, validate_pool_parameters};
pub use workflow::{
    AddonOrchestrator, AddonPorts, DisableOutcome, DisableRequest, EnableOutcome, EnableRequest,
};
