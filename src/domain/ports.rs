//! Domain Ports - Core trait definitions for the storage add-on
//!
//! These traits define the boundaries between the add-on workflows and the
//! remote services they drive. Adapters implement these traits to provide
//! concrete functionality.

use crate::error::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Configuration Settings
// =============================================================================

/// Value of a single extension configuration setting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Str(String),
}

impl SettingValue {
    /// Render as the string form the extension service stores
    pub fn as_wire(&self) -> String {
        match self {
            SettingValue::Bool(b) => b.to_string(),
            SettingValue::Str(s) => s.clone(),
        }
    }
}

impl std::fmt::Display for SettingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::Str(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::Str(value)
    }
}

/// A single-key configuration setting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSetting {
    pub key: String,
    pub value: SettingValue,
}

/// Ordered configuration settings passed to the extension installer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSettings(Vec<ConfigurationSetting>);

impl ConfigurationSettings {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a setting. A key that is already present keeps its first value.
    pub fn push(&mut self, key: &str, value: impl Into<SettingValue>) {
        if self.get(key).is_some() {
            return;
        }
        self.0.push(ConfigurationSetting {
            key: key.to_string(),
            value: value.into(),
        });
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.0.iter().find(|s| s.key == key).map(|s| &s.value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigurationSetting> {
        self.0.iter()
    }

    /// Keys in emission order
    pub fn keys(&self) -> Vec<&str> {
        self.0.iter().map(|s| s.key.as_str()).collect()
    }

    /// Insertion-ordered map of string values, as sent to the resource manager
    pub fn to_wire_map(&self) -> IndexMap<String, String> {
        self.0
            .iter()
            .map(|s| (s.key.clone(), s.value.as_wire()))
            .collect()
    }
}

// =============================================================================
// Cluster Topology
// =============================================================================

/// Agent pool (nodepool) of a managed cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPoolProfile {
    /// Nodepool name
    pub name: String,
    /// VM size (e.g., Standard_L8s_v3)
    pub vm_size: String,
    /// Node count
    #[serde(default)]
    pub count: u32,
    /// System or User
    #[serde(default)]
    pub mode: String,
}

impl AgentPoolProfile {
    pub fn new(name: &str, vm_size: &str) -> Self {
        Self {
            name: name.to_string(),
            vm_size: vm_size.to_string(),
            count: 1,
            mode: "System".to_string(),
        }
    }
}

/// The parts of a managed cluster the add-on workflows need
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterInfo {
    pub name: String,
    pub resource_group: String,
    /// Managed (infrastructure) resource group
    pub node_resource_group: String,
    /// Object ID of the kubelet identity
    pub kubelet_object_id: String,
    pub agent_pools: Vec<AgentPoolProfile>,
}

// =============================================================================
// Long-running Operations
// =============================================================================

/// Provisioning state of a remote resource or operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningState {
    Succeeded,
    Failed,
    Canceled,
    Creating,
    Updating,
    Deleting,
    Accepted,
    Other(String),
}

impl ProvisioningState {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "succeeded" => ProvisioningState::Succeeded,
            "failed" => ProvisioningState::Failed,
            "canceled" | "cancelled" => ProvisioningState::Canceled,
            "creating" => ProvisioningState::Creating,
            "updating" => ProvisioningState::Updating,
            "deleting" => ProvisioningState::Deleting,
            "accepted" | "inprogress" | "running" => ProvisioningState::Accepted,
            _ => ProvisioningState::Other(value.to_string()),
        }
    }

    /// Whether the operation has stopped changing
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProvisioningState::Succeeded | ProvisioningState::Failed | ProvisioningState::Canceled
        )
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, ProvisioningState::Succeeded)
    }
}

impl std::fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisioningState::Succeeded => write!(f, "Succeeded"),
            ProvisioningState::Failed => write!(f, "Failed"),
            ProvisioningState::Canceled => write!(f, "Canceled"),
            ProvisioningState::Creating => write!(f, "Creating"),
            ProvisioningState::Updating => write!(f, "Updating"),
            ProvisioningState::Deleting => write!(f, "Deleting"),
            ProvisioningState::Accepted => write!(f, "Accepted"),
            ProvisioningState::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Kind of extension operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// Handle to a long-running extension operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHandle {
    pub kind: OperationKind,
    /// Extension installation name
    pub extension_name: String,
    /// Full resource ID of the extension
    pub resource_id: String,
    /// Operation status endpoint, when the service returned one
    pub status_url: Option<String>,
    /// State reported with the initial response
    pub initial_state: Option<ProvisioningState>,
    /// Whether the caller asked not to wait on this operation
    pub no_wait: bool,
}

// =============================================================================
// Extensions
// =============================================================================

/// Installed extension as reported by the extension service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionInfo {
    pub name: String,
    pub extension_type: String,
    pub provisioning_state: ProvisioningState,
    pub version: Option<String>,
}

/// Parameters for an extension install
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionInstall {
    /// Installation name
    pub name: String,
    /// Extension type
    pub extension_type: String,
    pub auto_upgrade_minor_version: bool,
    pub release_train: String,
    /// Scope (cluster or namespace)
    pub scope: String,
    pub release_namespace: String,
    pub configuration_settings: ConfigurationSettings,
}

// =============================================================================
// Roles
// =============================================================================

/// Built-in roles granted to the kubelet identity on the managed resource group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ManagedRole {
    Reader,
    NetworkContributor,
    ElasticSanOwner,
    ElasticSanVolumeGroupOwner,
}

impl ManagedRole {
    /// Role grant set, in grant order
    pub const ALL: [ManagedRole; 4] = [
        ManagedRole::Reader,
        ManagedRole::NetworkContributor,
        ManagedRole::ElasticSanOwner,
        ManagedRole::ElasticSanVolumeGroupOwner,
    ];

    /// Built-in role definition GUID
    pub fn definition_id(&self) -> &'static str {
        match self {
            ManagedRole::Reader => "acdd72a7-3385-48ef-bd42-f606fba81ae7",
            ManagedRole::NetworkContributor => "4d97b98b-1d4f-4787-a291-c67834d212e7",
            ManagedRole::ElasticSanOwner => "80dcbedb-47ef-405d-95bd-188a1b4ac406",
            ManagedRole::ElasticSanVolumeGroupOwner => "a8281131-f312-4f34-8d98-ae12be9f0d23",
        }
    }
}

impl std::fmt::Display for ManagedRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagedRole::Reader => write!(f, "Reader"),
            ManagedRole::NetworkContributor => write!(f, "Network Contributor"),
            ManagedRole::ElasticSanOwner => write!(f, "Elastic SAN Owner"),
            ManagedRole::ElasticSanVolumeGroupOwner => {
                write!(f, "Elastic SAN Volume Group Owner")
            }
        }
    }
}

// =============================================================================
// Provider Registry Port
// =============================================================================

/// Port for subscription resource-provider registration
#[async_trait]
pub trait ProviderRegistry: Send + Sync {
    /// Check whether a provider namespace is registered
    async fn is_registered(&self, subscription_id: &str, namespace: &str) -> Result<bool>;

    /// Request registration of a provider namespace
    async fn register(&self, subscription_id: &str, namespace: &str) -> Result<()>;
}

// =============================================================================
// Extension Client Port
// =============================================================================

/// Port for cluster extension lifecycle operations
#[async_trait]
pub trait ExtensionClient: Send + Sync {
    /// Get an installed extension, `None` when absent
    async fn show(
        &self,
        resource_group: &str,
        cluster_name: &str,
        name: &str,
    ) -> Result<Option<ExtensionInfo>>;

    /// Start an extension install
    async fn create(
        &self,
        resource_group: &str,
        cluster_name: &str,
        install: &ExtensionInstall,
    ) -> Result<OperationHandle>;

    /// Start a configuration update
    async fn update(
        &self,
        resource_group: &str,
        cluster_name: &str,
        name: &str,
        settings: &ConfigurationSettings,
        no_wait: bool,
    ) -> Result<OperationHandle>;

    /// Start an extension delete
    async fn delete(
        &self,
        resource_group: &str,
        cluster_name: &str,
        name: &str,
        no_wait: bool,
    ) -> Result<OperationHandle>;

    /// Block until the operation reaches a terminal state
    async fn wait(&self, handle: &OperationHandle) -> Result<ProvisioningState>;
}

// =============================================================================
// Role Assigner Port
// =============================================================================

/// Port for role assignment operations
#[async_trait]
pub trait RoleAssigner: Send + Sync {
    /// Assign a role to a principal at a scope. Existing assignments are not an error.
    async fn assign(&self, scope: &str, role: ManagedRole, principal_id: &str) -> Result<()>;

    /// Remove all assignments of a role to a principal at a scope
    async fn revoke(&self, scope: &str, role: ManagedRole, principal_id: &str) -> Result<()>;
}

// =============================================================================
// Cluster Inspector Port
// =============================================================================

/// Port for reading managed cluster topology
#[async_trait]
pub trait ClusterInspector: Send + Sync {
    async fn managed_cluster(
        &self,
        subscription_id: &str,
        resource_group: &str,
        cluster_name: &str,
    ) -> Result<ManagedClusterInfo>;
}

// =============================================================================
// User Interaction Ports
// =============================================================================

/// User-facing output of the workflows
pub trait Reporter: Send + Sync {
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
}

/// Yes/no questions to the user
pub trait Prompter: Send + Sync {
    fn confirm(&self, message: &str, default: bool) -> Result<bool>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type ProviderRegistryRef = Arc<dyn ProviderRegistry>;
pub type ExtensionClientRef = Arc<dyn ExtensionClient>;
pub type RoleAssignerRef = Arc<dyn RoleAssigner>;
pub type ClusterInspectorRef = Arc<dyn ClusterInspector>;
pub type ReporterRef = Arc<dyn Reporter>;
pub type PrompterRef = Arc<dyn Prompter>;
