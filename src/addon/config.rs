//! Add-on constants and configuration

use std::time::Duration;

// =============================================================================
// Extension Identity
// =============================================================================

/// Extension type of the container storage add-on
pub const EXTENSION_TYPE: &str = "microsoft.azurecontainerstorage";

/// Installation name of the extension on the cluster
pub const EXTENSION_INSTALLATION_NAME: &str = "azurecontainerstorage";

/// Provider namespace the extension service lives in
pub const KUBERNETES_CONFIGURATION_RP: &str = "Microsoft.KubernetesConfiguration";

// =============================================================================
// Storage Pool Defaults
// =============================================================================

pub const DEFAULT_NODEPOOL_NAME: &str = "nodepool1";
pub const STORAGE_POOL_DEFAULT_SIZE: &str = "512Gi";
pub const STORAGE_POOL_DEFAULT_SIZE_ESAN: &str = "1Ti";
pub const STORAGE_POOL_SKU_PREMIUM_LRS: &str = "Premium_LRS";
pub const STORAGE_POOL_NAME_PREFIX: &str = "storagepool-";
pub const STORAGE_POOL_RANDOM_LENGTH: usize = 7;

/// Disk SKUs accepted for Azure Disk pools
pub const AZURE_DISK_SKUS: &[&str] = &[
    "Premium_LRS",
    "Standard_LRS",
    "StandardSSD_LRS",
    "UltraSSD_LRS",
    "Premium_ZRS",
    "PremiumV2_LRS",
    "StandardSSD_ZRS",
];

/// SKUs accepted for Elastic SAN pools
pub const ELASTIC_SAN_SKUS: &[&str] = &["Premium_LRS", "Premium_ZRS"];

/// VM size prefix of the NVMe-capable (L series) nodepools
pub const NVME_VM_SIZE_PREFIX: &str = "standard_l";

// =============================================================================
// Configuration Setting Keys
// =============================================================================

pub const KEY_STORAGE_POOL_CREATE: &str = "cli.storagePool.create";
pub const KEY_STORAGE_POOL_NAME: &str = "cli.storagePool.name";
pub const KEY_STORAGE_POOL_SIZE: &str = "cli.storagePool.size";
pub const KEY_STORAGE_POOL_TYPE: &str = "cli.storagePool.type";
pub const KEY_NODE_NODEPOOLS: &str = "cli.node.nodepools";
pub const KEY_EPHEMERAL_DISK_TYPE: &str = "cli.storagePool.ephemeralDisk.diskType";
pub const KEY_ELASTIC_SAN_SKU: &str = "cli.storagePool.elasticSan.sku";
pub const KEY_AZURE_DISK_SKU: &str = "cli.storagePool.azureDisk.sku";
pub const KEY_UNINSTALL_VALIDATION: &str = "cli.storagePool.uninstallValidation";

/// Marker the extension reports when uninstall validation hooks reject a delete
pub const PRE_UPGRADE_HOOKS_FAILED: &str = "pre-upgrade hooks failed";

// =============================================================================
// Configuration
// =============================================================================

/// Parameters of the extension install
#[derive(Debug, Clone)]
pub struct AddonConfig {
    /// Extension type
    pub extension_type: String,
    /// Installation name on the cluster
    pub installation_name: String,
    /// Auto-upgrade minor versions
    pub auto_upgrade_minor_version: bool,
    /// Release train
    pub release_train: String,
    /// Install scope
    pub scope: String,
    /// Namespace the extension releases into
    pub release_namespace: String,
    /// Nodepool used when none is requested
    pub default_nodepool: String,
    /// Provider registration behaviour
    pub registration: RegistrationConfig,
}

impl Default for AddonConfig {
    fn default() -> Self {
        Self {
            extension_type: EXTENSION_TYPE.to_string(),
            installation_name: EXTENSION_INSTALLATION_NAME.to_string(),
            auto_upgrade_minor_version: true,
            release_train: "stable".to_string(),
            scope: "cluster".to_string(),
            release_namespace: "acstor".to_string(),
            default_nodepool: DEFAULT_NODEPOOL_NAME.to_string(),
            registration: RegistrationConfig::default(),
        }
    }
}

/// Provider registration polling
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    /// Provider namespace to register
    pub namespace: String,
    /// Interval between registration checks
    pub poll_interval: Duration,
    /// Give up waiting after this long
    pub timeout: Duration,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            namespace: KUBERNETES_CONFIGURATION_RP.to_string(),
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(120),
        }
    }
}
