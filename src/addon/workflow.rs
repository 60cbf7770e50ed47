//! Add-on Orchestrator
//!
//! Drives the enable and disable workflows:
//!
//! ```text
//! enable:  register provider -> presence check -> defaults -> nodepool check
//!          -> create decision (role grants) -> settings -> install -> wait
//! disable: presence check -> [uninstall validation] -> delete -> revoke roles
//! ```
//!
//! Enable never propagates provider, presence or install failures. It reports
//! them and returns an [`EnableOutcome`] so an enclosing cluster create carries
//! on. Disable propagates every failure, since a half-disabled add-on is unsafe.

use crate::addon::access::AccessGrantManager;
use crate::addon::config::{AddonConfig, PRE_UPGRADE_HOOKS_FAILED};
use crate::addon::decision::{DecisionContext, DecisionEngine};
use crate::addon::lifecycle::LifecycleDriver;
use crate::addon::pool::StoragePoolRequest;
use crate::addon::presence::PresenceChecker;
use crate::addon::registration::ProviderRegistrator;
use crate::addon::validation::validate_nodepool_names;
use crate::domain::ports::{
    AgentPoolProfile, ConfigurationSettings, ExtensionClientRef, ManagedClusterInfo,
    ProviderRegistryRef, ReporterRef, RoleAssignerRef,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// =============================================================================
// Requests and Outcomes
// =============================================================================

/// Everything an enable call needs
#[derive(Debug, Clone)]
pub struct EnableRequest {
    pub subscription_id: String,
    pub resource_group: String,
    pub cluster_name: String,
    /// Managed resource group of the cluster
    pub node_resource_group: String,
    pub kubelet_object_id: String,
    pub pool: StoragePoolRequest,
    pub agent_pools: Vec<AgentPoolProfile>,
    /// Part of an initial cluster create rather than an update
    pub is_cluster_create: bool,
}

impl EnableRequest {
    pub fn for_cluster(
        subscription_id: &str,
        cluster: &ManagedClusterInfo,
        pool: StoragePoolRequest,
        is_cluster_create: bool,
    ) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            resource_group: cluster.resource_group.clone(),
            cluster_name: cluster.name.clone(),
            node_resource_group: cluster.node_resource_group.clone(),
            kubelet_object_id: cluster.kubelet_object_id.clone(),
            pool,
            agent_pools: cluster.agent_pools.clone(),
            is_cluster_create,
        }
    }
}

/// How an enable call ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnableOutcome {
    /// The extension provider could not be registered; nothing was sent
    ProviderNotRegistered,
    /// The extension is already on the cluster; nothing was sent
    AlreadyInstalled,
    Installed { settings: ConfigurationSettings },
    InstallFailed {
        settings: ConfigurationSettings,
        message: String,
    },
}

/// Everything a disable call needs
#[derive(Debug, Clone)]
pub struct DisableRequest {
    pub subscription_id: String,
    pub resource_group: String,
    pub cluster_name: String,
    pub node_resource_group: String,
    pub kubelet_object_id: String,
    /// Ask the extension to confirm no storage pool is in use before deleting
    pub perform_validation: bool,
}

impl DisableRequest {
    pub fn for_cluster(subscription_id: &str, cluster: &ManagedClusterInfo, perform_validation: bool) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            resource_group: cluster.resource_group.clone(),
            cluster_name: cluster.name.clone(),
            node_resource_group: cluster.node_resource_group.clone(),
            kubelet_object_id: cluster.kubelet_object_id.clone(),
            perform_validation,
        }
    }
}

/// Result of a completed disable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableOutcome {
    /// Uninstall validation ran and passed
    pub validated: bool,
    /// The whole role set was revoked
    pub roles_revoked: bool,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Remote services the orchestrator drives
#[derive(Clone)]
pub struct AddonPorts {
    pub providers: ProviderRegistryRef,
    pub extensions: ExtensionClientRef,
    pub roles: RoleAssignerRef,
    pub reporter: ReporterRef,
}

pub struct AddonOrchestrator {
    config: AddonConfig,
    registrator: ProviderRegistrator,
    presence: PresenceChecker,
    access: AccessGrantManager,
    lifecycle: LifecycleDriver,
    reporter: ReporterRef,
}

impl AddonOrchestrator {
    pub fn new(config: AddonConfig, ports: AddonPorts) -> Self {
        Self {
            registrator: ProviderRegistrator::new(
                ports.providers,
                ports.reporter.clone(),
                config.registration.clone(),
            ),
            presence: PresenceChecker::new(
                ports.extensions.clone(),
                &config.installation_name,
                &config.extension_type,
            ),
            access: AccessGrantManager::new(ports.roles, ports.reporter.clone()),
            lifecycle: LifecycleDriver::new(ports.extensions, config.clone()),
            reporter: ports.reporter,
            config,
        }
    }

    /// Enable the add-on. Only a nodepool that does not exist on the cluster
    /// is an error; every other failure is reported and returned as an outcome.
    pub async fn enable(&self, request: &EnableRequest) -> Result<EnableOutcome> {
        info!(
            "Enabling container storage on {}/{} ({})",
            request.resource_group, request.cluster_name, request.pool.pool_type
        );

        if !self.registrator.ensure_registered(&request.subscription_id).await {
            return Ok(EnableOutcome::ProviderNotRegistered);
        }

        if !request.is_cluster_create
            && self
                .presence
                .is_installed(&request.resource_group, &request.cluster_name)
                .await
        {
            let err = Error::ExtensionAlreadyInstalled {
                extension_type: self.config.extension_type.clone(),
            };
            self.reporter.error(&err.to_string());
            return Ok(EnableOutcome::AlreadyInstalled);
        }

        let pool = request.pool.clone().with_defaults(&self.config.default_nodepool);
        validate_nodepool_names(pool.nodepools(), &request.agent_pools)?;

        let ctx = DecisionContext {
            subscription_id: &request.subscription_id,
            node_resource_group: &request.node_resource_group,
            kubelet_object_id: &request.kubelet_object_id,
            agent_pools: &request.agent_pools,
        };
        let create = DecisionEngine::new(&self.access, self.reporter.clone())
            .should_create(&ctx, &pool)
            .await;

        let settings = ConfigurationSettings::assemble(&pool, create);
        debug!("Configuration settings: {:?}", settings.keys());

        match self
            .lifecycle
            .install(&request.resource_group, &request.cluster_name, settings.clone())
            .await
        {
            Ok(_) => {
                self.reporter.warning("Azure Container Storage successfully installed.");
                Ok(EnableOutcome::Installed { settings })
            }
            Err(e) => {
                let message = e.to_string();
                if request.is_cluster_create {
                    self.reporter.error(&format!(
                        "Azure Container Storage failed to install.\nError: {}",
                        message
                    ));
                    self.reporter.warning(
                        "AKS cluster is created. Please run `az aks update` along with \
                         `--enable-azure-container-storage` to enable Azure Container Storage.",
                    );
                } else {
                    self.reporter.error(&format!(
                        "AKS update to enable Azure Container Storage failed.\nError: {}",
                        message
                    ));
                }
                Ok(EnableOutcome::InstallFailed { settings, message })
            }
        }
    }

    /// Disable the add-on. Every failure is returned as an error.
    pub async fn disable(&self, request: &DisableRequest) -> Result<DisableOutcome> {
        info!(
            "Disabling container storage on {}/{}",
            request.resource_group, request.cluster_name
        );

        if !self
            .presence
            .is_installed(&request.resource_group, &request.cluster_name)
            .await
        {
            return Err(Error::ExtensionNotInstalled {
                extension_type: self.config.extension_type.clone(),
            });
        }

        let mut validated = false;
        if request.perform_validation {
            self.validate_uninstall(&request.resource_group, &request.cluster_name)
                .await?;
            validated = true;
        }

        // Validation already drained the storage pools, so the delete is not awaited
        let no_wait = validated;
        self.lifecycle
            .uninstall(&request.resource_group, &request.cluster_name, no_wait)
            .await
            .map_err(|e| Error::DisableFailed(e.to_string()))?;

        self.reporter.warning("Azure Container Storage has been disabled.");

        let roles_revoked = self
            .access
            .revoke(
                &request.subscription_id,
                &request.node_resource_group,
                &request.kubelet_object_id,
            )
            .await;

        Ok(DisableOutcome {
            validated,
            roles_revoked,
        })
    }

    async fn validate_uninstall(&self, resource_group: &str, cluster_name: &str) -> Result<()> {
        let enable = ConfigurationSettings::uninstall_validation(true);
        match self
            .lifecycle
            .update(resource_group, cluster_name, &enable, false)
            .await
        {
            Ok(_) => {
                self.reporter
                    .warning("Validation succeeded. Disabling Azure Container Storage...");
                Ok(())
            }
            Err(e) => {
                let reset = ConfigurationSettings::uninstall_validation(false);
                if let Err(reset_err) = self
                    .lifecycle
                    .update(resource_group, cluster_name, &reset, true)
                    .await
                {
                    self.reporter.warning(&format!(
                        "Unable to reset the uninstall validation setting on the extension. Error: {}",
                        reset_err
                    ));
                }

                let message = if e.to_string().contains(PRE_UPGRADE_HOOKS_FAILED) {
                    "Validation failed. Please ensure that storagepools are not being used. \
                     Unable to disable Azure Container Storage. Resetting cluster state."
                } else {
                    "Validation failed. Unable to disable Azure Container Storage. Resetting cluster state."
                };
                Err(Error::ValidationFailed(message.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryCloud, RecordingReporter};
    use crate::addon::access::resource_group_scope;
    use crate::addon::config::{KEY_STORAGE_POOL_CREATE, KEY_STORAGE_POOL_TYPE, RegistrationConfig};
    use crate::addon::pool::StoragePoolType;
    use crate::domain::ports::{ManagedRole, SettingValue};
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use std::time::Duration;

    const EXT: &str = "azurecontainerstorage";
    const EXT_TYPE: &str = "microsoft.azurecontainerstorage";

    struct Harness {
        cloud: Arc<InMemoryCloud>,
        reporter: Arc<RecordingReporter>,
        orchestrator: AddonOrchestrator,
    }

    fn harness() -> Harness {
        let cloud = Arc::new(InMemoryCloud::new());
        let reporter = Arc::new(RecordingReporter::default());
        let config = AddonConfig {
            registration: RegistrationConfig {
                poll_interval: Duration::from_millis(1),
                timeout: Duration::from_millis(20),
                ..Default::default()
            },
            ..Default::default()
        };
        let orchestrator = AddonOrchestrator::new(
            config,
            AddonPorts {
                providers: cloud.clone(),
                extensions: cloud.clone(),
                roles: cloud.clone(),
                reporter: reporter.clone(),
            },
        );
        Harness {
            cloud,
            reporter,
            orchestrator,
        }
    }

    fn cluster() -> ManagedClusterInfo {
        ManagedClusterInfo {
            name: "aks".into(),
            resource_group: "rg".into(),
            node_resource_group: "MC_rg_aks_eastus".into(),
            kubelet_object_id: "kubelet-oid".into(),
            agent_pools: vec![
                AgentPoolProfile::new("nodepool1", "Standard_D4s_v3"),
                AgentPoolProfile::new("nvmepool", "Standard_L8s_v3"),
            ],
        }
    }

    fn enable_request(pool_type: StoragePoolType, is_cluster_create: bool) -> EnableRequest {
        EnableRequest::for_cluster("sub-1", &cluster(), StoragePoolRequest::new(pool_type), is_cluster_create)
    }

    fn scope() -> String {
        resource_group_scope("sub-1", "MC_rg_aks_eastus")
    }

    #[tokio::test]
    async fn test_enable_installs_with_pool_settings() {
        let h = harness();

        let outcome = h
            .orchestrator
            .enable(&enable_request(StoragePoolType::AzureDisk, false))
            .await
            .unwrap();

        let settings = assert_matches!(outcome, EnableOutcome::Installed { settings } => settings);
        assert_eq!(settings.get(KEY_STORAGE_POOL_CREATE), Some(&SettingValue::Bool(true)));
        assert_eq!(
            settings.get(KEY_STORAGE_POOL_TYPE),
            Some(&SettingValue::Str("azureDisk".into()))
        );
        assert!(h.cloud.extension("rg", "aks", EXT).is_some());
        assert_eq!(h.cloud.role_assignments(&scope(), "kubelet-oid").len(), ManagedRole::ALL.len());
        assert_eq!(
            h.reporter.warnings(),
            vec!["Azure Container Storage successfully installed.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_enable_when_already_installed() {
        let h = harness();
        h.cloud.preinstall_extension("rg", "aks", EXT, EXT_TYPE);

        let outcome = h
            .orchestrator
            .enable(&enable_request(StoragePoolType::AzureDisk, false))
            .await
            .unwrap();

        assert_eq!(outcome, EnableOutcome::AlreadyInstalled);
        assert!(h.cloud.calls_starting_with("create").is_empty());
        assert!(h.reporter.errors()[0].contains("already installed"));
    }

    #[tokio::test]
    async fn test_cluster_create_skips_presence_check() {
        let h = harness();

        h.orchestrator
            .enable(&enable_request(StoragePoolType::AzureDisk, true))
            .await
            .unwrap();

        assert!(h.cloud.calls_starting_with("show").is_empty());
        assert_eq!(h.cloud.calls_starting_with("create").len(), 1);
    }

    #[tokio::test]
    async fn test_enable_without_provider() {
        let h = harness();
        h.cloud.fail_registration();

        let outcome = h
            .orchestrator
            .enable(&enable_request(StoragePoolType::AzureDisk, false))
            .await
            .unwrap();

        assert_eq!(outcome, EnableOutcome::ProviderNotRegistered);
        assert!(h.cloud.calls_starting_with("create").is_empty());
        assert!(h.cloud.calls_starting_with("assign").is_empty());
    }

    #[tokio::test]
    async fn test_enable_unknown_nodepool() {
        let h = harness();
        let mut request = enable_request(StoragePoolType::AzureDisk, false);
        request.pool.nodepool_names = Some("nodepool1,missing".into());

        let err = h.orchestrator.enable(&request).await.unwrap_err();

        assert_matches!(err, Error::InvalidArgument(ref msg) if msg.contains("Nodepool: missing not found"));
        assert!(h.cloud.calls_starting_with("create").is_empty());
    }

    #[tokio::test]
    async fn test_nvme_without_l_series_sends_single_setting() {
        let h = harness();

        let outcome = h
            .orchestrator
            .enable(&enable_request(StoragePoolType::EphemeralDisk, false))
            .await
            .unwrap();

        let settings = assert_matches!(outcome, EnableOutcome::Installed { settings } => settings);
        assert_eq!(settings.len(), 1);
        assert_eq!(settings.get(KEY_STORAGE_POOL_CREATE), Some(&SettingValue::Bool(false)));

        let ext = h.cloud.extension("rg", "aks", EXT).unwrap();
        assert_eq!(ext.install.configuration_settings, settings);
    }

    #[tokio::test]
    async fn test_install_failure_during_cluster_create() {
        let h = harness();
        h.cloud.fail_create("helm install timed out");

        let outcome = h
            .orchestrator
            .enable(&enable_request(StoragePoolType::AzureDisk, true))
            .await
            .unwrap();

        assert_matches!(outcome, EnableOutcome::InstallFailed { ref message, .. } if message.contains("helm install timed out"));
        assert!(h.reporter.errors()[0].starts_with("Azure Container Storage failed to install."));
        assert!(h.reporter.warnings()[0].contains("`az aks update`"));
    }

    #[tokio::test]
    async fn test_install_failure_during_update() {
        let h = harness();
        h.cloud.fail_create("helm install timed out");

        h.orchestrator
            .enable(&enable_request(StoragePoolType::AzureDisk, false))
            .await
            .unwrap();

        assert!(h.reporter.errors()[0]
            .starts_with("AKS update to enable Azure Container Storage failed."));
        assert!(h.reporter.warnings().is_empty());
    }

    #[tokio::test]
    async fn test_disable_not_installed() {
        let h = harness();

        let err = h
            .orchestrator
            .disable(&DisableRequest::for_cluster("sub-1", &cluster(), true))
            .await
            .unwrap_err();

        assert_matches!(err, Error::ExtensionNotInstalled { .. });
        assert!(h.cloud.calls_starting_with("update").is_empty());
        assert!(h.cloud.calls_starting_with("delete").is_empty());
    }

    #[tokio::test]
    async fn test_disable_with_validation() {
        let h = harness();
        h.cloud.preinstall_extension("rg", "aks", EXT, EXT_TYPE);

        let outcome = h
            .orchestrator
            .disable(&DisableRequest::for_cluster("sub-1", &cluster(), true))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DisableOutcome {
                validated: true,
                roles_revoked: true
            }
        );
        assert_eq!(
            h.cloud.calls_starting_with("update"),
            vec![format!("update {} cli.storagePool.uninstallValidation=true no_wait=false", EXT)]
        );
        assert_eq!(
            h.cloud.calls_starting_with("delete"),
            vec![format!("delete {} no_wait=true", EXT)]
        );
        assert_eq!(h.cloud.calls_starting_with("revoke").len(), ManagedRole::ALL.len());
        assert!(h
            .reporter
            .warnings()
            .contains(&"Azure Container Storage has been disabled.".to_string()));
    }

    #[tokio::test]
    async fn test_disable_skipping_validation_waits_on_delete() {
        let h = harness();
        h.cloud.preinstall_extension("rg", "aks", EXT, EXT_TYPE);

        let outcome = h
            .orchestrator
            .disable(&DisableRequest::for_cluster("sub-1", &cluster(), false))
            .await
            .unwrap();

        assert!(!outcome.validated);
        assert!(h.cloud.calls_starting_with("update").is_empty());
        assert_eq!(
            h.cloud.calls_starting_with("delete"),
            vec![format!("delete {} no_wait=false", EXT)]
        );
        assert_eq!(h.cloud.calls_starting_with("wait delete").len(), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_resets_setting() {
        let h = harness();
        h.cloud.preinstall_extension("rg", "aks", EXT, EXT_TYPE);
        h.cloud.fail_validation("helm: pre-upgrade hooks failed: job failed");

        let err = h
            .orchestrator
            .disable(&DisableRequest::for_cluster("sub-1", &cluster(), true))
            .await
            .unwrap_err();

        assert_matches!(err, Error::ValidationFailed(ref msg) if msg.contains("storagepools are not being used"));
        assert_eq!(
            h.cloud.calls_starting_with("update"),
            vec![
                format!("update {} cli.storagePool.uninstallValidation=true no_wait=false", EXT),
                format!("update {} cli.storagePool.uninstallValidation=false no_wait=true", EXT),
            ]
        );
        assert!(h.cloud.calls_starting_with("delete").is_empty());
        assert!(h.cloud.extension("rg", "aks", EXT).is_some());
    }

    #[tokio::test]
    async fn test_validation_failure_with_failed_reset() {
        let h = harness();
        h.cloud.preinstall_extension("rg", "aks", EXT, EXT_TYPE);
        h.cloud.fail_validation("timed out waiting for the condition");
        h.cloud.fail_reset();

        let err = h
            .orchestrator
            .disable(&DisableRequest::for_cluster("sub-1", &cluster(), true))
            .await
            .unwrap_err();

        assert_matches!(err, Error::ValidationFailed(ref msg) if !msg.contains("storagepools"));
        assert!(h.reporter.warnings()[0].contains("Unable to reset"));
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_roles() {
        let h = harness();
        h.cloud.preinstall_extension("rg", "aks", EXT, EXT_TYPE);
        h.cloud.fail_delete("extension is busy");

        let err = h
            .orchestrator
            .disable(&DisableRequest::for_cluster("sub-1", &cluster(), false))
            .await
            .unwrap_err();

        assert_matches!(err, Error::DisableFailed(ref msg) if msg.contains("extension is busy"));
        assert!(h.cloud.calls_starting_with("revoke").is_empty());
    }

    #[tokio::test]
    async fn test_revoke_failure_is_reported_not_raised() {
        let h = harness();
        h.cloud.preinstall_extension("rg", "aks", EXT, EXT_TYPE);
        h.cloud.fail_role_revocation();

        let outcome = h
            .orchestrator
            .disable(&DisableRequest::for_cluster("sub-1", &cluster(), false))
            .await
            .unwrap();

        assert!(!outcome.roles_revoked);
    }
}
