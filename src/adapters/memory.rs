//! In-memory cloud adapter
//!
//! Implements every remote port against in-process state. Used by standalone
//! mode and throughout the tests. Failures can be injected per operation, and
//! every call is written to a journal for inspection.

use crate::domain::ports::{
    ClusterInspector, ConfigurationSettings, ExtensionClient, ExtensionInfo, ExtensionInstall,
    ManagedClusterInfo, ManagedRole, OperationHandle, OperationKind, Prompter, ProviderRegistry,
    ProvisioningState, Reporter, RoleAssigner,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

// =============================================================================
// State
// =============================================================================

/// Extension as stored by the in-memory service
#[derive(Debug, Clone)]
pub struct ExtensionRecord {
    pub install: ExtensionInstall,
    pub state: ProvisioningState,
    /// Settings applied by updates, in order
    pub updates: Vec<ConfigurationSettings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum RegistrationMode {
    #[default]
    Normal,
    Reject,
    Stall,
}

/// Outcome a pending operation resolves to
#[derive(Debug, Clone)]
enum PendingOutcome {
    State(ProvisioningState),
    Fail(String),
}

#[derive(Debug, Default)]
struct CloudState {
    registered: BTreeSet<(String, String)>,
    registration: RegistrationMode,
    clusters: BTreeMap<(String, String), ManagedClusterInfo>,
    extensions: BTreeMap<(String, String, String), ExtensionRecord>,
    roles: BTreeSet<(String, ManagedRole, String)>,
    pending: BTreeMap<String, PendingOutcome>,
    next_op: u64,
    journal: Vec<String>,

    fail_show: bool,
    create_outcome: Option<PendingOutcome>,
    validation_failure: Option<String>,
    fail_reset: bool,
    delete_failure: Option<String>,
    failing_role: Option<ManagedRole>,
    fail_revoke: bool,
}

impl CloudState {
    fn pend(&mut self, outcome: PendingOutcome) -> String {
        self.next_op += 1;
        let url = format!("memory://operations/{}", self.next_op);
        self.pending.insert(url.clone(), outcome);
        url
    }
}

fn key(resource_group: &str, cluster_name: &str, name: &str) -> (String, String, String) {
    (
        resource_group.to_string(),
        cluster_name.to_string(),
        name.to_string(),
    )
}

fn resource_id(resource_group: &str, cluster_name: &str, name: &str) -> String {
    format!(
        "/resourceGroups/{}/providers/Microsoft.ContainerService/managedClusters/{}/providers/Microsoft.KubernetesConfiguration/extensions/{}",
        resource_group, cluster_name, name
    )
}

// =============================================================================
// In-memory Cloud
// =============================================================================

/// In-process stand-in for the provider, extension, role and cluster services
#[derive(Debug, Default)]
pub struct InMemoryCloud {
    state: Mutex<CloudState>,
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Seeding
    // -------------------------------------------------------------------------

    pub fn add_cluster(&self, cluster: ManagedClusterInfo) {
        self.state.lock().clusters.insert(
            (cluster.resource_group.clone(), cluster.name.clone()),
            cluster,
        );
    }

    pub fn mark_registered(&self, subscription_id: &str, namespace: &str) {
        self.state
            .lock()
            .registered
            .insert((subscription_id.to_string(), namespace.to_string()));
    }

    /// Put an extension on a cluster without going through `create`
    pub fn preinstall_extension(
        &self,
        resource_group: &str,
        cluster_name: &str,
        name: &str,
        extension_type: &str,
    ) {
        let install = ExtensionInstall {
            name: name.to_string(),
            extension_type: extension_type.to_string(),
            auto_upgrade_minor_version: true,
            release_train: "stable".to_string(),
            scope: "cluster".to_string(),
            release_namespace: "acstor".to_string(),
            configuration_settings: ConfigurationSettings::new(),
        };
        self.state.lock().extensions.insert(
            key(resource_group, cluster_name, name),
            ExtensionRecord {
                install,
                state: ProvisioningState::Succeeded,
                updates: Vec::new(),
            },
        );
    }

    // -------------------------------------------------------------------------
    // Failure Injection
    // -------------------------------------------------------------------------

    pub fn fail_registration(&self) {
        self.state.lock().registration = RegistrationMode::Reject;
    }

    /// Accept registration requests but never finish them
    pub fn stall_registration(&self) {
        self.state.lock().registration = RegistrationMode::Stall;
    }

    pub fn fail_show(&self) {
        self.state.lock().fail_show = true;
    }

    /// Terminal state the next installs resolve to
    pub fn set_create_outcome(&self, state: ProvisioningState) {
        self.state.lock().create_outcome = Some(PendingOutcome::State(state));
    }

    /// Make installs fail with an error while waiting
    pub fn fail_create(&self, message: &str) {
        self.state.lock().create_outcome = Some(PendingOutcome::Fail(message.to_string()));
    }

    /// Make uninstall validation updates fail with this message
    pub fn fail_validation(&self, message: &str) {
        self.state.lock().validation_failure = Some(message.to_string());
    }

    /// Make the validation reset update fail
    pub fn fail_reset(&self) {
        self.state.lock().fail_reset = true;
    }

    pub fn fail_delete(&self, message: &str) {
        self.state.lock().delete_failure = Some(message.to_string());
    }

    pub fn fail_role_assignment(&self, role: ManagedRole) {
        self.state.lock().failing_role = Some(role);
    }

    pub fn fail_role_revocation(&self) {
        self.state.lock().fail_revoke = true;
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn journal(&self) -> Vec<String> {
        self.state.lock().journal.clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn extension(&self, resource_group: &str, cluster_name: &str, name: &str) -> Option<ExtensionRecord> {
        self.state
            .lock()
            .extensions
            .get(&key(resource_group, cluster_name, name))
            .cloned()
    }

    /// Roles assigned to a principal at a scope
    pub fn role_assignments(&self, scope: &str, principal_id: &str) -> Vec<ManagedRole> {
        self.state
            .lock()
            .roles
            .iter()
            .filter(|(s, _, p)| s == scope && p == principal_id)
            .map(|(_, r, _)| *r)
            .collect()
    }

    fn record(&self, state: &mut CloudState, call: String) {
        debug!("in-memory cloud: {}", call);
        state.journal.push(call);
    }
}

// =============================================================================
// Port Implementations
// =============================================================================

#[async_trait]
impl ProviderRegistry for InMemoryCloud {
    async fn is_registered(&self, subscription_id: &str, namespace: &str) -> Result<bool> {
        let state = self.state.lock();
        Ok(state
            .registered
            .contains(&(subscription_id.to_string(), namespace.to_string())))
    }

    async fn register(&self, subscription_id: &str, namespace: &str) -> Result<()> {
        let mut state = self.state.lock();
        self.record(&mut state, format!("register {}", namespace));

        match state.registration {
            RegistrationMode::Normal => {
                state
                    .registered
                    .insert((subscription_id.to_string(), namespace.to_string()));
                Ok(())
            }
            RegistrationMode::Stall => Ok(()),
            RegistrationMode::Reject => Err(Error::ProviderRegistration {
                namespace: namespace.to_string(),
                reason: "AuthorizationFailed".to_string(),
            }),
        }
    }
}

#[async_trait]
impl ExtensionClient for InMemoryCloud {
    async fn show(
        &self,
        resource_group: &str,
        cluster_name: &str,
        name: &str,
    ) -> Result<Option<ExtensionInfo>> {
        let mut state = self.state.lock();
        self.record(&mut state, format!("show {}", name));

        if state.fail_show {
            return Err(Error::Arm {
                status: 500,
                code: "InternalServerError".to_string(),
                message: "extension lookup failed".to_string(),
            });
        }

        Ok(state
            .extensions
            .get(&key(resource_group, cluster_name, name))
            .map(|r| ExtensionInfo {
                name: r.install.name.clone(),
                extension_type: r.install.extension_type.clone(),
                provisioning_state: r.state.clone(),
                version: None,
            }))
    }

    async fn create(
        &self,
        resource_group: &str,
        cluster_name: &str,
        install: &ExtensionInstall,
    ) -> Result<OperationHandle> {
        let mut state = self.state.lock();
        self.record(&mut state, format!("create {}", install.name));

        let outcome = state
            .create_outcome
            .clone()
            .unwrap_or(PendingOutcome::State(ProvisioningState::Succeeded));
        let final_state = match &outcome {
            PendingOutcome::State(s) => s.clone(),
            PendingOutcome::Fail(_) => ProvisioningState::Failed,
        };
        state.extensions.insert(
            key(resource_group, cluster_name, &install.name),
            ExtensionRecord {
                install: install.clone(),
                state: final_state,
                updates: Vec::new(),
            },
        );
        let url = state.pend(outcome);

        Ok(OperationHandle {
            kind: OperationKind::Create,
            extension_name: install.name.clone(),
            resource_id: resource_id(resource_group, cluster_name, &install.name),
            status_url: Some(url),
            initial_state: Some(ProvisioningState::Creating),
            no_wait: false,
        })
    }

    async fn update(
        &self,
        resource_group: &str,
        cluster_name: &str,
        name: &str,
        settings: &ConfigurationSettings,
        no_wait: bool,
    ) -> Result<OperationHandle> {
        let mut state = self.state.lock();
        let rendered: Vec<String> = settings
            .iter()
            .map(|s| format!("{}={}", s.key, s.value))
            .collect();
        self.record(
            &mut state,
            format!("update {} {} no_wait={}", name, rendered.join(","), no_wait),
        );

        let validating = settings
            .get(crate::addon::config::KEY_UNINSTALL_VALIDATION)
            .map(|v| v.as_wire() == "true");

        let outcome = match validating {
            Some(false) if state.fail_reset => {
                return Err(Error::Arm {
                    status: 409,
                    code: "Conflict".to_string(),
                    message: "another operation is in progress".to_string(),
                })
            }
            Some(true) => match &state.validation_failure {
                Some(msg) => PendingOutcome::Fail(msg.clone()),
                None => PendingOutcome::State(ProvisioningState::Succeeded),
            },
            _ => PendingOutcome::State(ProvisioningState::Succeeded),
        };

        let record = state
            .extensions
            .get_mut(&key(resource_group, cluster_name, name))
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "Extension".into(),
                name: name.into(),
            })?;
        record.updates.push(settings.clone());

        let url = state.pend(outcome);
        Ok(OperationHandle {
            kind: OperationKind::Update,
            extension_name: name.to_string(),
            resource_id: resource_id(resource_group, cluster_name, name),
            status_url: Some(url),
            initial_state: Some(ProvisioningState::Updating),
            no_wait,
        })
    }

    async fn delete(
        &self,
        resource_group: &str,
        cluster_name: &str,
        name: &str,
        no_wait: bool,
    ) -> Result<OperationHandle> {
        let mut state = self.state.lock();
        self.record(&mut state, format!("delete {} no_wait={}", name, no_wait));

        let outcome = match &state.delete_failure {
            Some(msg) => PendingOutcome::Fail(msg.clone()),
            None => {
                state.extensions.remove(&key(resource_group, cluster_name, name));
                PendingOutcome::State(ProvisioningState::Succeeded)
            }
        };
        let url = state.pend(outcome);

        Ok(OperationHandle {
            kind: OperationKind::Delete,
            extension_name: name.to_string(),
            resource_id: resource_id(resource_group, cluster_name, name),
            status_url: Some(url),
            initial_state: Some(ProvisioningState::Deleting),
            no_wait,
        })
    }

    async fn wait(&self, handle: &OperationHandle) -> Result<ProvisioningState> {
        let mut state = self.state.lock();
        self.record(
            &mut state,
            format!("wait {} {}", handle.kind, handle.extension_name),
        );

        let outcome = handle
            .status_url
            .as_ref()
            .and_then(|url| state.pending.remove(url))
            .ok_or_else(|| Error::Internal(format!("unknown operation {:?}", handle.status_url)))?;

        match outcome {
            PendingOutcome::State(s) => Ok(s),
            PendingOutcome::Fail(message) => Err(Error::OperationFailed {
                operation: handle.kind.to_string(),
                name: handle.extension_name.clone(),
                state: ProvisioningState::Failed.to_string(),
                message,
            }),
        }
    }
}

#[async_trait]
impl RoleAssigner for InMemoryCloud {
    async fn assign(&self, scope: &str, role: ManagedRole, principal_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        self.record(&mut state, format!("assign {} {}", role, principal_id));

        if state.failing_role == Some(role) {
            return Err(Error::RoleAssignment {
                role: role.to_string(),
                scope: scope.to_string(),
                reason: "AuthorizationFailed".to_string(),
            });
        }
        state
            .roles
            .insert((scope.to_string(), role, principal_id.to_string()));
        Ok(())
    }

    async fn revoke(&self, scope: &str, role: ManagedRole, principal_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        self.record(&mut state, format!("revoke {} {}", role, principal_id));

        if state.fail_revoke {
            return Err(Error::RoleAssignment {
                role: role.to_string(),
                scope: scope.to_string(),
                reason: "AuthorizationFailed".to_string(),
            });
        }
        state
            .roles
            .remove(&(scope.to_string(), role, principal_id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl ClusterInspector for InMemoryCloud {
    async fn managed_cluster(
        &self,
        _subscription_id: &str,
        resource_group: &str,
        cluster_name: &str,
    ) -> Result<ManagedClusterInfo> {
        self.state
            .lock()
            .clusters
            .get(&(resource_group.to_string(), cluster_name.to_string()))
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "ManagedCluster".into(),
                name: cluster_name.into(),
            })
    }
}

// =============================================================================
// Recording Reporter / Prompter
// =============================================================================

/// Reporter that keeps every message
#[derive(Debug, Default)]
pub struct RecordingReporter {
    infos: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

impl Reporter for RecordingReporter {
    fn info(&self, message: &str) {
        self.infos.lock().push(message.to_string());
    }

    fn warning(&self, message: &str) {
        self.warnings.lock().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }
}

/// Prompter that always gives the same answer
#[derive(Debug, Clone, Copy)]
pub struct FixedPrompter(pub bool);

impl Prompter for FixedPrompter {
    fn confirm(&self, _message: &str, _default: bool) -> Result<bool> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pending_operation_resolves_once() {
        let cloud = InMemoryCloud::new();
        cloud.preinstall_extension("rg", "aks", "ext", "microsoft.azurecontainerstorage");

        let handle = cloud.delete("rg", "aks", "ext", false).await.unwrap();
        assert_eq!(cloud.wait(&handle).await.unwrap(), ProvisioningState::Succeeded);
        assert!(cloud.wait(&handle).await.is_err());
        assert!(cloud.show("rg", "aks", "ext").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_extension() {
        let cloud = InMemoryCloud::new();
        let settings = ConfigurationSettings::uninstall_validation(true);
        assert!(cloud.update("rg", "aks", "ext", &settings, false).await.is_err());
    }

    #[tokio::test]
    async fn test_managed_cluster_lookup() {
        let cloud = InMemoryCloud::new();
        cloud.add_cluster(ManagedClusterInfo {
            name: "aks".into(),
            resource_group: "rg".into(),
            node_resource_group: "MC_rg_aks_eastus".into(),
            kubelet_object_id: "kubelet-oid".into(),
            agent_pools: vec![],
        });

        let cluster = cloud.managed_cluster("sub-1", "rg", "aks").await.unwrap();
        assert_eq!(cluster.node_resource_group, "MC_rg_aks_eastus");
        assert!(cloud.managed_cluster("sub-1", "rg", "other").await.is_err());
    }
}
