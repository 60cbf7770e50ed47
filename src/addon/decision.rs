//! Storage-Pool Decision Engine
//!
//! Decides whether the extension should create a storage pool at install
//! time. Granting the role set on the managed resource group happens here as a
//! side effect, for every pool type.

use crate::addon::access::AccessGrantManager;
use crate::addon::config::NVME_VM_SIZE_PREFIX;
use crate::addon::pool::{StoragePoolOption, StoragePoolRequest, StoragePoolType};
use crate::domain::ports::{AgentPoolProfile, ReporterRef};
use tracing::debug;

/// Inputs of the create decision that come from the cluster
#[derive(Debug, Clone)]
pub struct DecisionContext<'a> {
    pub subscription_id: &'a str,
    pub node_resource_group: &'a str,
    pub kubelet_object_id: &'a str,
    pub agent_pools: &'a [AgentPoolProfile],
}

pub struct DecisionEngine<'a> {
    access: &'a AccessGrantManager,
    reporter: ReporterRef,
}

impl<'a> DecisionEngine<'a> {
    pub fn new(access: &'a AccessGrantManager, reporter: ReporterRef) -> Self {
        Self { access, reporter }
    }

    /// Expects a request with defaults applied.
    pub async fn should_create(&self, ctx: &DecisionContext<'_>, request: &StoragePoolRequest) -> bool {
        let mut create = true;

        let granted = self
            .access
            .grant(ctx.subscription_id, ctx.node_resource_group, ctx.kubelet_object_id)
            .await;

        if !granted {
            let mut msg = String::from(
                "\nUnable to add Role Assignments needed for Elastic SAN storagepools to be functional. \
                 Please check with your admin for permissions.",
            );
            // Elastic SAN pools are dropped here instead of failing the enable
            if request.pool_type == StoragePoolType::ElasticSan {
                msg.push_str("\nAborting creation of Elastic SAN storagepool.");
                create = false;
            }
            self.reporter.warning(&msg);
        }

        if request.pool_type == StoragePoolType::EphemeralDisk
            && request.option == Some(StoragePoolOption::NVMe)
            && !has_nvme_nodepool(&request.nodepool_list(), ctx.agent_pools)
        {
            self.reporter.warning(
                "Cannot create Ephemeral NVMe storagepool since none of the nodepools support \
                 NVMe. Please use a nodepool with Standard_L series VMs (e.g. Standard_L8s_v3).\n\
                 Aborting creation of Ephemeral NVMe storagepool.",
            );
            create = false;
        }

        debug!("Storage pool creation for {}: {}", request.pool_type, create);
        create
    }
}

/// Whether any requested nodepool runs L series VMs
pub fn has_nvme_nodepool(nodepools: &[&str], agent_pools: &[AgentPoolProfile]) -> bool {
    nodepools.iter().any(|name| {
        agent_pools
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.vm_size.to_ascii_lowercase().starts_with(NVME_VM_SIZE_PREFIX))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryCloud, RecordingReporter};
    use crate::domain::ports::ManagedRole;
    use std::sync::Arc;

    fn agent_pools() -> Vec<AgentPoolProfile> {
        vec![
            AgentPoolProfile::new("nodepool1", "Standard_D4s_v3"),
            AgentPoolProfile::new("nvmepool", "Standard_L8s_v3"),
        ]
    }

    fn ctx(pools: &[AgentPoolProfile]) -> DecisionContext<'_> {
        DecisionContext {
            subscription_id: "sub-1",
            node_resource_group: "MC_rg_aks_eastus",
            kubelet_object_id: "kubelet-oid",
            agent_pools: pools,
        }
    }

    fn request(pool_type: StoragePoolType, nodepools: &str) -> StoragePoolRequest {
        let mut req = StoragePoolRequest::new(pool_type);
        req.nodepool_names = Some(nodepools.into());
        req.with_defaults("nodepool1")
    }

    #[tokio::test]
    async fn test_azure_disk_creates() {
        let cloud = Arc::new(InMemoryCloud::new());
        let reporter = Arc::new(RecordingReporter::default());
        let access = AccessGrantManager::new(cloud, reporter.clone());
        let engine = DecisionEngine::new(&access, reporter.clone());
        let pools = agent_pools();

        assert!(engine.should_create(&ctx(&pools), &request(StoragePoolType::AzureDisk, "nodepool1")).await);
        assert!(reporter.warnings().is_empty());
    }

    // Role grant failure turns an Elastic SAN create into "do not create"
    // without failing the enable.
    #[tokio::test]
    async fn test_role_failure_downgrades_elastic_san() {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud.fail_role_assignment(ManagedRole::Reader);
        let reporter = Arc::new(RecordingReporter::default());
        let access = AccessGrantManager::new(cloud, reporter.clone());
        let engine = DecisionEngine::new(&access, reporter.clone());
        let pools = agent_pools();

        assert!(!engine.should_create(&ctx(&pools), &request(StoragePoolType::ElasticSan, "nodepool1")).await);
        assert!(reporter.warnings()[0].contains("Aborting creation of Elastic SAN storagepool."));
    }

    #[tokio::test]
    async fn test_role_failure_does_not_block_azure_disk() {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud.fail_role_assignment(ManagedRole::Reader);
        let reporter = Arc::new(RecordingReporter::default());
        let access = AccessGrantManager::new(cloud, reporter.clone());
        let engine = DecisionEngine::new(&access, reporter.clone());
        let pools = agent_pools();

        assert!(engine.should_create(&ctx(&pools), &request(StoragePoolType::AzureDisk, "nodepool1")).await);
        assert_eq!(reporter.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_ephemeral_nvme_needs_l_series() {
        let cloud = Arc::new(InMemoryCloud::new());
        let reporter = Arc::new(RecordingReporter::default());
        let access = AccessGrantManager::new(cloud, reporter.clone());
        let engine = DecisionEngine::new(&access, reporter.clone());
        let pools = agent_pools();

        assert!(!engine.should_create(&ctx(&pools), &request(StoragePoolType::EphemeralDisk, "nodepool1")).await);
        assert!(engine.should_create(&ctx(&pools), &request(StoragePoolType::EphemeralDisk, "nodepool1,nvmepool")).await);
    }

    #[tokio::test]
    async fn test_ephemeral_temp_ignores_vm_series() {
        let cloud = Arc::new(InMemoryCloud::new());
        let reporter = Arc::new(RecordingReporter::default());
        let access = AccessGrantManager::new(cloud, reporter.clone());
        let engine = DecisionEngine::new(&access, reporter.clone());
        let pools = agent_pools();

        let mut req = request(StoragePoolType::EphemeralDisk, "nodepool1");
        req.option = Some(StoragePoolOption::Ssd);
        assert!(engine.should_create(&ctx(&pools), &req).await);
    }
}
