//! Cloud Adapters
//!
//! Implementations of the domain ports:
//! - ARM: the Azure Resource Manager REST API
//! - In-memory: in-process state for standalone runs and tests
//! - Console: terminal output and prompts

pub mod arm;
pub mod console;
pub mod memory;

pub use arm::{ArmClient, ArmConfig};
pub use console::{TerminalPrompter, TracingReporter};
pub use memory::{FixedPrompter, InMemoryCloud, RecordingReporter};

use crate::addon::workflow::AddonPorts;
use crate::domain::ports::{
    AgentPoolProfile, ClusterInspector, ClusterInspectorRef, ExtensionClient, ExtensionClientRef,
    ManagedClusterInfo, ProviderRegistry, ProviderRegistryRef, ReporterRef, RoleAssigner,
    RoleAssignerRef,
};
use crate::error::Result;
use std::sync::Arc;

/// Which cloud the ports talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Arm,
    InMemory,
}

/// The remote ports, all backed by one adapter
#[derive(Clone)]
pub struct CloudPorts {
    pub providers: ProviderRegistryRef,
    pub extensions: ExtensionClientRef,
    pub roles: RoleAssignerRef,
    pub clusters: ClusterInspectorRef,
}

impl CloudPorts {
    fn from_adapter<T>(adapter: Arc<T>) -> Self
    where
        T: ProviderRegistry + ExtensionClient + RoleAssigner + ClusterInspector + 'static,
    {
        Self {
            providers: adapter.clone(),
            extensions: adapter.clone(),
            roles: adapter.clone(),
            clusters: adapter,
        }
    }

    /// Ports for the add-on orchestrator
    pub fn addon_ports(&self, reporter: ReporterRef) -> AddonPorts {
        AddonPorts {
            providers: self.providers.clone(),
            extensions: self.extensions.clone(),
            roles: self.roles.clone(),
            reporter,
        }
    }
}

/// Factory for creating cloud adapters
pub struct AdapterFactory;

impl AdapterFactory {
    /// Create the ports for an adapter kind
    pub fn create(kind: AdapterKind, config: ArmConfig) -> Result<CloudPorts> {
        match kind {
            AdapterKind::Arm => Ok(CloudPorts::from_adapter(Arc::new(ArmClient::new(config)?))),
            AdapterKind::InMemory => Ok(Self::in_memory(Arc::new(InMemoryCloud::new()))),
        }
    }

    pub fn in_memory(cloud: Arc<InMemoryCloud>) -> CloudPorts {
        CloudPorts::from_adapter(cloud)
    }

    /// In-memory ports holding a single cluster with a general purpose pool
    /// and an L series pool
    pub fn standalone(resource_group: &str, cluster_name: &str) -> CloudPorts {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud.add_cluster(ManagedClusterInfo {
            name: cluster_name.to_string(),
            resource_group: resource_group.to_string(),
            node_resource_group: format!("MC_{}_{}_local", resource_group, cluster_name),
            kubelet_object_id: uuid::Uuid::new_v4().to_string(),
            agent_pools: vec![
                AgentPoolProfile::new("nodepool1", "Standard_D4s_v3"),
                AgentPoolProfile {
                    mode: "User".to_string(),
                    ..AgentPoolProfile::new("nvmepool", "Standard_L8s_v3")
                },
            ],
        });
        Self::in_memory(cloud)
    }
}
