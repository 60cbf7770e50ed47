//! Access Grant Manager
//!
//! Grants and revokes the fixed role set on the cluster's managed resource
//! group for the kubelet identity. The set moves as a unit: when one grant
//! fails, the roles granted earlier in the same call are revoked again.

use crate::domain::ports::{ManagedRole, ReporterRef, RoleAssignerRef};
use tracing::{debug, info, warn};

/// Scope string of a resource group
pub fn resource_group_scope(subscription_id: &str, resource_group: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}",
        subscription_id, resource_group
    )
}

pub struct AccessGrantManager {
    assigner: RoleAssignerRef,
    reporter: ReporterRef,
}

impl AccessGrantManager {
    pub fn new(assigner: RoleAssignerRef, reporter: ReporterRef) -> Self {
        Self { assigner, reporter }
    }

    /// Grant the whole role set. Returns `false` after rolling back a partial grant.
    pub async fn grant(&self, subscription_id: &str, resource_group: &str, principal_id: &str) -> bool {
        let scope = resource_group_scope(subscription_id, resource_group);
        let mut granted = Vec::with_capacity(ManagedRole::ALL.len());

        for role in ManagedRole::ALL {
            match self.assigner.assign(&scope, role, principal_id).await {
                Ok(()) => {
                    debug!("Granted {} on {} to {}", role, scope, principal_id);
                    granted.push(role);
                }
                Err(e) => {
                    self.reporter.error(&format!(
                        "Unable to add Role Assignment '{}' on {} for the cluster's node identity. Error: {}",
                        role, scope, e
                    ));
                    self.roll_back(&scope, principal_id, &granted).await;
                    return false;
                }
            }
        }

        info!("Granted {} roles on {}", granted.len(), scope);
        true
    }

    pub async fn revoke(&self, subscription_id: &str, resource_group: &str, principal_id: &str) -> bool {
        let scope = resource_group_scope(subscription_id, resource_group);
        let mut all_revoked = true;

        // Keep going past failures so that as much of the set as possible is removed
        for role in ManagedRole::ALL {
            if let Err(e) = self.assigner.revoke(&scope, role, principal_id).await {
                self.reporter.warning(&format!(
                    "Unable to remove Role Assignment '{}' on {} for the cluster's node identity. Error: {}",
                    role, scope, e
                ));
                all_revoked = false;
            }
        }

        all_revoked
    }

    async fn roll_back(&self, scope: &str, principal_id: &str, granted: &[ManagedRole]) {
        for role in granted.iter().rev() {
            if let Err(e) = self.assigner.revoke(scope, *role, principal_id).await {
                warn!("Rollback of {} on {} failed: {}", role, scope, e);
            }
        }
    }
}
