//! Extension Presence Checker

use crate::domain::ports::ExtensionClientRef;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Whether the add-on extension is on the cluster. Always derived from a
/// fresh remote query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtensionInstallationState {
    NotInstalled,
    Installed,
}

pub struct PresenceChecker {
    client: ExtensionClientRef,
    installation_name: String,
    extension_type: String,
}

impl PresenceChecker {
    pub fn new(client: ExtensionClientRef, installation_name: &str, extension_type: &str) -> Self {
        Self {
            client,
            installation_name: installation_name.to_string(),
            extension_type: extension_type.to_string(),
        }
    }

    /// Query the installation. An extension of another type under the same
    /// installation name, or a failed lookup, counts as not installed.
    pub async fn state(&self, resource_group: &str, cluster_name: &str) -> ExtensionInstallationState {
        match self
            .client
            .show(resource_group, cluster_name, &self.installation_name)
            .await
        {
            Ok(Some(ext)) if ext.extension_type.eq_ignore_ascii_case(&self.extension_type) => {
                ExtensionInstallationState::Installed
            }
            Ok(Some(ext)) => {
                debug!(
                    "Installation {} has extension type {}, expected {}",
                    self.installation_name, ext.extension_type, self.extension_type
                );
                ExtensionInstallationState::NotInstalled
            }
            Ok(None) => ExtensionInstallationState::NotInstalled,
            Err(e) => {
                debug!("Extension lookup on {}/{} failed: {}", resource_group, cluster_name, e);
                ExtensionInstallationState::NotInstalled
            }
        }
    }

    pub async fn is_installed(&self, resource_group: &str, cluster_name: &str) -> bool {
        self.state(resource_group, cluster_name).await == ExtensionInstallationState::Installed
    }
}
