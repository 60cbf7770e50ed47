//! Extension Lifecycle Driver
//!
//! Starts create/update/delete operations on the add-on extension and, when
//! asked, blocks until the long-running operation reaches a terminal state.

use crate::addon::config::AddonConfig;
use crate::domain::ports::{
    ConfigurationSettings, ExtensionClientRef, ExtensionInstall, OperationHandle, ProvisioningState,
};
use crate::error::{Error, Result};
use tracing::{debug, info};

pub struct LifecycleDriver {
    client: ExtensionClientRef,
    config: AddonConfig,
}

impl LifecycleDriver {
    pub fn new(client: ExtensionClientRef, config: AddonConfig) -> Self {
        Self { client, config }
    }

    /// Install the extension with the fixed install parameters and wait for it
    pub async fn install(
        &self,
        resource_group: &str,
        cluster_name: &str,
        settings: ConfigurationSettings,
    ) -> Result<ProvisioningState> {
        let install = ExtensionInstall {
            name: self.config.installation_name.clone(),
            extension_type: self.config.extension_type.clone(),
            auto_upgrade_minor_version: self.config.auto_upgrade_minor_version,
            release_train: self.config.release_train.clone(),
            scope: self.config.scope.clone(),
            release_namespace: self.config.release_namespace.clone(),
            configuration_settings: settings,
        };

        info!(
            "Installing extension {} ({}) on {}/{}",
            install.name, install.extension_type, resource_group, cluster_name
        );
        let handle = self.client.create(resource_group, cluster_name, &install).await?;
        self.resolve(&handle).await
    }

    /// Update the extension's configuration settings. Returns `None` when `no_wait` is set.
    pub async fn update(
        &self,
        resource_group: &str,
        cluster_name: &str,
        settings: &ConfigurationSettings,
        no_wait: bool,
    ) -> Result<Option<ProvisioningState>> {
        let handle = self
            .client
            .update(
                resource_group,
                cluster_name,
                &self.config.installation_name,
                settings,
                no_wait,
            )
            .await?;

        if no_wait {
            debug!("Not waiting on update of {}", handle.extension_name);
            return Ok(None);
        }
        self.resolve(&handle).await.map(Some)
    }

    /// Delete the extension. Returns `None` when `no_wait` is set.
    pub async fn uninstall(
        &self,
        resource_group: &str,
        cluster_name: &str,
        no_wait: bool,
    ) -> Result<Option<ProvisioningState>> {
        info!(
            "Deleting extension {} from {}/{}",
            self.config.installation_name, resource_group, cluster_name
        );
        let handle = self
            .client
            .delete(resource_group, cluster_name, &self.config.installation_name, no_wait)
            .await?;

        if no_wait {
            debug!("Not waiting on delete of {}", handle.extension_name);
            return Ok(None);
        }
        self.resolve(&handle).await.map(Some)
    }

    /// Block on an operation and require `Succeeded`
    pub async fn resolve(&self, handle: &OperationHandle) -> Result<ProvisioningState> {
        let state = self.client.wait(handle).await?;
        if state.is_succeeded() {
            Ok(state)
        } else {
            Err(Error::OperationFailed {
                operation: handle.kind.to_string(),
                name: handle.extension_name.clone(),
                state: state.to_string(),
                message: format!("operation ended in state {}", state),
            })
        }
    }
}
