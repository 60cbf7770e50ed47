//! Provider Registrator
//!
//! Makes sure the extension service's resource provider is registered on the
//! subscription before anything is installed.

use crate::addon::config::RegistrationConfig;
use crate::domain::ports::{ProviderRegistryRef, ReporterRef};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

pub struct ProviderRegistrator {
    registry: ProviderRegistryRef,
    reporter: ReporterRef,
    config: RegistrationConfig,
}

impl ProviderRegistrator {
    pub fn new(registry: ProviderRegistryRef, reporter: ReporterRef, config: RegistrationConfig) -> Self {
        Self {
            registry,
            reporter,
            config,
        }
    }

    /// Register the provider if needed and wait for it. Never fails; a
    /// provider that cannot be registered yields `false`.
    pub async fn ensure_registered(&self, subscription_id: &str) -> bool {
        let namespace = &self.config.namespace;

        match self.registry.is_registered(subscription_id, namespace).await {
            Ok(true) => {
                debug!("Resource provider {} already registered", namespace);
                return true;
            }
            Ok(false) => {}
            Err(e) => {
                self.reporter.warning(&format!(
                    "Unable to check registration of '{}'. Error: {}",
                    namespace, e
                ));
                return false;
            }
        }

        info!("Registering resource provider {}", namespace);
        if let Err(e) = self.registry.register(subscription_id, namespace).await {
            self.reporter.warning(&format!(
                "Unable to register the required resource provider '{}'. Error: {}",
                namespace, e
            ));
            return false;
        }

        let started = Instant::now();
        loop {
            match self.registry.is_registered(subscription_id, namespace).await {
                Ok(true) => {
                    info!("Resource provider {} registered", namespace);
                    return true;
                }
                Ok(false) => {}
                Err(e) => warn!("Registration check for {} failed: {}", namespace, e),
            }

            if started.elapsed() >= self.config.timeout {
                self.reporter.warning(&format!(
                    "Registration of '{}' is taking longer than expected. Please try again after some time.",
                    namespace
                ));
                return false;
            }
            sleep(self.config.poll_interval).await;
        }
    }
}
