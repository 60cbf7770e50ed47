//! Compose Files
//!
//! Reads the `services` section of a compose file and turns each service into
//! a container app plan with CPU, memory and ingress filled in.

pub mod resources;

pub use resources::{resolve_cpu, resolve_memory, ContainerAppPlan};

use crate::error::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// A parsed compose file. Services keep their file order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposeFile {
    #[serde(default)]
    pub services: IndexMap<String, ComposeService>,
}

impl ComposeFile {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading compose file {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }
}

/// One service of a compose file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposeService {
    pub image: Option<String>,
    pub cpus: Option<NumberOrString>,
    pub deploy: Option<Deploy>,
    #[serde(default)]
    pub expose: Vec<NumberOrString>,
    #[serde(default)]
    pub ports: Vec<NumberOrString>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Deploy {
    pub resources: Option<DeployResources>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployResources {
    pub reservations: Option<ResourceSpec>,
    pub limits: Option<ResourceSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub cpus: Option<NumberOrString>,
    pub memory: Option<String>,
}

/// Compose allows `1.25` as well as `"1.25"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(f64),
    Text(String),
}

impl NumberOrString {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NumberOrString::Number(n) => Some(*n),
            NumberOrString::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Container side of a port entry: `3000`, `"3000"`, `"8080:3000"`, `"3000/tcp"`
    pub fn container_port(&self) -> Option<u16> {
        match self {
            NumberOrString::Number(n) if n.fract() == 0.0 && *n >= 0.0 && *n <= u16::MAX as f64 => {
                Some(*n as u16)
            }
            NumberOrString::Number(_) => None,
            NumberOrString::Text(s) => s
                .rsplit(':')
                .next()
                .and_then(|p| p.split('/').next())
                .and_then(|p| p.trim().parse().ok()),
        }
    }
}

impl ComposeService {
    fn reservations(&self) -> Option<&ResourceSpec> {
        self.deploy
            .as_ref()
            .and_then(|d| d.resources.as_ref())
            .and_then(|r| r.reservations.as_ref())
    }
}
