//! Container app resources derived from compose services

use super::{ComposeFile, ComposeService};
use serde::{Deserialize, Serialize};

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// CPU cores of a service. A deploy reservation wins over `cpus`.
pub fn resolve_cpu(service: &ComposeService) -> Option<f64> {
    service
        .reservations()
        .and_then(|r| r.cpus.as_ref())
        .and_then(|c| c.as_f64())
        .or_else(|| service.cpus.as_ref().and_then(|c| c.as_f64()))
}

/// Memory of a service as a `Gi` quantity. Without a reservation, twice the
/// CPU count in Gi.
pub fn resolve_memory(service: &ComposeService) -> Option<String> {
    if let Some(gib) = service
        .reservations()
        .and_then(|r| r.memory.as_deref())
        .and_then(parse_memory_gib)
    {
        return Some(format_gib(gib));
    }
    resolve_cpu(service).map(|cpu| format_gib(cpu * 2.0))
}

/// Parse a compose memory value (`512m`, `2g`, `1024kb`, plain bytes) into GiB
fn parse_memory_gib(value: &str) -> Option<f64> {
    let value = value.trim().to_ascii_lowercase();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: f64 = number.parse().ok()?;

    let multiplier = match unit.trim() {
        "" | "b" => 1.0,
        "k" | "kb" => 1024.0,
        "m" | "mb" => 1024.0 * 1024.0,
        "g" | "gb" => BYTES_PER_GIB,
        _ => return None,
    };
    Some(number * multiplier / BYTES_PER_GIB)
}

fn format_gib(gib: f64) -> String {
    format!("{}Gi", (gib * 100.0).round() / 100.0)
}

// =============================================================================
// Container App Plan
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerAppPlan {
    pub name: String,
    pub properties: ContainerAppProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerAppProperties {
    pub environment_id: String,
    pub configuration: ContainerAppConfiguration,
    pub template: ContainerAppTemplate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerAppConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress: Option<Ingress>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingress {
    pub external: bool,
    pub target_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerAppTemplate {
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub image: String,
    pub resources: ContainerResources,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerResources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl ContainerAppPlan {
    /// One plan per service, in file order
    pub fn from_compose(file: &ComposeFile, environment_id: &str) -> Vec<Self> {
        file.services
            .iter()
            .map(|(name, service)| Self::from_service(name, service, environment_id))
            .collect()
    }

    pub fn from_service(name: &str, service: &ComposeService, environment_id: &str) -> Self {
        // Exposed ports stay internal, published ports get external ingress
        let ingress = service
            .expose
            .first()
            .and_then(|p| p.container_port())
            .map(|target_port| Ingress {
                external: false,
                target_port,
            })
            .or_else(|| {
                service
                    .ports
                    .first()
                    .and_then(|p| p.container_port())
                    .map(|target_port| Ingress {
                        external: true,
                        target_port,
                    })
            });

        Self {
            name: name.to_string(),
            properties: ContainerAppProperties {
                environment_id: environment_id.to_string(),
                configuration: ContainerAppConfiguration { ingress },
                template: ContainerAppTemplate {
                    containers: vec![Container {
                        name: name.to_string(),
                        image: service.image.clone().unwrap_or_default(),
                        resources: ContainerResources {
                            cpu: resolve_cpu(service),
                            memory: resolve_memory(service),
                        },
                    }],
                },
            },
        }
    }
}
