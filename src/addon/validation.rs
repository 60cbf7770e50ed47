//! Argument validation for the enable command

use crate::addon::config::{AZURE_DISK_SKUS, ELASTIC_SAN_SKUS};
use crate::addon::pool::{StoragePoolRequest, StoragePoolType};
use crate::domain::ports::AgentPoolProfile;
use crate::error::{Error, Result};

/// Smallest Elastic SAN pool, in GiB
const ELASTIC_SAN_MIN_SIZE_GIB: u64 = 1024;

/// Check the storage pool arguments for combinations the extension rejects
pub fn validate_pool_parameters(request: &StoragePoolRequest) -> Result<()> {
    if let Some(name) = &request.name {
        if !is_valid_pool_name(name) {
            return Err(Error::InvalidArgument(format!(
                "Invalid --storage-pool-name value '{}'. Accepted values are lowercase alphanumeric \
                 characters, '-' or '.', and must start and end with an alphanumeric character.",
                name
            )));
        }
    }

    if let Some(size) = &request.size {
        let gib = parse_size_gib(size).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Value for --storage-pool-size should be defined with size followed by Gi or Ti \
                 e.g. 512Gi or 2Ti, got '{}'.",
                size
            ))
        })?;
        if request.pool_type == StoragePoolType::ElasticSan && gib < ELASTIC_SAN_MIN_SIZE_GIB {
            return Err(Error::InvalidArgument(
                "Value for --storage-pool-size must be at least 1Ti when \
                 --enable-azure-container-storage is elasticSan."
                    .into(),
            ));
        }
    }

    match request.pool_type {
        StoragePoolType::EphemeralDisk => {
            if request.sku.is_some() {
                return Err(Error::InvalidArgument(
                    "Cannot set --storage-pool-sku when --enable-azure-container-storage is ephemeralDisk."
                        .into(),
                ));
            }
        }
        StoragePoolType::ElasticSan | StoragePoolType::AzureDisk => {
            if request.option.is_some() {
                return Err(Error::InvalidArgument(
                    "Cannot set --storage-pool-option when --enable-azure-container-storage is not ephemeralDisk."
                        .into(),
                ));
            }
            if let Some(sku) = &request.sku {
                let allowed = if request.pool_type == StoragePoolType::ElasticSan {
                    ELASTIC_SAN_SKUS
                } else {
                    AZURE_DISK_SKUS
                };
                if !allowed.contains(&sku.as_str()) {
                    return Err(Error::InvalidArgument(format!(
                        "Invalid --storage-pool-sku value '{}' for {}. Allowed values: {}.",
                        sku,
                        request.pool_type,
                        allowed.join(", ")
                    )));
                }
            }
        }
    }

    if let Some(nodepools) = &request.nodepool_names {
        if !is_valid_nodepool_list(nodepools) {
            return Err(Error::InvalidArgument(
                "Invalid --azure-container-storage-nodepools value. Accepted value is a comma \
                 separated string of valid nodepool names without any spaces. A valid nodepool \
                 name may only contain lowercase alphanumeric characters and must begin with a \
                 lowercase letter."
                    .into(),
            ));
        }
    }

    Ok(())
}

/// Every requested nodepool must exist on the cluster
pub fn validate_nodepool_names(nodepool_names: &str, agent_pools: &[AgentPoolProfile]) -> Result<()> {
    for nodepool in nodepool_names.split(',') {
        if agent_pools.iter().any(|p| p.name == nodepool) {
            continue;
        }

        let available: Vec<&str> = agent_pools.iter().map(|p| p.name.as_str()).collect();
        let hint = if available.len() > 1 {
            format!("Nodepools available in the cluster are: {}.", available.join(", "))
        } else {
            format!(
                "Nodepool available in the cluster is: {}.",
                available.first().copied().unwrap_or("<none>")
            )
        };

        return Err(Error::InvalidArgument(format!(
            "Nodepool: {} not found. Please provide a comma separated string of existing nodepool \
             names in --azure-container-storage-nodepools.\n{}\n\
             Aborting installation of Azure Container Storage.",
            nodepool, hint
        )));
    }

    Ok(())
}

/// Parse `<n>Gi` or `<n>Ti` into GiB
pub fn parse_size_gib(size: &str) -> Option<u64> {
    let (digits, multiplier) = if let Some(d) = size.strip_suffix("Gi") {
        (d, 1)
    } else if let Some(d) = size.strip_suffix("Ti") {
        (d, 1024)
    } else {
        return None;
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
}

fn is_valid_pool_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) if alnum(first) && alnum(last) => bytes
            .iter()
            .all(|b| alnum(b) || *b == b'-' || *b == b'.'),
        _ => false,
    }
}

fn is_valid_nodepool_list(list: &str) -> bool {
    list.split(',').all(|name| {
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_lowercase() => {
                chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            }
            _ => false,
        }
    })
}
