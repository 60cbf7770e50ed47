//! Storage pool request types
//!
//! A [`StoragePoolRequest`] is rebuilt from command-line input on every
//! invocation. Defaults are filled in by [`StoragePoolRequest::with_defaults`]
//! before validation and the create decision.

use crate::addon::config::{STORAGE_POOL_NAME_PREFIX, STORAGE_POOL_RANDOM_LENGTH};
use crate::error::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// =============================================================================
// Pool Type
// =============================================================================

/// Backing storage of a storage pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoragePoolType {
    AzureDisk,
    ElasticSan,
    EphemeralDisk,
}

impl StoragePoolType {
    /// Wire form used in configuration settings
    pub fn as_str(&self) -> &'static str {
        match self {
            StoragePoolType::AzureDisk => "azureDisk",
            StoragePoolType::ElasticSan => "elasticSan",
            StoragePoolType::EphemeralDisk => "ephemeralDisk",
        }
    }
}

impl std::fmt::Display for StoragePoolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StoragePoolType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "azuredisk" => Ok(StoragePoolType::AzureDisk),
            "elasticsan" => Ok(StoragePoolType::ElasticSan),
            "ephemeraldisk" => Ok(StoragePoolType::EphemeralDisk),
            _ => Err(Error::InvalidArgument(format!(
                "Invalid storage pool type '{}'. Allowed values: azureDisk, elasticSan, ephemeralDisk.",
                s
            ))),
        }
    }
}

// =============================================================================
// Pool Option
// =============================================================================

/// Disk option of an ephemeral disk pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoragePoolOption {
    /// Local NVMe drives
    NVMe,
    /// Temp SSD of the VM
    Ssd,
}

impl StoragePoolOption {
    /// Disk-type keyword placed in configuration settings
    pub fn disk_type(&self) -> &'static str {
        match self {
            StoragePoolOption::NVMe => "nvme",
            StoragePoolOption::Ssd => "temp",
        }
    }
}

impl std::fmt::Display for StoragePoolOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoragePoolOption::NVMe => write!(f, "NVMe"),
            StoragePoolOption::Ssd => write!(f, "Temp"),
        }
    }
}

impl FromStr for StoragePoolOption {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nvme" => Ok(StoragePoolOption::NVMe),
            "temp" | "ssd" => Ok(StoragePoolOption::Ssd),
            _ => Err(Error::InvalidArgument(format!(
                "Invalid storage pool option '{}'. Allowed values: NVMe, Temp.",
                s
            ))),
        }
    }
}

// =============================================================================
// Pool Request
// =============================================================================

/// Storage pool parameters of an enable call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePoolRequest {
    pub name: Option<String>,
    pub pool_type: StoragePoolType,
    pub size: Option<String>,
    pub sku: Option<String>,
    pub option: Option<StoragePoolOption>,
    /// Comma separated nodepool names
    pub nodepool_names: Option<String>,
}

impl StoragePoolRequest {
    pub fn new(pool_type: StoragePoolType) -> Self {
        Self {
            name: None,
            pool_type,
            size: None,
            sku: None,
            option: None,
            nodepool_names: None,
        }
    }

    /// Fill in the nodepool list and the ephemeral disk option
    pub fn with_defaults(mut self, default_nodepool: &str) -> Self {
        if self.nodepool_names.is_none() {
            self.nodepool_names = Some(default_nodepool.to_string());
        }
        if self.pool_type == StoragePoolType::EphemeralDisk && self.option.is_none() {
            self.option = Some(StoragePoolOption::NVMe);
        }
        self
    }

    /// Comma separated nodepool names as passed downstream
    pub fn nodepools(&self) -> &str {
        self.nodepool_names.as_deref().unwrap_or_default()
    }

    /// Individual nodepool names
    pub fn nodepool_list(&self) -> Vec<&str> {
        self.nodepools()
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect()
    }
}

/// Random storage pool name, e.g. `storagepool-k3x9a0b`
pub fn generate_storage_pool_name() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..STORAGE_POOL_RANDOM_LENGTH)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("{}{}", STORAGE_POOL_NAME_PREFIX, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_type_parse() {
        assert_eq!(
            "elasticSan".parse::<StoragePoolType>().unwrap(),
            StoragePoolType::ElasticSan
        );
        assert_eq!(
            "AZUREDISK".parse::<StoragePoolType>().unwrap(),
            StoragePoolType::AzureDisk
        );
        assert!("blob".parse::<StoragePoolType>().is_err());
    }

    #[test]
    fn test_ephemeral_defaults_to_nvme() {
        let request = StoragePoolRequest::new(StoragePoolType::EphemeralDisk).with_defaults("nodepool1");
        assert_eq!(request.option, Some(StoragePoolOption::NVMe));
        assert_eq!(request.nodepools(), "nodepool1");
    }

    #[test]
    fn test_non_ephemeral_keeps_option_unset() {
        let request = StoragePoolRequest::new(StoragePoolType::AzureDisk).with_defaults("nodepool1");
        assert_eq!(request.option, None);
    }

    #[test]
    fn test_ssd_option_maps_to_temp() {
        assert_eq!("Temp".parse::<StoragePoolOption>().unwrap(), StoragePoolOption::Ssd);
        assert_eq!(StoragePoolOption::Ssd.disk_type(), "temp");
        assert_eq!(StoragePoolOption::NVMe.disk_type(), "nvme");
    }

    #[test]
    fn test_nodepool_list_splits_on_commas() {
        let mut request = StoragePoolRequest::new(StoragePoolType::AzureDisk);
        request.nodepool_names = Some("nodepool1,nodepool2".into());
        assert_eq!(request.nodepool_list(), vec!["nodepool1", "nodepool2"]);
    }

    #[test]
    fn test_generated_name_shape() {
        let name = generate_storage_pool_name();
        assert!(name.starts_with(STORAGE_POOL_NAME_PREFIX));
        let suffix = &name[STORAGE_POOL_NAME_PREFIX.len()..];
        assert_eq!(suffix.len(), STORAGE_POOL_RANDOM_LENGTH);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
