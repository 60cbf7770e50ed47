//! Configuration Assembler
//!
//! Builds the ordered configuration settings handed to the extension
//! installer. When no storage pool is to be created the only setting is
//! `cli.storagePool.create = false`, so no size, sku or disk option reaches
//! the extension alongside it.

use crate::addon::config::*;
use crate::addon::pool::{generate_storage_pool_name, StoragePoolRequest, StoragePoolType};
use crate::domain::ports::ConfigurationSettings;

impl ConfigurationSettings {
    /// Settings for an install, given the create decision
    pub fn assemble(request: &StoragePoolRequest, create_storage_pool: bool) -> Self {
        let mut settings = ConfigurationSettings::new();

        if !create_storage_pool {
            settings.push(KEY_STORAGE_POOL_CREATE, false);
            return settings;
        }

        let name = request
            .name
            .clone()
            .unwrap_or_else(generate_storage_pool_name);
        let size = request.size.clone().unwrap_or_else(|| {
            match request.pool_type {
                StoragePoolType::ElasticSan => STORAGE_POOL_DEFAULT_SIZE_ESAN,
                _ => STORAGE_POOL_DEFAULT_SIZE,
            }
            .to_string()
        });

        settings.push(KEY_STORAGE_POOL_CREATE, true);
        settings.push(KEY_STORAGE_POOL_NAME, name);
        settings.push(KEY_STORAGE_POOL_SIZE, size);
        settings.push(KEY_STORAGE_POOL_TYPE, request.pool_type.as_str());
        settings.push(KEY_NODE_NODEPOOLS, request.nodepools());

        let sku = || {
            request
                .sku
                .clone()
                .unwrap_or_else(|| STORAGE_POOL_SKU_PREMIUM_LRS.to_string())
        };

        match request.pool_type {
            StoragePoolType::EphemeralDisk => {
                // Option is always set once defaults are applied; NVMe otherwise
                let disk_type = request.option.map(|o| o.disk_type()).unwrap_or("nvme");
                settings.push(KEY_EPHEMERAL_DISK_TYPE, disk_type);
            }
            StoragePoolType::ElasticSan => settings.push(KEY_ELASTIC_SAN_SKU, sku()),
            StoragePoolType::AzureDisk => settings.push(KEY_AZURE_DISK_SKU, sku()),
        }

        settings
    }

    /// Settings for the pre-uninstall validation toggle
    pub fn uninstall_validation(enabled: bool) -> Self {
        let mut settings = ConfigurationSettings::new();
        settings.push(KEY_UNINSTALL_VALIDATION, enabled);
        settings
    }
}
