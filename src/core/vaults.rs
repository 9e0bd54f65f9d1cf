use crate::error::{RestoreError, Result};
use serde::Serialize;
use tracing::info;

pub(crate) const MAPPING_SUFFIX: &str = "_mapping";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct VaultPair {
    pub(crate) data: String,
    pub(crate) mapping: String,
}

impl VaultPair {
    fn for_data_vault(name: &str) -> Self {
        Self {
            data: name.to_string(),
            mapping: mapping_vault_name(name),
        }
    }
}

pub(crate) fn mapping_vault_name(vault: &str) -> String {
    format!("{}{}", vault, MAPPING_SUFFIX)
}

/// Every vault whose mapping vault also exists, in listing order.
pub(crate) fn detect_backup_vaults(vault_names: &[String]) -> Vec<VaultPair> {
    vault_names
        .iter()
        .filter(|name| {
            let mapping = mapping_vault_name(name);
            vault_names.iter().any(|other| *other == mapping)
        })
        .map(|name| VaultPair::for_data_vault(name))
        .collect()
}

pub(crate) fn select_backup_vault(
    vault_names: &[String],
    requested: Option<&str>,
    region: &str,
) -> Result<VaultPair> {
    if let Some(vault) = requested {
        if !vault_names.iter().any(|name| name == vault) {
            return Err(RestoreError::VaultNotFound {
                vault: vault.to_string(),
                region: region.to_string(),
            });
        }

        let pair = VaultPair::for_data_vault(vault);
        if !vault_names.iter().any(|name| *name == pair.mapping) {
            return Err(RestoreError::MappingVaultMissing {
                vault: pair.data,
                mapping: pair.mapping,
            });
        }

        return Ok(pair);
    }

    let mut candidates = detect_backup_vaults(vault_names);
    for candidate in &candidates {
        info!(vault = %candidate.data, "identified possible Synology DiskStation backup");
    }

    match candidates.len() {
        0 => Err(RestoreError::NoBackupVaults),
        1 => Ok(candidates.remove(0)),
        _ => Err(RestoreError::AmbiguousVaultSelection {
            candidates: candidates.into_iter().map(|pair| pair.data).collect(),
        }),
    }
}
