//! Service Catalog (§4.1): loads embedded AWS/GCP schemas and the Azure map
//! at startup, plus the action map and Service Authorization Reference.
//! Everything here is immutable after `Catalog::load` and safely shared for
//! read across the proxy's handler pool.

pub mod aws;
pub mod azure;
mod embedded;
pub mod gcp;

use crate::catalog::embedded::{ActionMapData, SarData};
use crate::error::CatalogError;
use crate::model::{ActionMap, SarEntry};

pub struct Catalog {
    pub aws: aws::AwsCatalog,
    pub azure: azure::AzureCatalog,
    pub gcp: gcp::GcpCatalog,
    pub action_map: ActionMap,
    pub sar: Vec<SarEntry>,
}

impl Catalog {
    pub fn load() -> Result<Self, CatalogError> {
        let aws = aws::AwsCatalog::load()?;
        let azure = azure::AzureCatalog::load()?;
        let gcp = gcp::GcpCatalog::load()?;
        let action_map = load_action_map()?;
        let sar = load_sar()?;

        Ok(Self {
            aws,
            azure,
            gcp,
            action_map,
            sar,
        })
    }

    /// Replace the embedded action map with one loaded from disk, honoring
    /// the `--override-aws-map` flag.
    pub fn override_action_map(&mut self, path: &str) -> Result<(), CatalogError> {
        let data = std::fs::read(path).map_err(|e| CatalogError::OverrideUnreadable {
            path: path.to_string(),
            source: e,
        })?;
        self.action_map = serde_json::from_slice(&data).map_err(CatalogError::MalformedActionMap)?;
        Ok(())
    }

    pub fn is_permissionless(&self, fingerprint: &str) -> bool {
        self.action_map
            .sdk_permissionless_actions
            .iter()
            .any(|a| a.eq_ignore_ascii_case(fingerprint))
    }

    pub fn sar_entry(&self, prefix: &str) -> Option<&SarEntry> {
        self.sar.iter().find(|e| e.prefix.eq_ignore_ascii_case(prefix))
    }
}

fn load_action_map() -> Result<ActionMap, CatalogError> {
    let data = ActionMapData::get("action_map.json").ok_or_else(|| CatalogError::MissingResource("action_map.json".into()))?;
    serde_json::from_slice(&data.data).map_err(CatalogError::MalformedActionMap)
}

fn load_sar() -> Result<Vec<SarEntry>, CatalogError> {
    let data = SarData::get("sar.json").ok_or_else(|| CatalogError::MissingResource("sar.json".into()))?;
    serde_json::from_slice(&data.data).map_err(CatalogError::MalformedSar)
}
