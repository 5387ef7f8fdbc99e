//! AWS Service Catalog: loads embedded per-service schemas, keeping the
//! newest API version per endpoint prefix, and indexes them for lookup by
//! the request identifier.

use std::collections::BTreeMap;

use crate::catalog::embedded::AwsServices;
use crate::error::CatalogError;
use crate::model::ServiceDefinition;

#[derive(Debug, Default)]
pub struct AwsCatalog {
    /// Keyed by `endpointPrefix`; every embedded `apiVersion` is kept, newest
    /// first, since some prefixes are shared by more than one service (ELB
    /// classic and ELBv2 both answer on `elasticloadbalancing`).
    by_endpoint_prefix: BTreeMap<String, Vec<ServiceDefinition>>,
}

impl AwsCatalog {
    pub fn load() -> Result<Self, CatalogError> {
        let mut by_endpoint_prefix: BTreeMap<String, Vec<ServiceDefinition>> = BTreeMap::new();

        for file in AwsServices::iter() {
            let data = AwsServices::get(&file).ok_or_else(|| CatalogError::MissingResource(file.to_string()))?;
            let def: ServiceDefinition = serde_json::from_slice(&data.data).map_err(|e| CatalogError::MalformedSchema {
                file: file.to_string(),
                source: e,
            })?;

            by_endpoint_prefix.entry(def.metadata.endpoint_prefix.clone()).or_default().push(def);
        }

        for versions in by_endpoint_prefix.values_mut() {
            versions.sort_by(|a, b| b.metadata.api_version.cmp(&a.metadata.api_version));
        }

        Ok(Self { by_endpoint_prefix })
    }

    /// The newest embedded `apiVersion` schema for this endpoint prefix.
    pub fn by_endpoint_prefix(&self, prefix: &str) -> Option<&ServiceDefinition> {
        self.by_endpoint_prefix.get(prefix).and_then(|versions| versions.first())
    }

    /// Every embedded schema sharing this endpoint prefix, newest first.
    /// More than one entry only for prefixes with co-hosted API versions.
    pub fn versions_by_endpoint_prefix(&self, prefix: &str) -> &[ServiceDefinition] {
        self.by_endpoint_prefix.get(prefix).map(Vec::as_slice).unwrap_or(&[])
    }
}
