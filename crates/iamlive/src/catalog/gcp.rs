//! GCP Service Catalog: indexes embedded API discovery descriptors by root
//! domain (derived from `rootUrl`) and exposes `service.resource.verb`
//! method lookup.

use std::collections::BTreeMap;

use url::Url;

use crate::catalog::embedded::GcpApis;
use crate::error::CatalogError;
use crate::model::{GcpApi, GcpMethod};

#[derive(Debug, Default)]
pub struct GcpCatalog {
    by_root_domain: BTreeMap<String, GcpApi>,
}

impl GcpCatalog {
    pub fn load() -> Result<Self, CatalogError> {
        let mut by_root_domain = BTreeMap::new();
        for file in GcpApis::iter() {
            let data = GcpApis::get(&file).ok_or_else(|| CatalogError::MissingResource(file.to_string()))?;
            let api: GcpApi = serde_json::from_slice(&data.data).map_err(CatalogError::MalformedGcpMap)?;
            if let Some(domain) = root_domain(&api.root_url) {
                by_root_domain.insert(domain, api);
            }
        }
        Ok(Self { by_root_domain })
    }

    pub fn by_root_domain(&self, domain: &str) -> Option<&GcpApi> {
        self.by_root_domain.get(domain)
    }

    /// Find every method across every loaded API whose `id` equals
    /// `api_id` (case-insensitive `service.resource.verb`).
    pub fn methods_for_api_id<'a>(&'a self, api_id: &str) -> Vec<&'a GcpMethod> {
        self.by_root_domain
            .values()
            .flat_map(|api| api.methods.values())
            .filter(|m| m.id.eq_ignore_ascii_case(api_id))
            .collect()
    }
}

fn root_domain(root_url: &str) -> Option<String> {
    let url = Url::parse(root_url).ok()?;
    url.host_str().map(|h| h.to_string())
}
