//! Azure Request Identifier catalog: method -> path-template router ->
//! permission list, with each path template converted from `{var}` to the
//! `:var` syntax `matchit` expects.

use std::collections::BTreeMap;

use matchit::Router;

use crate::catalog::embedded::AzureMapData;
use crate::error::CatalogError;
use crate::model::{AzureMap, AzurePermission};

pub struct AzureCatalog {
    raw: AzureMap,
    /// Keyed by uppercased HTTP method.
    routers: BTreeMap<String, Router<String>>,
}

impl AzureCatalog {
    pub fn load() -> Result<Self, CatalogError> {
        let data = AzureMapData::get("azure_map.json").ok_or_else(|| CatalogError::MissingResource("azure_map.json".into()))?;
        let raw: AzureMap = serde_json::from_slice(&data.data).map_err(CatalogError::MalformedAzureMap)?;

        let mut routers: BTreeMap<String, Router<String>> = BTreeMap::new();
        for (method, paths) in &raw {
            let mut router = Router::new();
            for path_template in paths.keys() {
                let matchit_path = to_matchit_path(path_template);
                // Duplicate/ambiguous templates are tolerated: first wins.
                let _ = router.insert(&matchit_path, path_template.clone());
            }
            routers.insert(method.to_ascii_uppercase(), router);
        }

        Ok(Self { raw, routers })
    }

    /// For `method`+`path`, return the matched path template, its captured
    /// `:var` parameters, and the list of candidate permissions.
    pub fn match_path(&self, method: &str, path: &str) -> Option<(&str, BTreeMap<String, String>, &[AzurePermission])> {
        let router = self.routers.get(&method.to_ascii_uppercase())?;
        let matched = router.at(path).ok()?;
        let template = matched.value.as_str();
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let permissions = self.raw.get(&method.to_ascii_uppercase())?.get(template)?;
        Some((template, params, permissions))
    }
}

fn to_matchit_path(template: &str) -> String {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            out.push(':');
            for c2 in chars.by_ref() {
                if c2 == '}' {
                    break;
                }
                out.push(c2);
            }
        } else {
            out.push(c);
        }
    }
    out
}
