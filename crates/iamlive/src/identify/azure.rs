//! Azure Request Identifier: matches HTTP method + path against the Azure
//! map's path templates. This stage only builds the `AzureEntry`; condition
//! evaluation (`bodyPathExists`, `pathEquals`) happens during synthesis
//! (§4.8), where the full catalog is consulted.

use crate::identify::{AzureIdentification, RawRequest};
use crate::model::AzureEntry;

const AZURE_HOSTS: &[&str] = &["management.azure.com", "management.core.windows.net"];

pub fn identify(req: &RawRequest) -> Option<AzureIdentification> {
    if !AZURE_HOSTS.iter().any(|h| req.host.eq_ignore_ascii_case(h)) {
        return None;
    }

    let path = req.uri.split('?').next().unwrap_or(&req.uri).to_string();
    let query_string = req.uri.split_once('?').map(|(_, q)| q).unwrap_or("");
    let parameters = serde_urlencoded::from_str::<Vec<(String, String)>>(query_string)
        .unwrap_or_default()
        .into_iter()
        .collect();

    let entry = AzureEntry {
        http_method: req.method.to_ascii_uppercase(),
        path,
        parameters,
        body: String::from_utf8_lossy(&req.body).into_owned(),
    };

    Some(AzureIdentification { entry })
}
