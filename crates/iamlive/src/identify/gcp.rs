//! GCP Request Identifier. GCP identification reduces to recognizing a
//! `service.resource.verb`-style `api-id` string (§4.1/§3); the heavy
//! lifting is the root-domain-keyed catalog lookup (see `catalog::gcp`).
//! Proxy mode derives a best-effort `api-id` from the host+path shape
//! `googleapis.com` uses (`<service>.googleapis.com/.../<resource>`),
//! mapping the HTTP verb to the conventional CRUD verb name.

use crate::identify::RawRequest;
use crate::model::GcpEntry;

pub fn identify(req: &RawRequest) -> Option<GcpEntry> {
    if !req.host.ends_with(".googleapis.com") {
        return None;
    }

    let service = req.host.trim_end_matches(".googleapis.com").to_string();
    let path = req.uri.split('?').next().unwrap_or(&req.uri);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let resource = segments
        .iter()
        .rev()
        .find(|s| !s.starts_with('v') || s.len() > 3)
        .copied()
        .unwrap_or("resource");

    let verb = match req.method.as_str() {
        "GET" => {
            if segments.last().map(|s| s.parse::<u64>().is_ok()).unwrap_or(false) {
                "get"
            } else {
                "list"
            }
        }
        "POST" => "insert",
        "PUT" | "PATCH" => "update",
        "DELETE" => "delete",
        _ => "list",
    };

    Some(GcpEntry {
        api_id: format!("{service}.{resource}.{verb}"),
    })
}
