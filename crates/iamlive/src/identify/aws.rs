//! AWS Request Identifier (§4.2–§4.4): reconstructs `(service, action,
//! params, uriParams)` from a buffered HTTP request across the four AWS
//! wire protocols.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::catalog::Catalog;
use crate::error::IdentifyError;
use crate::identify::{AwsIdentification, RawRequest};
use crate::json::{flatten_json, flatten_xml, parse_form};
use crate::model::{CallEntry, CallType, Operation, ServiceDefinition};
use crate::shape;

/// Host-parsing outcome: the endpoint prefix to look up in the catalog,
/// the region (if derivable from the host), and an optional virtual-hosted
/// S3 bucket name.
struct HostInfo {
    endpoint_prefix: String,
    region: String,
    virtual_host_bucket: Option<String>,
}

fn region_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.([^.]+)\.amazonaws\.com(?:\.cn)?$").unwrap())
}

fn region_like_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]{2}(?:-gov)?-[a-z]+-\d$|^cn-[a-z]+-\d$").unwrap())
}

/// Parse the request host into an endpoint prefix plus region, applying the
/// S3 virtual-hosted, S3 Express, and ECR special cases.
fn parse_host(host: &str) -> HostInfo {
    let region = region_regex()
        .captures(host)
        .map(|c| c[1].to_string())
        .filter(|r| r != "s3")
        .unwrap_or_else(|| "us-east-1".to_string());

    // S3 Express One Zone: bucket--zone--x-s3.s3express-zone.region.amazonaws.com
    // or the control plane host s3express-control.region.amazonaws.com
    if host.contains(".s3express-") || host.starts_with("s3express-control.") {
        return HostInfo {
            endpoint_prefix: "s3".to_string(),
            region,
            virtual_host_bucket: host.split("--x-s3.").next().map(|b| b.to_string()).filter(|_| host.contains("--x-s3.")),
        };
    }

    // api.ecr.region.amazonaws.com
    if host.starts_with("api.ecr.") {
        return HostInfo {
            endpoint_prefix: "ecr".to_string(),
            region,
            virtual_host_bucket: None,
        };
    }

    // S3 virtual-hosted style: bucket.s3[.-]region?[.dualstack].region?.amazonaws.com
    if let Some(bucket_host_match) = Regex::new(r"^(.+)\.(s3(?:-[a-z0-9-]+)?(?:\.dualstack\.[a-z0-9-]+)?)\.amazonaws\.com(?:\.cn)?$")
        .ok()
        .and_then(|re| re.captures(host).map(|c| (c[1].to_string(), c[2].to_string())))
    {
        let (bucket, s3_segment) = bucket_host_match;
        if !bucket.is_empty() && !bucket.contains('.') {
            return HostInfo {
                endpoint_prefix: "s3".to_string(),
                region,
                virtual_host_bucket: Some(bucket),
            };
        }
        let _ = s3_segment;
    }

    // generic: drop the trailing `amazonaws.com`/`amazonaws.com.cn` segments,
    // then peel off a trailing region-shaped segment if present. What's left
    // joins back into the endpoint prefix, with a leading `s3-<region>`
    // segment normalized to plain `s3` per the documented host shift.
    let mut segments: Vec<&str> = host.split('.').collect();
    if segments.last() == Some(&"cn") {
        segments.pop();
    }
    if segments.last() == Some(&"com") {
        segments.pop();
    }
    if segments.last() == Some(&"amazonaws") {
        segments.pop();
    }
    if segments.last().map(|s| region_like_regex().is_match(s)).unwrap_or(false) {
        segments.pop();
    }

    let mut prefix = segments.join(".");
    if let Some(rest) = prefix.strip_prefix("s3-") {
        let _ = rest;
        prefix = "s3".to_string();
    }

    HostInfo {
        endpoint_prefix: prefix,
        region,
        virtual_host_bucket: None,
    }
}

/// Normalize a service's display name into its IAM prefix token, per the
/// fixed renaming table.
fn normalize_service_name(service: &ServiceDefinition) -> String {
    let raw = service
        .metadata
        .service_abbreviation
        .clone()
        .or_else(|| service.metadata.service_full_name.clone())
        .unwrap_or_default();

    let without_paren = raw.split('(').next().unwrap_or(&raw);
    let stripped: String = without_paren
        .replace("Amazon", "")
        .replace("AWS", "")
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();

    let renamed = if stripped.starts_with("ElasticLoadBalancing") {
        if service.metadata.api_version == "2015-12-01" {
            "ELBv2".to_string()
        } else {
            "ELB".to_string()
        }
    } else if stripped == "CognitoIdentityProvider" {
        "CognitoIdentityServiceProvider".to_string()
    } else if stripped == "AgentsforAmazonBedrockRuntime" {
        "BedrockAgentRuntime".to_string()
    } else {
        stripped
    };

    renamed
}

fn extract_access_key(req: &RawRequest) -> Option<String> {
    let auth = req.header("Authorization")?;
    let cred_idx = auth.find("Credential=")?;
    let after = &auth[cred_idx + "Credential=".len()..];
    after.split('/').next().map(|s| s.to_string())
}

fn extract_session_token(req: &RawRequest, query: &BTreeMap<String, String>) -> Option<String> {
    req.header("X-Amz-Security-Token")
        .map(|s| s.to_string())
        .or_else(|| query.get("X-Amz-Security-Token").cloned())
}

fn query_params(uri: &str) -> BTreeMap<String, String> {
    let Some((_, qs)) = uri.split_once('?') else {
        return BTreeMap::new();
    };
    serde_urlencoded::from_str::<Vec<(String, String)>>(qs)
        .unwrap_or_default()
        .into_iter()
        .collect()
}

fn path_only(uri: &str) -> &str {
    uri.split('?').next().unwrap_or(uri)
}

/// Identify one AWS request. Returns `None` (not an error) when the host is
/// not an AWS host at all; returns `Err` for AWS hosts whose request still
/// fails to match any known operation, which is itself a non-fatal outcome
/// at the proxy layer (the request is simply forwarded unidentified).
///
/// An endpoint prefix can carry more than one embedded `apiVersion` (ELB
/// classic and ELBv2 both answer on `elasticloadbalancing`); every version
/// is tried, newest first, and the first one whose operations actually
/// match the request wins.
pub fn identify(catalog: &Catalog, req: &RawRequest) -> Result<Option<AwsIdentification>, IdentifyError> {
    if !req.host.ends_with(".amazonaws.com") && !req.host.ends_with(".amazonaws.com.cn") {
        return Ok(None);
    }

    let host_info = parse_host(&req.host);
    let versions = catalog.aws.versions_by_endpoint_prefix(&host_info.endpoint_prefix);
    if versions.is_empty() {
        return Err(IdentifyError::UnknownService(host_info.endpoint_prefix.clone()));
    }

    let query = query_params(&req.uri);

    let mut last_err = None;
    for service in versions {
        match identify_against(service, &host_info, req, &query) {
            Ok(entry) => return Ok(Some(AwsIdentification { entry })),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.expect("versions is non-empty"))
}

fn identify_against(
    service: &ServiceDefinition,
    host_info: &HostInfo,
    req: &RawRequest,
    query: &BTreeMap<String, String>,
) -> Result<CallEntry, IdentifyError> {
    let mut entry = CallEntry {
        service: normalize_service_name(service),
        region: host_info.region.clone(),
        host: req.host.clone(),
        access_key: extract_access_key(req),
        final_http_status_code: req.status_code,
        call_type: CallType::ApiCall,
        ..Default::default()
    };
    entry.session_token = extract_session_token(req, query);

    match service.metadata.protocol.as_str() {
        "json" => identify_json(service, req, &mut entry)?,
        "ec2" | "query" => identify_query(service, req, &mut entry)?,
        "rest-json" | "rest-xml" => identify_rest(service, req, &mut entry, host_info.virtual_host_bucket.as_deref())?,
        other => return Err(IdentifyError::UnknownService(format!("unsupported protocol {other}"))),
    }

    if let Some(bucket) = &host_info.virtual_host_bucket {
        entry.uri_parameters.entry("Bucket".to_string()).or_insert_with(|| bucket.clone());
    }

    Ok(entry)
}

fn identify_json(service: &ServiceDefinition, req: &RawRequest, entry: &mut CallEntry) -> Result<(), IdentifyError> {
    let target = req.header("X-Amz-Target").ok_or(IdentifyError::MissingTarget)?;
    let method = target.split_once('.').map(|(_, m)| m).unwrap_or(target).to_string();
    entry.method = method;

    if !req.body.is_empty() {
        let value: serde_json::Value = serde_json::from_slice(&req.body).map_err(IdentifyError::InvalidJsonBody)?;
        flatten_json(&value, &mut entry.parameters);
    }

    let _ = service;
    Ok(())
}

fn identify_query(service: &ServiceDefinition, req: &RawRequest, entry: &mut CallEntry) -> Result<(), IdentifyError> {
    let pairs = parse_form(&req.body)?;

    let mut action: Option<String> = None;
    let mut version: Option<String> = None;
    let mut action_count = 0;
    let mut version_count = 0;
    for (k, v) in &pairs {
        if k == "Action" {
            action = Some(v.clone());
            action_count += 1;
        } else if k == "Version" {
            version = Some(v.clone());
            version_count += 1;
        }
    }

    if action.is_none() || action_count != 1 {
        return Err(IdentifyError::MissingRequiredField("Action".to_string()));
    }
    if version.is_none() || version_count != 1 {
        return Err(IdentifyError::MissingRequiredField("Version".to_string()));
    }

    let method = action.unwrap();
    let operation = service.operations.get(&method);

    for (k, v) in &pairs {
        if k == "Action" || k == "Version" {
            continue;
        }
        let normalized = shape::normalize_query_key(k);
        let resolved = operation
            .and_then(|op| op.input.as_ref())
            .and_then(|input| shape::resolve_path(service, input, &normalized))
            .unwrap_or(normalized);
        entry.push_param(resolved, v.clone());
    }

    entry.method = method;
    Ok(())
}

struct RestCandidate<'a> {
    name: &'a str,
    op: &'a Operation,
    path_regex: Regex,
    path_len: usize,
    required_len: usize,
}

fn build_path_regex(request_uri: &str) -> (Regex, String) {
    let path_part = request_uri.split('?').next().unwrap_or(request_uri);
    let path_part = if path_part.starts_with('/') {
        path_part.to_string()
    } else {
        format!("/{path_part}")
    };

    let mut pattern = String::from("^");
    let mut chars = path_part.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            let mut var = String::new();
            let mut greedy = false;
            for c2 in chars.by_ref() {
                if c2 == '}' {
                    break;
                }
                if c2 == '+' {
                    greedy = true;
                } else {
                    var.push(c2);
                }
            }
            let _ = var;
            if greedy {
                pattern.push_str("([^?]+)");
            } else {
                pattern.push_str("([^/?]+?)");
            }
        } else {
            pattern.push_str(&regex::escape(&c.to_string()));
        }
    }
    pattern.push('$');
    (Regex::new(&pattern).unwrap_or_else(|_| Regex::new("$^").unwrap()), path_part)
}

fn query_fragment_matches(request_uri: &str, actual_query: &BTreeMap<String, String>) -> bool {
    let Some((_, frag)) = request_uri.split_once('?') else {
        return true;
    };
    for kv in frag.split('&') {
        if kv.is_empty() {
            continue;
        }
        match kv.split_once('=') {
            Some((k, v)) => {
                if actual_query.get(k).map(|av| av != v).unwrap_or(true) {
                    return false;
                }
            }
            None => {
                if !actual_query.contains_key(kv) {
                    return false;
                }
            }
        }
    }
    true
}

fn identify_rest(
    service: &ServiceDefinition,
    req: &RawRequest,
    entry: &mut CallEntry,
    virtual_host_bucket: Option<&str>,
) -> Result<(), IdentifyError> {
    let path = path_only(&req.uri);
    let query = query_params(&req.uri);

    let mut candidates: Vec<RestCandidate> = Vec::new();
    for (name, op) in &service.operations {
        if !op.http.method.eq_ignore_ascii_case(&req.method) {
            continue;
        }
        if !query_fragment_matches(&op.http.request_uri, &query) {
            continue;
        }

        let mut request_uri = op.http.request_uri.clone();
        if virtual_host_bucket.is_some() && request_uri.starts_with("/{Bucket}") {
            request_uri = request_uri.replacen("/{Bucket}", "/{bucket}/rest", 1);
        }

        let (re, path_part) = build_path_regex(&request_uri);
        if !re.is_match(path) {
            continue;
        }

        let required_len = op.input.as_ref().map(|i| i.required.len()).unwrap_or(0);
        candidates.push(RestCandidate {
            name,
            op,
            path_regex: re,
            path_len: path_part.len(),
            required_len,
        });
    }

    // Extract params/headers tentatively for satisfaction checks below.
    let mut best: Option<&RestCandidate> = None;
    for cand in &candidates {
        let mut trial_params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        collect_uri_captures(&cand.path_regex, path, cand.op, service, &mut trial_params);
        collect_headers_and_query(req, &query, cand.op, service, &mut trial_params);

        let required: Vec<String> = cand.op.input.as_ref().map(|i| i.required.clone()).unwrap_or_default();
        if !shape::required_satisfied(&required, &trial_params, &entry.uri_parameters) {
            continue;
        }

        best = match best {
            None => Some(cand),
            Some(current) => {
                if cand.path_len > current.path_len
                    || (cand.path_len == current.path_len && cand.required_len > current.required_len)
                {
                    Some(cand)
                } else {
                    Some(current)
                }
            }
        };
    }

    let cand = best.ok_or_else(|| IdentifyError::NoCandidate {
        method: req.method.clone(),
        path: path.to_string(),
    })?;

    entry.method = cand.name.to_string();
    collect_uri_captures(&cand.path_regex, path, cand.op, service, &mut entry.parameters);
    collect_headers_and_query(req, &query, cand.op, service, &mut entry.parameters);

    if !req.body.is_empty() {
        if service.metadata.protocol == "rest-json" {
            let value: serde_json::Value = serde_json::from_slice(&req.body).map_err(IdentifyError::InvalidJsonBody)?;
            flatten_json(&value, &mut entry.parameters);
        } else {
            match flatten_xml(&req.body) {
                Ok(params) => entry.parameters.extend(params),
                Err(_) => {
                    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&req.body) {
                        flatten_json(&value, &mut entry.parameters);
                    }
                }
            }
        }
    }

    Ok(())
}

fn collect_uri_captures(
    re: &Regex,
    path: &str,
    op: &Operation,
    _service: &ServiceDefinition,
    out: &mut BTreeMap<String, Vec<String>>,
) {
    let Some(caps) = re.captures(path) else { return };
    let var_names = extract_template_vars(&op.http.request_uri);
    for (i, name) in var_names.iter().enumerate() {
        if let Some(m) = caps.get(i + 1) {
            out.entry(name.clone()).or_default().push(m.as_str().to_string());
        }
    }
}

fn extract_template_vars(request_uri: &str) -> Vec<String> {
    let path_part = request_uri.split('?').next().unwrap_or(request_uri);
    let mut vars = Vec::new();
    let mut chars = path_part.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            let mut var = String::new();
            for c2 in chars.by_ref() {
                if c2 == '}' {
                    break;
                }
                if c2 != '+' {
                    var.push(c2);
                }
            }
            vars.push(var);
        }
    }
    vars
}

fn collect_headers_and_query(
    req: &RawRequest,
    query: &BTreeMap<String, String>,
    op: &Operation,
    service: &ServiceDefinition,
    out: &mut BTreeMap<String, Vec<String>>,
) {
    let Some(input) = &op.input else { return };

    for (k, v) in &req.headers {
        if let Some(resolved) = shape::resolve_path(service, input, k) {
            out.entry(resolved).or_default().push(v.clone());
        }
    }

    for (k, v) in query {
        let resolved = shape::resolve_path(service, input, k).unwrap_or_else(|| k.clone());
        out.entry(resolved).or_default().push(v.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_elb_version() {
        let def = ServiceDefinition {
            metadata: crate::model::ServiceMetadata {
                endpoint_prefix: "elasticloadbalancing".into(),
                protocol: "query".into(),
                service_abbreviation: None,
                service_full_name: Some("Amazon Elastic Load Balancing".into()),
                api_version: "2015-12-01".into(),
            },
            operations: Default::default(),
            shapes: Default::default(),
        };
        assert_eq!(normalize_service_name(&def), "ELBv2");
    }

    #[test]
    fn parses_virtual_hosted_s3_host() {
        let info = parse_host("mybucket.s3.us-east-1.amazonaws.com");
        assert_eq!(info.endpoint_prefix, "s3");
        assert_eq!(info.region, "us-east-1");
        assert_eq!(info.virtual_host_bucket.as_deref(), Some("mybucket"));
    }
}
