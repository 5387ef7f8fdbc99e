//! Action Resolver (§4.7) and Policy Synthesizer (§4.8): maps calls to IAM
//! actions and resource ARNs, then aggregates them into a policy document.

use std::collections::BTreeSet;

use crate::arn::{self, Identity};
use crate::catalog::Catalog;
use crate::model::{
    AzureIamPolicy, CallEntry, GcpEntry, GcpPermissionList, IamPolicy, IamStatement, MethodMapping, ResourceValue,
};

/// Synthesis-wide knobs that are configuration, not catalog data.
#[derive(Debug, Clone, Default)]
pub struct SynthesisOptions {
    pub account_id_override: Option<String>,
    pub fails_only: bool,
    pub force_wildcard_resource: bool,
    pub sort_alphabetical: bool,
}

/// `getActions` (§4.8): permissionless entries contribute nothing; a direct
/// `sdkMethodIamMappings` hit wins; otherwise fall back to
/// `sdkServiceMappings` substitution, else the literal `service:method`.
pub fn get_actions(catalog: &Catalog, service: &str, method: &str) -> Vec<String> {
    let fingerprint = format!("{service}.{method}");
    if catalog.is_permissionless(&fingerprint) {
        return Vec::new();
    }

    if let Some(mappings) = find_method_mappings(catalog, service, method) {
        return mappings.iter().map(|m| m.action.clone()).collect();
    }

    let mapped_service = catalog
        .action_map
        .sdk_service_mappings
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(service))
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| service.to_string());

    vec![format!("{mapped_service}:{method}")]
}

/// `getDependantActions`: appends each action's SAR-declared dependent
/// actions in one non-transitive pass, then deduplicates.
pub fn get_dependent_actions(catalog: &Catalog, actions: &[String]) -> Vec<String> {
    let mut out: Vec<String> = actions.to_vec();
    for action in actions {
        let Some((prefix, privilege_name)) = action.split_once(':') else { continue };
        let Some(sar) = catalog.sar_entry(prefix) else { continue };
        let Some(privilege) = sar.privileges.iter().find(|p| p.privilege.eq_ignore_ascii_case(privilege_name)) else {
            continue;
        };
        for rt in &privilege.resource_types {
            for dep in &rt.dependent_actions {
                out.push(dep.clone());
            }
        }
    }
    let mut seen = BTreeSet::new();
    out.retain(|a| seen.insert(a.clone()));
    out
}

fn find_method_mappings<'a>(catalog: &'a Catalog, service: &str, method: &str) -> Option<&'a Vec<MethodMapping>> {
    let fingerprint = format!("{service}.{method}");
    catalog
        .action_map
        .sdk_method_iam_mappings
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(&fingerprint))
        .map(|(_, v)| v)
}

fn identity_for(catalog: &Catalog, call: &CallEntry, opts: &SynthesisOptions) -> Identity {
    let mut region = call.region.clone();
    let mut account = opts.account_id_override.clone();

    if let Some(token) = &call.session_token {
        if let Ok(identity) = crate::account::identity_from_session_token(token) {
            if let Some(r) = identity.region {
                region = r;
            }
            if account.is_none() {
                account = identity.account_id;
            }
        }
    }

    if account.is_none() {
        if let Some(key) = &call.access_key {
            account = crate::account::account_from_access_key(key).ok();
        }
    }

    let _ = catalog;
    Identity {
        partition: arn::partition_for_region(&region),
        region,
        account: account.unwrap_or_else(|| "123456789012".to_string()),
    }
}

/// S3 Express disambiguation (§4.7): drop `s3express:*` mappings unless the
/// host is the S3 Express control plane, and drop `s3:*` mappings when the
/// host *is* the control plane or an S3 Express data-plane host.
fn filter_s3_express<'a>(call: &CallEntry, mappings: &'a [MethodMapping]) -> Vec<&'a MethodMapping> {
    if mappings.len() <= 1 {
        return mappings.iter().collect();
    }
    let is_control = call.host.starts_with("s3express-control.");
    let is_express = is_control || call.host.contains(".s3express-");

    mappings
        .iter()
        .filter(|m| {
            let is_s3express_action = m.action.to_ascii_lowercase().starts_with("s3express:");
            let is_s3_action = m.action.to_ascii_lowercase().starts_with("s3:");
            if is_s3express_action && !is_control {
                return false;
            }
            if is_s3_action && is_express {
                return false;
            }
            true
        })
        .collect()
}

/// Resolve the resource ARNs for one mapping entry, per the three-phase
/// scheme in §4.7: `arnOverride`, then `resourcearnMappings`, then
/// `resourceMappings`, stopping at the first non-empty set.
fn resolve_resources(catalog: &Catalog, call: &CallEntry, mapping: &MethodMapping, identity: &Identity, is_first: bool) -> Vec<String> {
    let mut resources = Vec::new();

    if let Some(arn_override) = &mapping.arn_override {
        let mut resolved = arn::evaluate(&arn_override.template, call, false, identity);
        resolved.retain(|r| is_first || is_fully_resolved_arn(&arn_override.template, r));
        resources.extend(resolved);
    }

    // Always evaluated when present, accumulating onto whatever arn_override
    // produced; only resource_mappings below is gated on staying empty.
    if !mapping.resourcearn_mappings.is_empty() {
        for (resource_type, template_ref) in &mapping.resourcearn_mappings {
            let bare = resource_type.trim_end_matches('*');
            let mandatory = resource_type.ends_with('*');
            let _context = catalog
                .sar_entry(&call.service)
                .and_then(|sar| sar.resources.iter().find(|r| r.resource.eq_ignore_ascii_case(bare)))
                .map(|r| r.arn.clone());

            let resolved = arn::evaluate(&template_ref.template, call, mandatory, identity);
            if resolved.is_empty() && mandatory && mapping.resource_mappings.is_empty() {
                resources.push("*".to_string());
            } else {
                resources.extend(resolved);
            }
        }
    }

    if resources.is_empty() && !mapping.resource_mappings.is_empty() {
        let Some(sar) = catalog.sar_entry(&call.service) else {
            return vec!["*".to_string()];
        };
        for resource in &sar.resources {
            let base = resource.arn.clone();
            let mut candidates = vec![base];
            for (var, template_ref) in &mapping.resource_mappings {
                let resolved = arn::evaluate(&template_ref.template, call, false, identity);
                if resolved.is_empty() {
                    continue;
                }
                let mut next = Vec::new();
                for base_candidate in &candidates {
                    for value in &resolved {
                        next.push(base_candidate.replace(&format!("${{{var}}}"), value));
                    }
                }
                candidates = next;
            }
            resources.extend(candidates);
        }
    }

    resources
}

fn is_fully_resolved_arn(original_template: &str, resolved: &str) -> bool {
    arn::is_fully_resolved(original_template, resolved)
}

/// Build the per-call statements for proxy mode (§4.7's per-mapping-entry
/// statements), before aggregation.
pub fn statements_for_call(catalog: &Catalog, call: &CallEntry, opts: &SynthesisOptions) -> Vec<IamStatement> {
    let Some(mappings) = find_method_mappings(catalog, &call.service, &call.method) else {
        let actions = get_actions(catalog, &call.service, &call.method);
        if actions.is_empty() {
            return Vec::new();
        }
        return vec![IamStatement {
            effect: "Allow",
            action: actions,
            resource: ResourceValue::One("*".to_string()),
        }];
    };

    let filtered = filter_s3_express(call, mappings);
    let identity = identity_for(catalog, call, opts);

    let mut statements = Vec::new();
    for (i, mapping) in filtered.iter().enumerate() {
        let resources = resolve_resources(catalog, call, mapping, &identity, i == 0);
        let resources = if resources.is_empty() {
            if !mapping.resourcearn_mappings.is_empty() {
                continue;
            }
            vec!["*".to_string()]
        } else {
            resources
        };

        statements.push(IamStatement {
            effect: "Allow",
            action: vec![mapping.action.clone()],
            resource: ResourceValue::from_sorted_vec(resources),
        });
    }
    statements
}

/// Aggregate statements: sort each resource list, merge statements with
/// identical sorted resource lists by unioning their actions, and serialize
/// a single-element resource list as a bare string.
pub fn aggregate(mut statements: Vec<IamStatement>, opts: &SynthesisOptions) -> Vec<IamStatement> {
    if opts.force_wildcard_resource {
        for s in &mut statements {
            s.resource = ResourceValue::One("*".to_string());
        }
    }

    let mut by_resource: Vec<(Vec<String>, Vec<String>)> = Vec::new();
    for s in statements {
        let resource_key: Vec<String> = s.resource.as_slice().to_vec();
        if let Some((_, actions)) = by_resource.iter_mut().find(|(r, _)| *r == resource_key) {
            for a in s.action {
                if !actions.contains(&a) {
                    actions.push(a);
                }
            }
        } else {
            by_resource.push((resource_key, s.action));
        }
    }

    by_resource
        .into_iter()
        .map(|(resource, mut actions)| {
            if opts.sort_alphabetical {
                actions.sort();
            }
            let mut seen = BTreeSet::new();
            actions.retain(|a| seen.insert(a.clone()));
            IamStatement {
                effect: "Allow",
                action: actions,
                resource: ResourceValue::from_sorted_vec(resource),
            }
        })
        .collect()
}

/// CSM-mode synthesis: one consolidated `Allow *` statement over the
/// distinct union of dependent actions across all (non-filtered) entries.
pub fn synthesize_csm(catalog: &Catalog, entries: &[CallEntry], opts: &SynthesisOptions) -> IamPolicy {
    let mut all_actions: Vec<String> = Vec::new();
    for entry in entries {
        if opts.fails_only && (200..300).contains(&entry.final_http_status_code) {
            continue;
        }
        if catalog.is_permissionless(&entry.fingerprint()) {
            continue;
        }
        let actions = get_actions(catalog, &entry.service, &entry.method);
        let with_deps = get_dependent_actions(catalog, &actions);
        for a in with_deps {
            if !all_actions.contains(&a) {
                all_actions.push(a);
            }
        }
    }

    if opts.sort_alphabetical {
        all_actions.sort();
    }

    if all_actions.is_empty() {
        return IamPolicy::default();
    }

    IamPolicy {
        statement: vec![IamStatement {
            effect: "Allow",
            action: all_actions,
            resource: ResourceValue::One("*".to_string()),
        }],
        ..Default::default()
    }
}

/// Proxy-mode synthesis (AWS): per-entry statements, then aggregated.
pub fn synthesize_proxy(catalog: &Catalog, entries: &[CallEntry], opts: &SynthesisOptions) -> IamPolicy {
    let mut statements = Vec::new();
    for entry in entries {
        statements.extend(statements_for_call(catalog, entry, opts));
    }
    IamPolicy {
        statement: aggregate(statements, opts),
        ..Default::default()
    }
}

/// Azure synthesis: iterate the Azure map for each entry's matched
/// templates/permissions, enforcing `bodyPathExists`/`pathEquals`
/// conditions, and split the resulting actions into `Actions`/`DataActions`.
pub fn synthesize_azure(catalog: &Catalog, entries: &[crate::model::AzureEntry]) -> AzureIamPolicy {
    let mut actions = BTreeSet::new();
    let mut data_actions = BTreeSet::new();

    for entry in entries {
        let Some((_, path_params, permissions)) = catalog.azure.match_path(&entry.http_method, &entry.path) else {
            continue;
        };

        for perm in permissions {
            if let Some(cond) = &perm.condition {
                let mut ok = true;
                for (name, expected) in &cond.path_equals {
                    if path_params.get(name).map(|v| v != expected).unwrap_or(true) {
                        ok = false;
                        break;
                    }
                }
                if ok {
                    if let Some(jsonpath) = &cond.body_path_exists {
                        ok = body_path_exists(&entry.body, jsonpath);
                    }
                }
                if !ok {
                    continue;
                }
            }

            if perm.is_data_action {
                data_actions.insert(perm.permission.clone());
            } else {
                actions.insert(perm.permission.clone());
            }
        }
    }

    AzureIamPolicy {
        actions: actions.into_iter().collect(),
        data_actions: data_actions.into_iter().collect(),
    }
}

fn body_path_exists(body: &str, path: &str) -> bool {
    use jsonpath_rust::JsonPathQuery;

    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return false;
    };
    match value.path(path) {
        Ok(serde_json::Value::Array(results)) => !results.is_empty(),
        Ok(serde_json::Value::Null) => false,
        Ok(_) => true,
        Err(_) => false,
    }
}

/// GCP synthesis: union of `Permissions[].name` across every matching
/// method for every observed entry.
pub fn synthesize_gcp(catalog: &Catalog, entries: &[GcpEntry]) -> GcpPermissionList {
    let mut perms = BTreeSet::new();
    for entry in entries {
        for method in catalog.gcp.methods_for_api_id(&entry.api_id) {
            for p in &method.permissions {
                perms.insert(p.name.clone());
            }
        }
    }
    GcpPermissionList(perms.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AzureEntry;

    #[test]
    fn synthesize_azure_maps_a_read_request_to_its_permission() {
        let catalog = Catalog::load().unwrap();
        let entries = vec![AzureEntry {
            http_method: "GET".to_string(),
            path: "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Storage/storageAccounts/acct1".to_string(),
            parameters: Default::default(),
            body: String::new(),
        }];

        let policy = synthesize_azure(&catalog, &entries);

        assert_eq!(policy.actions, vec!["Microsoft.Storage/storageAccounts/read".to_string()]);
        assert!(policy.data_actions.is_empty());
    }

    #[test]
    fn synthesize_azure_unmatched_path_contributes_nothing() {
        let catalog = Catalog::load().unwrap();
        let entries = vec![AzureEntry {
            http_method: "GET".to_string(),
            path: "/not/a/known/path".to_string(),
            parameters: Default::default(),
            body: String::new(),
        }];

        let policy = synthesize_azure(&catalog, &entries);

        assert!(policy.actions.is_empty());
        assert!(policy.data_actions.is_empty());
    }

    #[test]
    fn synthesize_azure_honors_body_path_exists_condition() {
        let catalog = Catalog::load().unwrap();
        let path = "/subscriptions/sub1/resourceGroups/rg1/providers/Microsoft.Resources/deployments/deploy1".to_string();

        let without_template = vec![AzureEntry {
            http_method: "PUT".to_string(),
            path: path.clone(),
            parameters: Default::default(),
            body: "{}".to_string(),
        }];
        assert!(synthesize_azure(&catalog, &without_template).actions.is_empty());

        let with_template = vec![AzureEntry {
            http_method: "PUT".to_string(),
            path,
            parameters: Default::default(),
            body: r#"{"properties": {"template": {}}}"#.to_string(),
        }];
        let policy = synthesize_azure(&catalog, &with_template);
        assert_eq!(policy.actions, vec!["Microsoft.Resources/deployments/write".to_string()]);
    }

    #[test]
    fn synthesize_gcp_unions_permissions_across_entries() {
        let catalog = Catalog::load().unwrap();
        let entries = vec![
            GcpEntry {
                api_id: "storage.objects.get".to_string(),
            },
            GcpEntry {
                api_id: "storage.objects.list".to_string(),
            },
        ];

        let policy = synthesize_gcp(&catalog, &entries);

        assert!(policy.0.contains(&"storage.objects.get".to_string()));
        assert!(policy.0.contains(&"storage.objects.list".to_string()));
    }

    #[test]
    fn synthesize_gcp_unknown_api_id_contributes_nothing() {
        let catalog = Catalog::load().unwrap();
        let entries = vec![GcpEntry {
            api_id: "nonexistent.method.verb".to_string(),
        }];

        let policy = synthesize_gcp(&catalog, &entries);

        assert!(policy.0.is_empty());
    }

    #[test]
    fn csm_synthesis_is_empty_when_no_entries_carry_permissions() {
        let catalog = Catalog::load().unwrap();
        let policy = synthesize_csm(&catalog, &[], &SynthesisOptions::default());
        assert!(policy.statement.is_empty());
    }
}
