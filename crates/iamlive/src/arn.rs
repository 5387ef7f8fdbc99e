//! ARN Template Engine (§4.5): evaluates the `%%fn%arg%...%%` mini-language
//! and substitutes call parameters and identity variables into resource ARN
//! templates.
//!
//! Split into `resolve_specials` (function dispatch) and `subst_parameters`
//! (parameter substitution), mirroring the original's `resolveSpecials` /
//! `subARNParameters` split so the two concerns stay independently testable.

use std::collections::BTreeMap;

use crate::model::CallEntry;

/// Identity values substituted into `${Partition}`, `${Region}`, `${Account}`
/// after template functions and call parameters have been resolved.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub partition: String,
    pub region: String,
    pub account: String,
}

/// Evaluate `template` against `call`, returning every fully- or
/// partially-resolved ARN the template expands to (a template has at most
/// one `%%...%%` special, but parameter substitution may still fan out to
/// several ARNs via multi-valued parameters).
///
/// `mandatory` controls what happens when a special's argument can't be
/// resolved: substitute `*` if true, elide the whole special if false.
pub fn evaluate(template: &str, call: &CallEntry, mandatory: bool, identity: &Identity) -> Vec<String> {
    let expanded = resolve_specials(template, call, mandatory);
    expanded
        .into_iter()
        .flat_map(|t| subst_parameters(&t, call))
        .map(|arn| subst_identity(&arn, identity))
        .collect()
}

/// Resolve the single `%%fn%arg1%...%%` special in `template`, if any,
/// expanding it to one or more literal strings with the special's own
/// parameter references still in place (call-parameter substitution happens
/// afterward, in `subst_parameters`).
pub fn resolve_specials(template: &str, call: &CallEntry, mandatory: bool) -> Vec<String> {
    let Some(start) = template.find("%%") else {
        return vec![template.to_string()];
    };
    let Some(rel_end) = template[start + 2..].find("%%") else {
        return vec![template.to_string()];
    };
    let end = start + 2 + rel_end;
    // authoritative per the spec's resolved open question: the interior is
    // template[start+2..end].
    let interior = &template[start + 2..end];
    let before = &template[..start];
    let after = &template[end + 2..];

    let parts: Vec<&str> = interior.split('%').collect();
    let func = parts.first().copied().unwrap_or("");

    let expansions = match func {
        "iftruthy" if parts.len() >= 3 => {
            let expr = parts[1];
            let then_branch = parts[2];
            let else_branch = parts.get(3).copied().unwrap_or("");
            if resolves_truthy(expr, call) {
                vec![then_branch.to_string()]
            } else {
                vec![else_branch.to_string()]
            }
        }
        "urlencode" if parts.len() >= 2 => {
            let expr = parts[1];
            subst_parameters(expr, call)
                .into_iter()
                .map(|v| percent_encoding::utf8_percent_encode(&v, percent_encoding::NON_ALPHANUMERIC).to_string())
                .collect()
        }
        "iftemplatematch" if parts.len() >= 2 => {
            // Resolved upstream in action resolution where the surrounding
            // resource ARN template context is available; here we simply
            // pass the resolved value through, leaving the match check to
            // the caller (see action.rs `iftemplatematch_ok`).
            let expr = parts[1];
            subst_parameters(expr, call)
        }
        "many" if parts.len() >= 2 => parts[1..]
            .iter()
            .flat_map(|expr| subst_parameters(expr, call))
            .collect(),
        "regex" if parts.len() >= 3 => {
            let expr = parts[1];
            let pattern = parts[2].trim_start_matches('/').trim_end_matches('/');
            match regex::Regex::new(pattern) {
                Ok(re) => subst_parameters(expr, call)
                    .into_iter()
                    .filter_map(|v| re.captures(&v).and_then(|c| c.get(1)).map(|m| m.as_str().to_string()))
                    .collect(),
                Err(_) => vec![],
            }
        }
        _ => vec![],
    };

    let expansions = if expansions.is_empty() {
        if parts.len() >= 4 {
            vec![parts[3].to_string()]
        } else if mandatory {
            vec!["*".to_string()]
        } else {
            vec![String::new()]
        }
    } else {
        expansions
    };

    expansions
        .into_iter()
        .map(|mid| format!("{before}{mid}{after}"))
        .collect()
}

fn resolves_truthy(expr: &str, call: &CallEntry) -> bool {
    subst_parameters(expr, call)
        .into_iter()
        .any(|v| !v.is_empty() && !v.contains("${"))
}

/// Substitute each `${name}` in `template` with every observed value for
/// that call parameter, producing the Cartesian expansion as a
/// deduplicated, order-preserving list. Identity variables (`Partition`,
/// `Region`, `Account`) are left untouched here; see `subst_identity`.
pub fn subst_parameters(template: &str, call: &CallEntry) -> Vec<String> {
    let mut results = vec![template.to_string()];
    let mut i = 0;
    while i < results.len() {
        let current = results[i].clone();
        if let Some((name, span)) = next_var(&current) {
            if matches!(name.as_str(), "Partition" | "Region" | "Account") {
                i += 1;
                continue;
            }
            let values = call.parameters.get(&name).cloned().unwrap_or_default();
            if values.is_empty() {
                i += 1;
                continue;
            }
            results.remove(i);
            let mut fanned = ordered_dedup(
                values
                    .iter()
                    .map(|v| format!("{}{}{}", &current[..span.0], v, &current[span.1..]))
                    .collect(),
            );
            for (offset, item) in fanned.drain(..).enumerate() {
                results.insert(i + offset, item);
            }
        } else {
            i += 1;
        }
    }
    ordered_dedup(results)
}

fn next_var(s: &str) -> Option<(String, (usize, usize))> {
    let start = s.find("${")?;
    let rel_end = s[start..].find('}')?;
    let end = start + rel_end + 1;
    let name = s[start + 2..end - 1].to_string();
    Some((name, (start, end)))
}

fn subst_identity(arn: &str, identity: &Identity) -> String {
    let mut out = arn
        .replace("${Partition}", &identity.partition)
        .replace("${Region}", &identity.region)
        .replace("${Account}", &identity.account);
    // Any remaining ${...} becomes a wildcard.
    let re = regex::Regex::new(r"\$\{[^}]*\}").unwrap();
    out = re.replace_all(&out, "*").into_owned();
    out
}

/// `true` when any `${...}` substitution in `arn` fell back to `*` because
/// no value was available -- used to flag an ARN as "not fully resolved".
pub fn is_fully_resolved(original: &str, after: &str) -> bool {
    original == after || !after.contains('*') || !original.contains("${")
}

fn ordered_dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
    out
}

/// Partition derivation from a region string.
pub fn partition_for_region(region: &str) -> String {
    if region.starts_with("cn") {
        "aws-cn".to_string()
    } else if region.starts_with("us-gov") {
        "aws-us-gov".to_string()
    } else {
        "aws".to_string()
    }
}

/// Turn a resource ARN template (containing `${...}` placeholders) into a
/// regex usable for `iftemplatematch`: each `${...}` becomes `.*?`.
pub fn template_to_regex(template: &str) -> Option<regex::Regex> {
    let re = regex::Regex::new(r"\$\{[^}]*\}").ok()?;
    let escaped = regex::escape(template);
    // escape() also escaped the placeholder braces/dollar; rebuild from the
    // raw template instead so `${...}` tokens survive to be replaced.
    let mut pattern = String::new();
    let mut rest = template;
    loop {
        match re.find(rest) {
            Some(m) => {
                pattern.push_str(&regex::escape(&rest[..m.start()]));
                pattern.push_str(".*?");
                rest = &rest[m.end()..];
            }
            None => {
                pattern.push_str(&regex::escape(rest));
                break;
            }
        }
    }
    let _ = escaped;
    regex::Regex::new(&format!("^{pattern}$")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(pairs: &[(&str, &[&str])]) -> CallEntry {
        let mut entry = CallEntry::default();
        for (name, values) in pairs {
            entry
                .parameters
                .insert(name.to_string(), values.iter().map(|v| v.to_string()).collect());
        }
        entry
    }

    fn identity() -> Identity {
        Identity {
            partition: "aws".to_string(),
            region: "us-east-1".to_string(),
            account: "123456789012".to_string(),
        }
    }

    #[test]
    fn subst_parameters_fans_out_multi_valued_params() {
        let entry = call(&[("BucketName", &["one", "two"])]);
        let mut got = subst_parameters("arn:aws:s3:::${BucketName}", &entry);
        got.sort();
        assert_eq!(got, vec!["arn:aws:s3:::one".to_string(), "arn:aws:s3:::two".to_string()]);
    }

    #[test]
    fn subst_parameters_leaves_identity_vars_untouched() {
        let entry = call(&[]);
        let got = subst_parameters("arn:${Partition}:s3:${Region}:${Account}:x", &entry);
        assert_eq!(got, vec!["arn:${Partition}:s3:${Region}:${Account}:x".to_string()]);
    }

    #[test]
    fn subst_parameters_drops_unresolved_var_leaving_template_unexpanded() {
        let entry = call(&[]);
        let got = subst_parameters("arn:aws:s3:::${BucketName}", &entry);
        assert_eq!(got, vec!["arn:aws:s3:::${BucketName}".to_string()]);
    }

    #[test]
    fn subst_parameters_is_order_preserving_and_deduplicated() {
        let entry = call(&[("Id", &["a", "b", "a"])]);
        let got = subst_parameters("x/${Id}", &entry);
        assert_eq!(got, vec!["x/a".to_string(), "x/b".to_string()]);
    }

    #[test]
    fn evaluate_is_deterministic_for_the_same_inputs() {
        let entry = call(&[("BucketName", &["b1", "b2"])]);
        let id = identity();
        let first = evaluate("arn:${Partition}:s3:::${BucketName}", &entry, true, &id);
        let second = evaluate("arn:${Partition}:s3:::${BucketName}", &entry, true, &id);
        assert_eq!(first, second);
        assert_eq!(first, vec!["arn:aws:s3:::b1".to_string(), "arn:aws:s3:::b2".to_string()]);
    }

    #[test]
    fn resolve_specials_iftruthy_picks_then_branch_when_param_present() {
        let entry = call(&[("VersionId", &["v1"])]);
        let got = resolve_specials("arn:%%iftruthy%${VersionId}%object-versions%object%%", &entry, true);
        assert_eq!(got, vec!["arn:object-versions".to_string()]);
    }

    #[test]
    fn resolve_specials_iftruthy_picks_else_branch_when_param_absent() {
        let entry = call(&[]);
        let got = resolve_specials("arn:%%iftruthy%${VersionId}%object-versions%object%%", &entry, true);
        assert_eq!(got, vec!["arn:object".to_string()]);
    }

    #[test]
    fn resolve_specials_urlencode_percent_encodes_the_value() {
        let entry = call(&[("Key", &["a b/c"])]);
        let got = resolve_specials("arn:%%urlencode%${Key}%%", &entry, true);
        assert_eq!(got, vec![format!("arn:{}", percent_encoding::utf8_percent_encode("a b/c", percent_encoding::NON_ALPHANUMERIC))]);
    }

    #[test]
    fn resolve_specials_many_flattens_every_argument() {
        let entry = call(&[("A", &["1"]), ("B", &["2", "3"])]);
        let mut got = resolve_specials("arn:%%many%${A}%${B}%%", &entry, true);
        got.sort();
        assert_eq!(got, vec!["arn:1".to_string(), "arn:2".to_string(), "arn:3".to_string()]);
    }

    #[test]
    fn resolve_specials_regex_extracts_capture_group() {
        let entry = call(&[("Arn", &["arn:aws:iam::123456789012:role/MyRole"])]);
        let got = resolve_specials("%%regex%${Arn}%/role\\/(.+)$/%%", &entry, true);
        assert_eq!(got, vec!["MyRole".to_string()]);
    }

    #[test]
    fn resolve_specials_falls_back_to_wildcard_when_mandatory_and_unresolved() {
        let entry = call(&[]);
        let got = resolve_specials("arn:%%regex%${Missing}%/(.+)$/%%", &entry, true);
        assert_eq!(got, vec!["arn:*".to_string()]);
    }

    #[test]
    fn resolve_specials_elides_when_not_mandatory_and_unresolved() {
        let entry = call(&[]);
        let got = resolve_specials("arn:%%regex%${Missing}%/(.+)$/%%", &entry, false);
        assert_eq!(got, vec!["arn:".to_string()]);
    }

    #[test]
    fn resolve_specials_passes_template_through_unchanged_without_a_special() {
        let entry = call(&[]);
        let got = resolve_specials("arn:aws:s3:::my-bucket", &entry, true);
        assert_eq!(got, vec!["arn:aws:s3:::my-bucket".to_string()]);
    }

    #[test]
    fn subst_identity_replaces_all_three_identity_vars() {
        let id = identity();
        let got = subst_identity("arn:${Partition}:s3:${Region}:${Account}:x", &id);
        assert_eq!(got, "arn:aws:s3:us-east-1:123456789012:x");
    }

    #[test]
    fn subst_identity_wildcards_any_leftover_placeholder() {
        let id = identity();
        let got = subst_identity("arn:${Partition}:s3:::${Unknown}", &id);
        assert_eq!(got, "arn:aws:s3:::*");
    }

    #[test]
    fn is_fully_resolved_true_when_no_placeholder_was_present() {
        assert!(is_fully_resolved("arn:aws:s3:::bucket", "arn:aws:s3:::bucket"));
    }

    #[test]
    fn is_fully_resolved_false_when_a_placeholder_fell_back_to_wildcard() {
        assert!(!is_fully_resolved("arn:aws:s3:::${Bucket}", "arn:aws:s3:::*"));
    }

    #[test]
    fn partition_for_region_selects_china_and_govcloud_partitions() {
        assert_eq!(partition_for_region("cn-north-1"), "aws-cn");
        assert_eq!(partition_for_region("us-gov-west-1"), "aws-us-gov");
        assert_eq!(partition_for_region("us-east-1"), "aws");
    }

    #[test]
    fn template_to_regex_matches_any_value_at_the_placeholder() {
        let re = template_to_regex("arn:aws:s3:::${BucketName}/${Key}").unwrap();
        assert!(re.is_match("arn:aws:s3:::my-bucket/path/to/object"));
        assert!(!re.is_match("arn:aws:ec2:::not-a-match"));
    }
}
