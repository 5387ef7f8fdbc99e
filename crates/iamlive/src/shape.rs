//! Shape path resolution (§4.4): walk an AWS service schema's shape tree to
//! turn a flat wire parameter name into its canonical dotted/bracketed
//! property path, and vice versa for the ec2/query normalization step.

use std::collections::BTreeMap;

use crate::model::{ServiceDefinition, Structure};

const MAX_DOTS: usize = 10;

/// Resolve `query` (a header/query name, or a normalized `ec2`/`query`
/// protocol key with `[]` array markers) against `root` by walking the
/// shape tree and comparing accumulated location paths case-insensitively.
/// Returns the canonical dotted path on a match.
pub fn resolve_path(service: &ServiceDefinition, root: &Structure, query: &str) -> Option<String> {
    let query_lower = query.to_ascii_lowercase();
    resolve_node(service, root, String::new(), String::new(), &query_lower, 0)
}

fn resolve_node(
    service: &ServiceDefinition,
    node: &Structure,
    canonical: String,
    location: String,
    query_lower: &str,
    depth: usize,
) -> Option<String> {
    if depth > MAX_DOTS {
        return None;
    }

    let resolved = resolve_indirection(service, node);
    let resolved = match resolved {
        Some(r) => r,
        None => node,
    };

    match resolved.shape_type.as_str() {
        "structure" => {
            for (key, member) in &resolved.members {
                let member_location_piece = member
                    .query_name
                    .clone()
                    .or_else(|| member.location_name.clone())
                    .unwrap_or_else(|| key.clone());
                let next_location = join(&location, &member_location_piece);
                let next_canonical = join(&canonical, key);

                if next_location.to_ascii_lowercase() == query_lower {
                    if is_leaf_type(member_shape_type(service, member)) {
                        return Some(next_canonical);
                    }
                }

                if let Some(found) = resolve_node(
                    service,
                    member,
                    next_canonical,
                    next_location,
                    query_lower,
                    depth + 1,
                ) {
                    return Some(found);
                }
            }
            None
        }
        "list" => {
            let next_location = format!("{location}[]");
            let next_canonical = format!("{canonical}[]");
            if let Some(member) = &resolved.member {
                if next_location.to_ascii_lowercase() == query_lower
                    && is_leaf_type(member_shape_type(service, member))
                {
                    return Some(next_canonical);
                }
                resolve_node(
                    service,
                    member,
                    next_canonical,
                    next_location,
                    query_lower,
                    depth + 1,
                )
            } else {
                None
            }
        }
        // map, boolean, timestamp, blob terminate the search.
        _ => None,
    }
}

fn member_shape_type<'a>(service: &'a ServiceDefinition, member: &'a Structure) -> &'a str {
    if member.shape_type.is_empty() && !member.shape.is_empty() {
        service
            .shapes
            .get(&member.shape)
            .map(|s| s.shape_type.as_str())
            .unwrap_or("")
    } else {
        member.shape_type.as_str()
    }
}

fn is_leaf_type(shape_type: &str) -> bool {
    matches!(shape_type, "string" | "integer" | "long" | "float" | "")
}

fn join(prefix: &str, piece: &str) -> String {
    if prefix.is_empty() {
        piece.to_string()
    } else {
        format!("{prefix}.{piece}")
    }
}

/// Resolve a `shape` reference against `shapes`, preserving the referring
/// node's own `location_name`/`query_name`. Returns `None` when the node has
/// no indirection (it's already concrete).
fn resolve_indirection<'a>(
    service: &'a ServiceDefinition,
    node: &'a Structure,
) -> Option<&'a Structure> {
    if node.shape.is_empty() {
        return None;
    }
    service.shapes.get(&node.shape)
}

/// Normalize an `ec2`/`query` protocol form key: replace `.member.N` and
/// `.N` index markers with `[]`.
pub fn normalize_query_key(key: &str) -> String {
    let re_member = regex::Regex::new(r"\.member\.\d+").unwrap();
    let re_index = regex::Regex::new(r"\.\d+").unwrap();
    let step1 = re_member.replace_all(key, "[]");
    re_index.replace_all(&step1, "[]").into_owned()
}

/// Union of collected params and URI params, used to check whether a
/// required shape member is satisfied: a required name `R` is satisfied by
/// a key equal to `R`, or starting with `R[]` or `R.`.
pub fn required_satisfied(
    required: &[String],
    params: &BTreeMap<String, Vec<String>>,
    uri_params: &BTreeMap<String, String>,
) -> bool {
    required.iter().all(|r| {
        params.keys().any(|k| key_satisfies(k, r)) || uri_params.keys().any(|k| key_satisfies(k, r))
    })
}

fn key_satisfies(key: &str, required: &str) -> bool {
    key == required
        || key.starts_with(&format!("{required}[]"))
        || key.starts_with(&format!("{required}."))
}
