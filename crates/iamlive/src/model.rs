//! Data model shared by every subsystem: call entries, service schemas, the
//! action map, the Service Authorization Reference, and the IAM policy
//! document shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tag distinguishing a fully-identified API call from a raw proxy
/// observation that still needs identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CallType {
    ApiCall,
    ProxyCall,
}

/// One identified AWS (or CSM-reported) API call.
///
/// `parameters` maps a normalized dotted/bracketed property path (e.g.
/// `Filter[].Name`) to the ordered list of observed string values at that
/// path; a key never repeats.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallEntry {
    #[serde(rename = "Service")]
    pub service: String,
    #[serde(rename = "Api")]
    pub method: String,
    #[serde(rename = "Region", default)]
    pub region: String,
    #[serde(rename = "_Host", default)]
    pub host: String,
    #[serde(rename = "AccessKey", default)]
    pub access_key: Option<String>,
    #[serde(rename = "SessionToken", default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub uri_parameters: BTreeMap<String, String>,
    #[serde(rename = "FinalHttpStatusCode", default)]
    pub final_http_status_code: u16,
    #[serde(rename = "Type", default = "default_call_type")]
    pub call_type: CallType,
}

fn default_call_type() -> CallType {
    CallType::ApiCall
}

impl CallEntry {
    pub fn push_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.parameters.entry(key.into()).or_default().push(value.into());
    }

    /// `true` when this call is an exact fingerprint match for one of the
    /// catalog's permissionless actions (`service.method`, case-insensitive).
    pub fn fingerprint(&self) -> String {
        format!("{}.{}", self.service, self.method)
    }
}

/// One observed Azure Resource Manager call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzureEntry {
    pub http_method: String,
    pub path: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

/// One observed GCP call, reduced to the `service.resource.verb` API id
/// string the GCP discovery document indexes methods under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpEntry {
    pub api_id: String,
}

// ---------------------------------------------------------------------
// AWS service schema (botocore-style service-2.json shape)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDefinition {
    pub metadata: ServiceMetadata,
    #[serde(default)]
    pub operations: BTreeMap<String, Operation>,
    #[serde(default)]
    pub shapes: BTreeMap<String, Structure>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceMetadata {
    #[serde(rename = "endpointPrefix")]
    pub endpoint_prefix: String,
    pub protocol: String,
    #[serde(rename = "serviceAbbreviation", default)]
    pub service_abbreviation: Option<String>,
    #[serde(rename = "serviceFullName", default)]
    pub service_full_name: Option<String>,
    #[serde(rename = "apiVersion", default)]
    pub api_version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Operation {
    pub http: OperationHttp,
    #[serde(default)]
    pub input: Option<Structure>,
    #[serde(default)]
    pub output: Option<Structure>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationHttp {
    pub method: String,
    #[serde(rename = "requestUri", default)]
    pub request_uri: String,
}

/// A recursive, tagged shape node. `shape`, when non-empty, is a reference
/// into `ServiceDefinition::shapes` that should be resolved in place while
/// retaining this node's own `location_name`/`query_name`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Structure {
    #[serde(default, rename = "type")]
    pub shape_type: String,
    #[serde(default)]
    pub shape: String,
    #[serde(default, rename = "locationName")]
    pub location_name: Option<String>,
    #[serde(default, rename = "queryName")]
    pub query_name: Option<String>,
    #[serde(default)]
    pub member: Option<Box<Structure>>,
    #[serde(default)]
    pub members: BTreeMap<String, Structure>,
    #[serde(default)]
    pub required: Vec<String>,
}

// ---------------------------------------------------------------------
// Action map
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ActionMap {
    #[serde(default, rename = "sdk_method_iam_mappings")]
    pub sdk_method_iam_mappings: BTreeMap<String, Vec<MethodMapping>>,
    #[serde(default, rename = "sdk_service_mappings")]
    pub sdk_service_mappings: BTreeMap<String, String>,
    #[serde(default, rename = "sdk_permissionless_actions")]
    pub sdk_permissionless_actions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MethodMapping {
    pub action: String,
    #[serde(default)]
    pub resource_mappings: BTreeMap<String, TemplateRef>,
    #[serde(default)]
    pub resourcearn_mappings: BTreeMap<String, TemplateRef>,
    #[serde(default)]
    pub arn_override: Option<TemplateRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateRef {
    pub template: String,
}

// ---------------------------------------------------------------------
// Service Authorization Reference
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SarEntry {
    pub prefix: String,
    #[serde(default)]
    pub privileges: Vec<SarPrivilege>,
    #[serde(default)]
    pub resources: Vec<SarResource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SarPrivilege {
    pub privilege: String,
    #[serde(default)]
    pub resource_types: Vec<SarResourceType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SarResourceType {
    pub resource_type: String,
    #[serde(default)]
    pub dependent_actions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SarResource {
    pub resource: String,
    pub arn: String,
}

impl SarResourceType {
    /// A resource type name ending in `*` is mandatory: the IAM action
    /// requires a concrete (non-wildcard) resource.
    pub fn is_mandatory(&self) -> bool {
        self.resource_type.ends_with('*')
    }

    pub fn bare_name(&self) -> &str {
        self.resource_type.trim_end_matches('*')
    }
}

// ---------------------------------------------------------------------
// Azure map
// ---------------------------------------------------------------------

/// Keyed by uppercased HTTP method, then path template.
pub type AzureMap = BTreeMap<String, BTreeMap<String, Vec<AzurePermission>>>;

#[derive(Debug, Clone, Deserialize)]
pub struct AzurePermission {
    pub permission: String,
    #[serde(default)]
    pub is_data_action: bool,
    #[serde(default)]
    pub condition: Option<AzureCondition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AzureCondition {
    #[serde(default)]
    pub path_equals: BTreeMap<String, String>,
    #[serde(default)]
    pub body_path_exists: Option<String>,
}

// ---------------------------------------------------------------------
// GCP map
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct GcpApi {
    pub name: String,
    #[serde(rename = "rootUrl")]
    pub root_url: String,
    #[serde(default)]
    pub methods: BTreeMap<String, GcpMethod>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GcpMethod {
    pub id: String,
    #[serde(default)]
    pub permissions: Vec<GcpPermission>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GcpPermission {
    pub name: String,
}

// ---------------------------------------------------------------------
// IAM policy document
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct IamPolicy {
    #[serde(rename = "Version")]
    pub version: &'static str,
    #[serde(rename = "Statement")]
    pub statement: Vec<IamStatement>,
}

impl Default for IamPolicy {
    fn default() -> Self {
        Self {
            version: "2012-10-17",
            statement: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IamStatement {
    #[serde(rename = "Effect")]
    pub effect: &'static str,
    #[serde(rename = "Action")]
    pub action: Vec<String>,
    #[serde(rename = "Resource")]
    pub resource: ResourceValue,
}

/// A statement's `Resource` serializes as a bare string iff it has exactly
/// one element, otherwise as an array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceValue {
    One(String),
    Many(Vec<String>),
}

impl ResourceValue {
    pub fn from_sorted_vec(mut v: Vec<String>) -> Self {
        v.sort();
        v.dedup();
        if v.len() == 1 {
            ResourceValue::One(v.into_iter().next().unwrap())
        } else {
            ResourceValue::Many(v)
        }
    }

    pub fn as_slice(&self) -> &[String] {
        match self {
            ResourceValue::One(s) => std::slice::from_ref(s),
            ResourceValue::Many(v) => v.as_slice(),
        }
    }
}

impl Serialize for ResourceValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            ResourceValue::One(s) => serializer.serialize_str(s),
            ResourceValue::Many(v) => v.serialize(serializer),
        }
    }
}

/// Azure policy output: actions split from data actions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AzureIamPolicy {
    #[serde(rename = "Actions")]
    pub actions: Vec<String>,
    #[serde(rename = "DataActions")]
    pub data_actions: Vec<String>,
}

/// GCP policy output: a bare JSON array of permission strings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GcpPermissionList(pub Vec<String>);
