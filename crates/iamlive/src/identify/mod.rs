//! Per-provider request identification. Rather than threading a
//! `providerFlag` switch through every function, each provider implements
//! the same `Identifier` capability and the proxy core selects one
//! implementation at startup (Design Notes: "Per-provider forking").

pub mod aws;
pub mod azure;
pub mod gcp;

use crate::model::CallEntry;

/// A single HTTP request as observed by the proxy core, fully buffered.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: String,
    pub host: String,
    /// Path plus optional `?query`, as sent on the wire.
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub status_code: u16,
}

impl RawRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Outcome of identifying one AWS request: the call entry plus, when a
/// virtual-hosted S3 bucket was detected, the bucket name to prepend to the
/// `{Bucket}` URI parameter.
pub struct AwsIdentification {
    pub entry: CallEntry,
}

/// Outcome of identifying one Azure request.
pub struct AzureIdentification {
    pub entry: crate::model::AzureEntry,
}
