//! Error types for the iamlive library, one enum per subsystem.

use thiserror::Error;

/// Errors loading or indexing the embedded service catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("malformed embedded schema {file}: {source}")]
    MalformedSchema {
        file: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed embedded action map: {0}")]
    MalformedActionMap(#[source] serde_json::Error),
    #[error("malformed embedded service authorization reference: {0}")]
    MalformedSar(#[source] serde_json::Error),
    #[error("malformed embedded azure map: {0}")]
    MalformedAzureMap(#[source] serde_json::Error),
    #[error("malformed embedded gcp api list: {0}")]
    MalformedGcpMap(#[source] serde_json::Error),
    #[error("override map file {path} could not be read: {source}")]
    OverrideUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no embedded resource found at path {0}")]
    MissingResource(String),
}

/// Errors identifying a single request against a cloud provider's schema.
///
/// Identification failures are not fatal: the caller forwards the request
/// unidentified. These variants exist so call sites can log a reason.
#[derive(Debug, Error)]
pub enum IdentifyError {
    #[error("no service schema for endpoint prefix {0}")]
    UnknownService(String),
    #[error("request body is not valid JSON: {0}")]
    InvalidJsonBody(#[source] serde_json::Error),
    #[error("request body is not valid XML: {0}")]
    InvalidXmlBody(String),
    #[error("request body is not valid url-encoded form: {0}")]
    InvalidFormBody(String),
    #[error("missing or non-unique required field {0}")]
    MissingRequiredField(String),
    #[error("no operation candidate matched method {method} path {path}")]
    NoCandidate { method: String, path: String },
    #[error("missing X-Amz-Target header")]
    MissingTarget,
}

/// Errors from the proxy core (TLS/CA/network).
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to sign leaf certificate for {host}: {source}")]
    LeafSigning {
        host: String,
        #[source]
        source: rcgen::Error,
    },
    #[error("tls handshake failed: {0}")]
    Tls(#[source] std::io::Error),
    #[error("upstream connection failed: {0}")]
    Upstream(#[source] std::io::Error),
}

/// Errors from the CSM UDP listener. Per the spec, these are fatal: the
/// listener is the authoritative source of events and a parse error means
/// the stream can no longer be trusted.
#[derive(Debug, Error)]
pub enum CsmError {
    #[error("failed to bind csm socket {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read csm datagram: {0}")]
    Recv(#[source] std::io::Error),
    #[error("malformed csm event: {0}")]
    MalformedEvent(#[source] serde_json::Error),
}

/// Errors recovering an account id from an access key or session token.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("access key too short to decode an account id")]
    KeyTooShort,
    #[error("access key decodes to a negative account id")]
    NegativeAccountId,
    #[error("session token is not valid base64: {0}")]
    InvalidBase64(#[source] base64::DecodeError),
    #[error("session token is too short to carry a message type")]
    TokenTooShort,
    #[error("session token message type {0} is not recognized")]
    UnknownMessageType(u8),
    #[error("malformed protobuf payload in session token")]
    MalformedProtobuf,
}
