//! Embedded catalog data, baked into the binary with `rust_embed`.
//!
//! Grounded in the Botocore/Boto3Resources embed pattern used for schema
//! data: one `RustEmbed` folder per data family so each can be iterated and
//! deserialized independently.

use rust_embed::RustEmbed;

/// Per-service AWS API schemas (`service-2.json`-shaped files), one or more
/// API versions per endpoint prefix.
#[derive(RustEmbed)]
#[folder = "resources/aws"]
#[include = "*.json"]
pub struct AwsServices;

/// The SDK-method-to-IAM-action mapping table.
#[derive(RustEmbed)]
#[folder = "resources"]
#[include = "action_map.json"]
pub struct ActionMapData;

/// The Service Authorization Reference.
#[derive(RustEmbed)]
#[folder = "resources"]
#[include = "sar.json"]
pub struct SarData;

/// The Azure method/path/permission map.
#[derive(RustEmbed)]
#[folder = "resources"]
#[include = "azure_map.json"]
pub struct AzureMapData;

/// GCP API discovery descriptors.
#[derive(RustEmbed)]
#[folder = "resources/gcp"]
#[include = "*.json"]
pub struct GcpApis;
