//! CA keypair type and per-host leaf certificate signing.
//!
//! Generating and persisting the *root* CA keypair is an external
//! collaborator's job (the CLI crate's `ca` module owns `~/.iamlive/ca.pem`
//! / `ca.key`); this module only consumes an already-loaded CA to mint the
//! short-lived leaf certificates the MITM proxy presents per intercepted
//! host, which is core proxy functionality.

use rcgen::{CertificateParams, DistinguishedName, DnType, Issuer, KeyPair, SanType};
use rustls_pki_types::{CertificateDer, PrivatePkcs8KeyDer};

use crate::error::ProxyError;

/// A loaded CA certificate + private key, ready to sign leaf certificates.
pub struct CaKeyPair {
    pub cert_der: CertificateDer<'static>,
    key_pair: KeyPair,
}

impl CaKeyPair {
    pub fn new(cert_der: CertificateDer<'static>, key_pair: KeyPair) -> Self {
        Self { cert_der, key_pair }
    }

    /// Sign a fresh leaf certificate for `host`, valid for the connection's
    /// lifetime. Returns the DER-encoded certificate and its private key.
    pub fn sign_leaf(&self, host: &str) -> Result<(CertificateDer<'static>, PrivatePkcs8KeyDer<'static>), ProxyError> {
        let leaf_key = KeyPair::generate().map_err(|e| ProxyError::LeafSigning {
            host: host.to_string(),
            source: e,
        })?;

        let mut params = CertificateParams::new(vec![host.to_string()]).map_err(|e| ProxyError::LeafSigning {
            host: host.to_string(),
            source: e,
        })?;
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, host);
        params.subject_alt_names = vec![SanType::DnsName(host.try_into().map_err(|_| ProxyError::LeafSigning {
            host: host.to_string(),
            source: rcgen::Error::InvalidNameType,
        })?)];

        let issuer = Issuer::from_ca_cert_der(&self.cert_der, self.key_pair.clone_key()).map_err(|e| ProxyError::LeafSigning {
            host: host.to_string(),
            source: e,
        })?;

        let cert = params.signed_by(&leaf_key, &issuer).map_err(|e| ProxyError::LeafSigning {
            host: host.to_string(),
            source: e,
        })?;

        Ok((cert.der().clone(), PrivatePkcs8KeyDer::from(leaf_key.serialize_der())))
    }
}
