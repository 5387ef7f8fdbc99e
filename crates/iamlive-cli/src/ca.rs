//! Root CA keypair generation and persistence (§4.10). Unlike the per-host
//! leaf certificates the library mints per MITM'd connection, the root CA
//! is a long-lived identity the user imports into their system trust store,
//! so it lives here in the CLI rather than in `iamlive`'s proxy core.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use iamlive::proxy::ca::CaKeyPair;
use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair, KeyUsagePurpose};
use rsa::pkcs8::EncodePrivateKey;
use rustls_pki_types::CertificateDer;
use time::OffsetDateTime;

const RSA_BITS: usize = 4096;
const VALIDITY_DAYS: i64 = 365 * 10;

/// Load the CA from `cert_path`/`key_path` if both exist, generate and
/// persist a fresh self-signed 4096-bit RSA CA if neither exists, or fail
/// if only one half of the pair is present (§4.10).
pub fn load_or_generate(cert_path: &Path, key_path: &Path) -> Result<CaKeyPair> {
    let cert_exists = cert_path.exists();
    let key_exists = key_path.exists();

    if cert_exists && key_exists {
        return load(cert_path, key_path);
    }
    if cert_exists != key_exists {
        bail!(
            "CA certificate and key must both exist or both be absent ({} exists: {cert_exists}, {} exists: {key_exists})",
            cert_path.display(),
            key_path.display()
        );
    }

    generate_and_persist(cert_path, key_path)
}

fn load(cert_path: &Path, key_path: &Path) -> Result<CaKeyPair> {
    let cert_pem = fs::read(cert_path).with_context(|| format!("reading CA certificate {}", cert_path.display()))?;
    let key_pem = fs::read(key_path).with_context(|| format!("reading CA key {}", key_path.display()))?;

    let cert_der = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .next()
        .context("CA certificate file contains no PEM certificate")??;

    sanity_check(&cert_der);

    let key_der = rustls_pemfile::pkcs8_private_keys(&mut key_pem.as_slice())
        .next()
        .context("CA key file contains no PKCS8 private key")??;
    let key_pair = KeyPair::try_from(key_der.secret_pkcs8_der()).context("parsing persisted CA private key")?;

    Ok(CaKeyPair::new(cert_der, key_pair))
}

/// Re-parse the persisted certificate to sanity-check its validity before
/// reuse (debug-logged only, never a hard failure — the original trusts
/// whatever is on disk; this just makes an expired/malformed CA visible).
fn sanity_check(cert_der: &CertificateDer<'_>) {
    match x509_parser::parse_x509_certificate(cert_der) {
        Ok((_, cert)) => {
            if !cert.validity().is_valid() {
                tracing::warn!("persisted CA certificate is outside its validity window");
            }
        }
        Err(e) => tracing::debug!(error = %e, "could not re-parse persisted CA certificate"),
    }
}

fn generate_and_persist(cert_path: &Path, key_path: &Path) -> Result<CaKeyPair> {
    tracing::info!("no CA keypair found, generating a new self-signed 4096-bit RSA CA");

    let rsa_key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), RSA_BITS).context("generating RSA CA key")?;
    let pkcs8 = rsa_key.to_pkcs8_der().context("encoding RSA CA key as PKCS8")?;
    let key_pair = KeyPair::try_from(pkcs8.as_bytes()).context("loading generated RSA key into the CA signer")?;

    let mut params = CertificateParams::new(Vec::new()).context("building CA certificate params")?;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, "iamlive root CA");
    params.not_after = OffsetDateTime::now_utc() + time::Duration::days(VALIDITY_DAYS);

    let cert = params.self_signed(&key_pair).context("self-signing CA certificate")?;
    let cert_der = cert.der().clone();

    persist(cert_path, cert.pem().as_bytes())?;
    persist(key_path, key_pair.serialize_pem().as_bytes())?;

    Ok(CaKeyPair::new(cert_der, key_pair))
}

/// Write `contents` to `path`, creating its parent directory with `0700`
/// permissions and the file itself with `0600` (§4.10).
fn persist(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        set_permissions(parent, 0o700)?;
    }

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;
    file.write_all(contents)?;
    set_permissions(path, 0o600)?;
    Ok(())
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).with_context(|| format!("setting permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
