//! Proxy Core (§4.10): an HTTPS-intercepting CONNECT proxy. Recognized
//! cloud hostnames are MITM'd with a per-host leaf certificate signed by
//! the configured CA; everything else tunnels transparently.

pub mod ca;

use std::sync::Arc;
use std::sync::OnceLock;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::client::conn::http1 as client_http1;
use hyper::server::conn::http1 as server_http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use regex::Regex;
use rustls_pki_types::{CertificateDer, PrivatePkcs8KeyDer, PrivateKeyDer, ServerName};
use tokio::io::{copy_bidirectional, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::calllog::CallLog;
use crate::catalog::Catalog;
use crate::error::ProxyError;
use crate::identify::{self, RawRequest};
use crate::proxy::ca::CaKeyPair;

fn mitm_host_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"^.*\.amazonaws\.com(\.cn)?$",
            r"^management\.azure\.com$",
            r"^management\.core\.windows\.net$",
            r"^.*\.googleapis\.com$",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
    })
}

fn should_mitm(host: &str) -> bool {
    mitm_host_patterns().iter().any(|re| re.is_match(host))
}

#[derive(Clone)]
pub struct ProxyConfig {
    pub bind_addr: String,
    pub aws_redirect_host: Option<String>,
}

pub struct ProxyServer {
    config: ProxyConfig,
    ca: Arc<CaKeyPair>,
    catalog: Arc<Catalog>,
    log: CallLog,
}

impl ProxyServer {
    pub fn new(config: ProxyConfig, ca: CaKeyPair, catalog: Arc<Catalog>, log: CallLog) -> Self {
        Self {
            config,
            ca: Arc::new(ca),
            catalog,
            log,
        }
    }

    pub async fn serve(&self) -> Result<(), ProxyError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await.map_err(|e| ProxyError::Bind {
            addr: self.config.bind_addr.clone(),
            source: e,
        })?;

        tracing::info!(addr = %self.config.bind_addr, "proxy core listening");

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };

            let ca = self.ca.clone();
            let catalog = self.catalog.clone();
            let log = self.log.clone();
            let redirect = self.config.aws_redirect_host.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, ca, catalog, log, redirect).await {
                    tracing::debug!(peer = %peer, error = %e, "connection ended with error");
                }
            });
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    ca: Arc<CaKeyPair>,
    catalog: Arc<Catalog>,
    log: CallLog,
    redirect: Option<String>,
) -> Result<(), ProxyError> {
    let (method, host) = read_connect_line(&mut stream).await?;
    if !method.eq_ignore_ascii_case("CONNECT") {
        // Non-CONNECT traffic on the proxy port is passed through raw.
        return Ok(());
    }

    stream
        .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
        .await
        .map_err(ProxyError::Upstream)?;

    let host_only = host.split(':').next().unwrap_or(&host).to_string();

    if !should_mitm(&host_only) {
        return tunnel(stream, &host).await;
    }

    let (leaf_cert, leaf_key) = ca.sign_leaf(&host_only)?;
    let tls_config = build_server_tls_config(ca.cert_der.clone(), leaf_cert, leaf_key)?;
    let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(tls_config));
    let tls_stream = acceptor.accept(stream).await.map_err(ProxyError::Tls)?;
    let io = TokioIo::new(tls_stream);

    let catalog = catalog.clone();
    let log = log.clone();
    let host_for_service = host_only.clone();

    let service = service_fn(move |req: Request<Incoming>| {
        let catalog = catalog.clone();
        let log = log.clone();
        let host = host_for_service.clone();
        let redirect = redirect.clone();
        async move { handle_request(req, host, catalog, log, redirect).await }
    });

    server_http1::Builder::new()
        .serve_connection(io, service)
        .await
        .map_err(|e| ProxyError::Tls(std::io::Error::other(e)))?;

    Ok(())
}

async fn read_connect_line(stream: &mut TcpStream) -> Result<(String, String), ProxyError> {
    let mut buf = Vec::with_capacity(512);
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await.map_err(ProxyError::Upstream)?;
        if n == 0 {
            break;
        }
        buf.push(byte[0]);
        if buf.ends_with(b"\r\n\r\n") {
            break;
        }
        if buf.len() > 8192 {
            break;
        }
    }
    let text = String::from_utf8_lossy(&buf);
    let first_line = text.lines().next().unwrap_or_default();
    let mut parts = first_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();
    Ok((method, target))
}

async fn tunnel(mut client_stream: TcpStream, target: &str) -> Result<(), ProxyError> {
    let mut upstream = TcpStream::connect(target).await.map_err(ProxyError::Upstream)?;
    copy_bidirectional(&mut client_stream, &mut upstream)
        .await
        .map_err(ProxyError::Upstream)?;
    Ok(())
}

fn build_server_tls_config(
    ca_cert: CertificateDer<'static>,
    leaf_cert: CertificateDer<'static>,
    leaf_key: PrivatePkcs8KeyDer<'static>,
) -> Result<rustls::ServerConfig, ProxyError> {
    let chain = vec![leaf_cert, ca_cert];
    rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, PrivateKeyDer::Pkcs8(leaf_key))
        .map_err(ProxyError::Tls)
}

async fn handle_request(
    req: Request<Incoming>,
    host: String,
    catalog: Arc<Catalog>,
    log: CallLog,
    redirect: Option<String>,
) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
    let method = req.method().to_string();
    let uri = req.uri().path_and_query().map(|pq| pq.as_str().to_string()).unwrap_or_default();
    let headers: Vec<(String, String)> = req
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();

    let body_bytes = req.into_body().collect().await.map(|c| c.to_bytes()).unwrap_or_default();

    let raw = RawRequest {
        method: method.clone(),
        host: host.clone(),
        uri: uri.clone(),
        headers,
        body: body_bytes.to_vec(),
        status_code: 200,
    };

    identify_and_log(&raw, &catalog, &log);

    let upstream_host = redirect.unwrap_or(host);
    match forward(&upstream_host, &method, &uri, &raw.headers, body_bytes).await {
        Ok(resp) => Ok(resp),
        Err(e) => {
            tracing::debug!(error = %e, "upstream forward failed");
            Ok(Response::builder().status(502).body(Full::new(Bytes::new())).unwrap())
        }
    }
}

fn identify_and_log(raw: &RawRequest, catalog: &Catalog, log: &CallLog) {
    if let Ok(Some(identified)) = identify::aws::identify(catalog, raw) {
        if !catalog.is_permissionless(&identified.entry.fingerprint()) {
            log.push_aws(identified.entry);
        }
        return;
    }

    if let Some(identified) = identify::azure::identify(raw) {
        log.push_azure(identified.entry);
        return;
    }

    if let Some(entry) = identify::gcp::identify(raw) {
        log.push_gcp(entry);
    }
}

async fn forward(
    host: &str,
    method: &str,
    uri: &str,
    headers: &[(String, String)],
    body: Bytes,
) -> Result<Response<Full<Bytes>>, ProxyError> {
    let connector = tokio_rustls::TlsConnector::from(Arc::new(client_tls_config()));
    let tcp = TcpStream::connect((host, 443)).await.map_err(ProxyError::Upstream)?;
    let server_name = ServerName::try_from(host.to_string()).map_err(|_| ProxyError::Upstream(std::io::Error::other("invalid server name")))?;
    let tls_stream = connector.connect(server_name, tcp).await.map_err(ProxyError::Tls)?;
    let io = TokioIo::new(tls_stream);

    let (mut sender, conn) = client_http1::handshake(io).await.map_err(|e| ProxyError::Upstream(std::io::Error::other(e)))?;
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut builder = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
        builder = builder.header(k, v);
    }
    let request = builder.body(Full::new(body)).map_err(|e| ProxyError::Upstream(std::io::Error::other(e)))?;

    let resp = sender.send_request(request).await.map_err(|e| ProxyError::Upstream(std::io::Error::other(e)))?;
    let (parts, body) = resp.into_parts();
    let bytes = body.collect().await.map(|c| c.to_bytes()).unwrap_or_default();
    Ok(Response::from_parts(parts, Full::new(bytes)))
}

fn client_tls_config() -> rustls::ClientConfig {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots_fallback());
    rustls::ClientConfig::builder().with_root_certificates(roots).with_no_client_auth()
}

/// The teacher stack pulls native roots via `rustls-native-certs`; mirrored
/// here so outbound forwarding trusts the host's real CA store.
fn webpki_roots_fallback() -> Vec<CertificateDer<'static>> {
    rustls_native_certs::load_native_certs().certs
}
