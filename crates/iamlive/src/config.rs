//! Library-level configuration. Per the Design Notes ("Global mutable
//! flags"), this replaces the original's process-wide flag variables with a
//! single immutable value threaded explicitly into each component; the CLI
//! crate is responsible for producing one from flags + the INI file.

use crate::action::SynthesisOptions;
use crate::proxy::ProxyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Csm,
    Proxy,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub csm_host: String,
    pub csm_port: u16,
    pub proxy_bind_addr: String,
    pub aws_redirect_host: Option<String>,
    pub synthesis: SynthesisOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Csm,
            csm_host: "127.0.0.1".to_string(),
            csm_port: 31000,
            proxy_bind_addr: "127.0.0.1:10080".to_string(),
            aws_redirect_host: None,
            synthesis: SynthesisOptions::default(),
        }
    }
}

impl Config {
    pub fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            bind_addr: self.proxy_bind_addr.clone(),
            aws_redirect_host: self.aws_redirect_host.clone(),
        }
    }
}
