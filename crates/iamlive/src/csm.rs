//! CSM Listener (§4.9): a UDP receive loop that parses newline-delimited
//! JSON events emitted by AWS SDKs' Client-Side Monitoring feature.
//!
//! Per §7/§8, parse errors here are fatal: the listener is the
//! authoritative source of events and a malformed datagram means the
//! stream can no longer be trusted. This is implemented as the loop
//! returning `Err` rather than a silent `std::process::exit`, so the caller
//! can log and choose the exit code (SPEC_FULL §8).

use tokio::net::UdpSocket;

use crate::calllog::CallLog;
use crate::catalog::Catalog;
use crate::error::CsmError;
use crate::model::CallEntry;

const READ_BUFFER_SIZE: usize = 1024 * 1024;

pub struct CsmListener {
    socket: UdpSocket,
}

impl CsmListener {
    pub async fn bind(host: &str, port: u16) -> Result<Self, CsmError> {
        let addr = format!("{host}:{port}");
        let socket = UdpSocket::bind(&addr).await.map_err(|e| CsmError::Bind { addr, source: e })?;
        Ok(Self { socket })
    }

    /// Run the receive loop forever, appending identified entries to
    /// `log`. Returns `Err` on the first malformed event (fatal per spec).
    pub async fn run(&self, catalog: &Catalog, log: &CallLog) -> Result<(), CsmError> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let (n, _peer) = self.socket.recv_from(&mut buf).await.map_err(CsmError::Recv)?;
            self.handle_datagram(&buf[..n], catalog, log)?;
        }
    }

    fn handle_datagram(&self, datagram: &[u8], catalog: &Catalog, log: &CallLog) -> Result<(), CsmError> {
        for line in datagram.split(|b| *b == b'\n') {
            if line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            let entry: CallEntry = serde_json::from_slice(line).map_err(CsmError::MalformedEvent)?;

            if catalog.is_permissionless(&entry.fingerprint()) {
                continue;
            }
            if entry.call_type == crate::model::CallType::ApiCall {
                log.push_aws(entry);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener() -> (CsmListener, Catalog) {
        // `handle_datagram` never touches `self.socket`, so a bound socket is
        // only needed to satisfy the struct's shape in these tests.
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_nonblocking(true).unwrap();
        let socket = UdpSocket::from_std(socket).unwrap();
        (CsmListener { socket }, Catalog::load().unwrap())
    }

    #[test]
    fn appends_one_entry_per_newline_delimited_event() {
        let (listener, catalog) = listener();
        let log = CallLog::new();
        let event = serde_json::json!({
            "Service": "DynamoDB",
            "Api": "PutItem",
            "Type": "ApiCall",
        })
        .to_string();
        let datagram = format!("{event}\n{event}\n");

        listener.handle_datagram(datagram.as_bytes(), &catalog, &log).unwrap();

        assert_eq!(log.snapshot_aws().len(), 2);
    }

    #[test]
    fn skips_blank_lines_between_events() {
        let (listener, catalog) = listener();
        let log = CallLog::new();
        let event = serde_json::json!({
            "Service": "DynamoDB",
            "Api": "PutItem",
            "Type": "ApiCall",
        })
        .to_string();
        let datagram = format!("\n{event}\n\n");

        listener.handle_datagram(datagram.as_bytes(), &catalog, &log).unwrap();

        assert_eq!(log.snapshot_aws().len(), 1);
    }

    #[test]
    fn malformed_event_is_a_fatal_error() {
        let (listener, catalog) = listener();
        let log = CallLog::new();

        let result = listener.handle_datagram(b"not json\n", &catalog, &log);

        assert!(result.is_err());
        assert!(log.snapshot_aws().is_empty());
    }

    #[test]
    fn proxy_call_entries_are_not_logged_as_api_calls() {
        let (listener, catalog) = listener();
        let log = CallLog::new();
        let event = serde_json::json!({
            "Service": "DynamoDB",
            "Api": "PutItem",
            "Type": "ProxyCall",
        })
        .to_string();

        listener.handle_datagram(format!("{event}\n").as_bytes(), &catalog, &log).unwrap();

        assert_eq!(log.snapshot_aws().len(), 0);
    }
}
