//! Policy Output (§4.11): renders the current policy document to the
//! terminal on every call-log append (or on a refresh-rate tick), and
//! writes the final document to an output file on shutdown.

use std::io::Write;

use iamlive::action::{self, SynthesisOptions};
use iamlive::calllog::CallLog;
use iamlive::catalog::Catalog;
use iamlive::model::{AzureIamPolicy, GcpPermissionList, IamPolicy};

/// Four-space-indented JSON, matching the original's output formatting.
fn pretty(value: &impl serde::Serialize) -> String {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser).expect("policy document always serializes");
    String::from_utf8(buf).expect("serde_json output is always valid utf-8")
}

pub enum PolicyDocument {
    Aws(IamPolicy),
    Azure(AzureIamPolicy),
    Gcp(GcpPermissionList),
}

impl PolicyDocument {
    pub fn render(&self) -> String {
        match self {
            PolicyDocument::Aws(p) => pretty(p),
            PolicyDocument::Azure(p) => pretty(p),
            PolicyDocument::Gcp(p) => pretty(p),
        }
    }
}

pub fn synthesize(catalog: &Catalog, provider: &str, log: &CallLog, opts: &SynthesisOptions) -> PolicyDocument {
    match provider {
        "azure" => PolicyDocument::Azure(action::synthesize_azure(catalog, &log.snapshot_azure())),
        "gcp" => PolicyDocument::Gcp(action::synthesize_gcp(catalog, &log.snapshot_gcp())),
        _ => PolicyDocument::Aws(action::synthesize_proxy(catalog, &log.snapshot_aws(), opts)),
    }
}

pub fn synthesize_csm(catalog: &Catalog, log: &CallLog, opts: &SynthesisOptions) -> PolicyDocument {
    PolicyDocument::Aws(action::synthesize_csm(catalog, &log.snapshot_aws(), opts))
}

/// Clears the screen and redraws from the top, unless the document is
/// taller than the terminal, in which case it's printed unbuffered
/// (§4.11). A `debug` flag skips ANSI clearing entirely, for piped output.
pub fn flush_to_terminal(document: &str, debug: bool) {
    if debug {
        println!("{document}");
        let _ = std::io::stdout().flush();
        return;
    }

    let height = terminal_size::terminal_size().map(|(_, terminal_size::Height(h))| h as usize);
    let line_count = document.lines().count();

    let mut out = std::io::stdout();
    match height {
        Some(h) if line_count > h => {
            let _ = writeln!(out, "{document}");
        }
        _ => {
            // ANSI: clear screen, move cursor to (1,1).
            let _ = write!(out, "\x1b[2J\x1b[1;1H{document}");
        }
    }
    let _ = out.flush();
}

pub fn write_output_file(path: &str, document: &str) -> std::io::Result<()> {
    std::fs::write(path, document)
}
