//! CPU profiling (`--cpu-profile`): captures a pprof-format profile for the
//! life of the process, written out on shutdown. Mirrors the teacher's own
//! `pprof::ProfilerGuardBuilder` usage (`management/admin.rs`'s on-demand
//! `/debug/pprof` handler), but the guard here spans the whole run instead
//! of a fixed sampling window, since there's no HTTP endpoint to bound it.

use std::path::Path;

use anyhow::{Context, Result};
use pprof::protos::Message;
use pprof::ProfilerGuard;

pub struct CpuProfiler<'a> {
    guard: ProfilerGuard<'a>,
}

/// Start sampling, if `path` is non-empty. Returns `None` when profiling was
/// not requested, so the caller can skip the write on shutdown.
pub fn start(path: &Option<String>) -> Result<Option<CpuProfiler<'static>>> {
    let Some(path) = path else { return Ok(None) };
    if path.is_empty() {
        return Ok(None);
    }

    let guard = pprof::ProfilerGuardBuilder::default()
        .frequency(1000)
        .build()
        .context("starting CPU profiler")?;
    tracing::info!(path, "CPU profiling enabled");
    Ok(Some(CpuProfiler { guard }))
}

impl CpuProfiler<'_> {
    pub fn write(&self, path: &str) -> Result<()> {
        let report = self.guard.report().build().context("building CPU profile report")?;
        let profile = report.pprof().context("converting CPU profile to pprof format")?;
        let bytes = profile.write_to_bytes().context("encoding CPU profile")?;
        std::fs::write(Path::new(path), bytes).with_context(|| format!("writing CPU profile to {path}"))
    }
}
