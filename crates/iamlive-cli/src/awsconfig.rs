//! Cloud-CLI config file editing (§6): adds `csm_enabled = true` (CSM mode)
//! or `ca_bundle = <path>` (proxy mode) under `[default]` or `[profile X]`
//! in `~/.aws/config`, reverted on exit. Revert is implemented by snapshotting
//! the file's original bytes (or absence) before editing and restoring them
//! verbatim, rather than diffing keys back out, so the edit is always
//! exactly undone regardless of what else changed the file meanwhile.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use iamlive::config::Mode;

pub struct AwsConfigEdit {
    path: PathBuf,
    original: Option<Vec<u8>>,
}

pub fn default_path() -> PathBuf {
    PathBuf::from(shellexpand::tilde("~/.aws/config").into_owned())
}

fn section_name(profile: &str) -> String {
    if profile == "default" {
        "default".to_string()
    } else {
        format!("profile {profile}")
    }
}

/// Apply the edit for `profile`, returning a handle that can [`revert`] it.
pub fn apply(path: &std::path::Path, profile: &str, mode: Mode, ca_bundle: &str) -> Result<AwsConfigEdit> {
    let original = fs::read(path).ok();

    let mut ini = match &original {
        Some(bytes) => ini::Ini::load_from_str(&String::from_utf8_lossy(bytes)).context("parsing existing aws config")?,
        None => ini::Ini::new(),
    };

    let section = section_name(profile);
    {
        let mut props = ini.with_section(Some(section.clone()));
        match mode {
            Mode::Csm => {
                props.set("csm_enabled", "true");
            }
            Mode::Proxy => {
                props.set("ca_bundle", ca_bundle);
            }
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    ini.write_to_file(path).with_context(|| format!("writing {}", path.display()))?;

    Ok(AwsConfigEdit {
        path: path.to_path_buf(),
        original,
    })
}

/// Undo the edit: restore the file's original bytes, or remove it entirely
/// if it didn't exist before.
pub fn revert(edit: &AwsConfigEdit) -> Result<()> {
    match &edit.original {
        Some(bytes) => fs::write(&edit.path, bytes).with_context(|| format!("reverting {}", edit.path.display())),
        None => match fs::remove_file(&edit.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", edit.path.display())),
        },
    }
}
