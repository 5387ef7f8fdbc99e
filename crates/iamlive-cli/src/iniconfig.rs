//! Loads `~/.iamlive/config`, an INI file with the same hyphenated keys as
//! the CLI flags, to provide defaults the flag parser overlays on top of
//! (mirroring the original's `parseConfig()` step that runs before
//! `flag.Parse()`).

use std::collections::HashMap;
use std::path::PathBuf;

/// Flat `flag-name -> value` map read from the `[default]` section (or the
/// file's top-level, unnamed section) of the config file. Absent entirely
/// if the file doesn't exist; a missing file is not an error.
pub fn load(path: &std::path::Path) -> HashMap<String, String> {
    let mut defaults = HashMap::new();
    let Ok(ini) = ini::Ini::load_from_file(path) else {
        return defaults;
    };
    for section in [None, Some("default")] {
        if let Some(props) = ini.section(section) {
            for (key, value) in props.iter() {
                defaults.entry(key.to_string()).or_insert_with(|| value.to_string());
            }
        }
    }
    defaults
}

pub fn default_path() -> PathBuf {
    PathBuf::from(shellexpand::tilde("~/.iamlive/config").into_owned())
}
