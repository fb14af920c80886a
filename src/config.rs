use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use gridcalc_core::RecalcConfig;

const MAX_CONFIG_FILE_BYTES: u64 = 64 * 1024;

pub(crate) fn user_config_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "gridcalc")?;
    let mut path = proj.config_dir().to_path_buf();
    path.push("config.toml");
    Some(path)
}

/// Load the recalculation settings.
///
/// An explicit `path` must exist. Without one, the user config file is read
/// when present and defaults are used otherwise.
pub(crate) fn load(path: Option<&Path>, skip_user_config: bool) -> Result<RecalcConfig> {
    if let Some(path) = path {
        return read(path);
    }
    if skip_user_config {
        return Ok(RecalcConfig::default());
    }
    match user_config_path() {
        Some(path) if path.is_file() => read(&path),
        _ => {
            log::debug!("no user config file, using defaults");
            Ok(RecalcConfig::default())
        }
    }
}

fn read(path: &Path) -> Result<RecalcConfig> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("Failed to read metadata for {}", path.display()))?;
    if meta.len() > MAX_CONFIG_FILE_BYTES {
        anyhow::bail!(
            "Refusing to read {}: file too large ({} bytes, max {})",
            path.display(),
            meta.len(),
            MAX_CONFIG_FILE_BYTES
        );
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: RecalcConfig =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    log::debug!("loaded config from {}: {config:?}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_config_path_is_deterministic() {
        // Should never panic and should either be Some(path) or None.
        let _ = user_config_path();
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let path = std::env::temp_dir().join("gridcalc_config_unit.toml");
        std::fs::write(&path, "max_cycle = 4\ncolumn_index = false\n").unwrap();
        let config = load(Some(&path), false).unwrap();
        assert_eq!(config.max_cycle, 4);
        assert!(!config.column_index);
        assert_eq!(config.max_rows, RecalcConfig::default().max_rows);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let path = std::env::temp_dir().join("gridcalc_config_missing.toml");
        assert!(load(Some(&path), false).is_err());
    }

    #[test]
    fn skipping_user_config_gives_defaults() {
        assert_eq!(load(None, true).unwrap(), RecalcConfig::default());
    }
}
