use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use fanwatch_core::config::TuningConfig;

/// Load the tuning file, falling back to defaults when it does not exist.
pub fn load_tuning(path: &Path) -> Result<TuningConfig> {
    let tuning = TuningConfig::load(path)
        .with_context(|| format!("failed to load tuning file: {}", path.display()))?;
    info!(
        "Tuning: cycle={}s hot_list={} top_tags={} window={}d item_cap={} round_limit={}",
        tuning.scheduler.cycle_seconds,
        tuning.scheduler.hot_list_size,
        tuning.discovery.top_tags,
        tuning.discovery.window_days,
        tuning.discovery.item_cap,
        tuning.discovery.round_limit,
    );
    Ok(tuning)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let tuning = load_tuning(&dir.path().join("fanwatch.toml")).unwrap();
        assert_eq!(tuning, TuningConfig::default());
    }

    #[test]
    fn parse_error_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fanwatch.toml");
        std::fs::write(&path, "[discovery\n").unwrap();
        let err = load_tuning(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("fanwatch.toml"));
    }

    #[test]
    fn overrides_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fanwatch.toml");
        std::fs::write(&path, "[scheduler]\nhot_list_size = 25\n\n[discovery]\nwindow_days = 30\n").unwrap();
        let tuning = load_tuning(&path).unwrap();
        assert_eq!(tuning.scheduler.hot_list_size, 25);
        assert_eq!(tuning.discovery.window_days, 30);
    }
}
