use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use starchart_dataset::NormalizerSettings;
use starchart_logging::chart_info;
use starchart_store::StoreSettings;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse settings from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },
    #[error("invalid settings in {path:?}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Tuning knobs for both halves of the data layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Settings {
    pub normalizer: NormalizerSettings,
    pub store: StoreSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct SettingsFile {
    normalizer: NormalizerFile,
    store: StoreFile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct NormalizerFile {
    exact_key_threshold: usize,
    fingerprint_sample: usize,
    worker_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct StoreFile {
    batch_delay_ms: u64,
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl Default for NormalizerFile {
    fn default() -> Self {
        SettingsFile::default().normalizer
    }
}

impl Default for StoreFile {
    fn default() -> Self {
        SettingsFile::default().store
    }
}

impl From<&Settings> for SettingsFile {
    fn from(settings: &Settings) -> Self {
        Self {
            normalizer: NormalizerFile {
                exact_key_threshold: settings.normalizer.exact_key_threshold,
                fingerprint_sample: settings.normalizer.fingerprint_sample,
                worker_timeout_ms: duration_ms(settings.normalizer.worker_timeout),
            },
            store: StoreFile {
                batch_delay_ms: duration_ms(settings.store.batch_delay),
            },
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Read a RON settings file; omitted fields keep their defaults.
pub fn load(path: &Path) -> Result<Settings, SettingsError> {
    let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: SettingsFile = ron::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    if file.normalizer.fingerprint_sample == 0 {
        return Err(SettingsError::Invalid {
            path: path.to_path_buf(),
            reason: "fingerprint_sample must be at least 1".to_string(),
        });
    }

    let settings = Settings {
        normalizer: NormalizerSettings {
            exact_key_threshold: file.normalizer.exact_key_threshold,
            fingerprint_sample: file.normalizer.fingerprint_sample,
            worker_timeout: Duration::from_millis(file.normalizer.worker_timeout_ms),
        },
        store: StoreSettings {
            batch_delay: Duration::from_millis(file.store.batch_delay_ms),
        },
    };
    chart_info!("Loaded settings from {:?}", path);
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn write(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("starchart.ron");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn full_file_maps_milliseconds_to_durations() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "(normalizer: (exact_key_threshold: 50, fingerprint_sample: 4, worker_timeout_ms: 250), \
             store: (batch_delay_ms: 25))",
        );

        let settings = load(&path).unwrap();

        assert_eq!(
            settings,
            Settings {
                normalizer: NormalizerSettings {
                    exact_key_threshold: 50,
                    fingerprint_sample: 4,
                    worker_timeout: Duration::from_millis(250),
                },
                store: StoreSettings {
                    batch_delay: Duration::from_millis(25),
                },
            }
        );
    }

    #[test]
    fn omitted_fields_keep_defaults() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "(store: (batch_delay_ms: 40))");

        let settings = load(&path).unwrap();

        assert_eq!(settings.normalizer, NormalizerSettings::default());
        assert_eq!(settings.store.batch_delay, Duration::from_millis(40));
    }

    #[test]
    fn empty_struct_is_all_defaults() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "()");

        assert_eq!(load(&path).unwrap(), Settings::default());
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempdir().unwrap();
        let err = load(&dir.path().join("absent.ron")).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "(store: (batch_delay_ms: \"soon\"))");

        let err = load(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    #[test]
    fn zero_fingerprint_sample_is_rejected() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "(normalizer: (fingerprint_sample: 0))");

        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("fingerprint_sample must be at least 1"));
    }
}
