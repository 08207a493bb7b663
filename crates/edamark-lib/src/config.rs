use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::align::AlignConfig;
use crate::eda::{DecomposeConfig, ScrConfig};
use crate::error::ConfigError;
use crate::io::eventlog::LogFormat;
use crate::io::shimmer::RecordingFormat;
use crate::session::{RoutingTable, SessionRoute};

/// Project configuration, read from TOML. Every field has a default so an
/// empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sensor_dir: PathBuf,
    pub log_dir: PathBuf,
    pub export_dir: PathBuf,
    pub fig_dir: PathBuf,
    pub feature_cache: PathBuf,
    pub export: bool,
    pub plot: bool,
    pub default_sampling_rate: u32,
    pub recording: RecordingFormat,
    pub log: LogFormat,
    pub align: AlignConfig,
    pub decompose: DecomposeConfig,
    pub scr: ScrConfig,
    #[serde(rename = "session")]
    pub sessions: Vec<SessionRoute>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sensor_dir: PathBuf::from("shimmer"),
            log_dir: PathBuf::from("logs"),
            export_dir: PathBuf::from("exports"),
            fig_dir: PathBuf::from("exports/figs"),
            feature_cache: PathBuf::from("pickled/feature_dicts.json"),
            export: true,
            plot: false,
            default_sampling_rate: 128,
            recording: RecordingFormat::default(),
            log: LogFormat::default(),
            align: AlignConfig::default(),
            decompose: DecomposeConfig::default(),
            scr: ScrConfig::default(),
            sessions: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    /// Relative directories are resolved against `base` (usually the config
    /// file's directory).
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        for dir in [
            &mut self.sensor_dir,
            &mut self.log_dir,
            &mut self.export_dir,
            &mut self.fig_dir,
            &mut self.feature_cache,
        ] {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        self
    }

    pub fn routing(&self) -> Result<RoutingTable, ConfigError> {
        RoutingTable::new(self.sessions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{IndexRounding, OffsetPrecision};

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = Config::from_toml("", Path::new("edamark.toml")).unwrap();
        assert_eq!(cfg.default_sampling_rate, 128);
        assert!(cfg.export);
        assert_eq!(cfg.log.footer_rows, 2);
        assert_eq!(cfg.align.offset, OffsetPrecision::WholeSeconds);
        assert!(cfg.routing().unwrap().is_empty());
    }

    #[test]
    fn parses_sessions_and_overrides() {
        let text = r#"
            sensor_dir = "data/shimmer"
            default_sampling_rate = 128

            [recording]
            delimiter = "\t"
            conductance_column = "GSR_Skin_Conductance_CAL"

            [align]
            rounding = "truncate"
            offset = "exact"

            [[session]]
            tag = "Session1"
            participant = "par1"
            session = 1
            logs = ["lucca_breath_1", "lucca_startle_1"]
            placement_rates = { palm = 1024 }

            [[session]]
            tag = "Session2"
            participant = "par2"
            session = 1
            placement_token = 2
            logs = ["trev_breath_1", "trev_startle_1"]
        "#;
        let cfg = Config::from_toml(text, Path::new("edamark.toml")).unwrap();
        assert_eq!(cfg.recording.delimiter, '\t');
        assert_eq!(cfg.align.rounding, IndexRounding::Truncate);
        assert_eq!(cfg.align.offset, OffsetPrecision::Exact);
        assert_eq!(cfg.sessions.len(), 2);
        assert_eq!(cfg.sessions[0].placement_token, 1);
        assert_eq!(cfg.sessions[0].placement_rates.get("palm"), Some(&1024));
        let routing = cfg.routing().unwrap();
        let (key, _) = routing.resolve("x_palm_Session1.csv").unwrap();
        assert_eq!(routing.rate_for(&key, cfg.default_sampling_rate), 1024);

        let resolved = cfg.resolve_paths(Path::new("/study"));
        assert_eq!(resolved.sensor_dir, PathBuf::from("/study/data/shimmer"));
    }

    #[test]
    fn reports_invalid_toml() {
        let err = Config::from_toml("export = \"maybe\"", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
