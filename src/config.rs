use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::policy::{clearance_from_classification, Clearance, ThreatCon};
use crate::telemetry::{Profile, DEFAULT_RING_CAPACITY};

const DEFAULT_MISSION: &str = "unassigned";
const DEFAULT_SINK_PATH: &str = "tck_audit.db";

#[derive(Debug, Deserialize, Default)]
struct KernelConfigFile {
    clearance: Option<String>,
    threatcon: Option<String>,
    telemetry: Option<TelemetryConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct TelemetryConfigFile {
    profile: Option<String>,
    mission: Option<String>,
    ring_capacity: Option<usize>,
    sink: Option<String>,
    sink_path: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SinkKind {
    File,
    #[default]
    Sqlite,
}

impl SinkKind {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(anyhow!(
                "unsupported telemetry sink '{}'; expected 'file' or 'sqlite'",
                other
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TelemetrySettings {
    pub profile: Profile,
    pub mission: String,
    pub ring_capacity: usize,
    pub sink: SinkKind,
    pub sink_path: String,
}

#[derive(Clone, Debug)]
pub struct KernelConfig {
    /// Session clearance, resolved once at load.
    pub clearance: Clearance,
    /// Initial threat condition.
    pub threatcon: ThreatCon,
    pub telemetry: TelemetrySettings,
}

impl KernelConfig {
    /// Load from the file named by `TCK_CONFIG` (if set), then apply
    /// `TCK_CLEARANCE` / `TCK_THREATCON` environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TCK_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: KernelConfigFile) -> Result<Self> {
        let clearance = match file.clearance.as_deref() {
            Some(raw) => clearance_from_classification(raw),
            None => Clearance::Unclassified,
        };
        let threatcon = match file.threatcon.as_deref() {
            Some(raw) => ThreatCon::parse(raw)?,
            None => ThreatCon::Normal,
        };
        let telemetry_file = file.telemetry.unwrap_or_default();
        let telemetry = TelemetrySettings {
            profile: match telemetry_file.profile.as_deref() {
                Some(raw) => Profile::parse(raw)?,
                None => Profile::default(),
            },
            mission: telemetry_file
                .mission
                .unwrap_or_else(|| DEFAULT_MISSION.to_string()),
            ring_capacity: telemetry_file
                .ring_capacity
                .unwrap_or(DEFAULT_RING_CAPACITY),
            sink: match telemetry_file.sink.as_deref() {
                Some(raw) => SinkKind::parse(raw)?,
                None => SinkKind::default(),
            },
            sink_path: telemetry_file
                .sink_path
                .unwrap_or_else(|| DEFAULT_SINK_PATH.to_string()),
        };
        Ok(Self {
            clearance,
            threatcon,
            telemetry,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var("TCK_CLEARANCE") {
            self.clearance = clearance_from_classification(&raw);
        }
        if let Ok(raw) = std::env::var("TCK_THREATCON") {
            self.threatcon =
                ThreatCon::parse(&raw).map_err(|e| anyhow!("TCK_THREATCON: {}", e))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.telemetry.ring_capacity == 0 {
            return Err(anyhow!("telemetry ring_capacity must be >= 1"));
        }
        if self.telemetry.mission.trim().is_empty() {
            return Err(anyhow!("telemetry mission must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<KernelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("read config {}: {}", path.display(), e))?;
    toml::from_str(&raw).map_err(|e| anyhow!("parse config {}: {}", path.display(), e))
}
