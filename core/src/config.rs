use crate::error::SimError;
use crate::time::{GlobalTime, Instant};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Top-level run configuration (`config.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterConfig {
    /// Station manifest, relative to the directory of this file.
    pub config_file: PathBuf,
    pub start_time_hr: u64,
    pub start_time_min: u64,
    pub start_time_sec: u64,
    /// Simulated duration in seconds.
    pub runtime: u64,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub seed: u64,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

impl MasterConfig {
    pub fn global_time(&self) -> GlobalTime {
        let start = Instant::from_hms(self.start_time_hr, self.start_time_min, self.start_time_sec);
        GlobalTime::new(start, self.runtime)
    }
}

/// Resolved configuration of one charging station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationConfig {
    pub name: String,
    pub fast_chargers: u32,
    pub slow_chargers: u32,
    /// Wh delivered per hour by one fast charger.
    pub fast_charging_rate: f64,
    pub slow_charging_rate: f64,
    /// Vehicles per simulated day.
    pub arrival_rate: u32,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            name: "Station".to_string(),
            fast_chargers: 2,
            slow_chargers: 4,
            fast_charging_rate: 50_000.0,
            slow_charging_rate: 7_200.0,
            arrival_rate: 40,
            seed: None,
        }
    }
}

/// `defaultConfig` plus per-station overrides, as found on disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    #[serde(default)]
    default_config: Value,
    stations: Vec<Value>,
}

/// Master config plus resolved stations, ready to run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub master: MasterConfig,
    pub stations: Vec<StationConfig>,
}

impl RunConfig {
    pub fn load(master_path: &Path) -> Result<Self, SimError> {
        let master: MasterConfig = read_json(master_path)?;
        let base = master_path.parent().unwrap_or_else(|| Path::new("."));
        let manifest_path = base.join(&master.config_file);
        let raw: RawManifest = read_json(&manifest_path)?;
        let stations = resolve_stations(&raw.default_config, &raw.stations, master.seed)
            .map_err(|detail| SimError::ConfigMalformed { path: manifest_path.clone(), detail })?;
        log::info!(
            "loaded {} stations from {}",
            stations.len(),
            manifest_path.display()
        );
        Ok(Self { master, stations })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, SimError> {
    let text = std::fs::read_to_string(path).map_err(|source| SimError::ConfigNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|e| SimError::ConfigMalformed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Overlays each station entry onto the default and validates the result.
/// Station seeds default to `base_seed + index`.
pub fn resolve_stations(
    defaults: &Value,
    overrides: &[Value],
    base_seed: u64,
) -> Result<Vec<StationConfig>, String> {
    if overrides.is_empty() {
        return Err("no stations configured".to_string());
    }
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(overrides.len());
    for (idx, entry) in overrides.iter().enumerate() {
        let merged = merge_over(defaults, entry).map_err(|e| format!("station #{idx}: {e}"))?;
        let mut cfg: StationConfig =
            serde_json::from_value(merged).map_err(|e| format!("station #{idx}: {e}"))?;
        if !seen.insert(cfg.name.clone()) {
            return Err(format!("duplicate station name '{}'", cfg.name));
        }
        if !(cfg.fast_charging_rate > 0.0 && cfg.slow_charging_rate > 0.0) {
            return Err(format!("station '{}': charging rates must be positive", cfg.name));
        }
        cfg.seed.get_or_insert(base_seed.wrapping_add(idx as u64));
        out.push(cfg);
    }
    Ok(out)
}

fn merge_over(defaults: &Value, entry: &Value) -> Result<Value, &'static str> {
    let mut merged = match defaults {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        _ => return Err("defaultConfig must be an object"),
    };
    let Value::Object(fields) = entry else {
        return Err("station entry must be an object");
    };
    for (key, value) in fields {
        merged.insert(key.clone(), value.clone());
    }
    Ok(Value::Object(merged))
}
