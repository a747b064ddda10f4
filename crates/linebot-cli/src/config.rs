//! Configuration vault – reads/writes `~/.linebot/config.toml`.
//!
//! The file holds the full [`RobotConfig`] under `[robot]` and the simulated
//! track the demo rig replays under `[demo]`.  Missing keys take their
//! defaults, so a file containing only
//!
//! ```toml
//! [robot.obstacle]
//! threshold_mm = 250.0
//! ```
//!
//! is valid.

use std::fs;
use std::path::{Path, PathBuf};

use linebot_runtime::{EscalationPolicy, RobotConfig};
use linebot_types::{ArrowDirection, SensorPattern};
use serde::{Deserialize, Serialize};

/// Simulated surroundings for the demo rig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Reflectance readings replayed in a loop, each as three `0`/`1`
    /// characters (left, middle, right).
    pub track: Vec<String>,
    /// Range readings in millimetres, replayed in a loop.  Empty means
    /// nothing is ever in front of the robot.
    pub ranges_mm: Vec<f32>,
    /// Verdicts served by the simulated arrow detector, in a loop.
    pub arrows: Vec<ArrowDirection>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        let track = [
            "010", "010", "011", "010", "110", "010", "001", "010", "000", "000", "010", "010",
        ];
        Self {
            track: track.iter().map(|s| s.to_string()).collect(),
            ranges_mm: vec![1200.0, 900.0, 700.0, 500.0, 350.0, 250.0, 800.0, 600.0],
            arrows: vec![ArrowDirection::Left, ArrowDirection::Left, ArrowDirection::Right],
        }
    }
}

impl DemoConfig {
    /// Parse [`track`](Self::track) into sensor patterns.
    pub fn patterns(&self) -> Result<Vec<SensorPattern>, String> {
        self.track.iter().map(|s| parse_pattern(s)).collect()
    }
}

/// Parse `"101"`-style pattern notation.
pub fn parse_pattern(s: &str) -> Result<SensorPattern, String> {
    let bits: Vec<bool> = s
        .trim()
        .chars()
        .map(|c| match c {
            '0' => Ok(false),
            '1' => Ok(true),
            other => Err(format!("Invalid sensor bit '{other}' in pattern '{s}'")),
        })
        .collect::<Result<_, _>>()?;
    match bits.as_slice() {
        [left, middle, right] => Ok(SensorPattern::new(*left, *middle, *right)),
        _ => Err(format!("Pattern '{s}' must have exactly three bits")),
    }
}

/// Persisted configuration stored in `~/.linebot/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub robot: RobotConfig,
    pub demo: DemoConfig,
}

/// Return the path to `~/.linebot/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".linebot").join("config.toml")
}

/// Load the config from disk and apply `LINEBOT_*` overrides.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let Some(mut cfg) = load_from(&config_path())? else {
        return Ok(None);
    };
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(Some(cfg))
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    validate(&cfg)?;
    Ok(Some(cfg))
}

fn validate(cfg: &Config) -> Result<(), String> {
    cfg.robot.validate().map_err(|e| e.to_string())?;
    cfg.demo.patterns().map(|_| ())
}

/// Apply `LINEBOT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `LINEBOT_OBSTACLE_THRESHOLD_MM` | `robot.obstacle.threshold_mm` |
/// | `LINEBOT_LOST_CEILING` | `robot.tracking.lost_ceiling` |
/// | `LINEBOT_ESCALATION` | `robot.tracking.escalation` (`resume` / `extreme`) |
/// | `LINEBOT_TRACKING_PERIOD_MS` | `robot.tracking.period_ms` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("LINEBOT_OBSTACLE_THRESHOLD_MM")
        && let Ok(mm) = v.trim().parse::<f32>()
    {
        cfg.robot.obstacle.threshold_mm = mm;
    }
    if let Ok(v) = std::env::var("LINEBOT_LOST_CEILING")
        && let Ok(n) = v.trim().parse::<u32>()
    {
        cfg.robot.tracking.lost_ceiling = n;
    }
    if let Ok(v) = std::env::var("LINEBOT_ESCALATION")
        && let Ok(policy) = v.parse::<EscalationPolicy>()
    {
        cfg.robot.tracking.escalation = policy;
    }
    if let Ok(v) = std::env::var("LINEBOT_TRACKING_PERIOD_MS")
        && let Ok(n) = v.trim().parse::<u64>()
    {
        cfg.robot.tracking.period_ms = n;
    }
}

/// Save the config to disk, creating `~/.linebot/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
