//! Run configuration – reads the TOML file given to `navpat run`.
//!
//! Every section is optional and deserialised on its own, so a typo in one
//! section only costs that section its values:
//!
//! ```toml
//! [localization]
//! pose = [0.0, 2.5, 0.0]
//! global_map = [[0.0, 0.0], [15.0, 0.0], [15.0, 5.0], [0.0, 5.0]]
//!
//! [johndeere]          # vehicle tuning, passed through to the vehicle
//! max_acceleration = 1.0
//!
//! [pattern]
//! laps = 10
//! ```

use std::fs;
use std::path::Path;

use navpat_hal::SimTuning;
use navpat_kernel::SafetyConfig;
use navpat_perception::LocalizationConfig;
use navpat_runtime::{MotionConfig, PatternConfig};
use serde::de::DeserializeOwned;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub localization: LocalizationConfig,
    /// Vehicle-specific tuning, kept opaque until the vehicle is built.
    pub johndeere: Option<toml::Value>,
    pub pattern: PatternConfig,
    pub motion: MotionConfig,
    pub safety: SafetyConfig,
    /// Raw text the configuration was parsed from.
    pub source: Option<String>,
}

/// Load the config from `path`.
pub fn load_from(path: &Path) -> Result<Config, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg = parse_str(&raw)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Parse configuration text.  Only a syntax error fails; bad sections fall
/// back to their defaults.
pub fn parse_str(raw: &str) -> Result<Config, String> {
    let table: toml::Table =
        toml::from_str(raw).map_err(|e| format!("Failed to parse config: {}", e))?;

    Ok(Config {
        localization: section(&table, "localization"),
        johndeere: table.get("johndeere").cloned(),
        pattern: section(&table, "pattern"),
        motion: section(&table, "motion"),
        safety: section(&table, "safety"),
        source: Some(raw.to_string()),
    })
}

fn section<T: DeserializeOwned + Default>(table: &toml::Table, key: &str) -> T {
    let Some(value) = table.get(key) else {
        return T::default();
    };
    match value.clone().try_into() {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(section = key, error = %e, "malformed config section, using defaults");
            T::default()
        }
    }
}

/// Apply `NAVPAT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `NAVPAT_LAPS` | `pattern.laps` |
/// | `NAVPAT_SPEED` | `pattern.speed` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("NAVPAT_LAPS")
        && let Ok(laps) = v.parse::<u32>()
    {
        cfg.pattern.laps = laps;
    }
    if let Ok(v) = std::env::var("NAVPAT_SPEED")
        && let Ok(speed) = v.parse::<f64>()
        && speed.is_finite()
    {
        cfg.pattern.speed = speed;
    }
}

impl Config {
    /// Simulator tuning from the `johndeere` section.
    pub fn vehicle_tuning(&self) -> SimTuning {
        let Some(value) = &self.johndeere else {
            return SimTuning::default();
        };
        match value.clone().try_into() {
            Ok(tuning) => tuning,
            Err(e) => {
                warn!(error = %e, "malformed johndeere section, using default tuning");
                SimTuning::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use navpat_runtime::PatternKind;

    /// Held by every test that reads or writes `NAVPAT_*`.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse_str("").expect("parse");
        assert_eq!(cfg.localization, LocalizationConfig::default());
        assert_eq!(cfg.localization.pose, [0.0, 2.5, 0.0]);
        assert_eq!(cfg.pattern.laps, 10);
        assert!(cfg.johndeere.is_none());
        assert_eq!(cfg.vehicle_tuning(), SimTuning::default());
    }

    #[test]
    fn sections_are_read() {
        let cfg = parse_str(
            r#"
            [localization]
            pose = [1.0, 2.0, 0.5]
            global_map = [[0.0, 0.0], [20.0, 0.0]]

            [johndeere]
            max_acceleration = 0.5

            [pattern]
            kind = "oval"
            laps = 3

            [safety]
            abort_range = 0.7
            "#,
        )
        .expect("parse");

        assert_eq!(cfg.localization.pose, [1.0, 2.0, 0.5]);
        assert_eq!(cfg.localization.global_map.len(), 2);
        // Unset keys inside a section keep their defaults.
        assert_eq!(cfg.localization.match_radius, 2.0);
        assert_eq!(cfg.pattern.kind, PatternKind::Oval);
        assert_eq!(cfg.pattern.laps, 3);
        assert_eq!(cfg.safety.abort_range, 0.7);
        assert_eq!(cfg.safety.arm_range, 1.0);
        assert_eq!(cfg.vehicle_tuning().max_acceleration, 0.5);
        assert_eq!(cfg.vehicle_tuning().update_hz, 20);
    }

    #[test]
    fn malformed_section_falls_back_to_defaults() {
        let cfg = parse_str(
            r#"
            [localization]
            pose = "somewhere"

            [pattern]
            laps = 4
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.localization, LocalizationConfig::default());
        assert_eq!(cfg.pattern.laps, 4);
    }

    #[test]
    fn malformed_vehicle_tuning_falls_back() {
        let cfg = parse_str("[johndeere]\nupdate_hz = \"fast\"\n").expect("parse");
        assert!(cfg.johndeere.is_some());
        assert_eq!(cfg.vehicle_tuning(), SimTuning::default());
    }

    #[test]
    fn syntax_error_is_reported() {
        let err = parse_str("[pattern\nlaps = 3").unwrap_err();
        assert!(err.contains("Failed to parse config"));
    }

    #[test]
    fn load_from_keeps_the_source_text() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("navpat.toml");
        fs::write(&path, "[pattern]\nlaps = 2\n").expect("write");

        let cfg = load_from(&path).expect("load");
        assert_eq!(cfg.source.as_deref(), Some("[pattern]\nlaps = 2\n"));
        assert_eq!(cfg.pattern.laps, 2);
    }

    #[test]
    fn load_from_missing_file_is_an_error() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().expect("tmp dir");
        let err = load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.contains("Failed to read config"));
    }

    #[test]
    fn bundled_config_parses_cleanly() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/navpat.toml");
        let raw = fs::read_to_string(path).expect("bundled config");
        let cfg = parse_str(&raw).expect("parse");
        assert_eq!(cfg.localization.global_map.len(), 6);
        assert_eq!(cfg.vehicle_tuning().obstacles.len(), 2);
        assert_eq!(cfg.vehicle_tuning().camera_period, Some(1.0));
        assert_eq!(cfg.pattern.laps, 10);
    }

    #[test]
    fn env_overrides_laps_and_speed() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: every test reading these variables holds ENV_LOCK.
        unsafe {
            std::env::set_var("NAVPAT_LAPS", "3");
            std::env::set_var("NAVPAT_SPEED", "not-a-number");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.pattern.laps, 3);
        assert_eq!(cfg.pattern.speed, 0.5);

        unsafe { std::env::set_var("NAVPAT_SPEED", "0.8") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.pattern.speed, 0.8);

        unsafe {
            std::env::remove_var("NAVPAT_LAPS");
            std::env::remove_var("NAVPAT_SPEED");
        }
    }
}
