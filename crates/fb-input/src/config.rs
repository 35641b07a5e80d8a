use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::rotation::{Rotation, ScreenGeometry};

/// Default config directory under `$XDG_CONFIG_HOME`.
const CONFIG_DIR: &str = "fbvnc-input";
/// Default config file name.
const CONFIG_FILE: &str = "config.toml";

/// Resolve the default config file path.
///
/// Returns `$XDG_CONFIG_HOME/fbvnc-input/config.toml` or
/// `~/.config/fbvnc-input/config.toml`.
#[must_use]
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join(CONFIG_DIR)
        .join(CONFIG_FILE)
}

/// Load the bridge configuration from a TOML file.
///
/// If `path` is `None`, reads from the default location.
/// Returns the default configuration if the file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load(path: Option<&Path>) -> Result<BridgeConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path(),
    };

    if !path.exists() {
        tracing::debug!(?path, "Config file not found, using defaults");
        return Ok(BridgeConfig::default());
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;

    let config = parse(&contents)
        .with_context(|| format!("failed to parse config: {}", path.display()))?;

    tracing::info!(?path, "Configuration loaded");
    Ok(config)
}

/// Parse a configuration from TOML text.
///
/// # Errors
///
/// Returns an error on malformed TOML, an unknown mode, a rotation that
/// is not a multiple of 90, or a zero-sized geometry.
pub fn parse(contents: &str) -> Result<BridgeConfig> {
    Ok(toml::from_str(contents)?)
}

/// How remote pointer updates reach the system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerMode {
    /// Absolute touches written into an existing touchscreen node.
    #[default]
    Absolute,
    /// Relative motion on a synthetic uinput mouse.
    Relative,
}

/// Pointer bridge configuration loaded from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub mode: PointerMode,

    /// Touchscreen evdev node used in absolute mode.
    pub touch_device: PathBuf,

    /// Panel rotation in degrees (0, 90, 180, 270).
    pub rotate: Rotation,

    /// Name of the virtual pointer created in relative mode.
    pub device_name: String,

    /// How long a frame write may wait for the device, in milliseconds.
    pub write_timeout_ms: u64,

    /// Framebuffer resolution. Required in relative mode; in absolute
    /// mode the touch device's axis extent is used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<ScreenGeometry>,
}

impl BridgeConfig {
    #[must_use]
    pub const fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mode: PointerMode::Absolute,
            touch_device: PathBuf::from("/dev/input/event0"),
            rotate: Rotation::Normal,
            device_name: "fbvnc-input pointer".to_string(),
            write_timeout_ms: 50,
            geometry: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg, BridgeConfig::default());
        assert_eq!(cfg.write_timeout(), Duration::from_millis(50));
    }

    #[test]
    fn full_relative_config() {
        let cfg = parse(
            r#"
            mode = "relative"
            touch_device = "/dev/input/event3"
            rotate = 270
            device_name = "panel mouse"
            write_timeout_ms = 20

            [geometry]
            width = 800
            height = 480
            "#,
        )
        .unwrap();
        assert_eq!(cfg.mode, PointerMode::Relative);
        assert_eq!(cfg.touch_device, PathBuf::from("/dev/input/event3"));
        assert_eq!(cfg.rotate, Rotation::Rotate270);
        assert_eq!(cfg.geometry, Some(ScreenGeometry::new(800, 480).unwrap()));
        assert_eq!(cfg.device_name, "panel mouse");
        assert_eq!(cfg.write_timeout_ms, 20);
    }

    #[test]
    fn negative_rotation_normalizes() {
        let cfg = parse("rotate = -90").unwrap();
        assert_eq!(cfg.rotate, Rotation::Rotate270);
    }

    #[test]
    fn invalid_rotation_is_rejected() {
        let err = parse("rotate = 45").unwrap_err();
        assert!(format!("{err:#}").contains("rotation"));
    }

    #[test]
    fn zero_geometry_is_rejected() {
        assert!(parse("[geometry]\nwidth = 0\nheight = 480").is_err());
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(parse("mode = \"joystick\"").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = load(Some(Path::new("/nonexistent/fbvnc-input/config.toml"))).unwrap();
        assert_eq!(cfg, BridgeConfig::default());
    }

    #[test]
    fn serialization_round_trips() {
        let cfg = BridgeConfig {
            rotate: Rotation::Rotate90,
            geometry: Some(ScreenGeometry::new(480, 320).unwrap()),
            ..BridgeConfig::default()
        };
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("rotate = 90"));
        assert_eq!(parse(&text).unwrap(), cfg);
    }

    #[test]
    fn default_path_ends_with_config_file() {
        assert!(config_path().ends_with("fbvnc-input/config.toml"));
    }
}
