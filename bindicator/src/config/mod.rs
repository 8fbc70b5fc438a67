//! Device configuration loading.
//!
//! The expected YAML structure is:
//! ```yaml
//! display_on: 16        # hour the bin indicator lights up
//! display_off: 23       # hour it goes dark
//! poll_web: 12          # hour of the daily bin-date refresh
//! short_timeout: 10     # minutes before retrying a failed refresh
//! long_timeout: 5       # minutes a button press keeps the indicator lit
//! bin_colours:
//!   general: [0, 0, 100]
//!   recycling: [100, 60, 0]
//! gesture:
//!   double_tap_ms: 300
//!   long_hold_ms: 500
//! status_inverted: [false, true, false]
//! ```
//!
//! Every key is optional; absent keys take the values of [`Config::default`].

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::gesture::GestureTiming;
use crate::output::Rgb;

/// Shown for a bin label that has no configured colour.
pub const FALLBACK_COLOUR: Rgb = Rgb::new(100, 100, 100);

// ── Private YAML deserialization types ────────────────────────────────────────

/// Mirrors the YAML file layout.  Callers work with [`Config`] instead.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    display_on: Option<u32>,
    display_off: Option<u32>,
    poll_web: Option<u32>,
    short_timeout: Option<u64>,
    long_timeout: Option<u64>,
    heartbeat_secs: Option<u64>,
    #[serde(default)]
    bin_colours: BTreeMap<String, Rgb>,
    gesture: Option<GestureTiming>,
    status_inverted: Option<[bool; 3]>,
    bin_inverted: Option<[bool; 3]>,
}

// ── Public data structures ────────────────────────────────────────────────────

/// Validated, fully-defaulted configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Hour (0–23) the bin indicator window opens.
    pub display_on: u32,
    /// Hour (0–23) the bin indicator window closes.
    pub display_off: u32,
    /// Hour (0–23) of the daily refresh after a successful fetch.
    pub poll_web: u32,
    /// Retry delay after a failed refresh.
    pub short_timeout: Duration,
    /// How long a single press keeps the indicator lit outside the window.
    pub long_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub bin_colours: BTreeMap<String, Rgb>,
    pub gesture: GestureTiming,
    pub status_inverted: [bool; 3],
    pub bin_inverted: [bool; 3],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display_on: 16,
            display_off: 23,
            poll_web: 12,
            short_timeout: Duration::from_secs(10 * 60),
            long_timeout: Duration::from_secs(5 * 60),
            heartbeat_interval: Duration::from_secs(10),
            bin_colours: BTreeMap::from([
                ("general".to_string(), Rgb::new(0, 0, 100)),
                ("recycling".to_string(), Rgb::new(100, 60, 0)),
                ("garden".to_string(), Rgb::new(0, 100, 0)),
            ]),
            gesture: GestureTiming::default(),
            status_inverted: [false, true, false],
            bin_inverted: [false; 3],
        }
    }
}

impl Config {
    /// Parse and validate the YAML file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the YAML is malformed,
    /// or a value is out of range (the message names the key).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading device configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid configuration file: {}", path.display()))
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        // An empty document deserialises as unit, not as an empty map.
        let file: ConfigFile = if content.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(content).context("Failed to parse YAML")?
        };

        let defaults = Config::default();
        let config = Config {
            display_on: file.display_on.unwrap_or(defaults.display_on),
            display_off: file.display_off.unwrap_or(defaults.display_off),
            poll_web: file.poll_web.unwrap_or(defaults.poll_web),
            short_timeout: file
                .short_timeout
                .map(minutes)
                .unwrap_or(defaults.short_timeout),
            long_timeout: file
                .long_timeout
                .map(minutes)
                .unwrap_or(defaults.long_timeout),
            heartbeat_interval: file
                .heartbeat_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat_interval),
            bin_colours: if file.bin_colours.is_empty() {
                defaults.bin_colours
            } else {
                file.bin_colours
            },
            gesture: file.gesture.unwrap_or(defaults.gesture),
            status_inverted: file.status_inverted.unwrap_or(defaults.status_inverted),
            bin_inverted: file.bin_inverted.unwrap_or(defaults.bin_inverted),
        };

        config.validate()?;
        config.log_summary();
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (key, hour) in [
            ("display_on", self.display_on),
            ("display_off", self.display_off),
            ("poll_web", self.poll_web),
        ] {
            ensure!(hour <= 23, "{key} must be an hour between 0 and 23, got {hour}");
        }
        ensure!(
            !self.short_timeout.is_zero(),
            "short_timeout must be at least 1 minute"
        );
        ensure!(
            !self.long_timeout.is_zero(),
            "long_timeout must be at least 1 minute"
        );
        ensure!(
            !self.heartbeat_interval.is_zero(),
            "heartbeat_secs must be at least 1"
        );
        for (label, colour) in &self.bin_colours {
            ensure!(
                !colour.out_of_range(),
                "bin_colours.{label} components must be 0..=100, got [{}, {}, {}]",
                colour.r,
                colour.g,
                colour.b
            );
        }
        ensure!(
            self.gesture.double_tap < self.gesture.long_hold,
            "gesture.double_tap_ms must be shorter than gesture.long_hold_ms"
        );
        Ok(())
    }

    fn log_summary(&self) {
        info!(
            display_on = self.display_on,
            display_off = self.display_off,
            poll_web = self.poll_web,
            short_timeout_min = self.short_timeout.as_secs() / 60,
            long_timeout_min = self.long_timeout.as_secs() / 60,
            bins = self.bin_colours.len(),
            "Configuration loaded"
        );
        for (label, colour) in &self.bin_colours {
            debug!("  Bin: {} | colour: {:?}", label, colour);
        }
    }

    /// Colour configured for `label`, or [`FALLBACK_COLOUR`].
    pub fn colour_for(&self, label: &str) -> Rgb {
        match self.bin_colours.get(label) {
            Some(colour) => *colour,
            None => {
                warn!(label, "no colour configured for bin, using fallback");
                FALLBACK_COLOUR
            }
        }
    }

    /// Whether `hour` falls inside the display window.
    ///
    /// The window is `[display_on, display_off)` and may wrap past midnight.
    /// Equal bounds mean the window never opens.
    pub fn in_display_window(&self, hour: u32) -> bool {
        let (on, off) = (self.display_on, self.display_off);
        if on <= off {
            (on..off).contains(&hour)
        } else {
            hour >= on || hour < off
        }
    }
}

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn load_full_yaml() {
        let yaml = r#"
display_on: 17
display_off: 22
poll_web: 6
short_timeout: 15
long_timeout: 2
heartbeat_secs: 30
bin_colours:
  general: [0, 0, 100]
  food: [0, 100, 0]
gesture:
  double_tap_ms: 250
  long_hold_ms: 1000
status_inverted: [false, false, false]
bin_inverted: [true, true, true]
"#;
        let f = yaml_tempfile(yaml);
        let cfg = Config::load_from_file(f.path()).unwrap();

        assert_eq!(cfg.display_on, 17);
        assert_eq!(cfg.display_off, 22);
        assert_eq!(cfg.poll_web, 6);
        assert_eq!(cfg.short_timeout, Duration::from_secs(15 * 60));
        assert_eq!(cfg.long_timeout, Duration::from_secs(2 * 60));
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(cfg.bin_colours.len(), 2);
        assert_eq!(cfg.colour_for("food"), Rgb::new(0, 100, 0));
        assert_eq!(cfg.gesture.long_hold, Duration::from_millis(1000));
        assert_eq!(cfg.bin_inverted, [true; 3]);
    }

    #[test]
    fn absent_keys_use_defaults() {
        let cfg = Config::from_yaml_str("poll_web: 8\n").unwrap();
        let defaults = Config::default();
        assert_eq!(cfg.poll_web, 8);
        assert_eq!(cfg.display_on, defaults.display_on);
        assert_eq!(cfg.bin_colours, defaults.bin_colours);
        assert_eq!(cfg.gesture, defaults.gesture);
    }

    #[test]
    fn empty_document_is_all_defaults() {
        assert_eq!(Config::from_yaml_str("").unwrap(), Config::default());
    }

    #[test]
    fn out_of_range_hour_is_rejected_with_key_name() {
        let err = Config::from_yaml_str("display_off: 24\n").unwrap_err();
        assert!(format!("{err:#}").contains("display_off"));
    }

    #[test]
    fn out_of_range_colour_is_rejected() {
        let err = Config::from_yaml_str("bin_colours:\n  general: [0, 0, 180]\n").unwrap_err();
        assert!(format!("{err:#}").contains("bin_colours.general"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(Config::from_yaml_str("short_timeout: 0\n").is_err());
    }

    #[test]
    fn missing_file_returns_error() {
        assert!(Config::load_from_file(Path::new("/nonexistent/bindicator.yaml")).is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("this is: not: valid: yaml: content:::");
        assert!(Config::load_from_file(f.path()).is_err());
    }

    #[test]
    fn unknown_bin_gets_fallback_colour() {
        assert_eq!(Config::default().colour_for("mystery"), FALLBACK_COLOUR);
    }

    #[test]
    fn display_window_plain_and_wrapping() {
        let cfg = Config::default(); // 16..23
        assert!(!cfg.in_display_window(15));
        assert!(cfg.in_display_window(16));
        assert!(cfg.in_display_window(22));
        assert!(!cfg.in_display_window(23));

        let night = Config {
            display_on: 22,
            display_off: 6,
            ..Config::default()
        };
        assert!(night.in_display_window(23));
        assert!(night.in_display_window(0));
        assert!(night.in_display_window(5));
        assert!(!night.in_display_window(6));
        assert!(!night.in_display_window(12));
    }
}
