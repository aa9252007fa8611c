use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EdgePolicy {
    Rising,
    Falling,
    #[default]
    Both,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    #[default]
    Pulse,
    Follow,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Level {
    #[default]
    Low,
    High,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EventClock {
    #[default]
    Monotonic,
    Realtime,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub device_path: String,
    pub input_offset: u32,
    pub output_offset: u32,
    pub edge_policy: EdgePolicy,
    pub output_mode: OutputMode,
    pub pulse_duration_ms: u64,
    #[serde(alias = "wait_timeout")]
    pub wait_timeout_ms: Option<u64>,
    pub initial_level: Level,
    pub consumer: String,
    pub event_clock: EventClock,
    pub poll_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            device_path: "/dev/gpiochip0".into(),
            input_offset: 26,
            output_offset: 6,
            edge_policy: EdgePolicy::Both,
            output_mode: OutputMode::Pulse,
            pulse_duration_ms: 1,
            wait_timeout_ms: None,
            initial_level: Level::Low,
            consumer: "gpio-monitor".into(),
            event_clock: EventClock::Monotonic,
            poll_interval_ms: 10,
        }
    }
}

impl MonitorConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| AppError::Config(format!("Invalid config json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.input_offset == self.output_offset {
            return Err(AppError::Config(format!(
                "input and output share line {}",
                self.input_offset
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(AppError::Config("poll_interval_ms must be positive".into()));
        }
        if self.wait_timeout_ms == Some(0) {
            return Err(AppError::Config("wait_timeout_ms must be positive".into()));
        }
        if self.consumer.is_empty() {
            return Err(AppError::Config("consumer label must not be empty".into()));
        }
        Ok(())
    }

    pub fn pulse_duration(&self) -> Duration {
        Duration::from_millis(self.pulse_duration_ms)
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg: MonitorConfig = serde_json::from_str("{}").expect("valid config");
        assert_eq!(cfg, MonitorConfig::default());
        assert_eq!(cfg.device_path, "/dev/gpiochip0");
        assert_eq!(cfg.edge_policy, EdgePolicy::Both);
        assert_eq!(cfg.output_mode, OutputMode::Pulse);
        assert_eq!(cfg.pulse_duration(), Duration::from_millis(1));
        assert_eq!(cfg.wait_timeout(), None);
    }

    #[test]
    fn kebab_case_enums() {
        let cfg: MonitorConfig = serde_json::from_str(
            r#"{"edge_policy":"rising","output_mode":"follow","event_clock":"realtime","wait_timeout_ms":250}"#,
        )
        .expect("valid config");
        assert_eq!(cfg.edge_policy, EdgePolicy::Rising);
        assert_eq!(cfg.output_mode, OutputMode::Follow);
        assert_eq!(cfg.event_clock, EventClock::Realtime);
        assert_eq!(cfg.wait_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn wait_timeout_accepts_short_key() {
        let cfg: MonitorConfig =
            serde_json::from_str(r#"{"wait_timeout": 100}"#).expect("valid config");
        assert_eq!(cfg.wait_timeout(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_json::from_str::<MonitorConfig>(r#"{"input_line":3}"#).is_err());
    }

    #[test]
    fn same_line_for_input_and_output_is_invalid() {
        let cfg = MonitorConfig {
            input_offset: 4,
            output_offset: 4,
            ..MonitorConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn zero_poll_interval_is_invalid() {
        let cfg = MonitorConfig {
            poll_interval_ms: 0,
            ..MonitorConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(AppError::Config(_))));
    }
}
