//! Client configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sandbox_core::codec::DEFAULT_MAX_BODY_SIZE;
use sandbox_core::stream::display::DEFAULT_TEXTURE_NAME;
use sandbox_core::{ExchangeConfig, RecoveryPolicy, SchedulerConfig};

/// Top-level configuration for the streaming client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Processing service endpoint.
    pub service: ServiceConfig,
    /// Tick loop pacing.
    pub stream: StreamConfig,
    /// Behaviour after a failed exchange.
    pub recovery: RecoveryConfig,
    /// Presentation settings.
    pub display: DisplayConfig,
    /// Procedural source surface.
    pub surface: SurfaceConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Processing service endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service address (`host:port`).
    pub address: String,
    /// Request path.
    pub path: String,
    /// Round-trip timeout in milliseconds.
    pub timeout_ms: u64,
    /// Largest accepted response body.
    pub max_body_bytes: usize,
}

/// Tick loop pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Ticks per second (the host frame rate).
    pub tick_hz: u32,
    /// How often to log loop statistics, in milliseconds. `0` disables.
    pub stats_interval_ms: u64,
}

/// Recovery after a network failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// `"backoff"` or `"stall"`.
    pub policy: String,
    /// First backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub max_backoff_ms: u64,
}

/// Presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Shader property the processed image is bound to.
    pub texture_name: String,
}

/// Procedural surface dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub width: u32,
    pub height: u32,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,
    /// Optional log file.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:5000".into(),
            path: "/sandbox".into(),
            timeout_ms: 5000,
            max_body_bytes: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            tick_hz: 60,
            stats_interval_ms: 1000,
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            policy: "backoff".into(),
            initial_backoff_ms: 250,
            max_backoff_ms: 5000,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            texture_name: DEFAULT_TEXTURE_NAME.into(),
        }
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 192,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Network settings for [`sandbox_core::HttpExchange`].
    pub fn exchange(&self) -> ExchangeConfig {
        ExchangeConfig {
            address: self.service.address.clone(),
            path: self.service.path.clone(),
            timeout: Duration::from_millis(self.service.timeout_ms),
            max_body: self.service.max_body_bytes,
        }
    }

    /// Loop settings for [`sandbox_core::ExchangeScheduler`].
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            recovery: self.recovery.policy(),
            texture_name: self.display.texture_name.clone(),
            ..SchedulerConfig::default()
        }
    }

    /// Interval between ticks. Rates below 1 Hz are clamped to 1 Hz.
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.stream.tick_hz.max(1)))
    }
}

impl RecoveryConfig {
    /// Resolve the configured policy. Unknown names fall back to backoff.
    pub fn policy(&self) -> RecoveryPolicy {
        match self.policy.to_ascii_lowercase().as_str() {
            "stall" => RecoveryPolicy::Stall,
            "backoff" => self.backoff(),
            other => {
                tracing::warn!("unknown recovery policy {other:?}; using backoff");
                self.backoff()
            }
        }
    }

    fn backoff(&self) -> RecoveryPolicy {
        let initial = Duration::from_millis(self.initial_backoff_ms.max(1));
        RecoveryPolicy::Backoff {
            initial,
            max: Duration::from_millis(self.max_backoff_ms).max(initial),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = ClientConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("[service]"));
        assert!(text.contains("texture_name"));
        assert!(text.contains("initial_backoff_ms"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = ClientConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ClientConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.service.address, "127.0.0.1:5000");
        assert_eq!(parsed.display.texture_name, "_FireSurfaceTex");
        assert_eq!(parsed.stream.tick_hz, 60);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let parsed: ClientConfig = toml::from_str(
            r#"
            [service]
            address = "10.0.0.7:8080"

            [recovery]
            policy = "stall"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.service.address, "10.0.0.7:8080");
        assert_eq!(parsed.service.path, "/sandbox");
        assert_eq!(parsed.recovery.policy(), RecoveryPolicy::Stall);
        assert_eq!(parsed.surface.width, 256);
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = std::env::temp_dir();
        let missing = dir.join(format!("sandbox-missing-{}.toml", std::process::id()));
        assert_eq!(ClientConfig::load(&missing).service.address, "127.0.0.1:5000");

        let broken = dir.join(format!("sandbox-broken-{}.toml", std::process::id()));
        std::fs::write(&broken, "[service\naddress = ").unwrap();
        assert_eq!(ClientConfig::load(&broken).stream.tick_hz, 60);

        std::fs::write(&broken, "[surface]\nwidth = 32\n").unwrap();
        assert_eq!(ClientConfig::load(&broken).surface.width, 32);
        let _ = std::fs::remove_file(&broken);
    }

    #[test]
    fn converts_to_core_configs() {
        let mut cfg = ClientConfig::default();
        cfg.service.timeout_ms = 750;
        cfg.recovery.initial_backoff_ms = 100;
        cfg.recovery.max_backoff_ms = 50;

        let exchange = cfg.exchange();
        assert_eq!(exchange.timeout, Duration::from_millis(750));
        assert_eq!(exchange.path, "/sandbox");

        // A ceiling below the initial delay is raised to it.
        assert_eq!(
            cfg.scheduler().recovery,
            RecoveryPolicy::Backoff {
                initial: Duration::from_millis(100),
                max: Duration::from_millis(100),
            }
        );
    }

    #[test]
    fn unknown_policy_falls_back_to_backoff() {
        let cfg = RecoveryConfig {
            policy: "retry-forever".into(),
            ..RecoveryConfig::default()
        };
        assert!(matches!(cfg.policy(), RecoveryPolicy::Backoff { .. }));
    }

    #[test]
    fn tick_period_clamps_zero_rate() {
        let mut cfg = ClientConfig::default();
        cfg.stream.tick_hz = 0;
        assert_eq!(cfg.tick_period(), Duration::from_secs(1));
        cfg.stream.tick_hz = 50;
        assert_eq!(cfg.tick_period(), Duration::from_millis(20));
    }
}
