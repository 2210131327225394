use std::sync::OnceLock;
use std::time::Duration;

/// Process-wide defaults, initialized once and read by every actor/operator that
/// doesn't override them explicitly. Mirrors the base design's "thread-name counter
/// and default group registry are process-wide; initialize once at startup".
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Interval at which a `Progress` watchdog checks whether a reactive or blocking
    /// actor has made forward progress since the last tick.
    pub heartbeat: Duration,
    /// Default bound applied to a mailbox when an actor is spawned without an
    /// explicit capacity.
    pub default_mailbox_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            heartbeat: Duration::from_secs(5),
            default_mailbox_capacity: 128,
        }
    }
}

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Initializes the process-wide configuration. Safe to call more than once; only the
/// first call takes effect, matching the "initialize once at startup" contract.
pub fn init(config: RuntimeConfig) {
    let _ = CONFIG.set(config);
}

/// Returns the active configuration, falling back to defaults if `init` was never
/// called.
pub fn config() -> &'static RuntimeConfig {
    CONFIG.get_or_init(RuntimeConfig::default)
}
