//! Shared constants for Argus components.

/// Default Panoptes HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8890";

/// Idle session eviction (10 minutes)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 600;

/// Length of the viewing window once a challenge is opened
pub const VIEW_WINDOW_SECS: u32 = 5;

/// Countdown granularity
pub const TICK_MS: u64 = 1000;

/// Delay between a graded answer and the automatic refresh
pub const REFRESH_DELAY_MS: u64 = 1500;

/// How long a transient notice stays visible
pub const NOTICE_DURATION_MS: u64 = 3000;

/// Visibility flips closer together than this are reported as rapid toggles
pub const RAPID_TOGGLE_MS: u64 = 400;

/// Options offered by category challenges
pub const OPTION_COUNT: usize = 4;

/// Digits in a glyph code
pub const GLYPH_CODE_LENGTH: usize = 4;

/// Provider fetch budget before the loader degrades the round
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 4000;

/// Scratch-reveal surface parameters
pub mod scratch {
    /// Raster width in cells
    pub const WIDTH: u32 = 200;

    /// Raster height in cells
    pub const HEIGHT: u32 = 140;

    /// Largest accepted raster edge
    pub const MAX_EDGE: u32 = 4096;

    /// Radius of the disc erased per pointer sample
    pub const BRUSH_RADIUS: u32 = 7;

    /// Cleared fraction that must be exceeded to pass
    pub const PASS_THRESHOLD: f64 = 0.34;

    /// Time allowed after the first pointer-down
    pub const DEADLINE_SECS: u64 = 5;

    /// Overlay fill (#CBD5E1)
    pub const FILL_RGB: [u8; 3] = [0xCB, 0xD5, 0xE1];

    /// Label band (#1E293B)
    pub const LABEL_RGB: [u8; 3] = [0x1E, 0x29, 0x3B];
}

/// Variant selection weights for the high-friction kind
pub mod weights {
    /// Probability mass given to scratch-reveal on compact devices
    pub const HIGH_FRICTION_COMPACT: f64 = 0.5;

    /// Probability mass given to scratch-reveal elsewhere
    pub const HIGH_FRICTION_STANDARD: f64 = 0.1;
}

/// User-facing notice texts
pub mod messages {
    pub const CAPTURE_WARNING: &str = "Screenshot detected! This action is not allowed.";
    pub const SUCCESS: &str = "Verification successful!";
    pub const FAILURE: &str = "Verification failed. Please try again.";
}

/// Redis keys
pub mod redis_keys {
    /// Outcome log list
    pub const OUTCOMES: &str = "argus:outcomes";
}
