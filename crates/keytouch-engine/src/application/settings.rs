//! Tunables injected into the handlers and the script engine.
//!
//! These are plain values.  The storage layer deserializes them as the
//! `[humanize]` and `[script]` sections of the configuration file and the
//! session copies them in at construction.

use serde::{Deserialize, Serialize};

/// How "human" generated touches look.  Every level is `0..=100`; `0`
/// disables the corresponding effect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HumanizeSettings {
    /// Radius of the random jitter applied to touch-down anchors.
    #[serde(default)]
    pub random_offset: u32,

    /// Slows joystick travel down into more, smaller steps.
    #[serde(default = "default_steer_wheel_smooth")]
    pub steer_wheel_smooth: u32,

    /// Amplitude of the sideways bow on joystick paths.
    #[serde(default = "default_steer_wheel_curve")]
    pub steer_wheel_curve: u32,

    /// Curvature of script `slide` paths.
    #[serde(default = "default_slide_curve")]
    pub slide_curve: u32,
}

impl Default for HumanizeSettings {
    fn default() -> Self {
        Self {
            random_offset: 0,
            steer_wheel_smooth: default_steer_wheel_smooth(),
            steer_wheel_curve: default_steer_wheel_curve(),
            slide_curve: default_slide_curve(),
        }
    }
}

fn default_steer_wheel_smooth() -> u32 {
    50
}

fn default_steer_wheel_curve() -> u32 {
    30
}

fn default_slide_curve() -> u32 {
    30
}

/// Limits applied to every script sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScriptSettings {
    /// Window without a `sleep` after which a script is asked to stop.
    #[serde(default = "default_soft_timeout_ms")]
    pub soft_timeout_ms: u64,

    /// Grace period after the soft timeout before the sandbox is abandoned.
    #[serde(default = "default_hard_timeout_ms")]
    pub hard_timeout_ms: u64,

    /// Concurrent `holdpress` touches one key may own.
    #[serde(default = "default_max_touch_points")]
    pub max_touch_points: usize,

    /// Capacity of the worker → event-loop channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// How long `stop_all` waits for sandboxes to unwind before abandoning them.
    #[serde(default = "default_stop_all_timeout_ms")]
    pub stop_all_timeout_ms: u64,
}

impl ScriptSettings {
    pub const MIN_TOUCH_POINTS: usize = 1;
    pub const MAX_TOUCH_POINTS: usize = 50;

    /// `max_touch_points` clamped into its supported range.
    pub fn touch_point_limit(&self) -> usize {
        self.max_touch_points
            .clamp(Self::MIN_TOUCH_POINTS, Self::MAX_TOUCH_POINTS)
    }
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            soft_timeout_ms: default_soft_timeout_ms(),
            hard_timeout_ms: default_hard_timeout_ms(),
            max_touch_points: default_max_touch_points(),
            channel_capacity: default_channel_capacity(),
            stop_all_timeout_ms: default_stop_all_timeout_ms(),
        }
    }
}

fn default_soft_timeout_ms() -> u64 {
    30_000
}

fn default_hard_timeout_ms() -> u64 {
    1_000
}

fn default_max_touch_points() -> usize {
    10
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_stop_all_timeout_ms() -> u64 {
    3_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_point_limit_is_clamped() {
        let mut settings = ScriptSettings::default();
        assert_eq!(settings.touch_point_limit(), 10);

        settings.max_touch_points = 0;
        assert_eq!(settings.touch_point_limit(), 1);

        settings.max_touch_points = 500;
        assert_eq!(settings.touch_point_limit(), 50);
    }

    #[test]
    fn test_humanize_default_has_no_anchor_jitter() {
        assert_eq!(HumanizeSettings::default().random_offset, 0);
    }
}
