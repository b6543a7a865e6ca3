//! Controller configuration structures
//!
//! Loading and saving are handled elsewhere; these are the in-memory values
//! the controller consumes, with the factory defaults.

use core::fmt::Write;

use heapless::{String, Vec};

use crate::effects::{EffectArgs, EffectKind};
use crate::logger::LogConfig;
use crate::pwm::OUTPUT_MAX_COUNT;

/// Longest output name
pub const MAX_NAME_LEN: usize = 64;

/// How an output responds to its commanded duty cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelType {
    /// Duty cycle follows the commanded value within [min, max]
    #[default]
    Dimmer,
    /// On/off only; on drives `max_pwm`
    Toggle,
}

impl ChannelType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Dimmer => "dimmer",
            Self::Toggle => "toggle",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        [Self::Dimmer, Self::Toggle]
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }
}

/// One PWM output channel
#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub name: String<MAX_NAME_LEN>,
    /// Lowest duty cycle a Dimmer is driven at while on (percent)
    pub min_pwm: u8,
    /// Highest duty cycle (percent)
    pub max_pwm: u8,
    /// Power-on duty cycle (percent)
    pub default_pwm: u8,
    /// Power-on state
    pub default_state: bool,
    pub kind: ChannelType,
    /// Effect applied between the commanded duty and the hardware
    pub effect: Option<EffectKind>,
    pub effect_args: EffectArgs,
}

impl OutputConfig {
    /// Factory defaults for output `index` (named "Output N", 1-based).
    pub fn numbered(index: usize) -> Self {
        let mut name = String::new();
        let _ = write!(name, "Output {}", index + 1);
        Self {
            name,
            min_pwm: 0,
            max_pwm: 100,
            default_pwm: 100,
            default_state: false,
            kind: ChannelType::Dimmer,
            effect: None,
            effect_args: EffectArgs::new(),
        }
    }

    /// Duty cycle fed to the effect for a commanded `duty`.
    ///
    /// Dimmers are limited to `[min_pwm, max_pwm]`; toggles always use
    /// `max_pwm`.
    pub fn base_duty(&self, duty: u8) -> u8 {
        let max = self.max_pwm.min(100);
        match self.kind {
            ChannelType::Dimmer => duty.max(self.min_pwm).min(max),
            ChannelType::Toggle => max,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::numbered(0)
    }
}

/// Whole-controller configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub outputs: Vec<OutputConfig, OUTPUT_MAX_COUNT>,
    /// Target PWM frequency in Hz (clamped by the driver)
    pub pwm_freq: u32,
    pub log: LogConfig,
}

impl ControllerConfig {
    /// Defaults with `count` outputs (at most [`OUTPUT_MAX_COUNT`]).
    pub fn with_outputs(count: usize) -> Self {
        let outputs = (0..count.min(OUTPUT_MAX_COUNT))
            .map(OutputConfig::numbered)
            .collect();
        Self {
            outputs,
            pwm_freq: 1000,
            log: LogConfig::default(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::with_outputs(OUTPUT_MAX_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::Priority;

    #[test]
    fn factory_defaults() {
        let cfg = ControllerConfig::default();
        assert_eq!(cfg.outputs.len(), 16);
        assert_eq!(cfg.pwm_freq, 1000);
        assert_eq!(cfg.log.log_level, Priority::Err);
        assert_eq!(cfg.log.lock_timeout_us, 100);

        let out = &cfg.outputs[3];
        assert_eq!(out.name.as_str(), "Output 4");
        assert_eq!((out.min_pwm, out.max_pwm, out.default_pwm), (0, 100, 100));
        assert!(!out.default_state);
        assert_eq!(out.kind, ChannelType::Dimmer);
        assert_eq!(out.effect, None);
    }

    #[test]
    fn base_duty_clamps_dimmer() {
        let mut out = OutputConfig::numbered(0);
        out.min_pwm = 10;
        out.max_pwm = 80;
        assert_eq!(out.base_duty(0), 10);
        assert_eq!(out.base_duty(50), 50);
        assert_eq!(out.base_duty(95), 80);
    }

    #[test]
    fn base_duty_toggle_uses_max() {
        let mut out = OutputConfig::numbered(0);
        out.kind = ChannelType::Toggle;
        out.max_pwm = 70;
        assert_eq!(out.base_duty(5), 70);
    }

    #[test]
    fn channel_type_names() {
        assert_eq!(ChannelType::from_name("Toggle"), Some(ChannelType::Toggle));
        assert_eq!(ChannelType::from_name("dim"), None);
        assert_eq!(ChannelType::Dimmer.name(), "dimmer");
    }
}
