//! Per-tick output processing
//!
//! [`OutputState`] is what the outside world commands: a duty cycle and a
//! power flag per channel. [`OutputController`] turns that into hardware
//! levels once per control-loop tick by running each channel through its
//! effect slot.

use hal_abstractions::PwmHardware;

use crate::config::ControllerConfig;
use crate::effects::{EffectSlot, UnknownEffect};
use crate::pwm::{PwmDriver, OUTPUT_MAX_COUNT};

/// Commanded duty cycle and power per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputState {
    pub pwm: [u8; OUTPUT_MAX_COUNT],
    pub pwr: [bool; OUTPUT_MAX_COUNT],
}

impl OutputState {
    /// Power-on state from the configured defaults.
    pub fn from_config(config: &ControllerConfig) -> Self {
        let mut state = Self {
            pwm: [0; OUTPUT_MAX_COUNT],
            pwr: [false; OUTPUT_MAX_COUNT],
        };
        for (i, out) in config.outputs.iter().enumerate() {
            state.pwm[i] = out.default_pwm.min(100);
            state.pwr[i] = out.default_state;
        }
        state
    }

    pub fn set_duty(&mut self, channel: usize, duty: u8) {
        self.pwm[channel] = duty.min(100);
    }

    pub fn set_power(&mut self, channel: usize, on: bool) {
        self.pwr[channel] = on;
    }

    /// Switch every channel whose bit is set in `mask` (bit 0 = channel 0).
    pub fn apply_power_mask(&mut self, mask: u16, on: bool) {
        for (i, pwr) in self.pwr.iter_mut().enumerate() {
            if mask & (1 << i) != 0 {
                *pwr = on;
            }
        }
    }
}

/// Runs the effect engine and writes the PWM outputs.
///
/// Owned by the control loop; nothing here is shared between cores.
pub struct OutputController<H> {
    driver: PwmDriver<H>,
    effects: [EffectSlot; OUTPUT_MAX_COUNT],
    last: [Option<u8>; OUTPUT_MAX_COUNT],
    channels: usize,
}

impl<H: PwmHardware> OutputController<H> {
    pub fn new(driver: PwmDriver<H>, config: &ControllerConfig) -> Self {
        let mut ctl = Self {
            channels: driver.channel_count().min(config.outputs.len()),
            driver,
            effects: core::array::from_fn(|_| EffectSlot::new()),
            last: [None; OUTPUT_MAX_COUNT],
        };
        ctl.reconfigure(config);
        ctl
    }

    /// Rebuild every effect context from `config` and force a rewrite of
    /// all outputs on the next tick.
    pub fn reconfigure(&mut self, config: &ControllerConfig) {
        self.channels = self.driver.channel_count().min(config.outputs.len());
        for (slot, out) in self.effects.iter_mut().zip(config.outputs.iter()) {
            match out.effect {
                Some(kind) => slot.set(kind, &out.effect_args),
                None => slot.clear(),
            }
        }
        self.last = [None; OUTPUT_MAX_COUNT];
    }

    /// Change one channel's effect by name at runtime.
    pub fn set_effect(
        &mut self,
        channel: usize,
        name: &str,
        args: &str,
    ) -> Result<(), UnknownEffect> {
        self.effects[channel].assign(name, args)
    }

    pub fn effect(&self, channel: usize) -> &EffectSlot {
        &self.effects[channel]
    }

    /// One control-loop tick. Returns the number of channels written.
    ///
    /// `now_us` must not decrease between calls.
    pub fn tick(
        &mut self,
        now_us: u64,
        state: &OutputState,
        config: &ControllerConfig,
    ) -> usize {
        let mut written = 0;
        for (ch, out) in config.outputs.iter().enumerate().take(self.channels) {
            let base = out.base_duty(state.pwm[ch]);
            let duty = self.effects[ch].evaluate(now_us, base, state.pwr[ch]);
            if self.last[ch] != Some(duty) {
                self.driver.set_duty_cycle(ch, duty as f32);
                self.last[ch] = Some(duty);
                written += 1;
            }
        }
        written
    }

    /// Duty cycle currently programmed on `channel`, in percent.
    pub fn duty(&self, channel: usize) -> f32 {
        self.driver.get_duty_cycle(channel)
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }

    pub fn driver(&self) -> &PwmDriver<H> {
        &self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_from_defaults() {
        let mut cfg = ControllerConfig::with_outputs(4);
        cfg.outputs[1].default_state = true;
        cfg.outputs[2].default_pwm = 40;
        let state = OutputState::from_config(&cfg);
        assert_eq!(&state.pwr[..4], &[false, true, false, false]);
        assert_eq!(&state.pwm[..4], &[100, 100, 40, 100]);
        assert_eq!(state.pwm[10], 0);
    }

    #[test]
    fn power_mask() {
        let mut state = OutputState::from_config(&ControllerConfig::default());
        state.apply_power_mask(0b1000_0000_0000_0101, true);
        assert!(state.pwr[0] && state.pwr[2] && state.pwr[15]);
        assert!(!state.pwr[1]);
        state.apply_power_mask(0b0100, false);
        assert!(!state.pwr[2]);
        assert!(state.pwr[0]);
    }

    #[test]
    fn duty_is_capped_at_100() {
        let mut state = OutputState::from_config(&ControllerConfig::default());
        state.set_duty(0, 250);
        assert_eq!(state.pwm[0], 100);
    }
}
