//! Triangle-wave "breathing" while powered
//!
//! Argument: period in seconds (default 2.0). The wave restarts from 0 at
//! every power-on edge and the output is 0 while power is off.

use core::fmt::Write;

use super::{parse_seconds, seconds_to_micros, EffectArgs, Transform};

#[derive(Debug, Clone, PartialEq)]
pub struct PulseContext {
    period: f32,
    period_us: u64,
    last_power: bool,
    start_us: u64,
}

impl PulseContext {
    pub fn period_secs(&self) -> f32 {
        self.period
    }
}

impl Transform for PulseContext {
    const NAME: &'static str = "pulse";

    fn parse(args: &str) -> Self {
        let [period] = parse_seconds(args, [2.0]);
        Self {
            period,
            period_us: seconds_to_micros(period),
            last_power: false,
            start_us: 0,
        }
    }

    fn args(&self) -> EffectArgs {
        let mut s = EffectArgs::new();
        let _ = write!(s, "{:.6}", self.period);
        s
    }

    fn evaluate(&mut self, now_us: u64, pwm: u8, power: bool) -> u8 {
        if power && !self.last_power {
            self.start_us = now_us;
        }
        self.last_power = power;

        if !power {
            return 0;
        }
        if self.period_us < 2 {
            return pwm;
        }

        let max = pwm as u128;
        let period = self.period_us as u128;
        let half = period / 2;
        let phase = now_us.saturating_sub(self.start_us) as u128 % period;
        let level = if phase <= half {
            max * phase / half
        } else {
            max * (period - phase) / half
        };
        level.min(max) as u8
    }
}
