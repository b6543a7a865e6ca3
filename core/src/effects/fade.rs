//! Fade in/out on power changes
//!
//! Arguments: `fade_in[,fade_out]` in seconds, each defaulting to 1.0.
//!
//! ```text
//!   power off -> on    any mode         -> FADING_IN   (output 0)
//!   power on -> off    any mode         -> FADING_OUT  (output pwm)
//!   ramp elapsed       FADING_IN        -> HELD_ON     (output pwm)
//!   ramp elapsed       FADING_OUT       -> HELD_OFF    (output 0)
//! ```
//!
//! Any power change restarts the matching ramp from the current tick. Ramp
//! arithmetic is integer microseconds, so long uptimes do not drift.

use core::fmt::Write;

use super::{parse_seconds, seconds_to_micros, EffectArgs, Transform};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FadeMode {
    Init = 0,
    FadingIn = 1,
    HeldOn = 2,
    FadingOut = 3,
    HeldOff = 4,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FadeContext {
    fade_in: f32,
    fade_out: f32,
    in_len_us: u64,
    out_len_us: u64,
    last_power: bool,
    mode: FadeMode,
    start_us: u64,
}

impl FadeContext {
    pub fn mode(&self) -> FadeMode {
        self.mode
    }

    pub fn fade_in_secs(&self) -> f32 {
        self.fade_in
    }

    pub fn fade_out_secs(&self) -> f32 {
        self.fade_out
    }
}

/// `pwm * elapsed / len`, clamped to `pwm`. A zero `len` is already done.
fn ramp(pwm: u8, elapsed: u64, len: u64) -> u8 {
    if len == 0 {
        return pwm;
    }
    let v = (pwm as u128 * elapsed as u128) / len as u128;
    v.min(pwm as u128) as u8
}

impl Transform for FadeContext {
    const NAME: &'static str = "fade";

    fn parse(args: &str) -> Self {
        let [fade_in, fade_out] = parse_seconds(args, [1.0, 1.0]);
        Self {
            fade_in,
            fade_out,
            in_len_us: seconds_to_micros(fade_in),
            out_len_us: seconds_to_micros(fade_out),
            last_power: false,
            mode: FadeMode::Init,
            start_us: 0,
        }
    }

    fn args(&self) -> EffectArgs {
        let mut s = EffectArgs::new();
        let _ = write!(s, "{:.6},{:.6}", self.fade_in, self.fade_out);
        s
    }

    fn evaluate(&mut self, now_us: u64, pwm: u8, power: bool) -> u8 {
        let out = if power != self.last_power {
            self.start_us = now_us;
            if power {
                self.mode = FadeMode::FadingIn;
                0
            } else {
                self.mode = FadeMode::FadingOut;
                pwm
            }
        } else {
            let elapsed = now_us.saturating_sub(self.start_us);
            match self.mode {
                FadeMode::FadingIn if elapsed < self.in_len_us => {
                    ramp(pwm, elapsed, self.in_len_us)
                }
                FadeMode::FadingIn | FadeMode::HeldOn => {
                    self.mode = FadeMode::HeldOn;
                    pwm
                }
                FadeMode::FadingOut if elapsed < self.out_len_us => {
                    pwm - ramp(pwm, elapsed, self.out_len_us)
                }
                FadeMode::FadingOut | FadeMode::HeldOff => {
                    self.mode = FadeMode::HeldOff;
                    0
                }
                FadeMode::Init => 0,
            }
        };
        self.last_power = power;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: u64 = 1_000_000;

    #[test]
    fn defaults() {
        let c = FadeContext::parse("");
        assert_eq!(c.fade_in_secs(), 1.0);
        assert_eq!(c.fade_out_secs(), 1.0);
        assert_eq!(c.mode(), FadeMode::Init);
        assert_eq!(c.args().as_str(), "1.000000,1.000000");
    }

    #[test]
    fn negative_argument_keeps_default() {
        let c = FadeContext::parse("-2,0.5");
        assert_eq!(c.fade_in_secs(), 1.0);
        assert_eq!(c.fade_out_secs(), 0.5);
    }

    #[test]
    fn stays_off_until_powered() {
        let mut c = FadeContext::parse("1");
        assert_eq!(c.evaluate(0, 100, false), 0);
        assert_eq!(c.evaluate(S, 100, false), 0);
        assert_eq!(c.mode(), FadeMode::Init);
    }

    #[test]
    fn fade_in_reaches_half_then_full() {
        let mut c = FadeContext::parse("2.0");
        let t0 = 10 * S;
        assert_eq!(c.evaluate(t0, 80, true), 0);
        assert_eq!(c.mode(), FadeMode::FadingIn);
        let mid = c.evaluate(t0 + S, 80, true);
        assert!((39..=41).contains(&mid), "mid={}", mid);
        assert_eq!(c.evaluate(t0 + 2 * S + 1, 80, true), 80);
        assert_eq!(c.mode(), FadeMode::HeldOn);
        assert_eq!(c.evaluate(t0 + 100 * S, 80, true), 80);
        assert_eq!(c.mode(), FadeMode::HeldOn);
    }

    #[test]
    fn held_on_tracks_commanded_duty() {
        let mut c = FadeContext::parse("0");
        c.evaluate(0, 50, true);
        assert_eq!(c.evaluate(1, 50, true), 50);
        assert_eq!(c.evaluate(2, 70, true), 70);
    }

    #[test]
    fn fade_out_decreases_to_zero() {
        let mut c = FadeContext::parse("0,1");
        c.evaluate(0, 100, true);
        c.evaluate(1, 100, true);

        let t0 = 5 * S;
        assert_eq!(c.evaluate(t0, 100, false), 100);
        let mut last = 100;
        for step in 1..10 {
            let v = c.evaluate(t0 + step * S / 10, 100, false);
            assert!(v < last, "step={} v={} last={}", step, v, last);
            last = v;
        }
        assert_eq!(c.evaluate(t0 + S, 100, false), 0);
        assert_eq!(c.mode(), FadeMode::HeldOff);
        assert_eq!(c.evaluate(t0 + 10 * S, 100, false), 0);
    }

    #[test]
    fn zero_length_fades_are_instant() {
        let mut c = FadeContext::parse("0,0");
        assert_eq!(c.evaluate(0, 60, true), 0);
        assert_eq!(c.evaluate(0, 60, true), 60);
        assert_eq!(c.evaluate(1, 60, false), 60);
        assert_eq!(c.evaluate(1, 60, false), 0);
    }

    #[test]
    fn power_flip_mid_fade_restarts() {
        let mut c = FadeContext::parse("1,1");
        c.evaluate(0, 100, true);
        c.evaluate(S / 2, 100, true);
        assert_eq!(c.evaluate(S / 2 + 1, 100, false), 100);
        assert_eq!(c.mode(), FadeMode::FadingOut);
    }

    #[test]
    fn huge_elapsed_does_not_overflow() {
        let mut c = FadeContext::parse("1000000");
        c.evaluate(0, 255, true);
        assert_eq!(c.evaluate(999_999_999_999, 255, true), 254);
        assert_eq!(c.evaluate(u64::MAX, 255, true), 255);
    }
}
