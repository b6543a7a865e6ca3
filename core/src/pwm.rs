//! PWM timing derivation and the per-channel output driver
//!
//! Outputs are generated in phase-correct mode: the slice counter ramps
//! `0..=wrap` and back, so one period takes `2 * (wrap + 1)` divided clock
//! cycles.
//!
//! Logical channels come in consecutive pairs (0/1, 2/3, ...). Both pins of
//! a pair must be the A and B outputs of one hardware slice, because a slice
//! has a single divider and wrap. The pin map is validated once in
//! [`PwmDriver::new`]; after that channels are addressed by index only.

use core::fmt;

use hal_abstractions::PwmHardware;

pub const PWM_FREQ_MIN_HZ: u32 = 10;
pub const PWM_FREQ_MAX_HZ: u32 = 100_000;

/// Largest usable wrap value.
///
/// The full-on level is `wrap + 1` and has to fit the 16-bit compare
/// register, so the counter ceiling is one below `u16::MAX`.
pub const PWM_WRAP_MAX: u32 = 0xFFFE;

/// Largest integer clock divider.
pub const PWM_CLOCK_DIVIDER_MAX: u32 = 255;

/// Number of output channels the controller supports.
pub const OUTPUT_MAX_COUNT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwmError {
    /// The two pins of a channel pair are on different slices
    SliceMismatch { channel: u8, pin_a: u8, pin_b: u8 },
    /// Channel count is zero, odd, or above [`OUTPUT_MAX_COUNT`]
    InvalidChannelCount { count: usize },
    /// System clock cannot produce the requested frequency
    ClockTooSlow { sys_clock_hz: u32, frequency_hz: u32 },
    /// Required divider exceeds [`PWM_CLOCK_DIVIDER_MAX`]
    DividerOutOfRange { divider: u32 },
}

impl fmt::Display for PwmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SliceMismatch {
                channel,
                pin_a,
                pin_b,
            } => write!(
                f,
                "channels {}/{}: pins {} and {} are not on the same PWM slice",
                channel,
                channel + 1,
                pin_a,
                pin_b
            ),
            Self::InvalidChannelCount { count } => {
                write!(f, "invalid PWM channel count: {}", count)
            }
            Self::ClockTooSlow {
                sys_clock_hz,
                frequency_hz,
            } => write!(
                f,
                "system clock {} Hz too slow for {} Hz PWM",
                sys_clock_hz, frequency_hz
            ),
            Self::DividerOutOfRange { divider } => {
                write!(f, "PWM clock divider {} out of range", divider)
            }
        }
    }
}

impl core::error::Error for PwmError {}

/// Clamp a requested frequency into the supported range.
pub fn clamp_frequency(frequency_hz: u32) -> u32 {
    frequency_hz.clamp(PWM_FREQ_MIN_HZ, PWM_FREQ_MAX_HZ)
}

/// Hardware timer settings for one PWM frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmTiming {
    /// Target frequency after clamping
    pub frequency_hz: u32,
    pub sys_clock_hz: u32,
    pub clock_divider: u8,
    pub wrap: u16,
}

impl PwmTiming {
    /// Derive divider and wrap for phase-correct output at `frequency_hz`.
    ///
    /// The divider starts at 1 and is raised to the smallest value that
    /// brings wrap under [`PWM_WRAP_MAX`] before anything is committed.
    pub fn derive(frequency_hz: u32, sys_clock_hz: u32) -> Result<Self, PwmError> {
        let frequency_hz = clamp_frequency(frequency_hz);
        let too_slow = PwmError::ClockTooSlow {
            sys_clock_hz,
            frequency_hz,
        };
        let top_for = |divider: u32| -> Option<u32> {
            (sys_clock_hz / divider / frequency_hz / 2).checked_sub(1)
        };

        let mut divider = 1;
        let mut top = top_for(divider).ok_or(too_slow)?;
        if top > PWM_WRAP_MAX {
            divider = top / (PWM_WRAP_MAX + 1) + 1;
            if divider > PWM_CLOCK_DIVIDER_MAX {
                return Err(PwmError::DividerOutOfRange { divider });
            }
            top = top_for(divider).ok_or(too_slow)?;
        }
        if top == 0 {
            return Err(too_slow);
        }

        Ok(Self {
            frequency_hz,
            sys_clock_hz,
            clock_divider: divider as u8,
            wrap: top as u16,
        })
    }

    /// Level that holds the output permanently high.
    pub fn full_level(&self) -> u32 {
        self.wrap as u32 + 1
    }

    /// Frequency the hardware actually produces with these settings.
    pub fn actual_frequency_hz(&self) -> f32 {
        self.sys_clock_hz as f32 / (self.clock_divider as f32 * 2.0 * self.full_level() as f32)
    }
}

/// Compare level for a duty cycle in percent.
///
/// `>= 100` is `wrap + 1` (fully on), `<= 0` and NaN are 0.
pub fn level_for_duty(duty: f32, wrap: u16) -> u32 {
    let full = wrap as u32 + 1;
    if duty >= 100.0 {
        full
    } else if duty > 0.0 {
        ((duty * full as f32 / 100.0) as u32).min(full)
    } else {
        0
    }
}

/// Duty cycle in percent for a compare level.
pub fn duty_for_level(level: u32, wrap: u16) -> f32 {
    let full = wrap as u32 + 1;
    level.min(full) as f32 * 100.0 / full as f32
}

/// Drives the configured output channels through a [`PwmHardware`].
pub struct PwmDriver<H> {
    hw: H,
    pins: [u8; OUTPUT_MAX_COUNT],
    count: usize,
    timing: PwmTiming,
}

impl<H: PwmHardware> PwmDriver<H> {
    /// Validate the pin map and program every slice with `timing`.
    ///
    /// Every pair is checked before any pin is touched, so a bad map leaves
    /// the hardware unconfigured.
    pub fn new(mut hw: H, pins: &[u8], timing: PwmTiming) -> Result<Self, PwmError> {
        let count = pins.len();
        if count == 0 || count % 2 != 0 || count > OUTPUT_MAX_COUNT {
            return Err(PwmError::InvalidChannelCount { count });
        }

        for (pair, chunk) in pins.chunks_exact(2).enumerate() {
            let (pin_a, pin_b) = (chunk[0], chunk[1]);
            if hw.slice_of(pin_a) != hw.slice_of(pin_b) {
                return Err(PwmError::SliceMismatch {
                    channel: (pair * 2) as u8,
                    pin_a,
                    pin_b,
                });
            }
        }

        for chunk in pins.chunks_exact(2) {
            hw.attach_pin(chunk[0]);
            hw.attach_pin(chunk[1]);
            let slice = hw.slice_of(chunk[0]);
            hw.configure_slice(slice, timing.clock_divider, timing.wrap);
        }

        let mut map = [0; OUTPUT_MAX_COUNT];
        map[..count].copy_from_slice(pins);
        Ok(Self {
            hw,
            pins: map,
            count,
            timing,
        })
    }

    /// Derive timing for `frequency_hz` and set up the outputs.
    pub fn setup(
        hw: H,
        pins: &[u8],
        frequency_hz: u32,
        sys_clock_hz: u32,
    ) -> Result<Self, PwmError> {
        let timing = PwmTiming::derive(frequency_hz, sys_clock_hz)?;
        Self::new(hw, pins, timing)
    }

    /// Set `channel` to `duty` percent.
    ///
    /// # Panics
    ///
    /// If `channel` is not below [`channel_count`](Self::channel_count).
    pub fn set_duty_cycle(&mut self, channel: usize, duty: f32) {
        assert!(channel < self.count, "PWM channel {} out of range", channel);
        let level = level_for_duty(duty, self.timing.wrap);
        self.hw.set_level(self.pins[channel], level);
    }

    /// Current duty cycle of `channel` in percent, read back from hardware.
    ///
    /// # Panics
    ///
    /// If `channel` is not below [`channel_count`](Self::channel_count).
    pub fn get_duty_cycle(&self, channel: usize) -> f32 {
        assert!(channel < self.count, "PWM channel {} out of range", channel);
        duty_for_level(self.hw.level(self.pins[channel]), self.timing.wrap)
    }

    pub fn timing(&self) -> &PwmTiming {
        &self.timing
    }

    pub fn channel_count(&self) -> usize {
        self.count
    }

    pub fn pin(&self, channel: usize) -> u8 {
        self.pins[..self.count][channel]
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }
}
