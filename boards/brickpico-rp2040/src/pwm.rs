//! RP2040 PWM slices behind [`PwmHardware`]

use embassy_rp::pwm::{Config, Pwm};
use hal_abstractions::PwmHardware;

/// PWM slices on the RP2040
pub const SLICE_COUNT: usize = 8;

/// All eight PWM slices, each driving its A and B pins.
///
/// embassy-rp routes the pins when a slice is created with
/// [`Pwm::new_output_ab`]; the bank keeps a copy of every slice's config so
/// single compare levels can be changed without touching the other output.
pub struct RpPwmBank {
    slices: [Pwm<'static>; SLICE_COUNT],
    configs: [Config; SLICE_COUNT],
    attached: u32,
}

impl RpPwmBank {
    pub fn new(slices: [Pwm<'static>; SLICE_COUNT]) -> Self {
        Self {
            slices,
            configs: core::array::from_fn(|_| Config::default()),
            attached: 0,
        }
    }

    fn slice_index(pin: u8) -> usize {
        usize::from((pin >> 1) & 7)
    }
}

impl PwmHardware for RpPwmBank {
    fn slice_of(&self, pin: u8) -> u8 {
        (pin >> 1) & 7
    }

    fn attach_pin(&mut self, pin: u8) {
        defmt::debug!(
            "PWM: GPIO{} -> slice {} output {=str}",
            pin,
            self.slice_of(pin),
            if pin & 1 == 0 { "A" } else { "B" }
        );
        self.attached |= 1 << (pin & 31);
    }

    fn configure_slice(&mut self, slice: u8, clock_divider: u8, wrap: u16) {
        let index = usize::from(slice);
        let cfg = &mut self.configs[index];
        cfg.divider = clock_divider.into();
        cfg.top = wrap;
        cfg.phase_correct = true;
        cfg.compare_a = 0;
        cfg.compare_b = 0;
        cfg.enable = true;
        self.slices[index].set_config(cfg);
    }

    fn set_level(&mut self, pin: u8, level: u32) {
        debug_assert!(self.attached & (1 << (pin & 31)) != 0);
        let index = Self::slice_index(pin);
        let level = u16::try_from(level).unwrap_or(u16::MAX);
        let cfg = &mut self.configs[index];
        if pin & 1 == 0 {
            cfg.compare_a = level;
        } else {
            cfg.compare_b = level;
        }
        self.slices[index].set_config(cfg);
    }

    fn level(&self, pin: u8) -> u32 {
        let cfg = &self.configs[Self::slice_index(pin)];
        u32::from(if pin & 1 == 0 {
            cfg.compare_a
        } else {
            cfg.compare_b
        })
    }
}
