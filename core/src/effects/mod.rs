//! Per-channel output effects
//!
//! An effect is a time-domain transform between the commanded duty cycle of
//! a channel and the value written to the PWM hardware. Each transform
//! implements [`Transform`]; [`EFFECTS`] maps names to transforms so that
//! configuration and command handling can validate a name without knowing
//! the concrete types.
//!
//! A channel owns at most one [`EffectContext`] through its [`EffectSlot`].
//! Contexts are created by parsing an argument string and evaluated once per
//! control-loop tick without allocating.

mod fade;
mod pulse;

pub use fade::{FadeContext, FadeMode};
pub use pulse::PulseContext;

use core::fmt;

use heapless::String;

/// Longest rendered effect argument string.
pub const EFFECT_ARGS_MAX: usize = 64;

pub type EffectArgs = String<EFFECT_ARGS_MAX>;

/// A named transform over a channel's duty cycle.
pub trait Transform: Sized {
    /// Registry name
    const NAME: &'static str;

    /// Build a context from a comma-separated argument string.
    ///
    /// Never fails: missing or malformed fields take their defaults.
    fn parse(args: &str) -> Self;

    /// Render the arguments back in the form `parse` accepts.
    fn args(&self) -> EffectArgs;

    /// Output duty (0..=100) for this tick.
    ///
    /// `now_us` must not decrease between calls.
    fn evaluate(&mut self, now_us: u64, pwm: u8, power: bool) -> u8;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EffectKind {
    Fade,
    Pulse,
}

/// Registry entry
#[derive(Debug, Clone, Copy)]
pub struct EffectEntry {
    pub name: &'static str,
    pub kind: EffectKind,
}

/// All known effects.
pub const EFFECTS: &[EffectEntry] = &[
    EffectEntry {
        name: FadeContext::NAME,
        kind: EffectKind::Fade,
    },
    EffectEntry {
        name: PulseContext::NAME,
        kind: EffectKind::Pulse,
    },
];

/// Name that clears a channel's effect.
pub const NO_EFFECT: &str = "none";

/// Effect name not found in [`EFFECTS`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnknownEffect;

impl fmt::Display for UnknownEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown effect")
    }
}

impl core::error::Error for UnknownEffect {}

impl EffectKind {
    /// Case-insensitive registry lookup.
    pub fn lookup(name: &str) -> Option<Self> {
        let name = name.trim();
        EFFECTS
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.kind)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Fade => FadeContext::NAME,
            Self::Pulse => PulseContext::NAME,
        }
    }

    pub fn parse(self, args: &str) -> EffectContext {
        match self {
            Self::Fade => EffectContext::Fade(FadeContext::parse(args)),
            Self::Pulse => EffectContext::Pulse(PulseContext::parse(args)),
        }
    }
}

/// State of one active effect on one channel
#[derive(Debug, Clone, PartialEq)]
pub enum EffectContext {
    Fade(FadeContext),
    Pulse(PulseContext),
}

impl EffectContext {
    pub fn kind(&self) -> EffectKind {
        match self {
            Self::Fade(_) => EffectKind::Fade,
            Self::Pulse(_) => EffectKind::Pulse,
        }
    }

    pub fn args(&self) -> EffectArgs {
        match self {
            Self::Fade(c) => c.args(),
            Self::Pulse(c) => c.args(),
        }
    }

    pub fn evaluate(&mut self, now_us: u64, pwm: u8, power: bool) -> u8 {
        match self {
            Self::Fade(c) => c.evaluate(now_us, pwm, power),
            Self::Pulse(c) => c.evaluate(now_us, pwm, power),
        }
    }
}

/// A channel's effect, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectSlot {
    active: Option<EffectContext>,
}

impl EffectSlot {
    pub const fn new() -> Self {
        Self { active: None }
    }

    /// Replace the effect by name. `"none"` or an empty name clears it.
    ///
    /// An unknown name leaves the current effect in place.
    pub fn assign(&mut self, name: &str, args: &str) -> Result<(), UnknownEffect> {
        let name = name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case(NO_EFFECT) {
            self.clear();
            return Ok(());
        }
        let kind = EffectKind::lookup(name).ok_or(UnknownEffect)?;
        self.set(kind, args);
        Ok(())
    }

    /// Discard any current context and start `kind` from fresh state.
    pub fn set(&mut self, kind: EffectKind, args: &str) {
        self.active = Some(kind.parse(args));
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    pub fn active(&self) -> Option<&EffectContext> {
        self.active.as_ref()
    }

    /// Run the active effect, or gate `pwm` by `power` when there is none.
    pub fn evaluate(&mut self, now_us: u64, pwm: u8, power: bool) -> u8 {
        match &mut self.active {
            Some(ctx) => ctx.evaluate(now_us, pwm, power),
            None if power => pwm,
            None => 0,
        }
    }
}

/// Parse up to `N` comma-separated durations in seconds.
///
/// A field that is missing, malformed, negative or not finite keeps its
/// default.
pub(crate) fn parse_seconds<const N: usize>(args: &str, defaults: [f32; N]) -> [f32; N] {
    let mut out = defaults;
    for (slot, field) in out.iter_mut().zip(args.split(',')) {
        if let Ok(v) = field.trim().parse::<f32>() {
            if v.is_finite() && v >= 0.0 {
                *slot = v;
            }
        }
    }
    out
}

pub(crate) fn seconds_to_micros(secs: f32) -> u64 {
    (secs as f64 * 1_000_000.0) as u64
}
