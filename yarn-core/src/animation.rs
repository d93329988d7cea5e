//! Periodic oscillation of selected parameters.
//!
//! Each animatable parameter has a channel that is either
//! [`ChannelState::Static`] (the last manual value stands) or
//! [`ChannelState::Oscillating`]. An oscillating channel overwrites its
//! parameter on every [`AnimationDriver::apply`], so manual edits made in
//! the same frame lose.

use std::f64::consts::TAU;

use crate::params::{FiberParams, ParamId, ParamKind, ParamValue};

/// `mid + amp * sin(2π (time mod period) / period)`.
///
/// The phase is computed in `f64` so long-running clocks keep their
/// precision. A non-positive period pins the value to the midpoint.
pub fn oscillate(time: f64, min: f32, max: f32, period: f32) -> f32 {
    let (lo, hi) = (min.min(max), min.max(max));
    let mid = 0.5 * (f64::from(min) + f64::from(max));
    let amp = 0.5 * (f64::from(max) - f64::from(min));
    let period = f64::from(period);
    if period <= 0.0 || !period.is_finite() || !time.is_finite() {
        return mid as f32;
    }
    let phase = TAU * time.rem_euclid(period) / period;
    // Rounding to f32 must not step outside the declared range.
    ((mid + amp * phase.sin()) as f32).clamp(lo, hi)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ChannelState {
    #[default]
    Static,
    Oscillating,
}

/// One animatable parameter and the range it sweeps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnimationChannel {
    pub param: ParamId,
    pub state: ChannelState,
    pub min: f32,
    pub max: f32,
}

impl AnimationChannel {
    /// Channel sweeping the declared bounds of a float parameter.
    ///
    /// ### Returns
    /// `None` if `param` is not a float parameter.
    pub fn over_bounds(param: ParamId) -> Option<Self> {
        match param.spec().kind {
            ParamKind::Float { min, max, .. } => Some(Self {
                param,
                state: ChannelState::Static,
                min,
                max,
            }),
            _ => None,
        }
    }
}

/// Owns the animation channels and writes them into a [`FiberParams`].
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationDriver {
    channels: Vec<AnimationChannel>,
}

impl Default for AnimationDriver {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl AnimationDriver {
    /// Offset added to the lower twist bound of the twist channel.
    pub const TWIST_SWEEP_FLOOR: f32 = 0.5;

    pub fn new(channels: Vec<AnimationChannel>) -> Self {
        Self { channels }
    }

    /// The radius, twist, wiggle and migration channels, all static.
    pub fn with_defaults() -> Self {
        let channels = [
            ParamId::RadiusMax,
            ParamId::RadiusMin,
            ParamId::TwistRate,
            ParamId::HairWiggleStrength,
            ParamId::MigrationFrequency,
        ]
        .into_iter()
        .filter_map(AnimationChannel::over_bounds)
        .map(|mut channel| {
            if channel.param == ParamId::TwistRate {
                channel.min += Self::TWIST_SWEEP_FLOOR;
            }
            channel
        })
        .collect();
        Self { channels }
    }

    pub fn channels(&self) -> &[AnimationChannel] {
        &self.channels
    }

    pub fn channel(&self, param: ParamId) -> Option<&AnimationChannel> {
        self.channels.iter().find(|c| c.param == param)
    }

    /// State of `param`; parameters without a channel are static.
    pub fn state(&self, param: ParamId) -> ChannelState {
        self.channel(param).map_or(ChannelState::Static, |c| c.state)
    }

    /// Switches a channel between static and oscillating.
    ///
    /// ### Returns
    /// `false` if `param` has no channel.
    pub fn set_oscillating(&mut self, param: ParamId, oscillating: bool) -> bool {
        match self.channels.iter_mut().find(|c| c.param == param) {
            Some(channel) => {
                channel.state = if oscillating {
                    ChannelState::Oscillating
                } else {
                    ChannelState::Static
                };
                true
            }
            None => false,
        }
    }

    pub fn any_oscillating(&self) -> bool {
        self.channels.iter().any(|c| c.state == ChannelState::Oscillating)
    }

    /// Writes every oscillating channel into `params`.
    ///
    /// ### Parameters
    /// - `time` - Seconds since start.
    /// - `params` - Snapshot to update; `animation_period` is read from it.
    ///
    /// ### Returns
    /// How many parameters were written.
    pub fn apply(&self, time: f64, params: &mut FiberParams) -> usize {
        let period = params.animation_period;
        let mut written = 0;
        for channel in self.channels.iter().filter(|c| c.state == ChannelState::Oscillating) {
            let value = oscillate(time, channel.min, channel.max, period);
            params.set(channel.param, ParamValue::Float(value));
            written += 1;
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn oscillation_hits_mid_max_min() {
        assert_abs_diff_eq!(oscillate(0.0, 0.0, 2.0, 10.0), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(oscillate(2.5, 0.0, 2.0, 10.0), 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(oscillate(7.5, 0.0, 2.0, 10.0), 0.0, epsilon = 1e-6);
        // One full period later nothing changes.
        assert_abs_diff_eq!(oscillate(12.5, 0.0, 2.0, 10.0), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn degenerate_period_returns_midpoint() {
        assert_eq!(oscillate(3.0, 0.0, 2.0, 0.0), 1.0);
        assert_eq!(oscillate(3.0, 0.0, 2.0, -5.0), 1.0);
        assert_eq!(oscillate(f64::NAN, 0.0, 2.0, 10.0), 1.0);
    }

    #[test]
    fn default_channels_cover_declared_bounds() {
        let driver = AnimationDriver::with_defaults();
        assert_eq!(driver.channels().len(), 5);

        let twist = driver.channel(ParamId::TwistRate).unwrap();
        assert_eq!(twist.min, 0.5);
        assert_eq!(twist.max, 50.0);

        let radius = driver.channel(ParamId::RadiusMax).unwrap();
        assert_eq!((radius.min, radius.max), (0.001, 0.1));
        assert!(!driver.any_oscillating());
    }

    #[test]
    fn static_channels_leave_params_alone() {
        let driver = AnimationDriver::with_defaults();
        let mut params = FiberParams::default();
        assert_eq!(driver.apply(2.5, &mut params), 0);
        assert_eq!(params, FiberParams::default());
    }

    #[test]
    fn oscillation_wins_over_manual_edits() {
        let mut driver = AnimationDriver::with_defaults();
        assert!(driver.set_oscillating(ParamId::HairWiggleStrength, true));
        assert_eq!(driver.state(ParamId::HairWiggleStrength), ChannelState::Oscillating);

        let mut params = FiberParams::default();
        params.hair_wiggle_strength = 0.1;
        assert_eq!(driver.apply(2.5, &mut params), 1);
        assert_abs_diff_eq!(params.hair_wiggle_strength, 2.0, epsilon = 1e-6);

        assert!(driver.set_oscillating(ParamId::HairWiggleStrength, false));
        params.hair_wiggle_strength = 0.1;
        driver.apply(7.5, &mut params);
        assert_eq!(params.hair_wiggle_strength, 0.1);
    }

    #[test]
    fn unanimatable_params_have_no_channel() {
        let mut driver = AnimationDriver::with_defaults();
        assert!(!driver.set_oscillating(ParamId::FiberCount, true));
        assert_eq!(driver.state(ParamId::FiberCount), ChannelState::Static);
        assert!(AnimationChannel::over_bounds(ParamId::EnableMigration).is_none());
    }
}
