//! Plasma concentration-time curve for chart rendering.
//!
//! A two-phase closed-form model normalized to a peak of 100:
//! - Absorption: linear rise from 0 to the peak at Tmax
//! - Elimination: first-order exponential decay with `k = ln 2 / half-life`
//!
//! Sampled every 0.5 h over a 24 h horizon (49 samples).

use crate::{Error, Pharmacokinetics, Result};
use std::f64::consts::LN_2;

/// Normalized maximum concentration
pub const CMAX: f64 = 100.0;

/// Curve horizon in hours
pub const HORIZON_HOURS: f64 = 24.0;

/// Distance between samples in hours
pub const STEP_HOURS: f64 = 0.5;

/// Number of samples from 0 to 24 h inclusive
pub const SAMPLE_COUNT: usize = 49;

/// Tmax used when a drug has no recorded value
pub const DEFAULT_TMAX_HOURS: f64 = 2.0;

/// Half-life used when a drug has no recorded value
pub const DEFAULT_HALF_LIFE_HOURS: f64 = 6.0;

/// Validated curve parameters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurveParams {
    tmax: f64,
    half_life: f64,
}

fn require_positive(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::Validation(format!(
            "{} must be a positive number of hours, got {}",
            name, value
        )))
    }
}

impl CurveParams {
    /// Build parameters from Tmax and half-life, both in hours and > 0
    pub fn new(tmax: f64, half_life: f64) -> Result<Self> {
        Ok(Self {
            tmax: require_positive("peak_concentration_time", tmax)?,
            half_life: require_positive("half_life", half_life)?,
        })
    }

    /// Build parameters from a drug's PK record
    ///
    /// Absent values fall back to [`DEFAULT_TMAX_HOURS`] and
    /// [`DEFAULT_HALF_LIFE_HOURS`]. Values that are present but zero,
    /// negative or non-finite are rejected.
    pub fn from_pharmacokinetics(pk: Option<&Pharmacokinetics>) -> Result<Self> {
        let tmax = pk
            .and_then(|p| p.peak_concentration_time)
            .unwrap_or(DEFAULT_TMAX_HOURS);
        let half_life = pk
            .and_then(|p| p.half_life)
            .unwrap_or(DEFAULT_HALF_LIFE_HOURS);
        Self::new(tmax, half_life)
    }

    pub fn tmax(&self) -> f64 {
        self.tmax
    }

    pub fn half_life(&self) -> f64 {
        self.half_life
    }

    /// Elimination rate constant (1/h)
    pub fn elimination_rate(&self) -> f64 {
        LN_2 / self.half_life
    }

    /// Concentration (percent of peak) at `t` hours after the dose
    pub fn concentration_at(&self, t: f64) -> f64 {
        let concentration = if t <= self.tmax {
            CMAX * (t / self.tmax)
        } else {
            CMAX * (-self.elimination_rate() * (t - self.tmax)).exp()
        };
        concentration.max(0.0)
    }

    /// Lazily sample the curve over the fixed horizon
    pub fn curve(&self) -> PkCurve {
        PkCurve {
            params: *self,
            next: 0,
        }
    }
}

/// One point on the curve
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub time_hours: f64,
    pub concentration: f64,
}

impl Sample {
    /// Axis label every 4 hours ("0h", "4h", ..., "24h")
    pub fn axis_label(&self) -> Option<String> {
        if self.time_hours.fract() == 0.0 && (self.time_hours as u32) % 4 == 0 {
            Some(format!("{}h", self.time_hours as u32))
        } else {
            None
        }
    }
}

/// Iterator over the 49 curve samples
///
/// Cloning yields an independent iterator, so a curve can be replayed.
#[derive(Clone, Debug)]
pub struct PkCurve {
    params: CurveParams,
    next: usize,
}

impl Iterator for PkCurve {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        if self.next >= SAMPLE_COUNT {
            return None;
        }
        // Index-derived time keeps grid points exact (no accumulated drift)
        let time_hours = self.next as f64 * STEP_HOURS;
        self.next += 1;
        Some(Sample {
            time_hours,
            concentration: self.params.concentration_at(time_hours),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = SAMPLE_COUNT.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PkCurve {}
