//! Waveform table built once at startup.
//!
//! One table cycle is sampled at `k / N · 2π` for `k` in `[0, N)`:
//!
//! ```text
//! raw   = scale · sin(phase + phase_offset) + offset
//! value = clamp(32767 · raw + 32767, 0, 65535)
//! ```

use core::f64::consts::PI;

use heapless::Vec;

use crate::config::{ConfigError, MAX_RESOLUTION};

const MIDPOINT: f64 = 32767.0;
const FULL_SCALE: f64 = 65535.0;

/// Continuous shape the table is sampled from.
#[derive(Debug, Clone, Copy, PartialEq, defmt::Format)]
pub struct WaveformShape {
    pub scale: f64,
    pub offset: f64,
    /// Added to the sample phase, in radians.
    pub phase: f64,
}

impl WaveformShape {
    /// Rail-to-rail sine, minimum at step 0.
    pub const FULL_SCALE_SINE: Self = Self {
        scale: 1.0,
        offset: 0.0,
        phase: -0.5 * PI,
    };

    /// Cylinder pressure stand-in: 70% swing biased upwards, roughly 16711..62584.
    pub const CYLINDER_PRESSURE: Self = Self {
        scale: 0.7,
        offset: 0.21,
        phase: -0.5 * PI,
    };

    pub fn is_finite(&self) -> bool {
        self.scale.is_finite() && self.offset.is_finite() && self.phase.is_finite()
    }

    /// Unquantized level at `phase` radians.
    pub fn level(&self, phase: f64) -> f64 {
        self.scale * libm::sin(phase + self.phase) + self.offset
    }

    fn quantize(raw: f64) -> u16 {
        let v = MIDPOINT * raw + MIDPOINT;
        // clamp first, truncation toward zero is then exact
        v.clamp(0.0, FULL_SCALE) as u16
    }
}

impl Default for WaveformShape {
    fn default() -> Self {
        Self::FULL_SCALE_SINE
    }
}

pub type Samples = Vec<u16, MAX_RESOLUTION>;

/// Immutable quantized waveform, one entry per step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformTable {
    samples: Samples,
}

impl WaveformTable {
    pub fn build(resolution: usize, shape: &WaveformShape) -> Result<Self, ConfigError> {
        if resolution == 0 {
            return Err(ConfigError::ZeroResolution);
        }
        if resolution > MAX_RESOLUTION {
            return Err(ConfigError::ResolutionTooLarge {
                requested: resolution,
                max: MAX_RESOLUTION,
            });
        }
        if !shape.is_finite() {
            return Err(ConfigError::NonFiniteShape);
        }

        let mut samples = Samples::new();
        for k in 0..resolution {
            let phase = k as f64 / resolution as f64 * 2.0 * PI;
            let value = WaveformShape::quantize(shape.level(phase));
            samples.push(value).map_err(|_| ConfigError::ResolutionTooLarge {
                requested: resolution,
                max: MAX_RESOLUTION,
            })?;
        }

        Ok(Self { samples })
    }

    /// Number of steps per cycle. Never zero.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<u16> {
        self.samples.get(index).copied()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u16] {
        &self.samples
    }
}
