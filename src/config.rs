// Centralize all configuration constants
use crate::timing::{StepTiming, TimingConfig, TimingPolicy};
use crate::waveform::WaveformShape;

pub const UART_BAUDRATE: u32 = 2_500_000;

// Engine speed. One table cycle spans a full four-stroke cam cycle (two crank turns).
pub const ENGINE_RPM: u32 = 400;
pub const REVOLUTIONS_PER_CYCLE: u32 = 2;

// 1440 steps = 0.25° per step over one table cycle
pub const TABLE_RESOLUTION: usize = 1440;
pub const MAX_RESOLUTION: usize = 4096;

// Receiver-side clock the timing constant is expressed in
pub const REFERENCE_CLOCK_HZ: u32 = 40_000_000;

pub const WAVEFORM: WaveformShape = WaveformShape::FULL_SCALE_SINE;
pub const TIMING_POLICY: TimingPolicy = TimingPolicy::DriftCompensated;
pub const FLUSH_EACH_FRAME: bool = true;

// Stats are reported every N table cycles (0 disables reporting)
pub const STATS_REPORT_CYCLES: u32 = 50;

/// Configuration errors. All of them are detected before the first frame is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ConfigError {
    ZeroResolution,
    ResolutionTooLarge { requested: usize, max: usize },
    ZeroSpeed,
    ZeroRevolutionsPerCycle,
    ZeroReferenceClock,
    /// Step is shorter than one timer tick or one reference clock tick.
    StepTooShort,
    /// Timing constant does not fit the 16-bit wire field.
    TimingConstantOverflow { ticks: u64 },
    NonFiniteShape,
}

/// Startup configuration handed to the emitter. Immutable for the run.
#[derive(Debug, Clone, Copy, PartialEq, defmt::Format)]
pub struct EmulatorConfig {
    pub rpm: u32,
    pub revolutions_per_cycle: u32,
    pub resolution: usize,
    pub reference_clock_hz: u32,
    pub shape: WaveformShape,
    pub policy: TimingPolicy,
    pub flush_each_frame: bool,
    pub stats_report_cycles: u32,
}

impl EmulatorConfig {
    pub const DEFAULT: Self = Self {
        rpm: ENGINE_RPM,
        revolutions_per_cycle: REVOLUTIONS_PER_CYCLE,
        resolution: TABLE_RESOLUTION,
        reference_clock_hz: REFERENCE_CLOCK_HZ,
        shape: WAVEFORM,
        policy: TIMING_POLICY,
        flush_each_frame: FLUSH_EACH_FRAME,
        stats_report_cycles: STATS_REPORT_CYCLES,
    };

    pub fn timing(&self) -> TimingConfig {
        TimingConfig {
            rpm: self.rpm,
            revolutions_per_cycle: self.revolutions_per_cycle,
            steps_per_cycle: self.resolution,
            reference_clock_hz: self.reference_clock_hz,
        }
    }

    /// Validate everything and derive the per-run constants.
    pub fn plan(&self) -> Result<RunPlan, ConfigError> {
        if self.resolution > MAX_RESOLUTION {
            return Err(ConfigError::ResolutionTooLarge {
                requested: self.resolution,
                max: MAX_RESOLUTION,
            });
        }
        if !self.shape.is_finite() {
            return Err(ConfigError::NonFiniteShape);
        }
        let timing = self.timing().resolve()?;

        Ok(RunPlan {
            timing,
            policy: self.policy,
            flush_each_frame: self.flush_each_frame,
            stats_report_cycles: self.stats_report_cycles,
        })
    }
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Validated, derived run parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct RunPlan {
    pub timing: StepTiming,
    pub policy: TimingPolicy,
    pub flush_each_frame: bool,
    pub stats_report_cycles: u32,
}
