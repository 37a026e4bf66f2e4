//! Step timing: nominal step period, the wire timing constant, and the pacer
//! that turns measured elapsed time into a corrective wait.
//!
//! The nominal step is `60 · revolutions_per_cycle / (rpm · steps_per_cycle)`
//! seconds. It is kept as an exact ratio of timer ticks so that a step which is
//! not a whole number of ticks (208.33 µs at the bench setup) still averages
//! out exactly over a run.

use embassy_time::{Duration, Instant, TICK_HZ};

use crate::config::ConfigError;

const SECONDS_PER_MINUTE: u128 = 60;

/// Speed and resolution, as handed over at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct TimingConfig {
    pub rpm: u32,
    pub revolutions_per_cycle: u32,
    pub steps_per_cycle: usize,
    pub reference_clock_hz: u32,
}

/// Derived per-run timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct StepTiming {
    /// Step duration in reference clock ticks, sent as the first frame field.
    pub timing_constant: u16,
    pub period: StepPeriod,
}

impl TimingConfig {
    pub fn resolve(&self) -> Result<StepTiming, ConfigError> {
        if self.steps_per_cycle == 0 {
            return Err(ConfigError::ZeroResolution);
        }
        if self.rpm == 0 {
            return Err(ConfigError::ZeroSpeed);
        }
        if self.revolutions_per_cycle == 0 {
            return Err(ConfigError::ZeroRevolutionsPerCycle);
        }
        if self.reference_clock_hz == 0 {
            return Err(ConfigError::ZeroReferenceClock);
        }

        // step [s] = cycle_num / steps_den
        let cycle_num = SECONDS_PER_MINUTE * self.revolutions_per_cycle as u128;
        let steps_den = self.rpm as u128 * self.steps_per_cycle as u128;

        let constant = self.reference_clock_hz as u128 * cycle_num / steps_den;
        if constant == 0 {
            return Err(ConfigError::StepTooShort);
        }
        let timing_constant = u16::try_from(constant).map_err(|_| {
            ConfigError::TimingConstantOverflow {
                ticks: u64::try_from(constant).unwrap_or(u64::MAX),
            }
        })?;

        let period = StepPeriod::from_ratio(TICK_HZ as u128 * cycle_num, steps_den)
            .ok_or(ConfigError::StepTooShort)?;

        Ok(StepTiming {
            timing_constant,
            period,
        })
    }
}

/// Step length in timer ticks as `whole + num / den`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct StepPeriod {
    whole: u64,
    num: u64,
    den: u64,
}

impl StepPeriod {
    /// `None` if the step is shorter than one tick or does not fit.
    pub fn from_ratio(ticks_num: u128, ticks_den: u128) -> Option<Self> {
        if ticks_den == 0 {
            return None;
        }
        let whole = u64::try_from(ticks_num / ticks_den).ok()?;
        if whole == 0 {
            return None;
        }
        // Reduce so the remainder accumulator stays in u64.
        let g = gcd(ticks_num % ticks_den, ticks_den);
        let num = u64::try_from((ticks_num % ticks_den) / g).ok()?;
        let den = u64::try_from(ticks_den / g).ok()?;
        Some(Self { whole, num, den })
    }

    pub const fn from_ticks(ticks: u64) -> Self {
        Self {
            whole: ticks,
            num: 0,
            den: 1,
        }
    }

    /// Step length in nanoseconds, truncated.
    pub fn as_nanos(&self) -> u64 {
        let ticks_x_den = self.whole as u128 * self.den as u128 + self.num as u128;
        (ticks_x_den * 1_000_000_000 / (TICK_HZ as u128 * self.den as u128)) as u64
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.max(1)
}

/// How the loop paces itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum TimingPolicy {
    /// Sleep a full step every iteration. Encoding and transmission time is
    /// not subtracted, so the stream runs slow by exactly that overhead.
    OpenLoop,
    /// Subtract the time already spent in the step from the wait.
    DriftCompensated,
}

/// Pacer decision for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// Suspend for this long before the next step.
    Sleep(Duration),
    /// The step already took at least a full period; go on immediately.
    /// Carries how far past the period it ran.
    Overrun(Duration),
}

/// Timing controller. Owns the drift state (the anchor instant).
///
/// The anchor is the instant the current step was scheduled to start. After a
/// sleep the next anchor is the scheduled wake-up, not the measurement, so
/// late wake-ups are paid back on the following step. After an overrun the
/// anchor resets to the measurement: the lost time is absorbed, never caught
/// up over several steps.
pub struct Pacer {
    policy: TimingPolicy,
    period: StepPeriod,
    anchor: Instant,
    carry: u64,
}

impl Pacer {
    pub fn new(policy: TimingPolicy, period: StepPeriod, start: Instant) -> Self {
        Self {
            policy,
            period,
            anchor: start,
            carry: 0,
        }
    }

    /// Re-arm at the start of a run.
    pub fn restart(&mut self, start: Instant) {
        self.anchor = start;
        self.carry = 0;
    }

    pub fn policy(&self) -> TimingPolicy {
        self.policy
    }

    /// Length of the next step, distributing the fractional tick.
    fn next_step(&mut self) -> Duration {
        let mut ticks = self.period.whole;
        self.carry += self.period.num;
        if self.carry >= self.period.den {
            self.carry -= self.period.den;
            ticks += 1;
        }
        Duration::from_ticks(ticks)
    }

    /// Call right after the frame has been handed off (and flushed, if the
    /// link confirms transmission) with the current time.
    pub fn pace(&mut self, now: Instant) -> Pace {
        let step = self.next_step();

        match self.policy {
            TimingPolicy::OpenLoop => {
                self.anchor = now;
                Pace::Sleep(step)
            }
            TimingPolicy::DriftCompensated => {
                let busy = now
                    .checked_duration_since(self.anchor)
                    .unwrap_or(Duration::from_ticks(0));
                if busy < step {
                    let wait = step - busy;
                    self.anchor = now + wait;
                    Pace::Sleep(wait)
                } else {
                    self.anchor = now;
                    Pace::Overrun(busy - step)
                }
            }
        }
    }
}
