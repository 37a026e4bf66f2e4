//! The emission loop.
//!
//! ```text
//!  ┌──────────────┐   sample   ┌─────────────┐  frame   ┌───────────┐
//!  │  Sequencer   │──────────▶│ encode [c,v] │────────▶│ link sink │
//!  └──────▲───────┘            └─────────────┘          └─────┬─────┘
//!         │ advance                                           │ write (+flush)
//!         │            ┌────────┐   now   ┌──────────┐         │
//!         └────────────│ sleep  │◀────────│  Pacer   │◀────────┘
//!                      └────────┘  wait   └──────────┘
//! ```
//!
//! Time is read right after the link call returns and before the wait is
//! decided, so transmission cost is part of what the pacer compensates for.
//! The stop flag is checked once per step, never during a wait.

use embassy_time::{Duration, Instant, TICK_HZ};
use embedded_io_async::Write;
use portable_atomic::{AtomicBool, Ordering};

use crate::config::RunPlan;
use crate::drivers::crank_link::{Frame, FrameTransmitter, LinkError};
use crate::sequencer::Sequencer;
use crate::timing::{Pace, Pacer, StepPeriod, TimingPolicy};
use crate::waveform::WaveformTable;

/// Time source and suspension point for the loop.
#[allow(async_fn_in_trait)]
pub trait Clock {
    fn now(&self) -> Instant;
    async fn sleep(&mut self, duration: Duration);
}

/// Totals for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, defmt::Format)]
pub struct RunSummary {
    pub frames: u64,
    pub cycles: u32,
    pub overruns: u32,
}

/// Per-window counters behind the periodic stats line.
struct EmitStats {
    total: RunSummary,
    window_start: Instant,
    window_frames: u32,
    window_overruns: u32,
    max_late: Duration,
}

impl EmitStats {
    fn new(start: Instant) -> Self {
        Self {
            total: RunSummary::default(),
            window_start: start,
            window_frames: 0,
            window_overruns: 0,
            max_late: Duration::from_ticks(0),
        }
    }

    fn record_frame(&mut self) {
        self.total.frames += 1;
        self.window_frames += 1;
    }

    fn record_overrun(&mut self, late: Duration) {
        self.total.overruns += 1;
        self.window_overruns += 1;
        if late > self.max_late {
            self.max_late = late;
        }
    }

    /// Log the window and start a new one.
    fn report(&mut self, now: Instant) {
        let elapsed = now
            .checked_duration_since(self.window_start)
            .unwrap_or(Duration::from_ticks(0));
        let mean_step_ns = elapsed.as_ticks() as u128 * 1_000_000_000
            / (TICK_HZ as u128 * self.window_frames.max(1) as u128);
        let mean_step_ns = mean_step_ns as u64;

        if self.window_overruns > 0 {
            warn!(
                "Emitter stats: cycles={}, frames={}, mean_step={}ns, overruns={} (max late {}us)",
                self.total.cycles,
                self.total.frames,
                mean_step_ns,
                self.window_overruns,
                self.max_late.as_micros()
            );
        } else {
            info!(
                "Emitter stats: cycles={}, frames={}, mean_step={}ns, no overruns",
                self.total.cycles,
                self.total.frames,
                mean_step_ns
            );
        }

        self.window_start = now;
        self.window_frames = 0;
        self.window_overruns = 0;
        self.max_late = Duration::from_ticks(0);
    }
}

/// Everything the loop owns for one run. No loop state lives in statics.
pub struct RunContext<'t, W: Write> {
    sequencer: Sequencer<'t>,
    pacer: Pacer,
    transmitter: FrameTransmitter<W>,
    timing_constant: u16,
    period: StepPeriod,
    stats_report_cycles: u32,
}

impl<'t, W: Write> RunContext<'t, W> {
    pub fn new(table: &'t WaveformTable, plan: &RunPlan, sink: W) -> Self {
        Self {
            sequencer: Sequencer::new(table),
            pacer: Pacer::new(plan.policy, plan.timing.period, Instant::from_ticks(0)),
            transmitter: FrameTransmitter::new(sink, plan.flush_each_frame),
            timing_constant: plan.timing.timing_constant,
            period: plan.timing.period,
            stats_report_cycles: plan.stats_report_cycles,
        }
    }

    pub fn policy(&self) -> TimingPolicy {
        self.pacer.policy()
    }
}

/// Stream frames until `stop` is raised or the link fails.
///
/// Consumes the context: the sink is released exactly once when this returns,
/// whichever way it returns. On a requested stop the sink is drained first so
/// the last frame is complete on the wire.
pub async fn run<W: Write, C: Clock>(
    mut ctx: RunContext<'_, W>,
    clock: &mut C,
    stop: &AtomicBool,
) -> Result<RunSummary, LinkError<W::Error>> {
    let start = clock.now();
    ctx.pacer.restart(start);
    let mut stats = EmitStats::new(start);

    info!(
        "Emitter started: c={}, step={}ns, policy={}, flush={}",
        ctx.timing_constant,
        ctx.period.as_nanos(),
        ctx.policy(),
        ctx.transmitter.flushes_each_frame()
    );

    let streamed = stream(&mut ctx, clock, stop, &mut stats).await;
    let outcome = match streamed {
        Ok(()) => ctx.transmitter.drain().await.map(|()| stats.total),
        Err(e) => Err(e),
    };

    match &outcome {
        Ok(summary) => info!(
            "Emitter stopped: {} frames, {} cycles, {} overruns",
            summary.frames,
            summary.cycles,
            summary.overruns
        ),
        Err(_) => error!(
            "Emitter aborted on link failure after {} frames",
            stats.total.frames
        ),
    }

    outcome
}

async fn stream<W: Write, C: Clock>(
    ctx: &mut RunContext<'_, W>,
    clock: &mut C,
    stop: &AtomicBool,
    stats: &mut EmitStats,
) -> Result<(), LinkError<W::Error>> {
    loop {
        if stop.load(Ordering::Acquire) {
            return Ok(());
        }

        let frame = Frame::new(ctx.timing_constant, ctx.sequencer.current());
        ctx.transmitter.send(&frame).await?;
        stats.record_frame();

        let now = clock.now();
        match ctx.pacer.pace(now) {
            Pace::Sleep(wait) => clock.sleep(wait).await,
            Pace::Overrun(late) => stats.record_overrun(late),
        }

        if ctx.sequencer.advance() {
            stats.total.cycles += 1;
            if ctx.stats_report_cycles != 0 && stats.total.cycles % ctx.stats_report_cycles == 0 {
                stats.report(now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmulatorConfig;
    use crate::waveform::WaveformShape;
    use embassy_futures::block_on;
    use embedded_io_async::{ErrorKind, ErrorType};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::vec::Vec;

    /// Simulated time in ticks, shared by the clock and the sink.
    #[derive(Clone, Default)]
    struct SimTime(Rc<Cell<u64>>);

    impl SimTime {
        fn advance(&self, ticks: u64) {
            self.0.set(self.0.get() + ticks);
        }
    }

    struct SimClock {
        time: SimTime,
        sleeps: Rc<Cell<u32>>,
    }

    impl Clock for SimClock {
        fn now(&self) -> Instant {
            Instant::from_ticks(self.time.0.get())
        }

        async fn sleep(&mut self, duration: Duration) {
            self.sleeps.set(self.sleeps.get() + 1);
            self.time.advance(duration.as_ticks());
        }
    }

    #[derive(Default)]
    struct Wire {
        // (tick the write started, bytes)
        frames: RefCell<Vec<(u64, [u8; 4])>>,
        releases: Cell<u32>,
        writes_after_release: Cell<u32>,
    }

    /// Sink that burns simulated time per frame and raises `stop` after
    /// `limit` frames.
    struct SimSink {
        time: SimTime,
        wire: Rc<Wire>,
        overheads: Vec<u64>,
        limit: usize,
        stop: Rc<AtomicBool>,
        fail_at: Option<usize>,
    }

    impl ErrorType for SimSink {
        type Error = ErrorKind;
    }

    impl Write for SimSink {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            if self.wire.releases.get() > 0 {
                self.wire
                    .writes_after_release
                    .set(self.wire.writes_after_release.get() + 1);
            }
            let sent = self.wire.frames.borrow().len();
            if self.fail_at == Some(sent) {
                return Err(ErrorKind::NotConnected);
            }
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(buf);
            self.wire.frames.borrow_mut().push((self.time.0.get(), bytes));
            self.time.advance(self.overheads[sent % self.overheads.len()]);
            if sent + 1 >= self.limit {
                self.stop.store(true, Ordering::Release);
            }
            Ok(buf.len())
        }

        async fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    impl Drop for SimSink {
        fn drop(&mut self) {
            self.wire.releases.set(self.wire.releases.get() + 1);
        }
    }

    struct Harness {
        wire: Rc<Wire>,
        sleeps: u32,
        result: Result<RunSummary, LinkError<ErrorKind>>,
    }

    fn simulate(plan: RunPlan, overheads: &[u64], limit: usize, fail_at: Option<usize>) -> Harness {
        let table = WaveformTable::build(1440, &WaveformShape::FULL_SCALE_SINE).unwrap();
        let time = SimTime::default();
        time.advance(1_000);
        let wire = Rc::new(Wire::default());
        let stop = Rc::new(AtomicBool::new(false));
        let sleeps = Rc::new(Cell::new(0));

        let sink = SimSink {
            time: time.clone(),
            wire: wire.clone(),
            overheads: overheads.to_vec(),
            limit,
            stop: stop.clone(),
            fail_at,
        };
        let mut clock = SimClock {
            time,
            sleeps: sleeps.clone(),
        };

        let ctx = RunContext::new(&table, &plan, sink);
        let result = block_on(run(ctx, &mut clock, &stop));
        Harness {
            wire,
            sleeps: sleeps.get(),
            result,
        }
    }

    fn bench_plan() -> RunPlan {
        EmulatorConfig::DEFAULT.plan().unwrap()
    }

    fn mean_interval(wire: &Wire) -> f64 {
        let frames = wire.frames.borrow();
        let first = frames.first().unwrap().0;
        let last = frames.last().unwrap().0;
        (last - first) as f64 / (frames.len() - 1) as f64
    }

    fn nominal_ticks(plan: &RunPlan) -> f64 {
        plan.timing.period.as_nanos() as f64 * TICK_HZ as f64 / 1e9
    }

    #[test]
    fn test_drift_compensated_mean_converges_to_step() {
        let plan = bench_plan();
        // jittery transmit cost, always below the ~208 tick step
        let h = simulate(plan, &[12, 95, 40, 150, 3, 71], 20_000, None);

        assert_eq!(h.result.unwrap().frames, 20_000);
        let mean = mean_interval(&h.wire);
        assert!(
            (mean - nominal_ticks(&plan)).abs() < 1.0,
            "mean interval {} vs nominal {}",
            mean,
            nominal_ticks(&plan)
        );
    }

    #[test]
    fn test_open_loop_runs_slow_by_overhead() {
        let plan = RunPlan {
            policy: TimingPolicy::OpenLoop,
            ..bench_plan()
        };
        let h = simulate(plan, &[50], 2_000, None);
        let mean = mean_interval(&h.wire);
        assert!((mean - (nominal_ticks(&plan) + 50.0)).abs() < 1.0, "mean {}", mean);
    }

    #[test]
    fn test_overhead_above_step_never_sleeps() {
        let plan = bench_plan();
        let h = simulate(plan, &[209, 300, 250], 3_000, None);

        let summary = h.result.unwrap();
        assert_eq!(h.sleeps, 0);
        assert_eq!(summary.overruns, 3_000);
        // steady stream at the best achievable rate
        assert!((mean_interval(&h.wire) - (209.0 + 300.0 + 250.0) / 3.0).abs() < 1.0);
    }

    #[test]
    fn test_every_frame_carries_bench_timing_constant_in_table_order() {
        let plan = bench_plan();
        let table = WaveformTable::build(1440, &WaveformShape::FULL_SCALE_SINE).unwrap();
        let h = simulate(plan, &[20], 3_000, None);

        let frames = h.wire.frames.borrow();
        assert_eq!(frames.len(), 3_000);
        for (i, (_, bytes)) in frames.iter().enumerate() {
            let frame = Frame::from_bytes(*bytes);
            assert_eq!(frame.timing_constant(), 8333);
            assert_eq!(frame.sample(), table.as_slice()[i % 1440]);
        }
        assert_eq!(h.result.unwrap().cycles, 2);
    }

    #[test]
    fn test_transmission_timestamps_are_monotonic() {
        let h = simulate(bench_plan(), &[5, 180, 60], 1_000, None);
        let frames = h.wire.frames.borrow();
        assert!(frames.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn test_stop_releases_sink_once_and_writes_nothing_after() {
        let h = simulate(bench_plan(), &[20], 10, None);

        assert_eq!(h.result.unwrap().frames, 10);
        assert_eq!(h.wire.frames.borrow().len(), 10);
        assert_eq!(h.wire.releases.get(), 1);
        assert_eq!(h.wire.writes_after_release.get(), 0);
    }

    #[test]
    fn test_link_failure_is_fatal_and_releases_sink() {
        let h = simulate(bench_plan(), &[20], 100, Some(7));

        assert_eq!(
            h.result.unwrap_err(),
            LinkError::Write(ErrorKind::NotConnected)
        );
        assert_eq!(h.wire.frames.borrow().len(), 7);
        assert_eq!(h.wire.releases.get(), 1);
    }

    #[test]
    fn test_stats_reporting_does_not_disturb_the_stream() {
        let plan = RunPlan {
            stats_report_cycles: 1,
            ..bench_plan()
        };
        let h = simulate(plan, &[30], 1440 * 3, None);
        let summary = h.result.unwrap();
        assert_eq!(summary.cycles, 3);
        assert_eq!(summary.overruns, 0);
    }
}
