use defmt::info;
use embassy_executor::task;
use embassy_stm32::{mode::Async, usart::UartTx};
use embassy_time::{Duration, Instant, Timer};

use crate::config::RunPlan;
use crate::emitter::{self, Clock, RunContext};
use crate::ipc::{RUN_OUTCOME, STOP_REQUESTED};
use crate::waveform::WaveformTable;

/// embassy-time backed clock: monotonic uptime and timer-queue sleeps.
struct TimerClock;

impl Clock for TimerClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&mut self, duration: Duration) {
        Timer::after(duration).await;
    }
}

#[task]
pub async fn emitter_task(
    sensor_tx: UartTx<'static, Async>,
    table: &'static WaveformTable,
    plan: RunPlan,
) {
    info!("Emitter task started, {} steps per cycle", table.len());

    // sensor_tx is moved into the context and dropped (USART disabled) when run returns
    let ctx = RunContext::new(table, &plan, sensor_tx);
    let outcome = emitter::run(ctx, &mut TimerClock, &STOP_REQUESTED).await;

    RUN_OUTCOME.signal(outcome);
}
