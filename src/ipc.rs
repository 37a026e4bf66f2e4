use embassy_stm32::usart::Error as UartError;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex as RawMutex, signal::Signal};
use portable_atomic::AtomicBool;

use crate::drivers::LinkError;
use crate::emitter::RunSummary;

/// Raised by the stop button; polled by the emitter once per step.
pub static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

pub type RunOutcome = Result<RunSummary, LinkError<UartError>>;

/// Emitter -> main: how the run ended. Written once.
pub static RUN_OUTCOME: Signal<RawMutex, RunOutcome> = Signal::new();
