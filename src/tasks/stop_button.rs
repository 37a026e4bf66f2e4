use defmt::info;
use embassy_executor::task;
use embassy_stm32::exti::ExtiInput;
use portable_atomic::Ordering;

use crate::ipc::STOP_REQUESTED;

/// Operator stop: one press ends the run. The emitter sees the flag at its
/// next step boundary.
#[task]
pub async fn stop_button_task(mut button: ExtiInput<'static>) {
    button.wait_for_falling_edge().await;
    info!("Stop requested from user button");
    STOP_REQUESTED.store(true, Ordering::Release);
}
