#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use crank_emulator::{
    config::{EmulatorConfig, UART_BAUDRATE},
    ipc::RUN_OUTCOME,
    tasks::{emitter_task, stop_button_task},
    waveform::WaveformTable,
    Board,
};

static WAVEFORM_TABLE: StaticCell<WaveformTable> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Starting crank emulator");

    let config = EmulatorConfig::DEFAULT;
    info!("Config: {}", config);

    // Everything is validated before the link is even brought up
    let plan = match config.plan() {
        Ok(plan) => plan,
        Err(e) => {
            error!("Configuration rejected, not transmitting: {:?}", e);
            return;
        }
    };
    let table = match WaveformTable::build(config.resolution, &config.shape) {
        Ok(table) => WAVEFORM_TABLE.init(table),
        Err(e) => {
            error!("Waveform table rejected, not transmitting: {:?}", e);
            return;
        }
    };
    info!(
        "c={} step={}ns over {} baud",
        plan.timing.timing_constant,
        plan.timing.period.as_nanos(),
        UART_BAUDRATE
    );

    let board = Board::init();

    spawner.spawn(stop_button_task(board.stop_button)).unwrap();
    spawner.spawn(emitter_task(board.sensor_tx, table, plan)).unwrap();
    info!("Emitter spawned, press B1 to stop");

    match RUN_OUTCOME.wait().await {
        Ok(summary) => info!("Run finished: {}", summary),
        Err(e) => error!("Run aborted: {:?}", e),
    }
}
