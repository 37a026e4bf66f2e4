use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::Pull;
use embassy_stm32::mode::Async;
use embassy_stm32::usart::{Config as UsartConfig, DataBits, Parity, StopBits, UartTx};
use embassy_stm32::{rcc, Config};

use crate::config::UART_BAUDRATE;

// ── Board struct ──────────────────────────────────────────
pub struct Board {
    /// Crank sensor link, TX only (PC4, DMA1_CH2).
    pub sensor_tx: UartTx<'static, Async>,
    /// Nucleo user button B1 (PC13, active low).
    pub stop_button: ExtiInput<'static>,
}

impl Board {
    pub fn init() -> Self {
        // Configure for maximum performance
        let mut config = Config::default();

        // Enable HSI and configure PLL for 64MHz
        config.rcc.hsi = Some(rcc::Hsi {
            sys_div: rcc::HsiSysDiv::DIV1, // No division for maximum speed
        });
        config.rcc.pll = Some(rcc::Pll {
            source: rcc::PllSource::HSI,    // Use HSI as PLL source
            prediv: rcc::PllPreDiv::DIV2,   // 16MHz / 2 = 8MHz
            mul: rcc::PllMul::MUL16,        // 8MHz * 16 = 128MHz
            divp: None,                     // Not used
            divq: None,                     // Not used
            divr: Some(rcc::PllRDiv::DIV2), // 128MHz / 2 = 64MHz
        });
        config.rcc.sys = rcc::Sysclk::PLL1_R; // Use PLL as system clock
        let p = embassy_stm32::init(config);

        // 2.5 Mbaud 8N1: 64MHz / 2.5M = 25.6, within 0.5% at 16x oversampling
        let mut us_cfg = UsartConfig::default();
        us_cfg.baudrate = UART_BAUDRATE;
        us_cfg.data_bits = DataBits::DataBits8;
        us_cfg.parity = Parity::ParityNone;
        us_cfg.stop_bits = StopBits::STOP1;

        let sensor_tx = UartTx::new(p.USART1, p.PC4, p.DMA1_CH2, us_cfg).unwrap();

        let stop_button = ExtiInput::new(p.PC13, p.EXTI13, Pull::Up);

        Self {
            sensor_tx,
            stop_button,
        }
    }
}
