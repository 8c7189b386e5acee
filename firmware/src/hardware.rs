//! ハードウェア初期化モジュール
//!
//! クロック設定、割り込み優先度、ステータスLEDと外部ウォッチドッグをまとめます。

use ebike_foc::ports::{StatusIndicator, Watchdog};
use embassy_stm32::{
    gpio::Output,
    interrupt::{self, InterruptExt},
    Config,
};

/// RCCクロック設定を初期化
///
/// HSI → PLL（÷4 × 85 ÷ 2）で170MHz生成
pub fn create_clock_config() -> Config {
    let mut config = Config::default();
    {
        use embassy_stm32::rcc::mux::{Adcsel, ClockMux};
        use embassy_stm32::rcc::{Pll, PllMul, PllPreDiv, PllRDiv, PllSource, Sysclk};

        config.rcc.hsi = true;
        config.rcc.pll = Some(Pll {
            source: PllSource::HSI,
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL85,
            divp: None,
            divq: None,
            divr: Some(PllRDiv::DIV2),
        });
        config.rcc.sys = Sysclk::PLL1_R;

        let mut clock_mux = ClockMux::default();
        clock_mux.adc12sel = Adcsel::SYS;
        config.rcc.mux = clock_mux;
    }
    config
}

/// 割り込み優先度の設定
///
/// 高速コンテキスト（TIM1更新） > Hallエッジ（TIM4） > 低速コンテキスト（割り込みエグゼキュータ）
pub fn configure_priorities() {
    interrupt::TIM1_UP_TIM16.set_priority(interrupt::Priority::P0);
    interrupt::TIM4.set_priority(interrupt::Priority::P1);
    interrupt::USART3.set_priority(interrupt::Priority::P2);
}

/// ステータスLED
pub struct StatusLed(pub Output<'static>);

impl StatusIndicator for StatusLed {
    fn toggle(&mut self) {
        self.0.toggle();
    }
}

/// 外部ウォッチドッグ（WDI端子をトグル）
pub struct ExternalWatchdog(pub Output<'static>);

impl Watchdog for ExternalWatchdog {
    fn feed(&mut self) {
        self.0.toggle();
    }
}
