//! スロットル入力
//!
//! 2チャネルのスロットル端子（PA4、PA5）をアナログ入力（ADC2）とデジタル入力（PAS）で切り替えます。
//! アナログ電圧は低速コンテキスト、PASのレベルは高速コンテキストが読みます。

use ebike_foc::config::ThrottleMode;
use ebike_foc::ports::ThrottlePort;
use ebike_foc::throttle::THROTTLE_CHANNELS;
use embassy_stm32::{
    adc::{Adc, AnyAdcChannel},
    pac, peripherals,
};

/// 各チャネルのGPIOAピン番号
const PINS: [usize; THROTTLE_CHANNELS] = [4, 5];

/// ピンモードを切り替え（アナログ／プルダウン付きデジタル入力）
fn configure_pin(channel: usize, mode: ThrottleMode) {
    let gpioa = pac::GPIOA;
    let pin = PINS[channel];
    match mode {
        ThrottleMode::Pas => {
            gpioa
                .pupdr()
                .modify(|w| w.set_pupdr(pin, pac::gpio::vals::Pupdr::PULL_DOWN));
            gpioa
                .moder()
                .modify(|w| w.set_moder(pin, pac::gpio::vals::Moder::INPUT));
        }
        ThrottleMode::Analog | ThrottleMode::Disabled => {
            gpioa
                .pupdr()
                .modify(|w| w.set_pupdr(pin, pac::gpio::vals::Pupdr::FLOATING));
            gpioa
                .moder()
                .modify(|w| w.set_moder(pin, pac::gpio::vals::Moder::ANALOG));
        }
    }
}

#[inline(always)]
fn read_level(channel: usize) -> bool {
    pac::GPIOA.idr().read().idr(PINS[channel]) == pac::gpio::vals::Idr::HIGH
}

/// アナログ入力を含むスロットル端子（低速コンテキスト）
pub struct ThrottleInputs {
    adc: Adc<'static, peripherals::ADC2>,
    channels: [AnyAdcChannel<peripherals::ADC2>; THROTTLE_CHANNELS],
    /// ADC生値 → 電圧 [V]
    volts_per_count: f32,
}

impl ThrottleInputs {
    pub fn new(
        adc: Adc<'static, peripherals::ADC2>,
        channels: [AnyAdcChannel<peripherals::ADC2>; THROTTLE_CHANNELS],
        vref: f32,
        adc_max: u16,
    ) -> Self {
        Self {
            adc,
            channels,
            volts_per_count: vref / adc_max.max(1) as f32,
        }
    }
}

impl ThrottlePort for ThrottleInputs {
    fn configure(&mut self, channel: usize, mode: ThrottleMode) {
        configure_pin(channel, mode);
    }

    fn voltage(&mut self, channel: usize) -> f32 {
        self.adc.blocking_read(&mut self.channels[channel]) as f32 * self.volts_per_count
    }

    fn level(&mut self, channel: usize) -> bool {
        read_level(channel)
    }
}

/// PASパルスのレベルのみを読むスロットル端子（高速コンテキスト）
///
/// ピンモードの切り替えとアナログ入力は `ThrottleInputs` が受け持ちます。
pub struct PedalLevels;

impl ThrottlePort for PedalLevels {
    fn configure(&mut self, _channel: usize, _mode: ThrottleMode) {}

    fn voltage(&mut self, _channel: usize) -> f32 {
        0.0
    }

    fn level(&mut self, channel: usize) -> bool {
        read_level(channel)
    }
}
