//! モータードライバー
//!
//! TIM1の3相相補PWMとゲートドライバのフォルト入力をまとめ、`PwmSink` として高速コンテキストに渡します。

use ebike_foc::foc::PwmDuties;
use ebike_foc::ports::PwmSink;
use embassy_stm32::{
    gpio::Input,
    pac, peripherals,
    timer::{complementary_pwm::ComplementaryPwm, Channel},
};

/// 3相モータードライバー
pub struct MotorDriver {
    pwm: ComplementaryPwm<'static, peripherals::TIM1>,
    max_duty: u16,
    /// ゲートドライバのnFAULT（Lowでフォルト）
    fault: Input<'static>,
}

impl MotorDriver {
    /// # 引数
    /// * `pwm` - PWMペリフェラル（TIM1）
    /// * `fault` - ゲートドライバのnFAULT入力
    pub fn new(pwm: ComplementaryPwm<'static, peripherals::TIM1>, fault: Input<'static>) -> Self {
        let max_duty = pwm.get_max_duty();
        let mut driver = Self { pwm, max_duty, fault };
        driver.set_duty_uvw(0, 0, 0);
        driver.disable();
        driver
    }

    /// 更新イベントをTRGOに出力し、更新割り込みを有効化
    ///
    /// TRGOはADC1の電流サンプリング、更新割り込みは高速コンテキストの起動に使います。
    pub fn enable_update_events(&mut self) {
        let tim1 = pac::TIM1;
        tim1.cr2().modify(|w| w.set_mms(pac::timer::vals::Mms::UPDATE));
        tim1.sr().modify(|w| w.set_uif(false));
        tim1.dier().modify(|w| w.set_uie(true));
    }

    pub fn max_duty(&self) -> u16 {
        self.max_duty
    }

    fn set_duty_uvw(&mut self, duty_u: u16, duty_v: u16, duty_w: u16) {
        self.pwm.set_duty(Channel::Ch1, duty_u);
        self.pwm.set_duty(Channel::Ch2, duty_v);
        self.pwm.set_duty(Channel::Ch3, duty_w);
    }
}

impl PwmSink for MotorDriver {
    fn set_duties(&mut self, duties: PwmDuties) {
        let (u, v, w) = duties.to_compare(self.max_duty);
        self.set_duty_uvw(u, v, w);
    }

    fn enable(&mut self) {
        self.pwm.enable(Channel::Ch1);
        self.pwm.enable(Channel::Ch2);
        self.pwm.enable(Channel::Ch3);
    }

    fn disable(&mut self) {
        self.pwm.disable(Channel::Ch1);
        self.pwm.disable(Channel::Ch2);
        self.pwm.disable(Channel::Ch3);
    }

    fn gate_fault(&mut self) -> bool {
        self.fault.is_low()
    }
}

/// TIM1更新フラグをクリア
#[inline(always)]
pub fn clear_update_flag() {
    pac::TIM1.sr().modify(|w| w.set_uif(false));
}
