//! TIM4ベースのHallエッジ割り込み
//!
//! 3つのHall入力をXORしてTI1に接続し、いずれかのエッジでCCR1にカウンタ値をキャプチャします。
//! カウンタはリセットせずフリーランさせ、オーバーフロー回数と合わせて32bitのタイムスタンプにします。
//!
//! ## ハードウェア構成
//! - TIM4_CH1 (PB6): Hall H1
//! - TIM4_CH2 (PB7): Hall H2
//! - TIM4_CH3 (PB8): Hall H3
//! - カウンタ: 170MHz / 170 = 1MHz（`MotorConfig::timestamp_hz` と一致させる）

use core::sync::atomic::{AtomicU32, Ordering};

use ebike_foc::ports::PositionSensorPort;
use embassy_stm32::pac;

use crate::SHARED;

/// タイムスタンプ周波数 [Hz]
pub const TIMESTAMP_HZ: u32 = 1_000_000;

/// TIM4プリスケーラ（170MHz → 1MHz）
const PRESCALER: u16 = 169;

/// オーバーフロー回数（タイムスタンプの上位16bit）
static OVERFLOW_COUNTER: AtomicU32 = AtomicU32::new(0);

/// TIM4 Hall Sensor Interface の初期化
///
/// # Safety
/// PACを使用した直接的なレジスタ操作を含むため、unsafe
pub unsafe fn init_hall_timer() {
    let rcc = pac::RCC;
    let tim4 = pac::TIM4;
    let gpiob = pac::GPIOB;

    rcc.ahb2enr().modify(|w| w.set_gpioben(true));
    rcc.apb1enr1().modify(|w| w.set_tim4en(true));

    // PB6/PB7/PB8 → AF2（外部プルアップ前提）
    for pin in [6usize, 7, 8] {
        gpiob
            .moder()
            .modify(|w| w.set_moder(pin, pac::gpio::vals::Moder::ALTERNATE));
        gpiob
            .pupdr()
            .modify(|w| w.set_pupdr(pin, pac::gpio::vals::Pupdr::FLOATING));
    }
    gpiob.afr(0).modify(|w| {
        w.set_afr(6, 2);
        w.set_afr(7, 2);
    });
    gpiob.afr(1).modify(|w| w.set_afr(0, 2));

    tim4.cr1().modify(|w| w.set_cen(false));
    tim4.psc().write_value(PRESCALER);
    tim4.arr().write_value(pac::timer::regs::ArrCore(0xFFFF));

    // CH1/CH2/CH3 を XOR → TI1
    tim4.cr2().modify(|w| w.set_ti1s(pac::timer::vals::Ti1s::XOR));

    // TI1のエッジ検出をトリガーに選択、カウンタはリセットしない
    tim4.smcr().modify(|w| {
        w.set_ts(pac::timer::vals::Ts::TI1F_ED);
        w.set_sms(pac::timer::vals::Sms::DISABLED);
    });

    tim4.ccmr_input(0).modify(|w| {
        w.set_ccs(0, pac::timer::vals::CcmrInputCcs::TRC);
        w.set_icf(0, pac::timer::vals::FilterValue::FCK_INT_N8);
    });
    tim4.ccer().modify(|w| {
        w.set_cce(0, true);
        w.set_ccp(0, false);
    });

    tim4.dier().modify(|w| {
        w.set_ccie(0, true);
        w.set_uie(true);
    });

    OVERFLOW_COUNTER.store(0, Ordering::Relaxed);
    tim4.cnt().write_value(pac::timer::regs::CntCore(0));
    tim4.egr().write(|w| w.set_ug(true));
    tim4.sr().write(|w| w.0 = 0);

    tim4.cr1().modify(|w| {
        w.set_urs(pac::timer::vals::Urs::COUNTER_ONLY);
        w.set_cen(true);
    });

    cortex_m::peripheral::NVIC::unmask(pac::Interrupt::TIM4);
}

/// 現在のHallコード（H3:H2:H1）
#[inline(always)]
fn read_hall_code() -> u8 {
    let idr = pac::GPIOB.idr().read();
    ((idr.idr(8) as u8) << 2) | ((idr.idr(7) as u8) << 1) | idr.idr(6) as u8
}

/// TIM4割り込みハンドラー（Capture/Compare 1 + Update）
///
/// # Safety
/// 割り込みコンテキストで実行されるため、処理は最小限にする
#[inline(always)]
pub unsafe fn tim4_irq_handler() {
    let tim4 = pac::TIM4;
    let sr = tim4.sr().read();

    if sr.ccif(0) {
        tim4.sr().modify(|w| w.set_ccif(0, false));

        let capture = tim4.ccr(0).read().ccr() as u32;
        let mut overflow = OVERFLOW_COUNTER.load(Ordering::Relaxed);
        // キャプチャ直後にオーバーフローしてまだ処理していない場合
        if sr.uif() && capture < 0x8000 {
            overflow = overflow.wrapping_add(1);
        }
        let timestamp = (overflow << 16) | capture;

        if !ebike_foc::on_hall_edge(&SHARED, read_hall_code(), timestamp) {
            trace!("Hall glitch at {}", timestamp);
        }
    }

    if sr.uif() {
        tim4.sr().modify(|w| w.set_uif(false));
        OVERFLOW_COUNTER.fetch_add(1, Ordering::Relaxed);
    }
}

/// TIM4割り込みのRust側エントリーポイント
#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "C" fn TIM4() {
    tim4_irq_handler();
}

/// 高速コンテキスト用のHall入力
pub struct HallInput;

impl PositionSensorPort for HallInput {
    fn read_code(&mut self) -> u8 {
        read_hall_code()
    }
}
