//! ADC1による同期サンプリング
//!
//! TIM1の更新イベント（TRGO）でADC1のレギュラーシーケンス
//! （相電流A、相電流B、バス電圧、サーミスタ、内部基準電圧）を変換し、DMAでリングバッファへ転送します。
//! 相電流は高速コンテキストが `CurrentSensePort` として読み、
//! 残りの生値はアトミックに公開して低速コンテキストの `AnalogPort` が換算します。

use core::sync::atomic::{AtomicU16, Ordering};

use ebike_foc::foc::PhaseCurrents;
use ebike_foc::ports::{AnalogPort, CurrentSensePort};
use ebike_foc::scaling::AdcScaling;
use embassy_stm32::adc as stm32_adc;
use embassy_stm32::dma;
use embassy_stm32::pac;
use embassy_stm32::peripherals::{ADC1, DMA1_CH1};
use embassy_stm32::Peri;

/// 1シーケンスのチャネル数
pub const SEQUENCE_LEN: usize = 5;
/// DMAリングバッファ長（2シーケンス分）
pub const DMA_BUFFER_SIZE: usize = SEQUENCE_LEN * 2;

/// RM0440 EXTSEL: TIM1_TRGO
const TIM1_TRGO: u8 = 9;

/// ADC1入力チャネル
const CH_PHASE_A: u8 = 1; // PA0
const CH_PHASE_B: u8 = 2; // PA1
const CH_VBUS: u8 = 7; // PC1
const CH_THERM: u8 = 6; // PC0
const CH_VREFINT: u8 = 18;

/// VREFINT工場校正値（3.0V、30℃）
const VREFINT_CAL: *const u16 = 0x1FFF_75AA as *const u16;

/// 起動時の電流オフセット計測サンプル数
const OFFSET_SAMPLES: u32 = 1024;

static VBUS_RAW: AtomicU16 = AtomicU16::new(0);
static THERM_RAW: AtomicU16 = AtomicU16::new(0);
static VREFINT_RAW: AtomicU16 = AtomicU16::new(0);

/// 相電流サンプラー（高速コンテキスト）
pub struct CurrentSampler {
    _adc: Peri<'static, ADC1>,
    ring: dma::ReadableRingBuffer<'static, u16>,
    scaling: AdcScaling,
    /// 電流ゼロ時の生値
    offsets: [u16; 2],
    /// 直近の完全なシーケンス
    latest: [u16; SEQUENCE_LEN],
    /// 読み出し済みサンプル数（シーケンス内位置）
    position: usize,
}

impl CurrentSampler {
    pub fn new(
        adc: Peri<'static, ADC1>,
        dma_ch: Peri<'static, DMA1_CH1>,
        buffer: &'static mut [u16; DMA_BUFFER_SIZE],
        scaling: AdcScaling,
    ) -> Self {
        let request = dma_ch.request();
        let mut opts = dma::TransferOptions::default();
        opts.circular = true;
        opts.priority = dma::Priority::VeryHigh;

        let peri_addr = pac::ADC1.dr().as_ptr() as *mut u16;
        let ring = unsafe { dma::ReadableRingBuffer::new(dma_ch, request, peri_addr, buffer, opts) };

        let mid = scaling.config().adc_max / 2;
        Self {
            _adc: adc,
            ring,
            scaling,
            offsets: [mid; 2],
            latest: [mid, mid, 0, 0, 0],
            position: 0,
        }
    }

    /// ADCの校正とシーケンス設定を行い、DMA転送を開始
    pub fn start(&mut self) {
        let adc = pac::ADC1;
        calibrate(adc);
        configure_sequence(adc);
        self.ring.start();
        adc.cr().modify(|w| w.set_adstart(true));
        info!("ADC1 sampling started (TIM1 TRGO)");
    }

    /// モーター停止中に電流オフセットを計測
    ///
    /// PWM停止状態でTIM1が動作している必要があります。
    pub fn measure_offsets(&mut self) {
        let mut sum = [0u32; 2];
        let mut count = 0u32;
        while count < OFFSET_SAMPLES {
            if self.poll() {
                sum[0] += self.latest[0] as u32;
                sum[1] += self.latest[1] as u32;
                count += 1;
            }
        }
        self.offsets = [(sum[0] / count) as u16, (sum[1] / count) as u16];
        info!("Current offsets: A={} B={}", self.offsets[0], self.offsets[1]);
    }

    /// リングバッファを読み、完全なシーケンスが得られたら `latest` を更新
    fn poll(&mut self) -> bool {
        let mut buf = [0u16; DMA_BUFFER_SIZE];
        let n = match self.ring.read(&mut buf) {
            Ok((n, _)) => n,
            Err(_) => {
                // オーバーラン時はシーケンス先頭から取り直す
                self.ring.clear();
                self.position = 0;
                return false;
            }
        };

        let mut updated = false;
        let mut sequence = self.latest;
        for &sample in &buf[..n] {
            sequence[self.position] = sample;
            self.position += 1;
            if self.position == SEQUENCE_LEN {
                self.position = 0;
                self.latest = sequence;
                updated = true;
            }
        }
        if updated {
            VBUS_RAW.store(self.latest[2], Ordering::Relaxed);
            THERM_RAW.store(self.latest[3], Ordering::Relaxed);
            VREFINT_RAW.store(self.latest[4], Ordering::Relaxed);
        }
        updated
    }
}

impl CurrentSensePort for CurrentSampler {
    fn phase_currents(&mut self) -> PhaseCurrents {
        self.poll();
        PhaseCurrents::Two {
            a: self.scaling.phase_current(self.latest[0], self.offsets[0]),
            b: self.scaling.phase_current(self.latest[1], self.offsets[1]),
        }
    }
}

/// バス電圧・FET温度・電源電圧（低速コンテキスト）
pub struct MonitorInputs {
    scaling: AdcScaling,
    vrefint_cal: u16,
}

impl MonitorInputs {
    pub fn new(scaling: AdcScaling) -> Self {
        let vrefint_cal = unsafe { core::ptr::read_volatile(VREFINT_CAL) };
        info!("VREFINT_CAL = {}", vrefint_cal);
        Self { scaling, vrefint_cal }
    }
}

impl AnalogPort for MonitorInputs {
    fn bus_voltage(&mut self) -> f32 {
        self.scaling.bus_voltage(VBUS_RAW.load(Ordering::Relaxed))
    }

    fn fet_temperature(&mut self) -> f32 {
        self.scaling
            .thermistor_celsius(THERM_RAW.load(Ordering::Relaxed))
            .unwrap_or(f32::NAN)
    }

    fn supply_reference(&mut self) -> Option<f32> {
        AdcScaling::supply_from_vrefint(VREFINT_RAW.load(Ordering::Relaxed), self.vrefint_cal)
    }
}

fn calibrate(adc: pac::adc::Adc) {
    // ディープパワーダウン解除、レギュレータ有効化
    adc.cr().modify(|w| {
        w.set_deeppwd(false);
        w.set_advregen(true);
    });

    // tADCVREG = 20us
    cortex_m::asm::delay(3400);

    if adc.cr().read().aden() {
        adc.cr().modify(|w| w.set_addis(true));
        while adc.cr().read().aden() {}
    }

    adc.cr().modify(|w| w.set_adcaldif(stm32_adc::vals::Adcaldif::SINGLE_ENDED));
    adc.cr().modify(|w| w.set_adcal(true));
    while adc.cr().read().adcal() {}

    adc.isr().write(|w| w.set_adrdy(true));
    adc.cr().modify(|w| w.set_aden(true));
    while !adc.isr().read().adrdy() {}
}

fn configure_sequence(adc: pac::adc::Adc) {
    adc.cr().modify(|w| w.set_adstart(false));

    pac::ADC12_COMMON.ccr().modify(|w| w.set_vrefen(true));

    adc.smpr().modify(|w| {
        w.set_smp(CH_PHASE_A as usize, stm32_adc::SampleTime::CYCLES6_5);
        w.set_smp(CH_PHASE_B as usize, stm32_adc::SampleTime::CYCLES6_5);
        w.set_smp(CH_VBUS as usize, stm32_adc::SampleTime::CYCLES47_5);
        w.set_smp(CH_THERM as usize, stm32_adc::SampleTime::CYCLES47_5);
    });
    // VREFINTは最小4us
    adc.smpr2().modify(|w| w.set_smp((CH_VREFINT - 10) as usize, stm32_adc::SampleTime::CYCLES247_5));

    adc.sqr1().modify(|w| {
        w.set_l(SEQUENCE_LEN as u8 - 1);
        w.set_sq(0, CH_PHASE_A);
        w.set_sq(1, CH_PHASE_B);
        w.set_sq(2, CH_VBUS);
        w.set_sq(3, CH_THERM);
    });
    adc.sqr2().modify(|w| w.set_sq(0, CH_VREFINT));

    adc.cfgr().modify(|w| {
        w.set_cont(false);
        w.set_discen(false);
        w.set_align(false);
        w.set_ovrmod(stm32_adc::vals::Ovrmod::OVERWRITE);
        w.set_dmacfg(stm32_adc::vals::Dmacfg::CIRCULAR);
        w.set_dmaen(stm32_adc::vals::Dmaen::ENABLE);
        w.set_exten(stm32_adc::vals::Exten::RISING_EDGE);
        w.set_extsel(TIM1_TRGO);
    });

    adc.isr().write(|w| {
        w.set_eoc(true);
        w.set_eos(true);
        w.set_ovr(true);
    });
}
