#![no_std]
#![no_main]

#[macro_use]
mod fmt;

mod adc;
mod hall_tim;
mod hardware;
mod motor_driver;
mod throttle_io;

#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use {defmt_rtt as _, panic_probe as _};

use core::cell::RefCell;

use critical_section::Mutex;
use ebike_foc::config::{app, ControllerConfig};
use ebike_foc::foc::{DriveMode, RotorEstimator};
use ebike_foc::scaling::AdcScaling;
use ebike_foc::{FastContext, SharedState, SlowContext};
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32::{
    adc::{Adc, AdcChannel, SampleTime},
    gpio::{Input, Level, Output, OutputType, Pull, Speed},
    interrupt::{self, InterruptExt},
    time::Hertz,
    timer::{
        complementary_pwm::{ComplementaryPwm, ComplementaryPwmPin},
        low_level::CountingMode,
        simple_pwm::PwmPin,
    },
};
use embassy_time::{Duration, Ticker};

use adc::{CurrentSampler, MonitorInputs, DMA_BUFFER_SIZE};
use hall_tim::HallInput;
use hardware::{ExternalWatchdog, StatusLed};
use motor_driver::MotorDriver;
use throttle_io::{PedalLevels, ThrottleInputs};

/// コンテキスト間の共有状態
pub static SHARED: SharedState = SharedState::new();

/// 高速コンテキストとその入出力（mainで生成し、TIM1更新割り込みへ受け渡す）
static FAST: Mutex<RefCell<Option<FastIo>>> = Mutex::new(RefCell::new(None));

/// 低速コンテキスト用の割り込みエグゼキュータ
static EXECUTOR_SLOW: InterruptExecutor = InterruptExecutor::new();

struct FastIo {
    context: FastContext,
    sensor: HallInput,
    currents: CurrentSampler,
    driver: MotorDriver,
    pedals: PedalLevels,
}

impl FastIo {
    #[inline(always)]
    fn run(&mut self) {
        self.context.run(
            &SHARED,
            &mut self.sensor,
            &mut self.currents,
            &mut self.driver,
            &mut self.pedals,
        );
    }
}

/// TIM1更新割り込み（PWM周期）
#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "C" fn TIM1_UP_TIM16() {
    // この割り込みだけが触る
    static mut OWNED: Option<FastIo> = None;

    motor_driver::clear_update_flag();

    let owned = &mut *core::ptr::addr_of_mut!(OWNED);
    if owned.is_none() {
        *owned = critical_section::with(|cs| FAST.borrow_ref_mut(cs).take());
    }

    // 割り込み許可のまま実行（共有状態へのアクセスごとに短いクリティカルセクション）
    if let Some(io) = owned.as_mut() {
        io.run();
    }
}

#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "C" fn USART3() {
    EXECUTOR_SLOW.on_interrupt();
}

/// 低速コンテキストタスク（1kHz）
#[embassy_executor::task]
async fn slow_task(
    mut slow: SlowContext,
    mut analog: MonitorInputs,
    mut throttle: ThrottleInputs,
    mut watchdog: ExternalWatchdog,
    mut led: StatusLed,
) {
    slow.init(&SHARED, &mut throttle);

    let mut ticker = Ticker::every(Duration::from_hz(app::RATE_HZ as u64));
    loop {
        ticker.next().await;
        slow.run(&SHARED, &mut analog, &mut throttle, &mut watchdog, &mut led);
    }
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_stm32::init(hardware::create_clock_config());

    info!("═══════════════════════════════════════════════════════════════════");
    info!("        E-Bike Hub Motor Controller • STM32G431VB @ 170MHz");
    info!("═══════════════════════════════════════════════════════════════════");

    let mut config = ControllerConfig::default();
    config.motor.timestamp_hz = hall_tim::TIMESTAMP_HZ;
    let config = config.sanitized();
    let scaling = AdcScaling::new(&config.adc);

    SHARED.rotor.init(RotorEstimator::new(&config.motor));

    // スロットル入力（ADC2: PA4 = IN17、PA5 = IN13）
    let mut adc2 = Adc::new(p.ADC2);
    adc2.set_sample_time(SampleTime::CYCLES247_5);
    let throttle = ThrottleInputs::new(
        adc2,
        [p.PA4.degrade_adc(), p.PA5.degrade_adc()],
        config.adc.vref,
        config.adc.adc_max,
    );

    // PWM初期化（TIM1、3相相補PWM）
    let mut uvw_pwm = ComplementaryPwm::new(
        p.TIM1,
        Some(PwmPin::new(p.PE9, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE8, OutputType::PushPull)),
        Some(PwmPin::new(p.PE11, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE10, OutputType::PushPull)),
        Some(PwmPin::new(p.PE13, OutputType::PushPull)),
        Some(ComplementaryPwmPin::new(p.PE12, OutputType::PushPull)),
        None,
        None,
        Hertz(config.pwm.frequency_hz),
        CountingMode::EdgeAlignedUp,
    );
    // 170MHz → 1カウント約5.9ns
    uvw_pwm.set_dead_time((config.pwm.dead_time_ns * 170 / 1000) as u16);

    let fault = Input::new(p.PB12, Pull::Up);
    let mut driver = MotorDriver::new(uvw_pwm, fault);
    driver.enable_update_events();
    info!("PWM: {}Hz, max duty {}", config.pwm.frequency_hz, driver.max_duty());

    // 電流・電圧サンプリング（ADC1 + DMA1_CH1）
    let buffer = cortex_m::singleton!(: [u16; DMA_BUFFER_SIZE] = [0; DMA_BUFFER_SIZE]).unwrap();
    let mut currents = CurrentSampler::new(p.ADC1, p.DMA1_CH1, buffer, scaling);
    currents.start();
    currents.measure_offsets();

    critical_section::with(|cs| {
        FAST.borrow(cs).replace(Some(FastIo {
            context: FastContext::new(&config),
            sensor: HallInput,
            currents,
            driver,
            pedals: PedalLevels,
        }));
    });

    hardware::configure_priorities();

    // TIM4 Hallエッジ割り込み
    unsafe {
        hall_tim::init_hall_timer();
    }
    info!("TIM4 Hall interface started ({}Hz timestamps)", hall_tim::TIMESTAMP_HZ);

    // 低速コンテキスト
    let led = StatusLed(Output::new(p.PC13, Level::High, Speed::Low));
    let watchdog = ExternalWatchdog(Output::new(p.PC14, Level::Low, Speed::Low));
    let slow_spawner = EXECUTOR_SLOW.start(interrupt::USART3);
    slow_spawner
        .spawn(slow_task(
            SlowContext::new(&config),
            MonitorInputs::new(scaling),
            throttle,
            watchdog,
            led,
        ))
        .unwrap();

    // 高速コンテキスト開始
    unsafe {
        interrupt::TIM1_UP_TIM16.enable();
    }
    SHARED.set_modulation_enabled(true);
    SHARED.request_drive_mode(DriveMode::Foc);
    info!("Starting FOC motor control...");

    // テレメトリ出力（スレッドモード）
    let mut ticker = Ticker::every(Duration::from_secs(1));
    loop {
        ticker.next().await;

        if let Some(table) = SHARED.take_learned_table() {
            info!("Learned hall table: {}", table.angles());
        }

        let status = SHARED.status();
        info!(
            "mode={} en={} speed={}Hz iq={}A torque={} vbus={}V temp={}C",
            status.mode,
            status.outputs_enabled,
            status.speed_hz,
            status.iq,
            status.torque_command,
            status.bus_voltage,
            status.temperature
        );
        if let Some(err) = status.detect_error {
            warn!("Hall detection failed: {}", err);
        }
    }
}
