//! 低速コンテキスト（1kHz）
//!
//! スロットル処理とトルク指令の公開、バス電圧・温度の監視、
//! ステータスLEDのトグル、外部ウォッチドッグへの生存通知を行います。

use crate::config::{app, ControllerConfig, ThrottleMode};
use crate::ports::{AnalogPort, StatusIndicator, ThrottlePort, Watchdog};
use crate::state::SharedState;
use crate::throttle::{Throttle, THROTTLE_CHANNELS};
use crate::voltage_monitor::{MonitorState, VoltageMonitor};

/// 低速コンテキストの状態
pub struct SlowContext {
    throttle: Throttle,
    monitor: VoltageMonitor,
    /// LEDトグル周期（呼び出し回数）
    led_period: u32,
    led_counter: u32,
    /// デバッグログ用カウンタ
    log_counter: u32,
}

impl SlowContext {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            throttle: Throttle::new(&config.throttle),
            monitor: VoltageMonitor::new(&config.limits),
            led_period: (app::LED_TOGGLE_MS * app::RATE_HZ / 1000).max(1),
            led_counter: 0,
            log_counter: 0,
        }
    }

    /// 起動時の入力経路設定（全チャネル）
    pub fn init<T: ThrottlePort>(&mut self, shared: &SharedState, port: &mut T) {
        for channel in 0..THROTTLE_CHANNELS {
            let mode = self.throttle.mode(channel);
            self.set_throttle_mode(shared, port, channel, mode);
        }
        info!("Slow context started: throttle {}", self.throttle.modes());
    }

    /// スロットルの入力種別を切り替え、高速コンテキストへ公開
    pub fn set_throttle_mode<T: ThrottlePort>(
        &mut self,
        shared: &SharedState,
        port: &mut T,
        channel: usize,
        mode: ThrottleMode,
    ) {
        self.throttle.set_mode(port, channel, mode);
        shared.set_throttle_mode(channel, self.throttle.mode(channel));
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    pub fn monitor_state(&self) -> MonitorState {
        self.monitor.state()
    }

    /// 1周期分の処理
    ///
    /// # 戻り値
    /// 公開したトルク指令
    pub fn run<A, T, W, L>(
        &mut self,
        shared: &SharedState,
        analog: &mut A,
        port: &mut T,
        watchdog: &mut W,
        led: &mut L,
    ) -> f32
    where
        A: AnalogPort,
        T: ThrottlePort,
        W: Watchdog,
        L: StatusIndicator,
    {
        // 1. スロットル → トルク指令
        self.throttle.set_supply_reference(analog.supply_reference());
        let command = self.throttle.update(port, shared.pas_outputs());
        shared.set_torque_command(command);

        // 2. バス電圧・温度監視
        let temperature = analog.fet_temperature();
        let state = self.monitor.update(
            analog.bus_voltage(),
            temperature.is_finite().then_some(temperature),
            shared.gate_fault(),
        );
        shared.set_faults(state.flags);

        shared.update_telemetry(|t| {
            t.torque_command = command;
            t.bus_voltage = state.voltage;
            t.temperature = state.temperature;
            t.flags = state.flags;
        });

        // 3. ステータスLED
        self.led_counter += 1;
        if self.led_counter >= self.led_period {
            self.led_counter = 0;
            led.toggle();
        }

        // 4. ウォッチドッグ
        watchdog.feed();

        // デバッグログ（1秒ごと）
        self.log_counter += 1;
        if self.log_counter >= app::RATE_HZ {
            self.log_counter = 0;
            debug!(
                "[Slow] torque={} vbus={}V temp={}C",
                command, state.voltage, state.temperature
            );
        }

        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockAnalog {
        vbus: f32,
        temp: f32,
        supply: Option<f32>,
    }

    impl AnalogPort for MockAnalog {
        fn bus_voltage(&mut self) -> f32 {
            self.vbus
        }
        fn fet_temperature(&mut self) -> f32 {
            self.temp
        }
        fn supply_reference(&mut self) -> Option<f32> {
            self.supply
        }
    }

    #[derive(Default)]
    struct MockThrottle {
        volts: f32,
        configured: [Option<ThrottleMode>; THROTTLE_CHANNELS],
    }

    impl ThrottlePort for MockThrottle {
        fn configure(&mut self, channel: usize, mode: ThrottleMode) {
            self.configured[channel] = Some(mode);
        }
        fn voltage(&mut self, _channel: usize) -> f32 {
            self.volts
        }
        fn level(&mut self, _channel: usize) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct Counter(u32);

    impl Watchdog for Counter {
        fn feed(&mut self) {
            self.0 += 1;
        }
    }

    impl StatusIndicator for Counter {
        fn toggle(&mut self) {
            self.0 += 1;
        }
    }

    struct Rig {
        shared: SharedState,
        slow: SlowContext,
        analog: MockAnalog,
        port: MockThrottle,
        watchdog: Counter,
        led: Counter,
    }

    impl Rig {
        fn new() -> Self {
            let shared = SharedState::new();
            let mut slow = SlowContext::new(&ControllerConfig::default());
            let mut port = MockThrottle::default();
            slow.init(&shared, &mut port);
            Self {
                shared,
                slow,
                analog: MockAnalog {
                    vbus: 52.0,
                    temp: 30.0,
                    supply: None,
                },
                port,
                watchdog: Counter::default(),
                led: Counter::default(),
            }
        }

        fn step(&mut self) -> f32 {
            self.slow.run(
                &self.shared,
                &mut self.analog,
                &mut self.port,
                &mut self.watchdog,
                &mut self.led,
            )
        }
    }

    #[test]
    fn test_init_configures_ports() {
        let rig = Rig::new();
        assert_eq!(rig.port.configured, [Some(ThrottleMode::Analog), Some(ThrottleMode::Disabled)]);
        assert_eq!(rig.shared.throttle_mode(0), ThrottleMode::Analog);
        assert_eq!(rig.shared.throttle_mode(1), ThrottleMode::Disabled);
    }

    #[test]
    fn test_watchdog_and_led() {
        let mut rig = Rig::new();
        for _ in 0..1000 {
            rig.step();
        }
        assert_eq!(rig.watchdog.0, 1000);
        // 500msごとにトグル
        assert_eq!(rig.led.0, 2);
    }

    #[test]
    fn test_torque_command_published() {
        let mut rig = Rig::new();
        rig.port.volts = 1.0;
        for _ in 0..1000 {
            rig.step();
        }
        assert_eq!(rig.shared.torque_command(), 0.0);

        rig.port.volts = 1.5;
        let mut command = 0.0;
        for _ in 0..3000 {
            command = rig.step();
        }
        assert!((command - 0.4167).abs() < 0.01, "command = {}", command);
        assert_eq!(rig.shared.torque_command(), command);
        assert_eq!(rig.shared.status().torque_command, command);
    }

    #[test]
    fn test_measured_supply_sets_throttle_max() {
        let mut rig = Rig::new();
        rig.analog.supply = Some(3.3);
        rig.port.volts = 1.0;
        for _ in 0..1000 {
            rig.step();
        }

        // 最大位置 = 3.3 - 0.72 = 2.58V → (1.5 - 1.0) / 1.58
        rig.port.volts = 1.5;
        let mut command = 0.0;
        for _ in 0..3000 {
            command = rig.step();
        }
        assert!((command - 0.3165).abs() < 0.01, "command = {}", command);
    }

    #[test]
    fn test_pas_output_combined() {
        let mut rig = Rig::new();
        rig.slow.set_throttle_mode(&rig.shared, &mut rig.port, 1, ThrottleMode::Pas);
        assert_eq!(rig.shared.throttle_mode(1), ThrottleMode::Pas);
        rig.shared.set_pas_output(1, 0.6);
        assert_eq!(rig.step(), 0.6);
    }

    #[test]
    fn test_faults_published() {
        let mut rig = Rig::new();
        rig.step();
        assert!(!rig.shared.faults().any());

        rig.analog.temp = f32::NAN;
        rig.step();
        assert!(rig.shared.faults().overtemperature);
        assert!(rig.shared.status().flags.overtemperature);

        rig.analog.temp = 30.0;
        rig.shared.set_gate_fault(true);
        rig.step();
        let flags = rig.shared.faults();
        assert!(!flags.overtemperature);
        assert!(flags.gate_fault);
    }
}
