//! 高速コンテキスト（電流ループ）
//!
//! PWM周期ごとに呼ばれ、ロータ角度の更新 → 相電流の取得 → 駆動モード別の処理 →
//! デューティ出力 → テレメトリ更新 を行います。ブロッキングする処理は持ちません。

mod detect_mode;
mod foc_mode;
mod openloop_mode;

use crate::config::{ControllerConfig, ThrottleMode};
use crate::foc::{CurrentLoop, DriveMode, HallDetector, LoopOutput, OpenLoopRamp, PwmDuties};
use crate::ports::{CurrentSensePort, PositionSensorPort, PwmSink, ThrottlePort};
use crate::state::SharedState;
use crate::throttle::{PasThrottle, THROTTLE_CHANNELS};

/// 高速コンテキストの状態
pub struct FastContext {
    /// 制御周期 [s]
    dt: f32,
    current_loop: CurrentLoop,
    ramp: OpenLoopRamp,
    detector: HallDetector,
    pas: [PasThrottle; THROTTLE_CHANNELS],
    /// トルク指令1.0に相当するq軸電流 [A]
    full_scale_current: f32,
    /// q軸電流指令の上限 [A]
    phase_current_max: f32,
    /// 現在の駆動モード
    mode: DriveMode,
    /// ゲート出力の状態
    outputs_enabled: bool,
    /// デバッグログ用カウンタ
    log_counter: u32,
}

impl FastContext {
    pub fn new(config: &ControllerConfig) -> Self {
        let config = &config.sanitized();
        let dt = config.pwm.period_s();
        info!(
            "Fast context: {}Hz (dt={}s), full scale {}A",
            config.pwm.frequency_hz, dt, config.foc.full_scale_current
        );
        Self {
            dt,
            current_loop: CurrentLoop::new(&config.foc),
            ramp: OpenLoopRamp::new(&config.ramp),
            detector: HallDetector::new(config.ramp.amplitude),
            pas: [
                PasThrottle::new(&config.throttle[0]),
                PasThrottle::new(&config.throttle[1]),
            ],
            full_scale_current: config.foc.full_scale_current,
            phase_current_max: config.limits.phase_current_max,
            mode: DriveMode::Disabled,
            outputs_enabled: false,
            log_counter: 0,
        }
    }

    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    pub fn outputs_enabled(&self) -> bool {
        self.outputs_enabled
    }

    /// 1周期分の処理（PWM更新割り込みから呼ぶ）
    ///
    /// # 戻り値
    /// 変調した場合はその周期の電流ループ出力
    pub fn run<S, C, P, T>(
        &mut self,
        shared: &SharedState,
        sensor: &mut S,
        current_sense: &mut C,
        pwm: &mut P,
        throttle: &mut T,
    ) -> Option<LoopOutput>
    where
        S: PositionSensorPort,
        C: CurrentSensePort,
        P: PwmSink,
        T: ThrottlePort,
    {
        // 1. ロータ角度を進める（Hallエッジ割り込みと排他）
        let rotor = shared.rotor.tick(self.dt);

        // 2. PAS入力のサンプリング
        self.sample_pas(shared, throttle);

        // 3. 駆動モードの切り替え
        let requested = shared.drive_mode();
        if requested != self.mode {
            self.enter_mode(requested);
        }

        // 4. 変調許可の判定
        let gate_fault = pwm.gate_fault();
        if gate_fault != shared.gate_fault() {
            shared.set_gate_fault(gate_fault);
        }
        let allowed = self.mode != DriveMode::Disabled
            && shared.modulation_enabled()
            && !gate_fault
            && !shared.faults().any();

        // 5. 駆動モード別処理
        let currents = current_sense.phase_currents();
        let output = if allowed {
            match self.mode {
                DriveMode::OpenLoopRamp => Some(openloop_mode::execute(
                    &mut self.ramp,
                    &mut self.current_loop,
                    currents,
                    self.dt,
                )),
                DriveMode::HallDetect => detect_mode::execute(
                    &mut self.detector,
                    &mut self.current_loop,
                    shared,
                    sensor,
                    currents,
                    self.dt,
                ),
                DriveMode::Foc => rotor.map(|r| {
                    let iq_ref = (shared.torque_command() * self.full_scale_current)
                        .clamp(-self.phase_current_max, self.phase_current_max);
                    foc_mode::execute(&mut self.current_loop, r.angle, currents, iq_ref)
                }),
                DriveMode::Disabled => None,
            }
        } else {
            None
        };

        // 6. PWM出力
        match output {
            Some(out) => {
                pwm.set_duties(out.duties);
                if !self.outputs_enabled {
                    info!("Fast context: outputs enabled ({})", self.mode);
                    pwm.enable();
                    self.outputs_enabled = true;
                }
            }
            None => self.stop(pwm),
        }

        // 7. テレメトリ更新
        let out = output.unwrap_or_default();
        let mode = self.mode;
        let outputs_enabled = self.outputs_enabled;
        let duties = if output.is_some() { out.duties } else { PwmDuties::NEUTRAL };
        let ramp_angle = self.ramp.angle();
        shared.update_telemetry(|t| {
            t.mode = mode;
            t.outputs_enabled = outputs_enabled;
            t.phase_currents = currents;
            t.id = out.id;
            t.iq = out.iq;
            t.vd = out.vd;
            t.vq = out.vq;
            t.duties = duties;
            match rotor {
                Some(r) if mode != DriveMode::OpenLoopRamp => {
                    t.angle = r.angle;
                    t.speed_hz = r.speed_hz;
                }
                _ => t.angle = ramp_angle,
            }
            if let Some(r) = rotor {
                t.hall_code = r.code;
                t.hall_glitches = r.glitches;
            }
        });

        // デバッグログ（1Hz）
        self.log_counter += 1;
        if self.log_counter as f32 * self.dt >= 1.0 {
            self.log_counter = 0;
            if let Some(r) = rotor {
                debug!(
                    "[{}] angle={} speed={}Hz hall={} id={} iq={} vd={} vq={}",
                    mode, r.angle, r.speed_hz, r.code, out.id, out.iq, out.vd, out.vq
                );
            }
        }

        output
    }

    /// PASチャネルのレベルを読み、結果を低速コンテキストへ公開
    fn sample_pas<T: ThrottlePort>(&mut self, shared: &SharedState, throttle: &mut T) {
        for (channel, pas) in self.pas.iter_mut().enumerate() {
            let output = if shared.throttle_mode(channel) == ThrottleMode::Pas {
                pas.update(throttle.level(channel), self.dt)
            } else {
                pas.reset();
                0.0
            };
            shared.set_pas_output(channel, output);
        }
    }

    /// 駆動モードの遷移処理
    fn enter_mode(&mut self, mode: DriveMode) {
        info!("Drive mode: {} -> {}", self.mode, mode);
        if self.mode == DriveMode::HallDetect {
            self.detector.abort();
        }
        match mode {
            DriveMode::OpenLoopRamp => self.ramp.reset(),
            DriveMode::HallDetect => self.detector.start(),
            DriveMode::Foc | DriveMode::Disabled => {}
        }
        self.current_loop.reset();
        self.mode = mode;
    }

    /// 変調停止: 50%デューティ、ゲート無効、積分項リセット
    fn stop<P: PwmSink>(&mut self, pwm: &mut P) {
        pwm.set_duties(PwmDuties::NEUTRAL);
        pwm.disable();
        if self.outputs_enabled {
            info!("Fast context: outputs disabled ({})", self.mode);
            self.outputs_enabled = false;
        }
        self.current_loop.reset();
    }
}
