//! アナログスロットル（ツイストグリップ）
//!
//! フィルタ → 起動キャリブレーション → スケーリング → ヒステリシス → 上昇レート制限。
//! 起動直後の入力は読み捨て（`Deadtime`）、続く区間の平均を最小位置とします（`Averaging`）。

use super::biquad::LowPass;
use crate::config::{throttle, ThrottleConfig};

/// キャリブレーション状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationState {
    /// 読み捨て中（経過サンプル数）
    Deadtime(u32),
    /// 最小位置の平均化中（経過サンプル数）
    Averaging(u32),
    /// 通常動作
    Normal,
}

/// アナログスロットル1チャネル
#[derive(Debug, Clone)]
pub struct AnalogThrottle {
    filter: LowPass,
    state: CalibrationState,
    /// 平均化中の積算値
    accumulator: f32,
    /// 最小位置電圧 [V]
    min: f32,
    /// 最大位置電圧 [V]
    max: f32,
    scale: f32,
    /// ヒステリシスのラッチ（true: 出力中）
    active: bool,
    last_output: f32,
    /// 実測した電源電圧 [V]（Noneなら最大位置はデフォルト値）
    supply_reference: Option<f32>,
    hyst_on: f32,
    hyst_off: f32,
    rise: f32,
    output_min: f32,
    output_max: f32,
    start_deadtime: u32,
    average_samples: u32,
    min_default: f32,
    max_default: f32,
    dropout: f32,
    range_limit: f32,
}

impl AnalogThrottle {
    pub fn new(config: &ThrottleConfig) -> Self {
        let (hyst_on, hyst_off) = config.hysteresis_thresholds();
        let (output_min, output_max) = if config.output_min <= config.output_max {
            (config.output_min, config.output_max)
        } else {
            (throttle::OUTPUT_MIN, throttle::OUTPUT_MAX)
        };
        Self {
            filter: LowPass::new(config.filter_hz, config.sample_rate_hz, config.filter_q),
            state: CalibrationState::Deadtime(0),
            accumulator: 0.0,
            min: config.min_default,
            max: config.max_default,
            scale: scale_factor(config.min_default, config.max_default),
            active: false,
            last_output: 0.0,
            supply_reference: None,
            hyst_on,
            hyst_off,
            rise: config.rise,
            output_min,
            output_max,
            start_deadtime: config.start_deadtime,
            average_samples: config.start_time.saturating_sub(config.start_deadtime).max(1),
            min_default: config.min_default,
            max_default: config.max_default,
            dropout: config.dropout,
            range_limit: config.range_limit,
        }
    }

    /// 最大位置の推定に使う電源電圧を設定（次のキャリブレーションで反映）
    pub fn set_supply_reference(&mut self, volts: Option<f32>) {
        self.supply_reference = volts.filter(|v| v.is_finite());
    }

    /// キャリブレーションをやり直す（フィルタ状態は維持）
    pub fn recalibrate(&mut self) {
        self.state = CalibrationState::Deadtime(0);
        self.accumulator = 0.0;
        self.active = false;
        self.last_output = 0.0;
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// 学習した (最小, 最大) 電圧
    pub fn bounds(&self) -> (f32, f32) {
        (self.min, self.max)
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn last_output(&self) -> f32 {
        self.last_output
    }

    /// 1サンプル処理
    ///
    /// # 引数
    /// * `raw_voltage` - スロットル入力電圧 [V]
    ///
    /// # 戻り値
    /// トルク指令（output_min～output_max）
    pub fn update(&mut self, raw_voltage: f32) -> f32 {
        // NaNでフィルタ状態を壊さない
        let filtered = if raw_voltage.is_finite() {
            self.filter.update(raw_voltage)
        } else {
            self.filter.output()
        };

        match self.state {
            CalibrationState::Deadtime(n) => {
                let n = n + 1;
                self.state = if n >= self.start_deadtime {
                    debug!("Throttle: deadtime -> averaging");
                    CalibrationState::Averaging(0)
                } else {
                    CalibrationState::Deadtime(n)
                };
                self.idle_output()
            }
            CalibrationState::Averaging(n) => {
                self.accumulator += filtered;
                let n = n + 1;
                if n >= self.average_samples {
                    self.finish_calibration();
                    self.state = CalibrationState::Normal;
                } else {
                    self.state = CalibrationState::Averaging(n);
                }
                self.idle_output()
            }
            CalibrationState::Normal => self.process(filtered),
        }
    }

    fn finish_calibration(&mut self) {
        let average = self.accumulator / self.average_samples as f32;
        let sane = (throttle::MIN_SANE_LOW - throttle::SANE_TOLERANCE)..=(throttle::MIN_SANE_HIGH + throttle::SANE_TOLERANCE);
        self.min = if sane.contains(&average) {
            average
        } else {
            warn!("Throttle: min {} out of range, using default", average);
            self.min_default
        };

        self.max = match self.supply_reference {
            Some(vref) if (throttle::MAX_SANE_LOW..=throttle::MAX_SANE_HIGH).contains(&(vref - self.dropout)) => {
                vref - self.dropout
            }
            _ => self.max_default,
        };

        self.scale = scale_factor(self.min, self.max);
        self.accumulator = 0.0;
        info!("Throttle calibrated: min={} max={} scale={}", self.min, self.max, self.scale);
    }

    fn process(&mut self, filtered: f32) -> f32 {
        // 最小位置を下回った: センサー交換・接触不良などとみなし再キャリブレーション
        if filtered < self.min - self.range_limit {
            info!("Throttle: input {} below min {}, recalibrating", filtered, self.min);
            self.recalibrate();
            return self.idle_output();
        }

        // 最大位置を超えた: 最大位置を更新
        if filtered > self.max + self.range_limit {
            self.max = filtered;
            self.scale = scale_factor(self.min, self.max);
            debug!("Throttle: max raised to {}", self.max);
        }

        let mut command = ((filtered - self.min) * self.scale).clamp(self.output_min, self.output_max);

        // ヒステリシス
        if self.active {
            if command <= self.hyst_off {
                self.active = false;
                command = 0.0;
            }
        } else if command >= self.hyst_on {
            self.active = true;
        } else {
            command = 0.0;
        }

        // 上昇のみレート制限（下降は即時）
        if command - self.last_output > self.rise {
            command = self.last_output + self.rise;
        }

        let command = command.clamp(self.output_min, self.output_max);
        self.last_output = command;
        command
    }

    fn idle_output(&self) -> f32 {
        0.0f32.clamp(self.output_min, self.output_max)
    }
}

fn scale_factor(min: f32, max: f32) -> f32 {
    let span = max - min;
    if span > 0.0 {
        1.0 / span
    } else {
        0.0
    }
}
