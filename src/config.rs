//! 設定モジュール
//!
//! 制御コアが受け取る設定スカラーをまとめます。
//! 永続化（フラッシュ上のレイアウト）は外部コラボレーターの担当で、ここでは扱いません。

pub mod params;

pub use params::*;

use crate::foc::HallTable;

/// PIDゲインと出力制限（1軸分）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// アンチワインドアップゲイン（0で無効）
    pub kc: f32,
    pub out_min: f32,
    pub out_max: f32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: DEFAULT_FOC_KP,
            ki: DEFAULT_FOC_KI,
            kd: DEFAULT_FOC_KD,
            kc: DEFAULT_FOC_KC,
            out_min: DEFAULT_FOC_OUTMIN,
            out_max: DEFAULT_FOC_OUTMAX,
        }
    }
}

impl PidGains {
    /// 非有限のゲインと、非有限・逆転した出力制限をデフォルトに置き換え
    pub fn sanitized(self) -> Self {
        let default = Self::default();
        let finite_or = |value: f32, fallback: f32| if value.is_finite() { value } else { fallback };
        let (out_min, out_max) = if self.out_min.is_finite() && self.out_max.is_finite() && self.out_min < self.out_max {
            (self.out_min, self.out_max)
        } else {
            (default.out_min, default.out_max)
        };
        Self {
            kp: finite_or(self.kp, default.kp),
            ki: finite_or(self.ki, default.ki),
            kd: finite_or(self.kd, default.kd),
            kc: finite_or(self.kc, default.kc),
            out_min,
            out_max,
        }
    }
}

/// 電流ループ設定
///
/// d軸・q軸のゲインは独立して設定可能（デフォルトは同一チューニング）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FocConfig {
    pub id: PidGains,
    pub iq: PidGains,
    /// トルク指令1.0に相当するq軸電流 [A]
    pub full_scale_current: f32,
}

impl Default for FocConfig {
    fn default() -> Self {
        Self {
            id: PidGains::default(),
            iq: PidGains::default(),
            full_scale_current: DEFAULT_FULLSCALE_CURRENT,
        }
    }
}

/// PWMキャリア設定
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmConfig {
    pub frequency_hz: u32,
    pub dead_time_ns: u32,
}

impl PwmConfig {
    /// 高速コンテキストの周期 [s]
    pub fn period_s(&self) -> f32 {
        1.0 / self.frequency_hz.max(1) as f32
    }
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            frequency_hz: pwm::DEFAULT_FREQUENCY_HZ,
            dead_time_ns: pwm::DEFAULT_DEAD_TIME_NS,
        }
    }
}

/// オープンループランプ設定
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RampConfig {
    /// 回転速度 [電気角Hz]
    pub speed_hz: f32,
    /// 変調振幅（0.0～1.0）
    pub amplitude: f32,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            speed_hz: ramp::DEFAULT_SPEED_HZ,
            amplitude: ramp::DEFAULT_AMPLITUDE,
        }
    }
}

/// モーター・位置センサー設定
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorConfig {
    pub hall_table: HallTable,
    pub pole_pairs: u8,
    /// 速度EMAフィルタの重み（1.0でフィルタなし）
    pub speed_filter: f32,
    /// 停止判定時間 [s]
    pub stall_timeout_s: f32,
    /// Hallエッジタイムスタンプの周波数 [Hz]
    pub timestamp_hz: u32,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            hall_table: HallTable::default(),
            pole_pairs: motor::DEFAULT_POLE_PAIRS,
            speed_filter: motor::DEFAULT_SPEED_FILTER,
            stall_timeout_s: motor::DEFAULT_STALL_TIMEOUT_S,
            timestamp_hz: 1_000_000,
        }
    }
}

/// スロットル入力の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ThrottleMode {
    /// アナログ（ツイストグリップ）
    Analog,
    /// ペダルアシストセンサー（パルスレート）
    Pas,
    /// 未使用
    Disabled,
}

impl ThrottleMode {
    /// 設定値（0: アナログ、1: PAS、その他: 無効）から変換
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Analog,
            1 => Self::Pas,
            _ => Self::Disabled,
        }
    }
}

/// スロットル1チャネル分の設定
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThrottleConfig {
    pub mode: ThrottleMode,
    /// 平均化結果が範囲外だった場合の最小位置電圧 [V]
    pub min_default: f32,
    /// 推定値が範囲外だった場合の最大位置電圧 [V]
    pub max_default: f32,
    /// ヒステリシス幅
    pub hysteresis: f32,
    /// ヒステリシスの中心（Noneの場合はヒステリシス幅と同じ）
    pub hysteresis_center: Option<f32>,
    /// ローパスフィルタのカットオフ [Hz]
    pub filter_hz: f32,
    pub filter_q: f32,
    pub sample_rate_hz: f32,
    /// 1サンプルあたりの最大上昇量
    pub rise: f32,
    pub output_min: f32,
    pub output_max: f32,
    pub start_deadtime: u32,
    pub start_time: u32,
    pub dropout: f32,
    pub range_limit: f32,
    /// PASのパルス数/回転
    pub pas_ppr: u32,
    /// PAS速度フィルタの重み
    pub pas_filter: f32,
    /// アシスト100%のペダル回転数 [rev/s]
    pub pas_full_scale_rps: f32,
    pub pas_timeout_s: f32,
}

impl ThrottleConfig {
    /// ヒステリシスのON/OFFしきい値
    pub fn hysteresis_thresholds(&self) -> (f32, f32) {
        let center = self.hysteresis_center.unwrap_or(self.hysteresis);
        let half = self.hysteresis * 0.5;
        (center + half, center - half)
    }

    /// PASレベル変化レート [Hz] → 出力のスケール係数
    ///
    /// 1回転あたりのレベル変化はパルス数の2倍
    pub fn pas_scale(&self) -> f32 {
        let full_scale_hz = 2.0 * self.pas_ppr as f32 * self.pas_full_scale_rps;
        if full_scale_hz > 0.0 {
            1.0 / full_scale_hz
        } else {
            0.0
        }
    }

    /// チューニング値を許容範囲に制限
    pub fn sanitized(mut self) -> Self {
        self.hysteresis = clamp_or(self.hysteresis, throttle::HYST_MIN, throttle::HYST_MAX, throttle::HYST_DEFAULT);
        self.filter_hz = clamp_or(self.filter_hz, throttle::FILT_MIN, throttle::FILT_MAX, throttle::FILT_DEFAULT);
        self.rise = clamp_or(self.rise, throttle::RISE_MIN, throttle::RISE_MAX, throttle::RISE_DEFAULT);
        self.min_default = clamp_or(
            self.min_default,
            throttle::MIN_SANE_LOW,
            throttle::MIN_SANE_HIGH,
            throttle::MIN_DEFAULT,
        );
        self.max_default = clamp_or(
            self.max_default,
            throttle::MAX_SANE_LOW,
            throttle::MAX_SANE_HIGH,
            throttle::MAX_DEFAULT,
        );
        if self.start_deadtime > self.start_time {
            self.start_deadtime = self.start_time;
        }
        if !(self.output_min <= self.output_max) {
            self.output_min = throttle::OUTPUT_MIN;
            self.output_max = throttle::OUTPUT_MAX;
        }
        self
    }

    /// 2チャネル目のデフォルト（未使用）
    pub fn disabled() -> Self {
        Self {
            mode: ThrottleMode::Disabled,
            ..Self::default()
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            mode: ThrottleMode::Analog,
            min_default: throttle::MIN_DEFAULT,
            max_default: throttle::MAX_DEFAULT,
            hysteresis: throttle::HYST_DEFAULT,
            hysteresis_center: None,
            filter_hz: throttle::FILT_DEFAULT,
            filter_q: throttle::FILT_Q_DEFAULT,
            sample_rate_hz: throttle::SAMPLING_RATE,
            rise: throttle::RISE_DEFAULT,
            output_min: throttle::OUTPUT_MIN,
            output_max: throttle::OUTPUT_MAX,
            start_deadtime: throttle::START_DEADTIME,
            start_time: throttle::START_TIME,
            dropout: throttle::DROPOUT,
            range_limit: throttle::RANGE_LIMIT,
            pas_ppr: throttle::PAS_PPR,
            pas_filter: throttle::PAS_FILTER,
            pas_full_scale_rps: throttle::PAS_FULL_SCALE_RPS,
            pas_timeout_s: throttle::PAS_TIMEOUT_S,
        }
    }
}

/// ADC換算設定
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcConfig {
    pub inv_tia_gain: f32,
    pub vbus_ratio: f32,
    pub therm_fixed_r: f32,
    pub therm_r25: f32,
    pub therm_b: f32,
    pub vref: f32,
    pub adc_max: u16,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            inv_tia_gain: adc::INV_TIA_GAIN,
            vbus_ratio: adc::VBUS_RATIO,
            therm_fixed_r: adc::THERM_FIXED_R,
            therm_r25: adc::THERM_R25,
            therm_b: adc::THERM_B,
            vref: adc::VREF,
            adc_max: adc::ADC_MAX,
        }
    }
}

/// 保護リミット設定
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LimitConfig {
    pub volt_min: f32,
    pub volt_max: f32,
    pub phase_current_max: f32,
    pub fet_temp_max: f32,
    pub voltage_filter_alpha: f32,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            volt_min: limits::VOLT_MIN,
            volt_max: limits::VOLT_MAX,
            phase_current_max: limits::PHASE_I_MAX,
            fet_temp_max: limits::FET_TEMP_MAX,
            voltage_filter_alpha: limits::VOLTAGE_FILTER_ALPHA,
        }
    }
}

/// コントローラ全体の設定
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerConfig {
    pub foc: FocConfig,
    pub pwm: PwmConfig,
    pub ramp: RampConfig,
    pub motor: MotorConfig,
    pub throttle: [ThrottleConfig; 2],
    pub adc: AdcConfig,
    pub limits: LimitConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            foc: FocConfig::default(),
            pwm: PwmConfig::default(),
            ramp: RampConfig::default(),
            motor: MotorConfig::default(),
            // 1チャネル目: アナログ、2チャネル目: 未使用
            throttle: [ThrottleConfig::default(), ThrottleConfig::disabled()],
            adc: AdcConfig::default(),
            limits: LimitConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// 設定ロード後の検証
    ///
    /// 範囲外のチューニング値は制限し、矛盾したHallテーブルはデフォルトに置き換えます。
    pub fn sanitized(mut self) -> Self {
        self.foc.id = self.foc.id.sanitized();
        self.foc.iq = self.foc.iq.sanitized();
        self.foc.full_scale_current = positive_or(self.foc.full_scale_current, DEFAULT_FULLSCALE_CURRENT);
        self.limits.phase_current_max = positive_or(self.limits.phase_current_max, limits::PHASE_I_MAX);
        self.throttle = self.throttle.map(ThrottleConfig::sanitized);
        self.ramp.speed_hz = clamp_or(
            self.ramp.speed_hz,
            ramp::SPEED_MIN_HZ,
            ramp::SPEED_MAX_HZ,
            ramp::DEFAULT_SPEED_HZ,
        );
        self.ramp.amplitude = clamp_or(self.ramp.amplitude, 0.0, 1.0, ramp::DEFAULT_AMPLITUDE);
        self.motor.speed_filter = clamp_or(self.motor.speed_filter, 0.0, 1.0, motor::DEFAULT_SPEED_FILTER);
        if self.motor.pole_pairs == 0 {
            self.motor.pole_pairs = motor::DEFAULT_POLE_PAIRS;
        }
        if self.motor.hall_table.validate().is_err() {
            warn!("Hall table inconsistent, falling back to defaults");
            self.motor.hall_table = HallTable::default();
        }
        self
    }
}

/// 有限値なら範囲に制限、NaN等ならデフォルト
fn clamp_or(value: f32, min: f32, max: f32, default: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        default
    }
}

/// 有限の正値ならそのまま、それ以外はデフォルト
fn positive_or(value: f32, default: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let cfg = ThrottleConfig::default();
        let (on, off) = cfg.hysteresis_thresholds();
        assert!((on - 0.0375).abs() < 1e-6);
        assert!((off - 0.0125).abs() < 1e-6);
    }

    #[test]
    fn test_throttle_sanitize_clamps_ranges() {
        let cfg = ThrottleConfig {
            hysteresis: 5.0,
            filter_hz: f32::NAN,
            rise: 0.0,
            ..ThrottleConfig::default()
        }
        .sanitized();
        assert_eq!(cfg.hysteresis, throttle::HYST_MAX);
        assert_eq!(cfg.filter_hz, throttle::FILT_DEFAULT);
        assert_eq!(cfg.rise, throttle::RISE_MIN);
    }

    #[test]
    fn test_inconsistent_hall_table_replaced() {
        let mut cfg = ControllerConfig::default();
        cfg.motor.hall_table = HallTable::from_angles([0.1; 6]);
        let cfg = cfg.sanitized();
        assert_eq!(cfg.motor.hall_table, HallTable::default());
    }

    #[test]
    fn test_pid_gains_sanitized() {
        let mut cfg = ControllerConfig::default();
        cfg.foc.iq.out_min = f32::NAN;
        cfg.foc.iq.ki = f32::INFINITY;
        cfg.foc.id.out_min = 0.5;
        cfg.foc.id.out_max = -0.5;
        let cfg = cfg.sanitized();
        assert_eq!(cfg.foc.iq, PidGains::default());
        assert_eq!(cfg.foc.id.out_min, DEFAULT_FOC_OUTMIN);
        assert_eq!(cfg.foc.id.out_max, DEFAULT_FOC_OUTMAX);
    }

    #[test]
    fn test_current_limits_sanitized() {
        let mut cfg = ControllerConfig::default();
        cfg.limits.phase_current_max = -1.0;
        cfg.foc.full_scale_current = f32::NAN;
        let cfg = cfg.sanitized();
        assert_eq!(cfg.limits.phase_current_max, limits::PHASE_I_MAX);
        assert_eq!(cfg.foc.full_scale_current, DEFAULT_FULLSCALE_CURRENT);

        let mut cfg = ControllerConfig::default();
        cfg.limits.phase_current_max = f32::NAN;
        assert_eq!(cfg.sanitized().limits.phase_current_max, limits::PHASE_I_MAX);
    }

    #[test]
    fn test_limit_defaults() {
        let cfg = LimitConfig::default();
        assert_eq!(cfg.volt_min, limits::VOLT_MIN);
        assert_eq!(cfg.volt_max, limits::VOLT_MAX);
        assert_eq!(cfg.phase_current_max, limits::PHASE_I_MAX);
        assert_eq!(cfg.fet_temp_max, limits::FET_TEMP_MAX);
        assert_eq!(cfg.voltage_filter_alpha, limits::VOLTAGE_FILTER_ALPHA);
    }

    #[test]
    fn test_pas_scale() {
        let cfg = ThrottleConfig::default();
        // 12パルス × 2レベル変化 × 1.5 rev/s = 36 Hz
        assert!((cfg.pas_scale() - 1.0 / 36.0).abs() < 1e-6);
    }
}
