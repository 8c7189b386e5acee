//! バス電圧・温度監視
//!
//! 低速コンテキストでバス電圧とFET温度をフィルタし、保護リミットと比較します。
//! いずれかのフォルトが立っている間、高速コンテキストは変調を停止します。

use crate::config::LimitConfig;

/// 保護ステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusFlags {
    pub undervoltage: bool,
    pub overvoltage: bool,
    pub overtemperature: bool,
    pub gate_fault: bool,
}

impl StatusFlags {
    const UNDERVOLTAGE: u8 = 1 << 0;
    const OVERVOLTAGE: u8 = 1 << 1;
    const OVERTEMPERATURE: u8 = 1 << 2;
    const GATE_FAULT: u8 = 1 << 3;

    /// いずれかのフォルトが立っているか
    pub fn any(&self) -> bool {
        self.undervoltage || self.overvoltage || self.overtemperature || self.gate_fault
    }

    /// ビット表現（共有状態への格納用）
    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.undervoltage {
            bits |= Self::UNDERVOLTAGE;
        }
        if self.overvoltage {
            bits |= Self::OVERVOLTAGE;
        }
        if self.overtemperature {
            bits |= Self::OVERTEMPERATURE;
        }
        if self.gate_fault {
            bits |= Self::GATE_FAULT;
        }
        bits
    }

    pub fn from_bits(bits: u8) -> Self {
        Self {
            undervoltage: bits & Self::UNDERVOLTAGE != 0,
            overvoltage: bits & Self::OVERVOLTAGE != 0,
            overtemperature: bits & Self::OVERTEMPERATURE != 0,
            gate_fault: bits & Self::GATE_FAULT != 0,
        }
    }
}

/// 電圧監視状態
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MonitorState {
    /// バス電圧 [V]（フィルタ済み）
    pub voltage: f32,
    /// FET温度 [℃]（フィルタ済み）
    pub temperature: f32,
    pub flags: StatusFlags,
}

/// 電圧・温度監視
pub struct VoltageMonitor {
    limits: LimitConfig,
    state: MonitorState,
    /// 初回サンプルでフィルタを初期化済みか
    initialized: bool,
}

impl VoltageMonitor {
    pub fn new(limits: &LimitConfig) -> Self {
        Self {
            limits: *limits,
            state: MonitorState::default(),
            initialized: false,
        }
    }

    /// 計測値を取り込み、保護判定を更新
    ///
    /// # 引数
    /// * `bus_voltage` - バス電圧 [V]
    /// * `temperature` - FET温度 [℃]（Noneはセンサー異常）
    /// * `gate_fault` - ゲートドライバのフォルト入力
    pub fn update(&mut self, bus_voltage: f32, temperature: Option<f32>, gate_fault: bool) -> MonitorState {
        let alpha = self.limits.voltage_filter_alpha.clamp(0.0, 1.0);

        // 起動時の低電圧誤検出を防ぐため、初回は実測値で初期化
        if !self.initialized && bus_voltage.is_finite() {
            self.state.voltage = bus_voltage;
            if let Some(t) = temperature.filter(|t| t.is_finite()) {
                self.state.temperature = t;
            }
            self.initialized = true;
        } else {
            if bus_voltage.is_finite() {
                self.state.voltage = alpha * bus_voltage + (1.0 - alpha) * self.state.voltage;
            }
            if let Some(t) = temperature.filter(|t| t.is_finite()) {
                self.state.temperature = alpha * t + (1.0 - alpha) * self.state.temperature;
            }
        }

        let prev = self.state.flags;
        let flags = StatusFlags {
            undervoltage: !self.initialized || self.state.voltage < self.limits.volt_min,
            overvoltage: self.state.voltage > self.limits.volt_max,
            // 温度が読めない場合は安全側に倒す
            overtemperature: temperature.is_none() || self.state.temperature > self.limits.fet_temp_max,
            gate_fault,
        };
        self.state.flags = flags;

        // 異常検出時のログ（状態変化時のみ）
        if flags != prev {
            if flags.any() {
                error!(
                    "Protection fault: {}V {}C uv={} ov={} ot={} gate={}",
                    self.state.voltage,
                    self.state.temperature,
                    flags.undervoltage,
                    flags.overvoltage,
                    flags.overtemperature,
                    flags.gate_fault
                );
            } else {
                info!("Protection cleared: {}V {}C", self.state.voltage, self.state.temperature);
            }
        }

        self.state
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// しきい値を更新
    pub fn set_limits(&mut self, limits: &LimitConfig) {
        self.limits = *limits;
        info!("Voltage thresholds updated: OV={}V, UV={}V", limits.volt_max, limits.volt_min);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_range() {
        let mut mon = VoltageMonitor::new(&LimitConfig::default());
        let state = mon.update(52.0, Some(30.0), false);
        assert!(!state.flags.any());
        assert_eq!(state.voltage, 52.0);
    }

    #[test]
    fn test_undervoltage_filtered() {
        let mut mon = VoltageMonitor::new(&LimitConfig::default());
        mon.update(52.0, Some(30.0), false);
        // 1サンプルの落ち込みでは反応しない
        assert!(!mon.update(40.0, Some(30.0), false).flags.undervoltage);
        let mut state = mon.state();
        for _ in 0..100 {
            state = mon.update(40.0, Some(30.0), false);
        }
        assert!(state.flags.undervoltage);
        assert!(state.flags.any());
    }

    #[test]
    fn test_overvoltage_and_temperature() {
        let mut mon = VoltageMonitor::new(&LimitConfig::default());
        let state = mon.update(70.0, Some(95.0), false);
        assert!(state.flags.overvoltage);
        assert!(state.flags.overtemperature);
    }

    #[test]
    fn test_missing_temperature_and_gate_fault() {
        let mut mon = VoltageMonitor::new(&LimitConfig::default());
        assert!(mon.update(52.0, None, false).flags.overtemperature);
        assert!(mon.update(52.0, Some(30.0), true).flags.gate_fault);
    }

    #[test]
    fn test_non_finite_voltage_before_first_sample() {
        let mut mon = VoltageMonitor::new(&LimitConfig::default());
        assert!(mon.update(f32::NAN, Some(30.0), false).flags.undervoltage);
        assert!(!mon.update(52.0, Some(30.0), false).flags.any());
    }

    #[test]
    fn test_flag_bits() {
        let flags = StatusFlags {
            overvoltage: true,
            gate_fault: true,
            ..StatusFlags::default()
        };
        assert_eq!(StatusFlags::from_bits(flags.bits()), flags);
    }
}
