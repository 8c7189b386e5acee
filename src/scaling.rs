//! ADC生値から物理量への換算
//!
//! 相電流（電流アンプ経由）、バス電圧（分圧回路）、サーミスタ温度（β式）を扱います。

use libm::logf;

use crate::config::params::adc::VREFINT_CAL_VOLTS;
use crate::config::AdcConfig;

/// 0℃の絶対温度 [K]
const KELVIN_OFFSET: f32 = 273.15;
/// 25℃の絶対温度 [K]
const T25_KELVIN: f32 = 298.15;

/// ADC換算
#[derive(Debug, Clone, Copy)]
pub struct AdcScaling {
    config: AdcConfig,
    /// 1カウントあたりの電圧 [V]
    volts_per_count: f32,
}

impl AdcScaling {
    pub fn new(config: &AdcConfig) -> Self {
        Self {
            config: *config,
            volts_per_count: config.vref / config.adc_max.max(1) as f32,
        }
    }

    /// ADC生値 → ADC入力電圧 [V]
    #[inline]
    pub fn volts(&self, raw: u16) -> f32 {
        raw as f32 * self.volts_per_count
    }

    /// 電流アンプ出力 → 相電流 [A]
    ///
    /// # 引数
    /// * `raw` - ADC生値
    /// * `offset` - 電流ゼロ時のADC生値（起動時に計測）
    #[inline]
    pub fn phase_current(&self, raw: u16, offset: u16) -> f32 {
        (raw as f32 - offset as f32) * self.volts_per_count * self.config.inv_tia_gain
    }

    /// 分圧回路 → バス電圧 [V]
    #[inline]
    pub fn bus_voltage(&self, raw: u16) -> f32 {
        self.volts(raw) * self.config.vbus_ratio
    }

    /// サーミスタ分圧（NTCがGND側） → 温度 [℃]
    ///
    /// 断線・短絡（レール電圧）の場合は `None`
    pub fn thermistor_celsius(&self, raw: u16) -> Option<f32> {
        let v = self.volts(raw);
        if v <= 0.0 || v >= self.config.vref {
            return None;
        }
        let r_ntc = self.config.therm_fixed_r * v / (self.config.vref - v);
        let inv_t = 1.0 / T25_KELVIN + logf(r_ntc / self.config.therm_r25) / self.config.therm_b;
        let celsius = 1.0 / inv_t - KELVIN_OFFSET;
        celsius.is_finite().then_some(celsius)
    }

    /// 内部基準電圧の測定値 → 電源（ADC基準）電圧 [V]
    ///
    /// # 引数
    /// * `raw` - VREFINTのADC生値
    /// * `cal` - 工場校正値（`VREFINT_CAL_VOLTS` 電源時の生値）
    pub fn supply_from_vrefint(raw: u16, cal: u16) -> Option<f32> {
        if raw == 0 || cal == 0 {
            return None;
        }
        Some(VREFINT_CAL_VOLTS * cal as f32 / raw as f32)
    }

    pub fn config(&self) -> &AdcConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scaling() -> AdcScaling {
        AdcScaling::new(&AdcConfig::default())
    }

    #[test]
    fn test_phase_current() {
        let s = scaling();
        assert_eq!(s.phase_current(2048, 2048), 0.0);
        // 1カウント = 3.3/4096 V → ×20 A/V
        let one_count = 3.3 / 4096.0 * 20.0;
        assert!((s.phase_current(2058, 2048) - 10.0 * one_count).abs() < 1e-4);
        assert!(s.phase_current(2038, 2048) < 0.0);
    }

    #[test]
    fn test_bus_voltage() {
        let s = scaling();
        // 48V → ADC入力 1.4387V → 1786カウント
        let v = s.bus_voltage(1786);
        assert!((v - 48.0).abs() < 0.05, "v = {}", v);
    }

    #[test]
    fn test_thermistor() {
        let s = scaling();
        // 固定抵抗と同じ10kΩ = 25℃
        let t = s.thermistor_celsius(2048).unwrap();
        assert!((t - 25.0).abs() < 0.01, "t = {}", t);
        // 抵抗が下がる（電圧が下がる）と高温
        assert!(s.thermistor_celsius(1000).unwrap() > 25.0);
        assert_eq!(s.thermistor_celsius(0), None);
        assert_eq!(s.thermistor_celsius(4096), None);
    }

    #[test]
    fn test_supply_from_vrefint() {
        // 校正時と同じ生値 = 3.0V
        assert_eq!(AdcScaling::supply_from_vrefint(1655, 1655), Some(3.0));
        // 3.3V電源では生値が 3.0/3.3 倍
        let v = AdcScaling::supply_from_vrefint(1505, 1655).unwrap();
        assert!((v - 3.3).abs() < 0.01, "v = {}", v);
        assert_eq!(AdcScaling::supply_from_vrefint(0, 1655), None);
        assert_eq!(AdcScaling::supply_from_vrefint(1505, 0), None);
    }
}
