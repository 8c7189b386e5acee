//! オープンループランプ駆動
//!
//! 固定振幅の電圧ベクトルを一定速度で回転させます（パワー段のベンチ確認用）。
//! 位置センサーは使用しません。

use crate::angle::ElectricalAngle;
use crate::config::{ramp, RampConfig};

/// オープンループランプ
#[derive(Debug, Clone)]
pub struct OpenLoopRamp {
    /// 現在の駆動電気角
    angle: ElectricalAngle,
    /// 回転速度 [電気角Hz]（負で逆回転）
    speed_hz: f32,
    /// 変調振幅（0.0～1.0）
    amplitude: f32,
}

impl OpenLoopRamp {
    /// 新しいオープンループランプを作成
    pub fn new(config: &RampConfig) -> Self {
        let mut ramp = Self {
            angle: ElectricalAngle::ZERO,
            speed_hz: 0.0,
            amplitude: 0.0,
        };
        ramp.configure(config);
        ramp
    }

    /// 速度と振幅を更新（角度は維持）
    pub fn configure(&mut self, config: &RampConfig) {
        self.speed_hz = if config.speed_hz.is_finite() {
            config.speed_hz.clamp(-ramp::SPEED_MAX_HZ, ramp::SPEED_MAX_HZ)
        } else {
            ramp::DEFAULT_SPEED_HZ
        };
        self.amplitude = if config.amplitude.is_finite() {
            config.amplitude.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    /// 角度を0に戻す
    pub fn reset(&mut self) {
        self.angle = ElectricalAngle::ZERO;
    }

    /// 1周期進める
    ///
    /// # 戻り値
    /// * `(angle, amplitude)` - 駆動電気角とd軸に印加する変調率
    pub fn update(&mut self, dt: f32) -> (ElectricalAngle, f32) {
        self.angle += self.speed_hz * dt;
        (self.angle, self.amplitude)
    }

    pub fn angle(&self) -> ElectricalAngle {
        self.angle
    }

    pub fn speed_hz(&self) -> f32 {
        self.speed_hz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_advances_at_configured_speed() {
        let mut ramp = OpenLoopRamp::new(&RampConfig {
            speed_hz: 5.0,
            amplitude: 0.2,
        });
        // 20kHzで1000周期 = 50ms → 0.25回転
        let mut out = (ElectricalAngle::ZERO, 0.0);
        for _ in 0..1000 {
            out = ramp.update(1.0 / 20_000.0);
        }
        assert!((out.0.turns() - 0.25).abs() < 1e-3);
        assert_eq!(out.1, 0.2);
    }

    #[test]
    fn test_amplitude_clamped() {
        let ramp_cfg = RampConfig {
            speed_hz: 5.0,
            amplitude: 3.0,
        };
        let mut ramp = OpenLoopRamp::new(&ramp_cfg);
        assert_eq!(ramp.update(0.0).1, 1.0);
    }

    #[test]
    fn test_reverse_wraps() {
        let mut ramp = OpenLoopRamp::new(&RampConfig {
            speed_hz: -5.0,
            amplitude: 0.2,
        });
        let (angle, _) = ramp.update(0.01);
        assert!((angle.turns() - 0.95).abs() < 1e-4);
    }
}
