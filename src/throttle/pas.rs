//! ペダルアシスト（PAS）スロットル
//!
//! デジタル入力のレベル変化間隔からペダル回転レートを求め、指数移動平均したものを
//! スケーリングして出力します。ヒステリシス・レート制限はかけません。

use crate::config::{throttle, ThrottleConfig};

/// PASスロットル1チャネル
#[derive(Debug, Clone)]
pub struct PasThrottle {
    /// 前回読んだレベル（未取得ならNone）
    last_level: Option<bool>,
    /// 前回のレベル変化からの経過周期数
    count: u32,
    /// フィルタ後のレベル変化レート [Hz]
    filtered_hz: f32,
    /// 新しいサンプルの重み
    weight: f32,
    scale: f32,
    output_min: f32,
    output_max: f32,
    timeout_s: f32,
}

impl PasThrottle {
    pub fn new(config: &ThrottleConfig) -> Self {
        let (output_min, output_max) = if config.output_min <= config.output_max {
            (config.output_min, config.output_max)
        } else {
            (throttle::OUTPUT_MIN, throttle::OUTPUT_MAX)
        };
        Self {
            last_level: None,
            count: 0,
            filtered_hz: 0.0,
            weight: config.pas_filter.clamp(0.0, 1.0),
            scale: config.pas_scale(),
            output_min,
            output_max,
            timeout_s: config.pas_timeout_s,
        }
    }

    pub fn reset(&mut self) {
        self.last_level = None;
        self.count = 0;
        self.filtered_hz = 0.0;
    }

    /// フィルタ後のレベル変化レート [Hz]
    pub fn rate_hz(&self) -> f32 {
        self.filtered_hz
    }

    /// 1周期処理
    ///
    /// # 引数
    /// * `level` - 現在の入力レベル
    /// * `dt` - 呼び出し周期 [s]
    pub fn update(&mut self, level: bool, dt: f32) -> f32 {
        match self.last_level {
            Some(last) if last != level => {
                let elapsed = (self.count + 1) as f32 * dt;
                if elapsed > 0.0 {
                    self.filtered_hz = self.weight / elapsed + (1.0 - self.weight) * self.filtered_hz;
                }
                self.count = 0;
            }
            Some(_) => {
                self.count = self.count.saturating_add(1);
                // ペダル停止
                if self.count as f32 * dt > self.timeout_s {
                    self.filtered_hz = 0.0;
                }
            }
            None => {}
        }
        self.last_level = Some(level);

        (self.filtered_hz * self.scale).clamp(self.output_min, self.output_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 20_000.0;

    /// `period` 周期ごとにレベルを反転させて `n` 周期回す
    fn run(pas: &mut PasThrottle, period: u32, n: u32) -> f32 {
        let mut out = 0.0;
        for i in 0..n {
            out = pas.update((i / period) % 2 == 1, DT);
        }
        out
    }

    #[test]
    fn test_half_scale_cadence() {
        // 0.75 rev/s × 12パルス × 2 = 18 Hz → 1111周期ごとに変化
        let mut pas = PasThrottle::new(&ThrottleConfig::default());
        let out = run(&mut pas, 1111, 60_000);
        assert!((out - 0.5).abs() < 0.01, "out = {}", out);
        assert!((pas.rate_hz() - 18.0).abs() < 0.2);
    }

    #[test]
    fn test_output_clamped_to_max() {
        let mut pas = PasThrottle::new(&ThrottleConfig::default());
        let out = run(&mut pas, 100, 20_000);
        assert_eq!(out, throttle::OUTPUT_MAX);
    }

    #[test]
    fn test_timeout_stops_assist() {
        let mut pas = PasThrottle::new(&ThrottleConfig::default());
        run(&mut pas, 1111, 60_000);
        let mut out = 1.0;
        // 0.5秒 + α レベル変化なし
        for _ in 0..10_100 {
            out = pas.update(true, DT);
        }
        assert_eq!(out, 0.0);
    }

    #[test]
    fn test_first_sample_only_records_level() {
        let mut pas = PasThrottle::new(&ThrottleConfig::default());
        assert_eq!(pas.update(true, DT), 0.0);
        assert_eq!(pas.rate_hz(), 0.0);
    }
}
