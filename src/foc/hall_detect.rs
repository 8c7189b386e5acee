//! Hallセンサー自動検出（コミッショニング）
//!
//! 固定振幅・固定速度のオープンループでロータを回し、各Hallコードが出ている間の
//! 駆動電気角を円周平均して `HallTable` を作ります。
//! 規定時間内に必要な遷移数が得られない場合は失敗を返し、テーブルは確定しません。

use libm::atan2f;

use super::hall_sensor::{is_valid_code, HallTable, HALL_SECTORS};
use crate::angle::ElectricalAngle;
use crate::config::hall_detect;

/// 検出失敗の理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DetectError {
    /// 制限時間内に必要な遷移数に達しなかった
    Timeout,
    /// 一部のコードが観測されない、または回転順序が矛盾
    Inconsistent,
    /// モード変更などで中断された
    Aborted,
}

/// 検出の進行状況
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DetectStatus {
    /// 未開始
    Idle,
    /// 実行中: この角度・振幅で d軸電圧を印加すること
    Running { angle: ElectricalAngle, amplitude: f32 },
    /// 完了（学習したテーブル）
    Complete(HallTable),
    /// 失敗
    Failed(DetectError),
}

impl DetectStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Failed(_))
    }
}

/// Hallテーブル自動検出器
pub struct HallDetector {
    status: DetectStatus,
    /// 駆動電気角
    angle: ElectricalAngle,
    /// 駆動速度 [電気角Hz]
    speed_hz: f32,
    /// 駆動振幅（変調率）
    amplitude: f32,
    /// 開始からの経過時間 [s]
    elapsed_s: f32,
    timeout_s: f32,
    /// 直前の有効なHallコード
    prev_code: u8,
    /// 観測した遷移数
    transitions: u32,
    /// 平均化を始める遷移数
    skip_transitions: u32,
    /// 平均化を終える遷移数
    end_transitions: u32,
    /// コードごとの sin/cos 累積（インデックス code-1）
    sum_cos: [f32; HALL_SECTORS],
    sum_sin: [f32; HALL_SECTORS],
    samples: [u32; HALL_SECTORS],
}

impl HallDetector {
    /// 新しい検出器を作成
    ///
    /// # 引数
    /// * `amplitude` - 駆動振幅（0.0～1.0）
    pub fn new(amplitude: f32) -> Self {
        Self {
            status: DetectStatus::Idle,
            angle: ElectricalAngle::ZERO,
            speed_hz: hall_detect::RAMP_SPEED_HZ,
            amplitude: amplitude.clamp(0.0, 1.0),
            elapsed_s: 0.0,
            timeout_s: hall_detect::TIMEOUT_MS as f32 / 1000.0,
            prev_code: 0,
            transitions: 0,
            skip_transitions: hall_detect::MIN_TRANSITIONS,
            end_transitions: hall_detect::MIN_TRANSITIONS + hall_detect::TRANSITIONS_TO_AVG,
            sum_cos: [0.0; HALL_SECTORS],
            sum_sin: [0.0; HALL_SECTORS],
            samples: [0; HALL_SECTORS],
        }
    }

    /// 検出を開始（前回の結果は破棄）
    pub fn start(&mut self) {
        info!("Hall detection: start ({} Hz, amplitude {})", self.speed_hz, self.amplitude);
        self.status = DetectStatus::Running {
            angle: ElectricalAngle::ZERO,
            amplitude: self.amplitude,
        };
        self.angle = ElectricalAngle::ZERO;
        self.elapsed_s = 0.0;
        self.prev_code = 0;
        self.transitions = 0;
        self.sum_cos = [0.0; HALL_SECTORS];
        self.sum_sin = [0.0; HALL_SECTORS];
        self.samples = [0; HALL_SECTORS];
    }

    /// 実行中なら中断
    pub fn abort(&mut self) {
        if matches!(self.status, DetectStatus::Running { .. }) {
            warn!("Hall detection: aborted after {} transitions", self.transitions);
            self.status = DetectStatus::Failed(DetectError::Aborted);
        }
    }

    pub fn status(&self) -> DetectStatus {
        self.status
    }

    /// 1周期分進める
    ///
    /// # 引数
    /// * `dt` - 周期 [s]
    /// * `code` - 現在のHallコード
    pub fn update(&mut self, dt: f32, code: u8) -> DetectStatus {
        if !matches!(self.status, DetectStatus::Running { .. }) {
            return self.status;
        }

        self.elapsed_s += dt;
        if self.elapsed_s > self.timeout_s {
            error!(
                "Hall detection: timeout ({} of {} transitions)",
                self.transitions, self.end_transitions
            );
            self.status = DetectStatus::Failed(DetectError::Timeout);
            return self.status;
        }

        if is_valid_code(code) {
            if is_valid_code(self.prev_code) && code != self.prev_code {
                self.transitions += 1;
            }
            self.prev_code = code;

            // 読み飛ばし区間の後、各コードが出ている間の駆動角を積算
            if self.transitions >= self.skip_transitions {
                let (cos, sin) = self.angle.cos_sin();
                let idx = (code - 1) as usize;
                self.sum_cos[idx] += cos;
                self.sum_sin[idx] += sin;
                self.samples[idx] += 1;
            }
        }

        if self.transitions >= self.end_transitions {
            self.status = match self.finish() {
                Ok(table) => {
                    info!("Hall detection: complete {}", table.angles());
                    DetectStatus::Complete(table)
                }
                Err(e) => {
                    error!("Hall detection: {}", e);
                    DetectStatus::Failed(e)
                }
            };
            return self.status;
        }

        self.angle += self.speed_hz * dt;
        self.status = DetectStatus::Running {
            angle: self.angle,
            amplitude: self.amplitude,
        };
        self.status
    }

    /// 円周平均からテーブルを作成
    fn finish(&self) -> Result<HallTable, DetectError> {
        let mut angles = [0.0; HALL_SECTORS];
        for idx in 0..HALL_SECTORS {
            if self.samples[idx] == 0 {
                return Err(DetectError::Inconsistent);
            }
            angles[idx] = ElectricalAngle::from_radians(atan2f(self.sum_sin[idx], self.sum_cos[idx])).turns();
        }

        let table = HallTable::from_angles(angles);
        table.validate().map_err(|_| DetectError::Inconsistent)?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 20_000.0;
    const SEQUENCE: [u8; 6] = [1, 3, 2, 6, 4, 5];

    /// Ideal sensor mounted `offset` turns ahead of the driven angle
    fn sensor_code(angle: ElectricalAngle, offset: f32) -> u8 {
        let sector = ((angle + offset).turns() * 6.0) as usize;
        SEQUENCE[sector.min(5)]
    }

    fn run(detector: &mut HallDetector, offset: f32) -> DetectStatus {
        let mut code = sensor_code(ElectricalAngle::ZERO, offset);
        loop {
            match detector.update(DT, code) {
                DetectStatus::Running { angle, .. } => code = sensor_code(angle, offset),
                done => return done,
            }
        }
    }

    #[test]
    fn test_idle_until_started() {
        let mut det = HallDetector::new(0.2);
        assert_eq!(det.update(DT, 1), DetectStatus::Idle);
    }

    #[test]
    fn test_round_trip_learns_sector_centres() {
        let offset = 0.3;
        let mut det = HallDetector::new(0.2);
        det.start();

        let DetectStatus::Complete(table) = run(&mut det, offset) else {
            panic!("detection failed: {:?}", det.status());
        };

        for (k, code) in SEQUENCE.iter().enumerate() {
            let expected = ElectricalAngle::wrap((k as f32 + 0.5) / 6.0 - offset);
            let learned = table.angle(*code).unwrap();
            assert!(
                learned.delta(expected).abs() < 0.01,
                "code {}: learned {} expected {}",
                code,
                learned.turns(),
                expected.turns()
            );
        }
        assert_eq!(table.validate(), Ok(()));
    }

    #[test]
    fn test_timeout_when_rotor_does_not_move() {
        let mut det = HallDetector::new(0.2);
        det.start();
        let mut status = det.status();
        for _ in 0..40_000 {
            status = det.update(DT, 1);
            if status.is_finished() {
                break;
            }
        }
        assert_eq!(status, DetectStatus::Failed(DetectError::Timeout));
    }

    #[test]
    fn test_missing_code_is_inconsistent() {
        let mut det = HallDetector::new(0.2);
        det.start();
        // toggles between two codes only
        let mut status = det.status();
        let mut n = 0u32;
        while !status.is_finished() {
            let code = if (n / 200) % 2 == 0 { 1 } else { 3 };
            status = det.update(DT, code);
            n += 1;
        }
        assert_eq!(status, DetectStatus::Failed(DetectError::Inconsistent));
    }

    #[test]
    fn test_abort() {
        let mut det = HallDetector::new(0.2);
        det.start();
        det.update(DT, 1);
        det.abort();
        assert_eq!(det.status(), DetectStatus::Failed(DetectError::Aborted));
        // finished detectors ignore further updates
        assert_eq!(det.update(DT, 3), DetectStatus::Failed(DetectError::Aborted));
    }
}
