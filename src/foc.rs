// FOC (Field Oriented Control) module
// Hall sensor-based current-loop FOC for BLDC hub motors

pub mod current_loop;
pub mod hall_detect;
pub mod hall_sensor;
pub mod pid_controller;
pub mod ramp;
pub mod svpwm;
pub mod transforms;

// Re-export main types for easier access
pub use current_loop::{CurrentLoop, LoopOutput, LoopReference, PhaseCurrents};
pub use hall_detect::{DetectError, DetectStatus, HallDetector};
pub use hall_sensor::{HallTable, HallTableError, RotorEstimator, RotorState};
pub use pid_controller::PidController;
pub use ramp::OpenLoopRamp;
pub use svpwm::{svpwm, svpwm_dq, PwmDuties};

/// モーター駆動モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriveMode {
    /// 出力停止（50%デューティ、ゲート無効）
    #[default]
    Disabled,
    /// オープンループランプ（ベンチ確認用）
    OpenLoopRamp,
    /// Hallテーブル自動検出
    HallDetect,
    /// 電流ループFOC（通常運転）
    Foc,
}

impl DriveMode {
    /// 設定値から変換（範囲外は停止）
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::OpenLoopRamp,
            2 => Self::HallDetect,
            3 => Self::Foc,
            _ => Self::Disabled,
        }
    }

    pub fn as_raw(self) -> u8 {
        match self {
            Self::Disabled => 0,
            Self::OpenLoopRamp => 1,
            Self::HallDetect => 2,
            Self::Foc => 3,
        }
    }
}
