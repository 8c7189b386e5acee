//! Hallテーブル自動検出モード
//!
//! 検出器が指示する角度・振幅でロータを引き回し、完了したら学習したテーブルを
//! ロータ推定器に反映します。失敗時は以前のテーブルを維持します。
//! いずれの場合も終了後は停止モードに戻ります。

use crate::foc::{
    CurrentLoop, DetectStatus, DriveMode, HallDetector, LoopOutput, LoopReference, PhaseCurrents,
};
use crate::ports::PositionSensorPort;
use crate::state::SharedState;

/// 検出の1周期分を実行
///
/// # 戻り値
/// * `Some(output)` - 検出中（この出力で変調する）
/// * `None` - 検出が終了した（変調停止）
pub fn execute<S: PositionSensorPort>(
    detector: &mut HallDetector,
    current_loop: &mut CurrentLoop,
    shared: &SharedState,
    sensor: &mut S,
    currents: PhaseCurrents,
    dt: f32,
) -> Option<LoopOutput> {
    match detector.update(dt, sensor.read_code()) {
        DetectStatus::Running { angle, amplitude } => Some(current_loop.update(
            angle,
            currents,
            LoopReference::Voltage { vd: amplitude, vq: 0.0 },
        )),
        DetectStatus::Complete(table) => {
            shared.rotor.set_table(table);
            shared.store_learned_table(table);
            shared.update_telemetry(|t| t.detect_error = None);
            shared.request_drive_mode(DriveMode::Disabled);
            info!("Hall table applied, returning to Disabled");
            None
        }
        DetectStatus::Failed(e) => {
            shared.update_telemetry(|t| t.detect_error = Some(e));
            shared.request_drive_mode(DriveMode::Disabled);
            warn!("Hall detection failed ({}), keeping previous table", e);
            None
        }
        DetectStatus::Idle => {
            // モード遷移を経ずに呼ばれた場合
            detector.start();
            None
        }
    }
}
