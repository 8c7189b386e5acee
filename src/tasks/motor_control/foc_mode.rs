//! FOC（Field Oriented Control）制御モード
//!
//! Hallセンサーで推定した電気角を使い、d軸電流0・q軸電流をトルク指令に
//! 追従させます。

use crate::angle::ElectricalAngle;
use crate::foc::{CurrentLoop, LoopOutput, LoopReference, PhaseCurrents};

/// FOC制御の実行
///
/// # 引数
/// * `current_loop` - 電流ループ
/// * `angle` - ロータ電気角
/// * `currents` - 相電流 [A]
/// * `iq_ref` - q軸電流指令 [A]
pub fn execute(
    current_loop: &mut CurrentLoop,
    angle: ElectricalAngle,
    currents: PhaseCurrents,
    iq_ref: f32,
) -> LoopOutput {
    // SPMSM: d軸電流は0
    current_loop.update(angle, currents, LoopReference::Current { id: 0.0, iq: iq_ref })
}
