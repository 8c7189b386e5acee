//! オープンループ制御モード
//!
//! 位置センサーを使わず、固定振幅の電圧ベクトルを一定速度で回します。

use crate::foc::{CurrentLoop, LoopOutput, LoopReference, OpenLoopRamp, PhaseCurrents};

/// オープンループ駆動の実行
pub fn execute(
    ramp: &mut OpenLoopRamp,
    current_loop: &mut CurrentLoop,
    currents: PhaseCurrents,
    dt: f32,
) -> LoopOutput {
    let (angle, amplitude) = ramp.update(dt);
    // 駆動角にd軸を合わせて電圧を印加（電流は計測のみ）
    current_loop.update(angle, currents, LoopReference::Voltage { vd: amplitude, vq: 0.0 })
}
