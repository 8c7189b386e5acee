//! 実行コンテキスト
//!
//! 高速コンテキスト（PWM周期）、低速コンテキスト（1kHz）、Hallエッジ割り込みの
//! 3つの入口を提供します。優先度はエッジ割り込みが両コンテキストの中間です。

pub mod motor_control;
pub mod supervisor;

pub use motor_control::FastContext;
pub use supervisor::SlowContext;

use crate::state::SharedState;

/// Hallエッジ割り込みの処理
///
/// # 引数
/// * `code` - エッジ後のHallコード
/// * `timestamp` - エッジ時刻（`MotorConfig::timestamp_hz` のカウンタ値）
///
/// # 戻り値
/// 有効なコードとして受理した場合 `true`
pub fn on_hall_edge(shared: &SharedState, code: u8, timestamp: u32) -> bool {
    shared.rotor.on_sensor_edge(code, timestamp)
}
