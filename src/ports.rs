//! ハードウェア境界のインターフェース
//!
//! 制御コアはペリフェラルを直接触らず、ここのトレイトを通してのみ入出力します。
//! 実装はファームウェア側（`firmware/`）とテストのモックが持ちます。

use crate::config::ThrottleMode;
use crate::foc::{PhaseCurrents, PwmDuties};

/// Hallセンサー入力
pub trait PositionSensorPort {
    /// 現在のHallコード（0～7）
    fn read_code(&mut self) -> u8;
}

/// 相電流の計測（高速コンテキスト）
pub trait CurrentSensePort {
    /// 相電流 [A]
    fn phase_currents(&mut self) -> PhaseCurrents;
}

/// 校正済みのアナログ計測値（低速コンテキスト）
pub trait AnalogPort {
    /// バス電圧 [V]
    fn bus_voltage(&mut self) -> f32;
    /// FET温度 [℃]（読めない場合はNaN）
    fn fet_temperature(&mut self) -> f32;
    /// 実測した電源（ADC基準）電圧 [V]、測れない場合はNone
    fn supply_reference(&mut self) -> Option<f32> {
        None
    }
}

/// 3相PWM出力
pub trait PwmSink {
    /// デューティ比（0.0～1.0）を書き込む
    fn set_duties(&mut self, duties: PwmDuties);
    /// ゲート出力を有効化
    fn enable(&mut self);
    /// ゲート出力を無効化
    fn disable(&mut self);
    /// ゲートドライバのフォルト状態
    fn gate_fault(&mut self) -> bool {
        false
    }
}

/// スロットル入力
pub trait ThrottlePort {
    /// 入力経路を切り替える（アナログ入力／デジタル入力＋エッジ検出）
    fn configure(&mut self, channel: usize, mode: ThrottleMode);
    /// アナログ入力電圧 [V]
    fn voltage(&mut self, channel: usize) -> f32;
    /// デジタル入力レベル
    fn level(&mut self, channel: usize) -> bool;
}

/// 外部ウォッチドッグ
pub trait Watchdog {
    fn feed(&mut self);
}

/// ステータス表示（LED）
pub trait StatusIndicator {
    fn toggle(&mut self);
}
