//! E-bike ハブモーター用 FOC 制御コア
//!
//! Hallセンサー付きBLDCモーターの電流ループ、スロットル処理、実行コンテキストを
//! ハードウェア非依存で実装します。ペリフェラルとの入出力は [`ports`] のトレイト経由です。
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod angle;
pub mod config;
pub mod foc;
pub mod ports;
pub mod scaling;
pub mod state;
pub mod tasks;
pub mod throttle;
pub mod voltage_monitor;

pub use angle::ElectricalAngle;
pub use config::ControllerConfig;
pub use state::{SharedState, Telemetry};
pub use tasks::{on_hall_edge, FastContext, SlowContext};
