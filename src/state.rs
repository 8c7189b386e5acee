//! コンテキスト間の共有状態
//!
//! 高速コンテキスト（電流ループ）、低速コンテキスト（スロットル・監視）、
//! Hallエッジ割り込みの間でやり取りする値をまとめます。
//! スカラー値はアトミック変数（f32はビット表現）で、複数フィールドにまたがる値は
//! クリティカルセクションで保護したセルで受け渡します。

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::angle::ElectricalAngle;
use crate::config::ThrottleMode;
use crate::foc::{DetectError, DriveMode, HallTable, PhaseCurrents, PwmDuties, RotorEstimator, RotorState};
use crate::throttle::THROTTLE_CHANNELS;
use crate::voltage_monitor::StatusFlags;

/// f32をアトミックに読み書きするためのラッパー
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub const fn zero() -> Self {
        Self(AtomicU32::new(0))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// ロータ推定器（高速コンテキストとHallエッジ割り込みで共有）
///
/// すべての操作は短いクリティカルセクション内で行います。
pub struct SharedRotor {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Option<RotorEstimator>>>,
}

impl SharedRotor {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// 推定器を登録（起動時に1回）
    pub fn init(&self, estimator: RotorEstimator) {
        self.inner.lock(|cell| *cell.borrow_mut() = Some(estimator));
    }

    /// 高速コンテキストの周期処理: 角度を進めてスナップショットを返す
    pub fn tick(&self, dt: f32) -> Option<RotorState> {
        self.inner.lock(|cell| {
            cell.borrow_mut().as_mut().map(|est| {
                est.on_tick(dt);
                est.snapshot()
            })
        })
    }

    /// Hallエッジ割り込みから呼ぶ
    pub fn on_sensor_edge(&self, code: u8, timestamp: u32) -> bool {
        self.inner.lock(|cell| {
            cell.borrow_mut()
                .as_mut()
                .map(|est| est.on_sensor_edge(code, timestamp))
                .unwrap_or(false)
        })
    }

    /// Hallテーブルを差し替え
    pub fn set_table(&self, table: HallTable) {
        self.inner.lock(|cell| {
            if let Some(est) = cell.borrow_mut().as_mut() {
                est.set_table(table);
            }
        });
    }

    /// 使用中のHallテーブル
    pub fn table(&self) -> Option<HallTable> {
        self.inner.lock(|cell| cell.borrow().as_ref().map(|est| *est.table()))
    }

    pub fn snapshot(&self) -> Option<RotorState> {
        self.inner.lock(|cell| cell.borrow().as_ref().map(RotorEstimator::snapshot))
    }
}

impl Default for SharedRotor {
    fn default() -> Self {
        Self::new()
    }
}

/// テレメトリのスナップショット
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Telemetry {
    pub mode: DriveMode,
    /// ゲート出力が有効か
    pub outputs_enabled: bool,
    pub angle: ElectricalAngle,
    /// 電気角速度 [Hz]
    pub speed_hz: f32,
    pub hall_code: u8,
    pub hall_glitches: u32,
    /// 相電流 [A]
    pub phase_currents: PhaseCurrents,
    /// dq電流 [A]
    pub id: f32,
    pub iq: f32,
    /// 変調ベクトル
    pub vd: f32,
    pub vq: f32,
    pub duties: PwmDuties,
    /// トルク指令（0.0～1.0）
    pub torque_command: f32,
    /// バス電圧 [V]
    pub bus_voltage: f32,
    /// FET温度 [℃]
    pub temperature: f32,
    pub flags: StatusFlags,
    /// 直近のHall検出失敗
    pub detect_error: Option<DetectError>,
}

impl Telemetry {
    pub const fn new() -> Self {
        Self {
            mode: DriveMode::Disabled,
            outputs_enabled: false,
            angle: ElectricalAngle::ZERO,
            speed_hz: 0.0,
            hall_code: 0,
            hall_glitches: 0,
            phase_currents: PhaseCurrents::Two { a: 0.0, b: 0.0 },
            id: 0.0,
            iq: 0.0,
            vd: 0.0,
            vq: 0.0,
            duties: PwmDuties::NEUTRAL,
            torque_command: 0.0,
            bus_voltage: 0.0,
            temperature: 0.0,
            flags: StatusFlags {
                undervoltage: false,
                overvoltage: false,
                overtemperature: false,
                gate_fault: false,
            },
            detect_error: None,
        }
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

/// コンテキスト間の共有状態
pub struct SharedState {
    /// トルク指令（低速 → 高速）
    torque_command: AtomicF32,
    /// PAS出力（高速 → 低速）
    pas_outputs: [AtomicF32; THROTTLE_CHANNELS],
    /// スロットル入力種別（低速 → 高速）
    throttle_modes: [AtomicU8; THROTTLE_CHANNELS],
    /// 要求駆動モード
    drive_mode: AtomicU8,
    /// 保護ステータス（低速 → 高速）
    fault_bits: AtomicU8,
    /// ゲートドライバのフォルト（高速 → 低速）
    gate_fault: AtomicBool,
    /// 変調許可（外部からのフック）
    modulation_enabled: AtomicBool,
    /// 検出したHallテーブル（保存待ち）
    learned_table: Mutex<CriticalSectionRawMutex, Cell<Option<HallTable>>>,
    telemetry: Mutex<CriticalSectionRawMutex, Cell<Telemetry>>,
    pub rotor: SharedRotor,
}

impl SharedState {
    pub const fn new() -> Self {
        Self {
            torque_command: AtomicF32::zero(),
            pas_outputs: [AtomicF32::zero(), AtomicF32::zero()],
            throttle_modes: [AtomicU8::new(THROTTLE_DISABLED), AtomicU8::new(THROTTLE_DISABLED)],
            drive_mode: AtomicU8::new(0),
            fault_bits: AtomicU8::new(0),
            gate_fault: AtomicBool::new(false),
            modulation_enabled: AtomicBool::new(false),
            learned_table: Mutex::new(Cell::new(None)),
            telemetry: Mutex::new(Cell::new(Telemetry::new())),
            rotor: SharedRotor::new(),
        }
    }

    pub fn torque_command(&self) -> f32 {
        self.torque_command.load()
    }

    /// トルク指令を公開（非有限値は0）
    pub fn set_torque_command(&self, command: f32) {
        self.torque_command.store(if command.is_finite() { command } else { 0.0 });
    }

    pub fn pas_outputs(&self) -> [f32; THROTTLE_CHANNELS] {
        [self.pas_outputs[0].load(), self.pas_outputs[1].load()]
    }

    pub fn set_pas_output(&self, channel: usize, output: f32) {
        if let Some(slot) = self.pas_outputs.get(channel) {
            slot.store(output);
        }
    }

    pub fn throttle_mode(&self, channel: usize) -> ThrottleMode {
        self.throttle_modes
            .get(channel)
            .map(|m| ThrottleMode::from_raw(m.load(Ordering::Acquire)))
            .unwrap_or(ThrottleMode::Disabled)
    }

    pub fn set_throttle_mode(&self, channel: usize, mode: ThrottleMode) {
        if let Some(slot) = self.throttle_modes.get(channel) {
            slot.store(throttle_mode_raw(mode), Ordering::Release);
        }
    }

    pub fn drive_mode(&self) -> DriveMode {
        DriveMode::from_raw(self.drive_mode.load(Ordering::Acquire))
    }

    /// 駆動モードを要求（高速コンテキストが次の周期で反映）
    pub fn request_drive_mode(&self, mode: DriveMode) {
        self.drive_mode.store(mode.as_raw(), Ordering::Release);
    }

    pub fn faults(&self) -> StatusFlags {
        StatusFlags::from_bits(self.fault_bits.load(Ordering::Acquire))
    }

    pub fn set_faults(&self, flags: StatusFlags) {
        self.fault_bits.store(flags.bits(), Ordering::Release);
    }

    pub fn gate_fault(&self) -> bool {
        self.gate_fault.load(Ordering::Acquire)
    }

    pub fn set_gate_fault(&self, fault: bool) {
        self.gate_fault.store(fault, Ordering::Release);
    }

    pub fn modulation_enabled(&self) -> bool {
        self.modulation_enabled.load(Ordering::Acquire)
    }

    /// 変調の許可／停止
    pub fn set_modulation_enabled(&self, enabled: bool) {
        self.modulation_enabled.store(enabled, Ordering::Release);
    }

    pub fn store_learned_table(&self, table: HallTable) {
        self.learned_table.lock(|cell| cell.set(Some(table)));
    }

    /// 保存待ちのHallテーブルを取り出す
    pub fn take_learned_table(&self) -> Option<HallTable> {
        self.learned_table.lock(|cell| cell.take())
    }

    /// テレメトリを部分更新
    pub fn update_telemetry(&self, f: impl FnOnce(&mut Telemetry)) {
        self.telemetry.lock(|cell| {
            let mut telemetry = cell.get();
            f(&mut telemetry);
            cell.set(telemetry);
        });
    }

    /// テレメトリの一貫したコピー
    pub fn status(&self) -> Telemetry {
        self.telemetry.lock(|cell| cell.get())
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

const THROTTLE_DISABLED: u8 = 2;

fn throttle_mode_raw(mode: ThrottleMode) -> u8 {
    match mode {
        ThrottleMode::Analog => 0,
        ThrottleMode::Pas => 1,
        ThrottleMode::Disabled => THROTTLE_DISABLED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MotorConfig;

    #[test]
    fn test_torque_command_round_trip() {
        let shared = SharedState::new();
        shared.set_torque_command(0.42);
        assert_eq!(shared.torque_command(), 0.42);
        shared.set_torque_command(f32::NAN);
        assert_eq!(shared.torque_command(), 0.0);
    }

    #[test]
    fn test_modes() {
        let shared = SharedState::new();
        assert_eq!(shared.throttle_mode(0), ThrottleMode::Disabled);
        shared.set_throttle_mode(1, ThrottleMode::Pas);
        assert_eq!(shared.throttle_mode(1), ThrottleMode::Pas);
        assert_eq!(shared.throttle_mode(9), ThrottleMode::Disabled);

        assert_eq!(shared.drive_mode(), DriveMode::Disabled);
        shared.request_drive_mode(DriveMode::Foc);
        assert_eq!(shared.drive_mode(), DriveMode::Foc);
    }

    #[test]
    fn test_shared_rotor() {
        let shared = SharedState::new();
        assert_eq!(shared.rotor.tick(0.001), None);
        assert!(!shared.rotor.on_sensor_edge(1, 0));

        shared.rotor.init(RotorEstimator::new(&MotorConfig::default()));
        assert!(shared.rotor.on_sensor_edge(2, 0));
        let state = shared.rotor.tick(0.0001).unwrap();
        assert_eq!(state.code, 2);
        assert!((0.0..1.0).contains(&state.angle.turns()));
    }

    #[test]
    fn test_learned_table_taken_once() {
        let shared = SharedState::new();
        shared.store_learned_table(HallTable::default());
        assert_eq!(shared.take_learned_table(), Some(HallTable::default()));
        assert_eq!(shared.take_learned_table(), None);
    }

    #[test]
    fn test_telemetry_partial_update() {
        let shared = SharedState::new();
        shared.update_telemetry(|t| t.bus_voltage = 52.0);
        shared.update_telemetry(|t| t.iq = 3.0);
        let status = shared.status();
        assert_eq!(status.bus_voltage, 52.0);
        assert_eq!(status.iq, 3.0);
    }
}
