//! スロットル入力の調整
//!
//! 2チャネル（アナログ／PAS／無効）のスロットルからトルク指令を作ります。
//! アナログチャネルは低速コンテキストで処理し、PASチャネルは高速コンテキストで
//! レベルをサンプリングした結果（`PasThrottle`の出力）を受け取ります。

pub mod analog;
pub mod biquad;
pub mod pas;

pub use analog::{AnalogThrottle, CalibrationState};
pub use biquad::LowPass;
pub use pas::PasThrottle;

use crate::config::{ThrottleConfig, ThrottleMode};
use crate::ports::ThrottlePort;

/// スロットルのチャネル数
pub const THROTTLE_CHANNELS: usize = 2;

/// 1チャネル分の状態
#[derive(Debug, Clone)]
enum Channel {
    Disabled,
    Analog(AnalogThrottle),
    /// 出力は高速コンテキストから受け取る
    Pas,
}

impl Channel {
    fn new(config: &ThrottleConfig, mode: ThrottleMode) -> Self {
        match mode {
            ThrottleMode::Analog => Self::Analog(AnalogThrottle::new(config)),
            ThrottleMode::Pas => Self::Pas,
            ThrottleMode::Disabled => Self::Disabled,
        }
    }

    fn mode(&self) -> ThrottleMode {
        match self {
            Self::Disabled => ThrottleMode::Disabled,
            Self::Analog(_) => ThrottleMode::Analog,
            Self::Pas => ThrottleMode::Pas,
        }
    }
}

/// スロットル（全チャネル）
pub struct Throttle {
    configs: [ThrottleConfig; THROTTLE_CHANNELS],
    channels: [Channel; THROTTLE_CHANNELS],
    supply_reference: Option<f32>,
    last_command: f32,
}

impl Throttle {
    /// 設定に従ってチャネルを初期化
    ///
    /// 入力経路の切り替えは `set_mode` で行う（起動時は全チャネル分呼ぶこと）
    pub fn new(configs: &[ThrottleConfig; THROTTLE_CHANNELS]) -> Self {
        Self {
            configs: *configs,
            channels: [
                Channel::new(&configs[0], configs[0].mode),
                Channel::new(&configs[1], configs[1].mode),
            ],
            supply_reference: None,
            last_command: 0.0,
        }
    }

    /// チャネルの入力種別を切り替え
    ///
    /// 入力経路（アナログ／エッジ検出）の再設定はポート側が行います。
    /// アナログに切り替えた場合はキャリブレーションからやり直します。
    pub fn set_mode<P: ThrottlePort>(&mut self, port: &mut P, channel: usize, mode: ThrottleMode) {
        if channel >= THROTTLE_CHANNELS {
            warn!("Throttle: invalid channel {}", channel);
            return;
        }
        port.configure(channel, mode);
        let mut ch = Channel::new(&self.configs[channel], mode);
        if let Channel::Analog(analog) = &mut ch {
            analog.set_supply_reference(self.supply_reference);
        }
        self.channels[channel] = ch;
        self.configs[channel].mode = mode;
        info!("Throttle channel {}: {}", channel, mode);
    }

    pub fn mode(&self, channel: usize) -> ThrottleMode {
        self.channels
            .get(channel)
            .map(Channel::mode)
            .unwrap_or(ThrottleMode::Disabled)
    }

    /// 各チャネルの入力種別
    pub fn modes(&self) -> [ThrottleMode; THROTTLE_CHANNELS] {
        [self.channels[0].mode(), self.channels[1].mode()]
    }

    /// 最大位置推定用の電源電圧を設定
    pub fn set_supply_reference(&mut self, volts: Option<f32>) {
        self.supply_reference = volts;
        for ch in self.channels.iter_mut() {
            if let Channel::Analog(analog) = ch {
                analog.set_supply_reference(volts);
            }
        }
    }

    /// アナログチャネルの状態（診断用）
    pub fn analog(&self, channel: usize) -> Option<&AnalogThrottle> {
        match self.channels.get(channel) {
            Some(Channel::Analog(analog)) => Some(analog),
            _ => None,
        }
    }

    pub fn last_command(&self) -> f32 {
        self.last_command
    }

    /// 1サンプル処理（低速コンテキスト）
    ///
    /// # 引数
    /// * `port` - アナログ電圧の読み出し元
    /// * `pas_outputs` - 高速コンテキストが公開したPAS出力
    ///
    /// # 戻り値
    /// 有効なチャネルのうち最大の指令
    pub fn update<P: ThrottlePort>(&mut self, port: &mut P, pas_outputs: [f32; THROTTLE_CHANNELS]) -> f32 {
        let mut command = 0.0f32;
        for (idx, ch) in self.channels.iter_mut().enumerate() {
            let out = match ch {
                Channel::Disabled => 0.0,
                Channel::Analog(analog) => analog.update(port.voltage(idx)),
                Channel::Pas => pas_outputs[idx],
            };
            if out.is_finite() {
                command = command.max(out);
            }
        }
        self.last_command = command;
        command
    }
}
