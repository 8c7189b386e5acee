//! モーター制御とハードウェアの設定パラメータ（デフォルト値）

/// 電流ループPIDゲイン（d軸・q軸共通のデフォルト値）
pub const DEFAULT_FOC_KP: f32 = 0.1;
pub const DEFAULT_FOC_KI: f32 = 0.001;
pub const DEFAULT_FOC_KD: f32 = 0.0;
/// アンチワインドアップ（バックカリキュレーション）ゲイン
pub const DEFAULT_FOC_KC: f32 = 0.05;
/// PID出力制限（変調率）
pub const DEFAULT_FOC_OUTMIN: f32 = -0.95;
pub const DEFAULT_FOC_OUTMAX: f32 = 0.95;

/// スロットル100%に相当するq軸電流 [A]
pub const DEFAULT_FULLSCALE_CURRENT: f32 = 5.0;

/// 電流ループ（高速コンテキスト）周期
pub mod pwm {
    /// PWM周波数 [Hz]（= 高速コンテキストの実行レート）
    pub const DEFAULT_FREQUENCY_HZ: u32 = 20_000;
    /// デッドタイム [ns]
    pub const DEFAULT_DEAD_TIME_NS: u32 = 500;
}

/// 低速コンテキスト（スロットル・監視）
pub mod app {
    /// 実行レート [Hz]
    pub const RATE_HZ: u32 = 1_000;
    /// ステータスLEDのトグル周期 [ms]
    pub const LED_TOGGLE_MS: u32 = 500;
}

/// オープンループランプ
pub mod ramp {
    /// ランプ速度 [電気角Hz]
    pub const DEFAULT_SPEED_HZ: f32 = 5.0;
    /// 変調振幅（0.0～1.0）
    pub const DEFAULT_AMPLITUDE: f32 = 0.2;
    pub const SPEED_MIN_HZ: f32 = 0.1;
    pub const SPEED_MAX_HZ: f32 = 100.0;
}

/// モーター（Hallセンサー）
pub mod motor {
    /// 極対数（Ebikeling 700C 1200W）
    pub const DEFAULT_POLE_PAIRS: u8 = 23;
    /// Hallコード1～6に対応する区間中央の電気角 [回転]（Ebikeling 700C 1200W）
    pub const DEFAULT_HALL_ANGLES: [f32; 6] = [
        0.743786, // コード1
        0.089677, // コード2
        0.905861, // コード3
        0.412525, // コード4
        0.593083, // コード5
        0.240492, // コード6
    ];
    /// 速度EMAフィルタの重み（0.0～1.0）
    pub const DEFAULT_SPEED_FILTER: f32 = 0.2;
    /// エッジが来ない場合に速度をゼロとみなす時間 [s]
    pub const DEFAULT_STALL_TIMEOUT_S: f32 = 0.25;
}

/// Hallセンサー自動検出（コミッショニング）
pub mod hall_detect {
    /// 駆動速度 [電気角Hz]（5Hz = 300 eRPM）
    pub const RAMP_SPEED_HZ: f32 = 5.0;
    /// 平均化を始めるまでに読み飛ばす遷移数
    pub const MIN_TRANSITIONS: u32 = 16;
    /// 平均化に使う遷移数
    pub const TRANSITIONS_TO_AVG: u32 = 16;
    /// タイムアウト [ms]
    pub const TIMEOUT_MS: u32 = 1_500;
    /// 隣接コード間の角度ずれ許容値 [回転]（理想は1/6）
    pub const SPACING_TOLERANCE: f32 = 0.1;
}

/// スロットル（アナログ・PAS共通）
pub mod throttle {
    /// 最小位置電圧のデフォルト [V]
    pub const MIN_DEFAULT: f32 = 0.85;
    /// 最大位置電圧のデフォルト [V]
    pub const MAX_DEFAULT: f32 = 2.20;
    /// 最小位置電圧として許容する範囲 [V]
    pub const MIN_SANE_LOW: f32 = 0.3;
    pub const MIN_SANE_HIGH: f32 = 1.0;
    /// 最大位置電圧として許容する範囲 [V]
    pub const MAX_SANE_LOW: f32 = 1.5;
    pub const MAX_SANE_HIGH: f32 = 3.0;
    /// 範囲判定の丸め誤差許容 [V]
    pub const SANE_TOLERANCE: f32 = 1e-3;
    /// 電源電圧から最大位置までのドロップアウト [V]
    pub const DROPOUT: f32 = 0.72;
    /// 再キャリブレーション判定の余裕 [V]
    pub const RANGE_LIMIT: f32 = 0.05;
    /// 起動時の読み捨てサンプル数
    pub const START_DEADTIME: u32 = 500;
    /// 起動シーケンス全体のサンプル数（読み捨て + 平均化）
    pub const START_TIME: u32 = 1_000;

    pub const HYST_DEFAULT: f32 = 0.025;
    pub const HYST_MIN: f32 = 0.001;
    pub const HYST_MAX: f32 = 0.1;

    /// ローパスフィルタのカットオフ [Hz]
    pub const FILT_DEFAULT: f32 = 2.0;
    pub const FILT_MIN: f32 = 0.1;
    pub const FILT_MAX: f32 = 499.9;
    /// 2次バターワース
    pub const FILT_Q_DEFAULT: f32 = 0.707;
    /// スロットル処理のサンプリングレート [Hz]
    pub const SAMPLING_RATE: f32 = 1_000.0;

    /// 上昇レート制限（1サンプルあたり、1kHzで50%/s）
    pub const RISE_DEFAULT: f32 = 0.0005;
    pub const RISE_MIN: f32 = 0.00005;
    pub const RISE_MAX: f32 = 0.01;

    pub const OUTPUT_MIN: f32 = 0.00;
    pub const OUTPUT_MAX: f32 = 0.99;

    /// PASセンサーのパルス数/回転（マグネット数）
    pub const PAS_PPR: u32 = 12;
    /// PAS速度フィルタの重み
    pub const PAS_FILTER: f32 = 0.2;
    /// アシスト100%となるペダル回転数 [rev/s]（90rpm）
    pub const PAS_FULL_SCALE_RPS: f32 = 1.5;
    /// レベル変化が途絶えたらアシストを止めるまでの時間 [s]
    pub const PAS_TIMEOUT_S: f32 = 0.5;
}

/// ADC換算定数
pub mod adc {
    /// 電流アンプ逆ゲイン [A/V]（0.001Ω、INA213 50倍 → 1/(50*0.001) = 20）
    pub const INV_TIA_GAIN: f32 = 20.0;
    /// VBUS分圧比（1 / (3.09k / (100k + 3.09k))）
    pub const VBUS_RATIO: f32 = 33.36246;
    /// サーミスタ分圧の固定抵抗 [Ω]
    pub const THERM_FIXED_R: f32 = 10_000.0;
    /// サーミスタ 25℃抵抗 [Ω]（NTCALUG02A103G）
    pub const THERM_R25: f32 = 10_000.0;
    /// サーミスタ B定数
    pub const THERM_B: f32 = 3_984.0;
    /// ADC基準電圧 [V]
    pub const VREF: f32 = 3.3;
    /// ADC分解能（12ビット）
    pub const ADC_MAX: u16 = 4096;
    /// VREFINT校正値を取得したときの電源電圧 [V]
    pub const VREFINT_CAL_VOLTS: f32 = 3.0;
}

/// 保護リミット
pub mod limits {
    /// 低電圧しきい値 [V]（3.0V × 16セル）
    pub const VOLT_MIN: f32 = 48.0;
    /// 過電圧しきい値 [V]（4.2V × 16セル）
    pub const VOLT_MAX: f32 = 67.2;
    /// 相電流上限 [A]
    pub const PHASE_I_MAX: f32 = 25.0;
    /// FET温度上限 [℃]
    pub const FET_TEMP_MAX: f32 = 90.0;
    /// 電圧フィルタ係数
    pub const VOLTAGE_FILTER_ALPHA: f32 = 0.1;
}
