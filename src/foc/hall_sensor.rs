// Hall sensor processing for BLDC motor position and speed estimation
// Edge events snap the angle to a calibrated table; ticks dead-reckon between edges

use crate::angle::ElectricalAngle;
use crate::config::{motor, MotorConfig};

/// Number of valid hall codes per electrical revolution
pub const HALL_SECTORS: usize = 6;

/// Angle covered by one hall sector, in turns
const SECTOR_TURNS: f32 = 1.0 / HALL_SECTORS as f32;

/// Marker for "no neighbour" in the transition lookups
const NO_CODE: u8 = 0;

/// Check if a hall code is valid
///
/// `0b000` and `0b111` are never produced by a healthy 120° sensor set
#[inline]
pub fn is_valid_code(code: u8) -> bool {
    (1..=6).contains(&code)
}

/// Reason a hall table was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HallTableError {
    /// An entry is NaN, infinite or outside `[0, 1)`
    OutOfRange,
    /// Neighbouring entries are not roughly 1/6 turn apart
    Spacing,
    /// Neighbouring codes in angle order differ in more than one bit
    Ordering,
}

/// Mid-sector electrical angle for each hall code 1..=6
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HallTable {
    /// Index `code - 1`, fraction of an electrical revolution
    angles: [f32; HALL_SECTORS],
}

impl HallTable {
    pub const fn from_angles(angles: [f32; HALL_SECTORS]) -> Self {
        Self { angles }
    }

    pub fn angles(&self) -> &[f32; HALL_SECTORS] {
        &self.angles
    }

    /// Calibrated angle for `code`, `None` for the reserved codes
    pub fn angle(&self, code: u8) -> Option<ElectricalAngle> {
        if is_valid_code(code) {
            Some(ElectricalAngle::wrap(self.angles[(code - 1) as usize]))
        } else {
            None
        }
    }

    /// Codes ordered by increasing angle (the forward transition sequence)
    pub fn forward_sequence(&self) -> [u8; HALL_SECTORS] {
        let mut seq = [1u8, 2, 3, 4, 5, 6];
        // insertion sort; six entries
        for i in 1..HALL_SECTORS {
            let mut j = i;
            while j > 0 && self.angles[(seq[j - 1] - 1) as usize] > self.angles[(seq[j] - 1) as usize] {
                seq.swap(j - 1, j);
                j -= 1;
            }
        }
        seq
    }

    /// Check that the table describes one consistent rotational ordering
    pub fn validate(&self) -> Result<(), HallTableError> {
        if self.angles.iter().any(|a| !a.is_finite() || !(0.0..1.0).contains(a)) {
            return Err(HallTableError::OutOfRange);
        }

        let seq = self.forward_sequence();
        for i in 0..HALL_SECTORS {
            let code = seq[i];
            let next = seq[(i + 1) % HALL_SECTORS];

            let mut gap = self.angles[(next - 1) as usize] - self.angles[(code - 1) as usize];
            if gap < 0.0 {
                gap += 1.0;
            }
            if (gap - SECTOR_TURNS).abs() > crate::config::hall_detect::SPACING_TOLERANCE {
                return Err(HallTableError::Spacing);
            }

            // 120° sensors change exactly one bit per transition
            if (code ^ next).count_ones() != 1 {
                return Err(HallTableError::Ordering);
            }
        }
        Ok(())
    }
}

impl Default for HallTable {
    fn default() -> Self {
        Self::from_angles(motor::DEFAULT_HALL_ANGLES)
    }
}

/// Next/previous code lookups derived from a table's forward sequence
#[derive(Debug, Clone, Copy)]
struct Transitions {
    next: [u8; 8],
    prev: [u8; 8],
}

impl Transitions {
    fn new(table: &HallTable) -> Self {
        let seq = table.forward_sequence();
        let mut next = [NO_CODE; 8];
        let mut prev = [NO_CODE; 8];
        for i in 0..HALL_SECTORS {
            let code = seq[i] as usize;
            next[code] = seq[(i + 1) % HALL_SECTORS];
            prev[code] = seq[(i + HALL_SECTORS - 1) % HALL_SECTORS];
        }
        Self { next, prev }
    }
}

/// Consistent copy of the estimator state
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RotorState {
    /// Last valid hall code, 0 before the first edge
    pub code: u8,
    pub angle: ElectricalAngle,
    /// Signed electrical speed [Hz]; positive is the forward sequence
    pub speed_hz: f32,
    /// Timestamp of the last valid edge (timer ticks)
    pub last_edge: u32,
    pub edges: u32,
    pub glitches: u32,
}

/// Rotor position and speed estimator
///
/// `on_tick` runs in the fast context, `on_sensor_edge` in the hall edge
/// handler. Callers sharing one instance between the two must wrap it in a
/// critical-section cell (see `state::SharedRotor`).
#[derive(Debug, Clone)]
pub struct RotorEstimator {
    table: HallTable,
    transitions: Transitions,
    angle: ElectricalAngle,
    /// Signed electrical speed [Hz]
    speed_hz: f32,
    code: u8,
    last_edge: Option<u32>,
    /// Time since the last valid edge [s], advanced by `on_tick`
    since_edge_s: f32,
    stalled: bool,
    edges: u32,
    glitches: u32,
    /// EMA weight of a new speed sample
    speed_filter: f32,
    stall_timeout_s: f32,
    /// Edge timestamp frequency [Hz]
    tick_hz: f32,
    pole_pairs: u8,
}

impl RotorEstimator {
    pub fn new(config: &MotorConfig) -> Self {
        Self {
            table: config.hall_table,
            transitions: Transitions::new(&config.hall_table),
            angle: ElectricalAngle::ZERO,
            speed_hz: 0.0,
            code: NO_CODE,
            last_edge: None,
            since_edge_s: 0.0,
            stalled: true,
            edges: 0,
            glitches: 0,
            speed_filter: config.speed_filter.clamp(0.0, 1.0),
            stall_timeout_s: config.stall_timeout_s,
            tick_hz: config.timestamp_hz.max(1) as f32,
            pole_pairs: config.pole_pairs.max(1),
        }
    }

    /// Advance the angle by `speed * dt`
    pub fn on_tick(&mut self, dt: f32) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }

        self.since_edge_s += dt;
        if !self.stalled && self.since_edge_s > self.stall_timeout_s {
            self.stalled = true;
            self.speed_hz = 0.0;
        }

        self.angle += self.speed_hz * dt;
    }

    /// Process a change of the hall code observed at `timestamp` (timer ticks)
    ///
    /// Returns `false` if the code was a reserved marker and the edge was dropped.
    pub fn on_sensor_edge(&mut self, code: u8, timestamp: u32) -> bool {
        let Some(snap) = self.table.angle(code) else {
            self.glitches = self.glitches.wrapping_add(1);
            if self.glitches % 256 == 1 {
                warn!("Invalid hall code {} (glitches={})", code, self.glitches);
            }
            return false;
        };

        if code == self.code {
            return true;
        }

        let direction = self.direction(self.code, code);

        // After a stall the stored timestamp no longer bounds a single sector
        if let (Some(last), false) = (self.last_edge, self.stalled) {
            let elapsed = timestamp.wrapping_sub(last) as f32 / self.tick_hz;
            if elapsed > 0.0 {
                let instant = direction * SECTOR_TURNS / elapsed;
                self.speed_hz = self.speed_filter * instant + (1.0 - self.speed_filter) * self.speed_hz;
            }
        }

        trace!("Hall edge: {} -> {}, speed={} Hz", self.code, code, self.speed_hz);

        self.angle = snap;
        self.code = code;
        self.last_edge = Some(timestamp);
        self.since_edge_s = 0.0;
        self.stalled = false;
        self.edges = self.edges.wrapping_add(1);
        true
    }

    /// +1.0 for a forward transition, -1.0 for reverse
    ///
    /// Skipped codes fall back to the sign of the shortest angular step.
    fn direction(&self, from: u8, to: u8) -> f32 {
        if self.transitions.next[from as usize] == to {
            return 1.0;
        }
        if self.transitions.prev[from as usize] == to {
            return -1.0;
        }
        match (self.table.angle(from), self.table.angle(to)) {
            (Some(a), Some(b)) if b.delta(a) < 0.0 => -1.0,
            (Some(_), Some(_)) => 1.0,
            // first edge: keep the sign of whatever speed we had
            _ => {
                if self.speed_hz < 0.0 {
                    -1.0
                } else {
                    1.0
                }
            }
        }
    }

    /// Replace the calibration table (commissioning result or config reload)
    pub fn set_table(&mut self, table: HallTable) {
        self.table = table;
        self.transitions = Transitions::new(&table);
        if let Some(angle) = table.angle(self.code) {
            self.angle = angle;
        }
    }

    pub fn table(&self) -> &HallTable {
        &self.table
    }

    /// Forget speed history; the angle is kept
    pub fn reset_speed(&mut self) {
        self.speed_hz = 0.0;
        self.stalled = true;
    }

    pub fn angle(&self) -> ElectricalAngle {
        self.angle
    }

    pub fn speed_hz(&self) -> f32 {
        self.speed_hz
    }

    /// Mechanical speed [rpm]
    pub fn speed_rpm(&self) -> f32 {
        mechanical_rpm(self.speed_hz, self.pole_pairs)
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn glitches(&self) -> u32 {
        self.glitches
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub fn snapshot(&self) -> RotorState {
        RotorState {
            code: self.code,
            angle: self.angle,
            speed_hz: self.speed_hz,
            last_edge: self.last_edge.unwrap_or(0),
            edges: self.edges,
            glitches: self.glitches,
        }
    }
}

/// Electrical [Hz] to mechanical [rpm]
pub fn mechanical_rpm(electrical_hz: f32, pole_pairs: u8) -> f32 {
    electrical_hz * 60.0 / pole_pairs.max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ideal 1,3,2,6,4,5 sequence with sector centres at k/6 + 1/12
    fn ideal_table() -> HallTable {
        let seq = [1u8, 3, 2, 6, 4, 5];
        let mut angles = [0.0; 6];
        for (k, code) in seq.iter().enumerate() {
            angles[(*code - 1) as usize] = k as f32 / 6.0 + 1.0 / 12.0;
        }
        HallTable::from_angles(angles)
    }

    fn estimator() -> RotorEstimator {
        RotorEstimator::new(&MotorConfig {
            hall_table: ideal_table(),
            speed_filter: 1.0,
            ..MotorConfig::default()
        })
    }

    #[test]
    fn test_valid_codes() {
        assert!(!is_valid_code(0));
        assert!(is_valid_code(1));
        assert!(is_valid_code(6));
        assert!(!is_valid_code(7));
    }

    #[test]
    fn test_default_table_is_consistent() {
        let table = HallTable::default();
        assert_eq!(table.validate(), Ok(()));
        assert_eq!(table.forward_sequence(), [2, 6, 4, 5, 1, 3]);
    }

    #[test]
    fn test_table_rejections() {
        assert_eq!(HallTable::from_angles([0.1; 6]).validate(), Err(HallTableError::Spacing));

        let mut angles = *ideal_table().angles();
        angles[0] = f32::NAN;
        assert_eq!(HallTable::from_angles(angles).validate(), Err(HallTableError::OutOfRange));

        // codes 1 and 2 swapped: the 1 -> 6 step changes three bits
        let mut angles = *ideal_table().angles();
        angles.swap(0, 1);
        assert_eq!(HallTable::from_angles(angles).validate(), Err(HallTableError::Ordering));
    }

    #[test]
    fn test_reserved_codes_are_glitches() {
        let mut est = estimator();
        assert!(est.on_sensor_edge(1, 0));
        let before = est.snapshot();

        assert!(!est.on_sensor_edge(0, 100));
        assert!(!est.on_sensor_edge(7, 200));

        let after = est.snapshot();
        assert_eq!(after.glitches, 2);
        assert_eq!(after.angle, before.angle);
        assert_eq!(after.code, before.code);
        assert_eq!(after.last_edge, before.last_edge);
    }

    #[test]
    fn test_forward_speed_and_snap() {
        let mut est = estimator();
        // 1 ms per sector at 1 MHz timestamps -> 1/6 turn per ms = 166.7 Hz
        let mut ts = 0u32;
        for code in [1u8, 3, 2, 6] {
            est.on_sensor_edge(code, ts);
            ts = ts.wrapping_add(1_000);
        }
        assert!((est.speed_hz() - 1000.0 / 6.0).abs() < 0.1);
        assert_eq!(est.angle(), ideal_table().angle(6).unwrap_or_default());
        assert_eq!(est.code(), 6);
    }

    #[test]
    fn test_reverse_speed_is_negative() {
        let mut est = estimator();
        let mut ts = 0u32;
        for code in [5u8, 4, 6, 2] {
            est.on_sensor_edge(code, ts);
            ts += 2_000;
        }
        assert!((est.speed_hz() + 1000.0 / 12.0).abs() < 0.1);
    }

    #[test]
    fn test_skipped_code_uses_shortest_step() {
        let mut est = estimator();
        est.on_sensor_edge(1, 0);
        est.on_sensor_edge(3, 1_000);
        // 3 -> 6 skips code 2, still forward
        est.on_sensor_edge(6, 2_000);
        assert!(est.speed_hz() > 0.0);
        assert_eq!(est.code(), 6);
    }

    #[test]
    fn test_timestamp_wraparound() {
        let mut est = estimator();
        est.on_sensor_edge(1, u32::MAX - 499);
        est.on_sensor_edge(3, 500);
        assert!((est.speed_hz() - 1000.0 / 6.0).abs() < 0.1);
    }

    #[test]
    fn test_tick_interpolates_and_wraps() {
        let mut est = estimator();
        est.on_sensor_edge(1, 0);
        est.on_sensor_edge(3, 1_000);
        let start = est.angle();
        est.on_tick(0.0005);
        assert!((est.angle().delta(start) - 0.5 / 6.0).abs() < 1e-3);

        for _ in 0..10_000 {
            est.on_tick(0.00005);
            assert!((0.0..1.0).contains(&est.angle().turns()));
        }
    }

    #[test]
    fn test_angle_stays_in_range_for_extreme_speed() {
        let mut est = estimator();
        est.on_sensor_edge(1, 0);
        // one tick apart: 166 kHz electrical
        est.on_sensor_edge(3, 1);
        for _ in 0..1000 {
            est.on_tick(0.000_05);
            assert!((0.0..1.0).contains(&est.angle().turns()));
        }
        est.on_tick(f32::INFINITY);
        assert!((0.0..1.0).contains(&est.angle().turns()));
    }

    #[test]
    fn test_stall_forces_zero_speed() {
        let mut est = estimator();
        est.on_sensor_edge(1, 0);
        est.on_sensor_edge(3, 1_000);
        assert!(est.speed_hz() > 0.0);

        for _ in 0..6_000 {
            est.on_tick(0.000_05);
        }
        assert!(est.is_stalled());
        assert_eq!(est.speed_hz(), 0.0);

        // first edge after standstill only resynchronizes the angle
        est.on_sensor_edge(2, 400_000);
        assert_eq!(est.speed_hz(), 0.0);
        est.on_sensor_edge(6, 401_000);
        assert!(est.speed_hz() > 0.0);
    }

    #[test]
    fn test_mechanical_rpm() {
        // 23 pole pairs, 23 Hz electrical = 1 rev/s
        assert!((mechanical_rpm(23.0, 23) - 60.0).abs() < 1e-4);
    }
}
