// FOC current loop
// Measured phase currents -> dq -> two PID regulators -> modulation vector -> duties

use super::pid_controller::PidController;
use super::svpwm::{svpwm, PwmDuties};
use super::transforms::{clarke, clarke3, inverse_park_cs, limit_magnitude, park_cs};
use crate::angle::ElectricalAngle;
use crate::config::FocConfig;

/// Largest modulation vector magnitude passed to the modulator (linear range)
pub const MAX_MODULATION: f32 = 1.0;

/// Measured phase currents [A]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhaseCurrents {
    /// Phases A and B; C is inferred
    Two { a: f32, b: f32 },
    Three { a: f32, b: f32, c: f32 },
}

impl PhaseCurrents {
    fn is_finite(&self) -> bool {
        match *self {
            Self::Two { a, b } => a.is_finite() && b.is_finite(),
            Self::Three { a, b, c } => a.is_finite() && b.is_finite() && c.is_finite(),
        }
    }

    /// Stationary frame (α, β)
    pub fn alpha_beta(&self) -> (f32, f32) {
        match *self {
            Self::Two { a, b } => clarke(a, b),
            Self::Three { a, b, c } => clarke3(a, b, c),
        }
    }
}

/// Command for one current-loop period
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoopReference {
    /// Modulation vector applied directly; regulators are bypassed
    Voltage { vd: f32, vq: f32 },
    /// Axis current references [A]
    Current { id: f32, iq: f32 },
}

/// Result of one current-loop period
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopOutput {
    /// Measured axis currents [A]
    pub id: f32,
    pub iq: f32,
    /// Modulation vector after magnitude limiting
    pub vd: f32,
    pub vq: f32,
    pub v_alpha: f32,
    pub v_beta: f32,
    pub duties: PwmDuties,
}

/// Field-oriented current controller
pub struct CurrentLoop {
    id_pid: PidController,
    iq_pid: PidController,
}

impl CurrentLoop {
    pub fn new(config: &FocConfig) -> Self {
        Self {
            id_pid: PidController::new(&config.id),
            iq_pid: PidController::new(&config.iq),
        }
    }

    /// Apply new gains without clearing the integrators
    pub fn set_config(&mut self, config: &FocConfig) {
        self.id_pid.set_gains(&config.id);
        self.iq_pid.set_gains(&config.iq);
    }

    pub fn reset(&mut self) {
        self.id_pid.reset();
        self.iq_pid.reset();
    }

    /// Run one period
    ///
    /// # Arguments
    /// * `theta` - Rotor electrical angle
    /// * `currents` - Measured phase currents
    /// * `reference` - Voltage or current command
    pub fn update(&mut self, theta: ElectricalAngle, currents: PhaseCurrents, reference: LoopReference) -> LoopOutput {
        if !currents.is_finite() {
            self.reset();
            return LoopOutput::default();
        }

        let (cos_theta, sin_theta) = theta.cos_sin();

        let (i_alpha, i_beta) = currents.alpha_beta();
        let (id, iq) = park_cs(i_alpha, i_beta, cos_theta, sin_theta);

        let (vd_cmd, vq_cmd) = match reference {
            LoopReference::Voltage { vd, vq } => (vd, vq),
            LoopReference::Current { id: id_ref, iq: iq_ref } => {
                (self.id_pid.update(id_ref, id), self.iq_pid.update(iq_ref, iq))
            }
        };

        let (vd, vq) = limit_magnitude(vd_cmd, vq_cmd, MAX_MODULATION);
        let (v_alpha, v_beta) = inverse_park_cs(vd, vq, cos_theta, sin_theta);
        let duties = svpwm(v_alpha, v_beta);

        LoopOutput {
            id,
            iq,
            vd,
            vq,
            v_alpha,
            v_beta,
            duties,
        }
    }
}
