// Discrete PID controller with back-calculation anti-windup
// Gains are per-sample (no dt scaling); the loop runs at a fixed rate

use crate::config::{PidGains, DEFAULT_FOC_OUTMAX, DEFAULT_FOC_OUTMIN};

/// PID controller with output clamping and back-calculation anti-windup
#[derive(Debug, Clone)]
pub struct PidController {
    /// Proportional gain
    kp: f32,
    /// Integral gain (per sample)
    ki: f32,
    /// Derivative gain (per sample)
    kd: f32,
    /// Anti-windup gain; 0.0 disables back-calculation
    kc: f32,
    /// Integral accumulator
    integral: f32,
    /// Error of the previous step, for the derivative term
    prev_error: f32,
    /// Minimum output limit
    output_min: f32,
    /// Maximum output limit
    output_max: f32,
    /// Last calculated output
    last_output: f32,
}

impl PidController {
    /// Create a PID controller from a gain set
    pub fn new(gains: &PidGains) -> Self {
        let mut pid = Self {
            kp: gains.kp,
            ki: gains.ki,
            kd: gains.kd,
            kc: gains.kc,
            integral: 0.0,
            prev_error: 0.0,
            output_min: 0.0,
            output_max: 0.0,
            last_output: 0.0,
        };
        pid.set_limits(gains.out_min, gains.out_max);
        pid
    }

    /// Run one controller step
    ///
    /// # Arguments
    /// * `reference` - Desired value
    /// * `measured` - Actual measured value
    ///
    /// # Returns
    /// Controller output (limited to output_min..output_max)
    pub fn update(&mut self, reference: f32, measured: f32) -> f32 {
        let error = reference - measured;

        self.integral += self.ki * error;

        let unclamped = self.kp * error + self.integral + self.kd * (error - self.prev_error);
        let clamped = unclamped.clamp(self.output_min, self.output_max);

        // Bleed the integrator by the amount the output was clipped
        self.integral -= self.kc * (unclamped - clamped);

        self.prev_error = error;
        self.last_output = clamped;
        clamped
    }

    /// Reset the integrator and derivative history
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
        self.last_output = 0.0;
    }

    /// Replace gains and limits; the integrator is kept
    pub fn set_gains(&mut self, gains: &PidGains) {
        self.kp = gains.kp;
        self.ki = gains.ki;
        self.kd = gains.kd;
        self.kc = gains.kc;
        self.set_limits(gains.out_min, gains.out_max);
    }

    /// Set the output limits; swapped bounds are reordered, non-finite bounds fall back to the defaults
    pub fn set_limits(&mut self, output_min: f32, output_max: f32) {
        if !output_min.is_finite() || !output_max.is_finite() {
            self.output_min = DEFAULT_FOC_OUTMIN;
            self.output_max = DEFAULT_FOC_OUTMAX;
        } else if output_min <= output_max {
            self.output_min = output_min;
            self.output_max = output_max;
        } else {
            self.output_min = output_max;
            self.output_max = output_min;
        }
    }

    /// Get the current output
    pub fn get_output(&self) -> f32 {
        self.last_output
    }

    /// Get the current integral term
    pub fn get_integral(&self) -> f32 {
        self.integral
    }

    /// Check if output is currently saturated
    pub fn is_saturated(&self) -> bool {
        self.last_output <= self.output_min || self.last_output >= self.output_max
    }
}
