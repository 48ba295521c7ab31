//! PID controller with trapezoidal integration of the error.

use crate::datatypes::PidParams;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Pid {
    gains: PidParams,
    prev_error: f32,
    sum_error: f32,
}

impl Pid {
    pub const fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self::from_params(PidParams::new(kp, ki, kd))
    }

    pub const fn from_params(gains: PidParams) -> Self {
        Self {
            gains,
            prev_error: 0.0,
            sum_error: 0.0,
        }
    }

    pub fn gains(&self) -> PidParams {
        self.gains
    }

    /// Retunes the controller; integrator and derivative history are kept.
    pub fn set_gains(&mut self, gains: PidParams) {
        self.gains = gains;
    }

    pub fn reset(&mut self) {
        self.prev_error = 0.0;
        self.sum_error = 0.0;
    }

    /// Runs one controller step. `dt` is the time since the previous step in seconds.
    pub fn update(&mut self, target: f32, current: f32, dt: f32) -> f32 {
        let error = target - current;
        self.sum_error += (error + self.prev_error) * dt / 2.0;
        let derivative = if dt > 0.0 {
            (error - self.prev_error) / dt
        } else {
            0.0
        };
        self.prev_error = error;

        self.gains.p * error + self.gains.i * self.sum_error + self.gains.d * derivative
    }
}

impl From<PidParams> for Pid {
    fn from(value: PidParams) -> Self {
        Self::from_params(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_float_eq::*;

    #[test]
    fn proportional_term_scales_error() {
        let mut pid = Pid::new(2.0, 0.0, 0.0);
        assert_f32_near!(pid.update(1.5, 0.5, 0.001), 2.0);
        assert_f32_near!(pid.update(0.0, 0.5, 0.001), -1.0);
    }

    #[test]
    fn integral_accumulates_trapezoids() {
        let mut pid = Pid::new(0.0, 1.0, 0.0);
        assert_f32_near!(pid.update(1.0, 0.0, 0.1), 0.05);
        assert_f32_near!(pid.update(1.0, 0.0, 0.1), 0.15);
        assert_f32_near!(pid.update(1.0, 0.0, 0.1), 0.25);
    }

    #[test]
    fn derivative_uses_error_change_over_dt() {
        let mut pid = Pid::new(0.0, 0.0, 1.0);
        assert_f32_near!(pid.update(1.0, 0.0, 0.5), 2.0);
        assert_f32_near!(pid.update(1.0, 0.0, 0.5), 0.0);
        assert_float_absolute_eq!(pid.update(1.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn reset_clears_history_but_not_gains() {
        let mut pid = Pid::new(1.0, 1.0, 0.0);
        pid.update(1.0, 0.0, 1.0);
        pid.update(1.0, 0.0, 1.0);
        pid.reset();
        assert_eq!(pid, Pid::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn set_gains_keeps_integrator() {
        let mut pid = Pid::new(0.0, 1.0, 0.0);
        pid.update(1.0, 0.0, 1.0);
        pid.set_gains(PidParams::new(0.0, 2.0, 0.0));
        // Integral is 0.5 + 1.0 after the second step
        assert_f32_near!(pid.update(1.0, 0.0, 1.0), 3.0);
    }
}
