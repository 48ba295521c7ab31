//! Target generation and feedback for the drive motors.
//!
//! A [`MotionParameter`] describes one manoeuvre (a straight, an in-place turn, holding still or
//! coasting). Every control period [`Motion::update`] advances a trapezoidal velocity profile for it,
//! optionally steers off the side walls and turns the velocity errors into motor voltages.

use core::f32::consts::PI;

use crate::datatypes::{ControllerParams, MotorVoltages};
use crate::parameters::{ANGULAR_VELOCITY_MIN, VELOCITY_MIN, VOLTAGE_MOTOR_LIMIT};
use crate::pid::Pid;
use crate::sensor::Sensed;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotionPattern {
    /// Motors coast, no feedback
    #[default]
    Free,
    /// Hold zero velocity under feedback
    Stop,
    Straight,
    Turn,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotionDirection {
    #[default]
    Forward,
    Back,
    Right,
    Left,
}

impl MotionDirection {
    /// Sign applied to the profile: Back and Right (clockwise) run negative.
    fn sign(self) -> f32 {
        match self {
            MotionDirection::Forward | MotionDirection::Left => 1.0,
            MotionDirection::Back | MotionDirection::Right => -1.0,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotionParameter {
    pub pattern: MotionPattern,
    pub direction: MotionDirection,
    /// [m/s^2]
    pub acceleration: f32,
    /// [m/s]
    pub start_velocity: f32,
    /// [m/s]
    pub max_velocity: f32,
    /// [m/s]
    pub end_velocity: f32,
    /// [mm]
    pub length: f32,
    /// [rad/s^2]
    pub angular_acceleration: f32,
    /// [rad/s]
    pub start_angular_velocity: f32,
    /// [rad/s]
    pub max_angular_velocity: f32,
    /// [rad/s]
    pub end_angular_velocity: f32,
    /// [deg]
    pub angle: f32,
    pub enable_side_wall_adjust: bool,
}

impl MotionParameter {
    pub fn free() -> Self {
        Self::default()
    }

    pub fn stop() -> Self {
        Self {
            pattern: MotionPattern::Stop,
            ..Self::default()
        }
    }

    pub fn straight(
        direction: MotionDirection,
        length: f32,
        acceleration: f32,
        max_velocity: f32,
        end_velocity: f32,
    ) -> Self {
        Self {
            pattern: MotionPattern::Straight,
            direction,
            acceleration,
            max_velocity,
            end_velocity,
            length,
            ..Self::default()
        }
    }

    pub fn turn(
        direction: MotionDirection,
        angle: f32,
        angular_acceleration: f32,
        max_angular_velocity: f32,
    ) -> Self {
        Self {
            pattern: MotionPattern::Turn,
            direction,
            angular_acceleration,
            max_angular_velocity,
            angle,
            ..Self::default()
        }
    }

    pub fn with_start_velocity(mut self, start_velocity: f32) -> Self {
        self.start_velocity = start_velocity;
        self
    }

    pub fn with_side_wall_adjust(mut self, enable: bool) -> Self {
        self.enable_side_wall_adjust = enable;
        self
    }
}

/// Targets generated for the current control period. Velocities are signed.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotionTarget {
    /// [m/s^2]
    pub acceleration: f32,
    /// [m/s]
    pub velocity: f32,
    /// [m/s]
    pub max_velocity: f32,
    /// [rad/s^2]
    pub angular_acceleration: f32,
    /// [rad/s]
    pub angular_velocity: f32,
    /// [rad/s]
    pub max_angular_velocity: f32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotionOutput {
    pub voltages: MotorVoltages,
    /// Set once the manoeuvre has covered its length or angle
    pub done: bool,
}

// One axis of a trapezoidal profile, all values unsigned.
struct Profile {
    acceleration: f32,
    max: f32,
    end: f32,
    min: f32,
    remaining: f32,
}

impl Profile {
    // Returns the next speed and the acceleration applied.
    fn step(&self, current: f32, dt: f32) -> (f32, f32) {
        let braking_distance = if self.acceleration > 0.0 {
            (current * current - self.end * self.end) / (2.0 * self.acceleration)
        } else {
            0.0
        };
        let floor = self.end.max(self.min);

        if self.remaining <= braking_distance {
            let next = (current - self.acceleration * dt).max(floor);
            (next, -self.acceleration)
        } else if current < self.max {
            let next = (current + self.acceleration * dt).min(self.max).max(floor.min(self.max));
            (next, self.acceleration)
        } else {
            (self.max, 0.0)
        }
    }
}

pub struct Motion {
    param: MotionParameter,
    target: MotionTarget,
    origin_length: f32,
    origin_angle: f32,
    done: bool,
    velo_pid: Pid,
    ang_velo_pid: Pid,
    wall_adj_side_pid: Pid,
}

impl Motion {
    pub fn new(params: ControllerParams) -> Self {
        Self {
            param: MotionParameter::free(),
            target: MotionTarget::default(),
            origin_length: 0.0,
            origin_angle: 0.0,
            done: true,
            velo_pid: Pid::from(params.velocity),
            ang_velo_pid: Pid::from(params.angular_velocity),
            wall_adj_side_pid: Pid::from(params.side_wall),
        }
    }

    pub fn set_params(&mut self, params: ControllerParams) {
        self.velo_pid.set_gains(params.velocity);
        self.ang_velo_pid.set_gains(params.angular_velocity);
        self.wall_adj_side_pid.set_gains(params.side_wall);
    }

    pub fn params(&self) -> ControllerParams {
        ControllerParams {
            velocity: self.velo_pid.gains(),
            angular_velocity: self.ang_velo_pid.gains(),
            side_wall: self.wall_adj_side_pid.gains(),
        }
    }

    pub fn param(&self) -> &MotionParameter {
        &self.param
    }

    pub fn target(&self) -> &MotionTarget {
        &self.target
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Latches a new manoeuvre measured from the current pose.
    pub fn start(&mut self, param: MotionParameter, sensed: &Sensed) {
        let sign = param.direction.sign();
        self.origin_length = sensed.length;
        self.origin_angle = sensed.angle;
        self.done = false;
        self.target = match param.pattern {
            MotionPattern::Straight => MotionTarget {
                velocity: sign * param.start_velocity,
                max_velocity: param.max_velocity,
                ..MotionTarget::default()
            },
            MotionPattern::Turn => MotionTarget {
                angular_velocity: sign * param.start_angular_velocity,
                max_angular_velocity: param.max_angular_velocity,
                ..MotionTarget::default()
            },
            MotionPattern::Free | MotionPattern::Stop => MotionTarget::default(),
        };
        if param.pattern == MotionPattern::Free {
            self.reset_feedback();
        }
        self.param = param;
    }

    /// Runs one control period. `dt` is the period in seconds.
    pub fn update(&mut self, sensed: &Sensed, dt: f32) -> MotionOutput {
        self.calc_target(sensed, dt);
        if self.param.enable_side_wall_adjust {
            self.adjust_side_wall(sensed, dt);
        }
        let voltages = self.calc_motor_voltage(sensed, dt);

        MotionOutput {
            voltages,
            done: self.done,
        }
    }

    fn calc_target(&mut self, sensed: &Sensed, dt: f32) {
        let sign = self.param.direction.sign();
        match self.param.pattern {
            MotionPattern::Straight => {
                let travelled = (sensed.length - self.origin_length) * sign;
                let remaining = self.param.length - travelled;
                if self.done || remaining <= 0.0 {
                    self.finish(self.param.end_velocity, 0.0);
                    return;
                }
                let profile = Profile {
                    acceleration: self.param.acceleration,
                    max: self.param.max_velocity,
                    end: self.param.end_velocity,
                    min: VELOCITY_MIN,
                    remaining: remaining / 1000.0,
                };
                let (velocity, acceleration) = profile.step(self.target.velocity * sign, dt);
                self.target.velocity = velocity * sign;
                self.target.acceleration = acceleration * sign;
                self.target.angular_velocity = 0.0;
                self.target.angular_acceleration = 0.0;
            }
            MotionPattern::Turn => {
                let travelled = (sensed.angle - self.origin_angle) * PI / 180.0 * sign;
                let remaining = self.param.angle * PI / 180.0 - travelled;
                if self.done || remaining <= 0.0 {
                    self.finish(0.0, self.param.end_angular_velocity);
                    return;
                }
                let profile = Profile {
                    acceleration: self.param.angular_acceleration,
                    max: self.param.max_angular_velocity,
                    end: self.param.end_angular_velocity,
                    min: ANGULAR_VELOCITY_MIN,
                    remaining,
                };
                let (angular_velocity, angular_acceleration) =
                    profile.step(self.target.angular_velocity * sign, dt);
                self.target.angular_velocity = angular_velocity * sign;
                self.target.angular_acceleration = angular_acceleration * sign;
                self.target.velocity = 0.0;
                self.target.acceleration = 0.0;
            }
            MotionPattern::Stop => {
                self.target = MotionTarget::default();
                self.done = true;
            }
            MotionPattern::Free => {
                self.target = MotionTarget::default();
                self.done = true;
            }
        }
    }

    // Holds the end velocities; a manoeuvre ending at rest becomes a Stop.
    fn finish(&mut self, end_velocity: f32, end_angular_velocity: f32) {
        let sign = self.param.direction.sign();
        self.done = true;
        self.target.acceleration = 0.0;
        self.target.angular_acceleration = 0.0;
        match self.param.pattern {
            MotionPattern::Straight => {
                self.target.velocity = sign * end_velocity;
                self.target.angular_velocity = 0.0;
            }
            _ => {
                self.target.velocity = 0.0;
                self.target.angular_velocity = sign * end_angular_velocity;
            }
        }
        if end_velocity == 0.0 && end_angular_velocity == 0.0 {
            self.param = MotionParameter::stop();
        }
    }

    /// Steers toward the corridor centre using the 45° sensors. Returns false if no side wall is
    /// usable.
    fn adjust_side_wall(&mut self, sensed: &Sensed, dt: f32) -> bool {
        if self.param.pattern != MotionPattern::Straight {
            self.wall_adj_side_pid.reset();
            return false;
        }
        let left = sensed.walls.left45;
        let right = sensed.walls.right45;
        let error = match (left.exist, right.exist) {
            (true, true) => i32::from(left.error) - i32::from(right.error),
            (true, false) => 2 * i32::from(left.error),
            (false, true) => -2 * i32::from(right.error),
            (false, false) => {
                self.wall_adj_side_pid.reset();
                return false;
            }
        };
        self.target.angular_velocity = self.wall_adj_side_pid.update(0.0, error as f32, dt);
        true
    }

    fn calc_motor_voltage(&mut self, sensed: &Sensed, dt: f32) -> MotorVoltages {
        if self.param.pattern == MotionPattern::Free {
            self.reset_feedback();
            return MotorVoltages::zeroed();
        }

        let velo = self
            .velo_pid
            .update(self.target.velocity, sensed.velocity, dt);
        let ang_velo =
            self.ang_velo_pid
                .update(self.target.angular_velocity, sensed.angular_velocity, dt);

        MotorVoltages {
            left: clamp_voltage(velo - ang_velo),
            right: clamp_voltage(velo + ang_velo),
        }
    }

    fn reset_feedback(&mut self) {
        self.velo_pid.reset();
        self.ang_velo_pid.reset();
        self.wall_adj_side_pid.reset();
    }
}

fn clamp_voltage(voltage: f32) -> f32 {
    voltage.clamp(-VOLTAGE_MOTOR_LIMIT, VOLTAGE_MOTOR_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::PidParams;
    use crate::photo::WallState;
    use assert_float_eq::*;

    const DT: f32 = 0.001;

    fn gains() -> ControllerParams {
        ControllerParams {
            velocity: PidParams::new(1.0, 0.0, 0.0),
            angular_velocity: PidParams::new(1.0, 0.0, 0.0),
            side_wall: PidParams::new(0.01, 0.0, 0.0),
        }
    }

    // Ideal plant: the mouse moves exactly at the target velocities.
    fn simulate(motion: &mut Motion, sensed: &mut Sensed, max_steps: usize) -> usize {
        for step in 0..max_steps {
            let output = motion.update(sensed, DT);
            if output.done {
                return step;
            }
            let target = *motion.target();
            sensed.velocity = target.velocity;
            sensed.angular_velocity = target.angular_velocity;
            sensed.length += target.velocity * 1000.0 * DT;
            sensed.angle += target.angular_velocity * DT * 180.0 / PI;
        }
        panic!("motion did not finish");
    }

    #[test]
    fn straight_covers_length_within_speed_limit() {
        let mut motion = Motion::new(gains());
        let mut sensed = Sensed::default();
        motion.start(
            MotionParameter::straight(MotionDirection::Forward, 180.0, 2.0, 0.5, 0.0),
            &sensed,
        );

        let mut peak = 0.0f32;
        for _ in 0..5000 {
            let output = motion.update(&sensed, DT);
            if output.done {
                break;
            }
            let velocity = motion.target().velocity;
            peak = peak.max(velocity);
            sensed.velocity = velocity;
            sensed.length += velocity * 1000.0 * DT;
        }

        assert!(motion.is_done());
        assert_float_absolute_eq!(sensed.length, 180.0, 0.5);
        assert!(peak <= 0.5 + 1e-6);
        assert_float_absolute_eq!(peak, 0.5, 1e-6);
        // Ending at rest falls back to holding position
        assert_eq!(motion.param().pattern, MotionPattern::Stop);
        assert_float_absolute_eq!(motion.target().velocity, 0.0);
    }

    #[test]
    fn straight_back_runs_negative() {
        let mut motion = Motion::new(gains());
        let mut sensed = Sensed::default();
        motion.start(
            MotionParameter::straight(MotionDirection::Back, 45.0, 2.0, 0.3, 0.0),
            &sensed,
        );
        motion.update(&sensed, DT);
        assert!(motion.target().velocity < 0.0);

        simulate(&mut motion, &mut sensed, 5000);
        assert_float_absolute_eq!(sensed.length, -45.0, 0.5);
    }

    #[test]
    fn straight_keeps_end_velocity() {
        let mut motion = Motion::new(gains());
        let mut sensed = Sensed::default();
        motion.start(
            MotionParameter::straight(MotionDirection::Forward, 90.0, 2.0, 0.5, 0.3),
            &sensed,
        );
        simulate(&mut motion, &mut sensed, 5000);
        assert_eq!(motion.param().pattern, MotionPattern::Straight);
        assert_float_absolute_eq!(motion.target().velocity, 0.3, 1e-6);
    }

    #[test]
    fn turns_follow_direction() {
        let mut motion = Motion::new(gains());
        let mut sensed = Sensed::default();
        motion.start(
            MotionParameter::turn(MotionDirection::Left, 90.0, 40.0, 6.0),
            &sensed,
        );
        simulate(&mut motion, &mut sensed, 5000);
        assert_float_absolute_eq!(sensed.angle, 90.0, 0.5);

        motion.start(
            MotionParameter::turn(MotionDirection::Right, 180.0, 40.0, 6.0),
            &sensed,
        );
        motion.update(&sensed, DT);
        assert!(motion.target().angular_velocity < 0.0);
        simulate(&mut motion, &mut sensed, 5000);
        assert_float_absolute_eq!(sensed.angle, -90.0, 0.5);
    }

    #[test]
    fn turning_left_drives_right_wheel_harder() {
        let mut motion = Motion::new(gains());
        let sensed = Sensed::default();
        motion.start(
            MotionParameter::turn(MotionDirection::Left, 90.0, 40.0, 6.0),
            &sensed,
        );
        let output = motion.update(&sensed, DT);
        assert!(output.voltages.right > output.voltages.left);
        assert!(!output.done);
    }

    fn walls(left: Option<i16>, right: Option<i16>) -> Sensed {
        let mut sensed = Sensed::default();
        sensed.walls.left45 = WallState {
            exist: left.is_some(),
            error: left.unwrap_or(0),
        };
        sensed.walls.right45 = WallState {
            exist: right.is_some(),
            error: right.unwrap_or(0),
        };
        sensed
    }

    fn wall_target(sensed: &Sensed) -> f32 {
        let mut motion = Motion::new(gains());
        motion.start(
            MotionParameter::straight(MotionDirection::Forward, 90.0, 2.0, 0.5, 0.0)
                .with_side_wall_adjust(true),
            sensed,
        );
        motion.update(sensed, DT);
        motion.target().angular_velocity
    }

    #[test]
    fn side_wall_adjust_steers_away_from_close_wall() {
        // Closer to the left wall: turn right
        assert_float_absolute_eq!(wall_target(&walls(Some(60), Some(-40))), -1.0, 1e-5);
        // Only the left wall visible counts twice
        assert_float_absolute_eq!(wall_target(&walls(Some(50), None)), -1.0, 1e-5);
        // Only the right wall visible and it is close: turn left
        assert_float_absolute_eq!(wall_target(&walls(None, Some(50))), 1.0, 1e-5);
        assert_float_absolute_eq!(wall_target(&walls(None, None)), 0.0);
    }

    #[test]
    fn motor_voltage_is_clamped() {
        let mut motion = Motion::new(ControllerParams {
            velocity: PidParams::new(100.0, 0.0, 0.0),
            ..gains()
        });
        let sensed = Sensed::default();
        motion.start(
            MotionParameter::straight(MotionDirection::Forward, 90.0, 2.0, 0.5, 0.0)
                .with_start_velocity(0.5),
            &sensed,
        );
        let output = motion.update(&sensed, DT);
        assert_f32_near!(output.voltages.left, VOLTAGE_MOTOR_LIMIT);
        assert_f32_near!(output.voltages.right, VOLTAGE_MOTOR_LIMIT);
    }

    #[test]
    fn free_outputs_nothing() {
        let mut motion = Motion::new(gains());
        let mut sensed = Sensed::default();
        sensed.velocity = 0.4;
        motion.start(MotionParameter::free(), &sensed);
        let output = motion.update(&sensed, DT);
        assert!(output.done);
        assert_eq!(output.voltages, MotorVoltages::zeroed());
    }

    #[test]
    fn stop_brakes_against_motion() {
        let mut motion = Motion::new(gains());
        let mut sensed = Sensed::default();
        sensed.velocity = 0.4;
        motion.start(MotionParameter::stop(), &sensed);
        let output = motion.update(&sensed, DT);
        assert!(output.done);
        assert!(output.voltages.left < 0.0);
        assert!(output.voltages.right < 0.0);
    }

    #[test]
    fn set_params_retunes_controllers() {
        let mut motion = Motion::new(ControllerParams::default());
        motion.set_params(gains());
        assert_eq!(motion.params(), gains());
    }
}
