//! Dead reckoning from the wheel encoders and the IMU.
//!
//! Velocity comes from the encoders; acceleration, angular velocity and heading come from the IMU.
//! Angles are counter-clockwise positive, `x` points along the initial heading.

use core::f32::consts::PI;

#[cfg(not(feature = "std"))]
use micromath::F32Ext;

use crate::imu::ImuSample;
use crate::lib::panic;

const US_TO_SEC: f32 = 1e-6;
const G_TO_MMPS2: f32 = 9.80665;
const MDPS_TO_RADPS: f32 = PI / 180.0 / 1000.0;

/// Per-wheel kinematics derived from successive absolute encoder readings.
#[derive(Copy, Clone, Debug)]
pub struct Wheel {
    tire_diameter: f32,
    invert: bool,
    resolution: u16,
    angle_per_count: f32,
    needs_latch: bool,
    previous: u16,
    angular_velocity: f32,
    angular_acceleration: f32,
    velocity: f32,
}

impl Wheel {
    pub fn new(resolution: u16, tire_diameter: f32, invert: bool) -> Self {
        if resolution < 2 {
            panic!("Encoder resolution {} too small to unwrap.", resolution);
        }
        Self {
            tire_diameter,
            invert,
            resolution,
            angle_per_count: 2.0 * PI / resolution as f32,
            needs_latch: true,
            previous: 0,
            angular_velocity: 0.0,
            angular_acceleration: 0.0,
            velocity: 0.0,
        }
    }

    /// `current` is the raw encoder reading, `delta_us` the time since the previous update.
    pub fn update(&mut self, current: u16, delta_us: u32) {
        let current = current % self.resolution;
        let current = if self.invert {
            (self.resolution - current) % self.resolution
        } else {
            current
        };
        if self.needs_latch {
            self.previous = current;
            self.needs_latch = false;
        }
        if delta_us == 0 {
            return;
        }

        let delta_t = delta_us as f32 * US_TO_SEC;
        let angular_velocity = self.count_delta(current) as f32 * self.angle_per_count / delta_t;
        self.angular_acceleration = (angular_velocity - self.angular_velocity) / delta_t;
        self.angular_velocity = angular_velocity;
        self.velocity = angular_velocity * (self.tire_diameter / 2.0);
        self.previous = current;
    }

    pub fn reset(&mut self) {
        self.needs_latch = true;
        self.angular_velocity = 0.0;
        self.angular_acceleration = 0.0;
        self.velocity = 0.0;
    }

    /// [rad/s]
    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    /// [rad/s^2]
    pub fn angular_acceleration(&self) -> f32 {
        self.angular_acceleration
    }

    /// Surface speed at the tyre [mm/s]
    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    // Shortest signed distance from the previous reading, unwrapping across zero.
    fn count_delta(&self, current: u16) -> i32 {
        let resolution = i32::from(self.resolution);
        let half = resolution / 2;
        let mut delta = i32::from(current) - i32::from(self.previous);
        if delta >= half {
            delta -= resolution;
        } else if delta < -half {
            delta += resolution;
        }
        delta
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WheelsPair {
    pub right: f32,
    pub left: f32,
}

pub struct Odometry {
    right: Wheel,
    left: Wheel,
    wheels_angular_velocity: WheelsPair,
    wheels_angular_acceleration: WheelsPair,
    wheels_velocity: WheelsPair,
    velocity: f32,
    acceleration: f32,
    length: f32,
    angular_velocity: f32,
    angular_acceleration: f32,
    /// Cleared by reset; the next gyro sample becomes the reference rate.
    rate_latched: bool,
    angle: f32,
    x: f32,
    y: f32,
}

impl Odometry {
    /// The left encoder faces the opposite way and is inverted.
    pub fn new(resolution: u16, tire_diameter: f32) -> Self {
        Self {
            right: Wheel::new(resolution, tire_diameter, false),
            left: Wheel::new(resolution, tire_diameter, true),
            wheels_angular_velocity: WheelsPair::default(),
            wheels_angular_acceleration: WheelsPair::default(),
            wheels_velocity: WheelsPair::default(),
            velocity: 0.0,
            acceleration: 0.0,
            length: 0.0,
            angular_velocity: 0.0,
            angular_acceleration: 0.0,
            rate_latched: false,
            angle: 0.0,
            x: 0.0,
            y: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.right.reset();
        self.left.reset();
        self.wheels_angular_velocity = WheelsPair::default();
        self.wheels_angular_acceleration = WheelsPair::default();
        self.wheels_velocity = WheelsPair::default();
        self.velocity = 0.0;
        self.acceleration = 0.0;
        self.length = 0.0;
        self.angular_velocity = 0.0;
        self.angular_acceleration = 0.0;
        self.rate_latched = false;
        self.angle = 0.0;
        self.x = 0.0;
        self.y = 0.0;
    }

    pub fn update(&mut self, right_raw: u16, left_raw: u16, imu: &ImuSample, delta_us: u32) {
        self.right.update(right_raw, delta_us);
        self.left.update(left_raw, delta_us);
        if delta_us == 0 {
            return;
        }
        let delta_t = delta_us as f32 * US_TO_SEC;

        self.wheels_angular_velocity = WheelsPair {
            right: self.right.angular_velocity(),
            left: self.left.angular_velocity(),
        };
        self.wheels_angular_acceleration = WheelsPair {
            right: self.right.angular_acceleration(),
            left: self.left.angular_acceleration(),
        };
        self.wheels_velocity = WheelsPair {
            right: self.right.velocity(),
            left: self.left.velocity(),
        };

        // Linear motion
        self.acceleration = imu.accel.y * G_TO_MMPS2;
        self.velocity = (self.wheels_velocity.right + self.wheels_velocity.left) / 2.0;
        self.length += self.velocity * delta_t;

        // Rotation
        let angular_velocity = imu.gyro.z * MDPS_TO_RADPS;
        if !self.rate_latched {
            self.angular_velocity = angular_velocity;
            self.rate_latched = true;
        }
        self.angular_acceleration = (angular_velocity - self.angular_velocity) / delta_t;
        self.angular_velocity = angular_velocity;
        let angle = self.angle + angular_velocity * delta_t;

        // Position
        if angular_velocity.abs() <= f32::EPSILON {
            let distance = self.velocity * delta_t;
            self.x += distance * angle.cos();
            self.y += distance * angle.sin();
        } else {
            // Chord of the arc travelled during this step
            let half_turn = (angle - self.angle) / 2.0;
            let chord = 2.0 * self.velocity / angular_velocity * half_turn.sin();
            let heading = self.angle + half_turn;
            self.x += chord * heading.cos();
            self.y += chord * heading.sin();
        }
        self.angle = angle;
    }

    pub fn wheels_angular_velocity(&self) -> WheelsPair {
        self.wheels_angular_velocity
    }

    pub fn wheels_angular_acceleration(&self) -> WheelsPair {
        self.wheels_angular_acceleration
    }

    pub fn wheels_velocity(&self) -> WheelsPair {
        self.wheels_velocity
    }

    /// [mm/s]
    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    /// [mm/s^2]
    pub fn acceleration(&self) -> f32 {
        self.acceleration
    }

    /// [mm]
    pub fn length(&self) -> f32 {
        self.length
    }

    /// [rad/s]
    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    /// [rad/s^2]
    pub fn angular_acceleration(&self) -> f32 {
        self.angular_acceleration
    }

    /// [rad]
    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// [mm]
    pub fn x(&self) -> f32 {
        self.x
    }

    /// [mm]
    pub fn y(&self) -> f32 {
        self.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::Vec3f;
    use assert_float_eq::*;

    const RESOLUTION: u16 = 16384;
    const DIAMETER: f32 = 12.8;

    #[test]
    #[should_panic]
    fn wheel_rejects_degenerate_resolution() {
        Wheel::new(1, DIAMETER, false);
    }

    fn still() -> ImuSample {
        ImuSample::default()
    }

    fn yawing(mdps: f32) -> ImuSample {
        ImuSample {
            gyro: Vec3f::new(0.0, 0.0, mdps),
            accel: Vec3f::zeroed(),
        }
    }

    #[test]
    fn wheel_first_update_only_latches() {
        let mut wheel = Wheel::new(RESOLUTION, DIAMETER, false);
        wheel.update(5000, 1000);
        assert_float_absolute_eq!(wheel.angular_velocity(), 0.0);
        assert_float_absolute_eq!(wheel.velocity(), 0.0);
    }

    #[test]
    fn wheel_velocity_from_count_delta() {
        let mut wheel = Wheel::new(RESOLUTION, DIAMETER, false);
        wheel.update(1000, 1000);
        wheel.update(1100, 1000);

        let expected_w = 100.0 * 2.0 * PI / RESOLUTION as f32 / 0.001;
        assert_float_relative_eq!(wheel.angular_velocity(), expected_w, 1e-4);
        assert_float_relative_eq!(wheel.velocity(), expected_w * DIAMETER / 2.0, 1e-4);
        assert_float_relative_eq!(wheel.angular_acceleration(), expected_w / 0.001, 1e-4);
    }

    #[test]
    fn wheel_unwraps_across_zero() {
        let mut forward = Wheel::new(RESOLUTION, DIAMETER, false);
        forward.update(RESOLUTION - 50, 1000);
        forward.update(50, 1000);
        assert!(forward.angular_velocity() > 0.0);

        let mut backward = Wheel::new(RESOLUTION, DIAMETER, false);
        backward.update(50, 1000);
        backward.update(RESOLUTION - 50, 1000);
        assert!(backward.angular_velocity() < 0.0);
        assert_float_relative_eq!(forward.angular_velocity(), -backward.angular_velocity(), 1e-4);
    }

    #[test]
    fn wheel_invert_flips_direction() {
        let mut wheel = Wheel::new(RESOLUTION, DIAMETER, true);
        wheel.update(0, 1000);
        wheel.update(RESOLUTION - 100, 1000);
        assert!(wheel.angular_velocity() > 0.0);
    }

    #[test]
    fn wheel_reset_relatches() {
        let mut wheel = Wheel::new(RESOLUTION, DIAMETER, false);
        wheel.update(0, 1000);
        wheel.update(200, 1000);
        wheel.reset();
        wheel.update(8000, 1000);
        assert_float_absolute_eq!(wheel.angular_velocity(), 0.0);
    }

    #[test]
    fn odometry_drives_straight() {
        let mut odometry = Odometry::new(RESOLUTION, DIAMETER);
        let mut right = 0u16;
        let mut left = 0u16;
        odometry.update(right, left, &still(), 1000);
        for _ in 0..100 {
            right = (right + 10) % RESOLUTION;
            left = (left + RESOLUTION - 10) % RESOLUTION;
            odometry.update(right, left, &still(), 1000);
        }

        let distance = 100.0 * 10.0 * 2.0 * PI / RESOLUTION as f32 * DIAMETER / 2.0;
        assert_float_relative_eq!(odometry.length(), distance, 1e-3);
        assert_float_relative_eq!(odometry.x(), distance, 1e-3);
        assert_float_absolute_eq!(odometry.y(), 0.0, 1e-4);
        assert_float_relative_eq!(odometry.velocity(), distance / 0.1, 1e-3);
    }

    #[test]
    fn odometry_integrates_yaw_rate() {
        let mut odometry = Odometry::new(RESOLUTION, DIAMETER);
        // 90 dps for one second
        for _ in 0..1000 {
            odometry.update(0, 0, &yawing(90_000.0), 1000);
        }
        assert_float_relative_eq!(odometry.angle(), PI / 2.0, 1e-3);
        assert_float_relative_eq!(odometry.angular_velocity(), PI / 2.0, 1e-4);
        assert_float_absolute_eq!(odometry.angular_acceleration(), 0.0, 1e-3);
    }

    #[test]
    fn odometry_arc_curves_left() {
        let mut odometry = Odometry::new(RESOLUTION, DIAMETER);
        let mut right = 0u16;
        let mut left = 0u16;
        odometry.update(right, left, &yawing(90_000.0), 1000);
        for _ in 0..500 {
            right = (right + 10) % RESOLUTION;
            left = (left + RESOLUTION - 10) % RESOLUTION;
            odometry.update(right, left, &yawing(90_000.0), 1000);
        }
        assert!(odometry.x() > 0.0);
        assert!(odometry.y() > 0.0);
        assert!(odometry.y() < odometry.x());
    }

    #[test]
    fn odometry_reports_forward_acceleration_in_mm() {
        let mut odometry = Odometry::new(RESOLUTION, DIAMETER);
        let sample = ImuSample {
            gyro: Vec3f::zeroed(),
            accel: Vec3f::new(0.0, 100.0, 1000.0),
        };
        odometry.update(0, 0, &sample, 1000);
        assert_float_relative_eq!(odometry.acceleration(), 980.665, 1e-5);
    }

    #[test]
    fn odometry_reset_clears_pose() {
        let mut odometry = Odometry::new(RESOLUTION, DIAMETER);
        odometry.update(0, 0, &yawing(90_000.0), 1000);
        odometry.update(100, RESOLUTION - 100, &yawing(90_000.0), 1000);
        odometry.reset();
        assert_float_absolute_eq!(odometry.angle(), 0.0);
        assert_float_absolute_eq!(odometry.x(), 0.0);
        assert_float_absolute_eq!(odometry.length(), 0.0);
        assert_float_absolute_eq!(odometry.velocity(), 0.0);
    }

    #[test]
    fn first_gyro_sample_after_reset_has_no_angular_acceleration() {
        let mut odometry = Odometry::new(RESOLUTION, DIAMETER);
        odometry.update(0, 0, &yawing(90_000.0), 1000);
        assert_float_absolute_eq!(odometry.angular_acceleration(), 0.0);

        odometry.update(0, 0, &still(), 1000);
        odometry.reset();
        odometry.update(0, 0, &yawing(-45_000.0), 1000);
        assert_float_absolute_eq!(odometry.angular_acceleration(), 0.0);
        assert_float_relative_eq!(odometry.angular_velocity(), -PI / 4.0, 1e-4);

        // Later samples differentiate normally: +45 dps change over 1 ms
        odometry.update(0, 0, &still(), 1000);
        assert_float_relative_eq!(odometry.angular_acceleration(), PI / 4.0 / 0.001, 1e-3);
    }
}
