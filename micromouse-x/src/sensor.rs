use core::f32::consts::PI;

use crate::battery::Battery;
use crate::imu::ImuSample;
use crate::odometry::Odometry;
use crate::parameters::{ENCODER_RESOLUTION, PHOTO_SENSOR_COUNT, TIRE_DIAMETER};
use crate::photo::{PhotoResult, PhotoWalls, WallDetector};

/// Readings discarded at start-up before the estimates are reset.
pub const WARM_UP_COUNTS: u32 = 10;

/// One round of raw readings from every sensor.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorInputs {
    pub battery_tap_millivolts: i32,
    pub photo: [PhotoResult; PHOTO_SENSOR_COUNT],
    pub imu: ImuSample,
    pub encoder_right: u16,
    pub encoder_left: u16,
}

/// Latest state of the mouse as seen by its sensors.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sensed {
    /// [m/s]
    pub velocity: f32,
    /// [rad/s]
    pub angular_velocity: f32,
    /// [deg]
    pub angle: f32,
    /// [mm]
    pub length: f32,
    /// [mm]
    pub x: f32,
    /// [mm]
    pub y: f32,
    /// Averaged [V]
    pub battery_voltage: f32,
    pub walls: PhotoWalls,
}

pub struct Sensor {
    battery: Battery,
    odometry: Odometry,
    wall_detector: WallDetector,
    sensed: Sensed,
}

impl Sensor {
    pub fn new() -> Self {
        Self::with_wall_detector(WallDetector::default())
    }

    pub fn with_wall_detector(wall_detector: WallDetector) -> Self {
        Self {
            battery: Battery::new(),
            odometry: Odometry::new(ENCODER_RESOLUTION, TIRE_DIAMETER),
            wall_detector,
            sensed: Sensed::default(),
        }
    }

    pub fn update(&mut self, inputs: &SensorInputs, delta_us: u32) -> Sensed {
        self.battery.update(inputs.battery_tap_millivolts);
        self.odometry.update(
            inputs.encoder_right,
            inputs.encoder_left,
            &inputs.imu,
            delta_us,
        );

        self.sensed = Sensed {
            velocity: self.odometry.velocity() / 1000.0,
            angular_velocity: self.odometry.angular_velocity(),
            angle: self.odometry.angle() * 180.0 / PI,
            length: self.odometry.length(),
            x: self.odometry.x(),
            y: self.odometry.y(),
            battery_voltage: self.battery.average() as f32 / 1000.0,
            walls: self.wall_detector.evaluate(&inputs.photo),
        };
        self.sensed
    }

    pub fn get(&self) -> Sensed {
        self.sensed
    }

    pub fn odometry(&self) -> &Odometry {
        &self.odometry
    }

    pub fn battery(&self) -> &Battery {
        &self.battery
    }

    /// Zeroes the pose estimate. Battery history and wall readings are kept.
    pub fn reset(&mut self) {
        self.odometry.reset();
        self.sensed = Sensed {
            battery_voltage: self.sensed.battery_voltage,
            walls: self.sensed.walls,
            ..Sensed::default()
        };
    }
}

impl Default for Sensor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::Vec3f;
    use assert_float_eq::*;

    fn inputs(right: u16, left: u16, yaw_mdps: f32) -> SensorInputs {
        SensorInputs {
            battery_tap_millivolts: 1950,
            photo: [
                PhotoResult {
                    ambient: 10,
                    flash: 1200,
                },
                PhotoResult::default(),
                PhotoResult::default(),
                PhotoResult::default(),
            ],
            imu: ImuSample {
                gyro: Vec3f::new(0.0, 0.0, yaw_mdps),
                accel: Vec3f::zeroed(),
            },
            encoder_right: right,
            encoder_left: left,
        }
    }

    #[test]
    fn update_converts_units() {
        let mut sensor = Sensor::new();
        sensor.update(&inputs(0, 0, 0.0), 1000);
        let sensed = sensor.update(&inputs(100, ENCODER_RESOLUTION - 100, 90_000.0), 1000);

        let expected_velocity = 100.0 * 2.0 * PI / ENCODER_RESOLUTION as f32 / 0.001
            * TIRE_DIAMETER
            / 2.0
            / 1000.0;
        assert_float_relative_eq!(sensed.velocity, expected_velocity, 1e-4);
        assert_float_relative_eq!(sensed.angular_velocity, PI / 2.0, 1e-4);
        assert_float_relative_eq!(sensed.angle, 0.09, 1e-3);
        assert_float_absolute_eq!(sensed.battery_voltage, 4.0, 1e-6);
        assert!(sensed.walls.left90.exist);
        assert!(!sensed.walls.right90.exist);
    }

    #[test]
    fn reset_zeroes_pose_only() {
        let mut sensor = Sensor::new();
        for i in 0..WARM_UP_COUNTS as u16 {
            sensor.update(&inputs(i * 10, 0, 1000.0), 1000);
        }
        sensor.reset();
        let sensed = sensor.get();
        assert_float_absolute_eq!(sensed.length, 0.0);
        assert_float_absolute_eq!(sensed.angle, 0.0);
        assert_float_absolute_eq!(sensed.battery_voltage, 4.0, 1e-6);
        assert!(sensed.walls.left90.exist);
    }
}
