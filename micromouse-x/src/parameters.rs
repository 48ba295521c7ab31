//! Compile-time tuning for the mouse hardware and its behaviour.
//!
//! Runtime-tunable values (the PID gains) start from the defaults here and can be overridden from
//! persistent data.

use crate::datatypes::PidParams;

/// Tyre diameter [mm]
pub const TIRE_DIAMETER: f32 = 12.80;
/// Counts per revolution of the magnetic wheel encoders (14 bit)
pub const ENCODER_RESOLUTION: u16 = 1 << 14;

/// Control loop period [us]
pub const CONTROL_PERIOD_US: u32 = 1000;

/// Maze size in cells (half-size maze)
pub const MAZE_SIZE: usize = 32;
/// Lower-left cell of the goal area
pub const MAZE_GOAL_X: u8 = 14;
pub const MAZE_GOAL_Y: u8 = 14;
/// Goal area size in cells
pub const MAZE_GOAL_SIZE_X: u8 = 3;
pub const MAZE_GOAL_SIZE_Y: u8 = 3;
/// Distance between two cell centres [mm]
pub const CELL_LENGTH: f32 = 90.0;

/// Voltage clamp applied to each motor command [V]
pub const VOLTAGE_MOTOR_LIMIT: f32 = 3.5;
/// Creep velocity used until a profiled straight has covered its length [m/s]
pub const VELOCITY_MIN: f32 = 0.05;
/// Creep angular velocity used until a profiled turn has covered its angle [rad/s]
pub const ANGULAR_VELOCITY_MIN: f32 = 0.5;

pub const VELOCITY_PID_GAIN: PidParams = PidParams::new(6.0, 60.0, 0.0);
pub const ANGULAR_VELOCITY_PID_GAIN: PidParams = PidParams::new(0.4, 4.0, 0.0);
pub const WALL_ADJUST_SIDE_PID_GAIN: PidParams = PidParams::new(0.005, 0.0, 0.0);

/// Wall sensor order used by every per-sensor array: left 90°, left 45°, right 45°, right 90°.
pub const PHOTO_SENSOR_COUNT: usize = 4;
/// Reflected intensity above which a wall is considered present [ADC counts]
pub const WALL_THRESHOLD: [i16; PHOTO_SENSOR_COUNT] = [120, 150, 150, 120];
/// Reflected intensity with the mouse centred in a cell bounded by walls [ADC counts]
pub const WALL_REFERENCE: [i16; PHOTO_SENSOR_COUNT] = [900, 420, 420, 900];

/// Number of samples in the battery moving average
pub const BATTERY_AVERAGE_COUNT: usize = 512;
/// Battery voltage below which runs are refused [V]
pub const BATTERY_LOW_VOLTAGE: f32 = 3.5;

pub const SEARCH_ACCELERATION: f32 = 2.0;
pub const SEARCH_VELOCITY: f32 = 0.3;
pub const FAST_RUN_ACCELERATION: f32 = 4.0;
pub const FAST_RUN_VELOCITY: f32 = 1.0;
pub const TURN_ANGULAR_ACCELERATION: f32 = 40.0;
pub const TURN_ANGULAR_VELOCITY: f32 = 6.0;
