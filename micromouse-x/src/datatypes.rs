use core::ops;

use postcard::experimental::max_size::MaxSize;
use serde::{Deserialize, Serialize};

use crate::maze::WallBytes;
use crate::parameters::{
    ANGULAR_VELOCITY_PID_GAIN, MAZE_SIZE, VELOCITY_PID_GAIN, WALL_ADJUST_SIDE_PID_GAIN,
};
use crate::photo::WallState;

#[derive(Serialize, Deserialize, MaxSize, Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Vec3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3f {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub const fn zeroed() -> Self {
        Self::new(0., 0., 0.)
    }
}

impl ops::Add for Vec3f {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl ops::Sub for Vec3f {
    type Output = Self;

    fn sub(self, rhs: Vec3f) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl ops::Mul<f32> for Vec3f {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

#[derive(Serialize, Deserialize, MaxSize, Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidParams {
    pub p: f32,
    pub i: f32,
    pub d: f32,
}

impl PidParams {
    pub const fn new(p: f32, i: f32, d: f32) -> Self {
        Self { p, i, d }
    }
}

#[derive(Serialize, Deserialize, MaxSize, Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerParams {
    pub velocity: PidParams,
    pub angular_velocity: PidParams,
    pub side_wall: PidParams,
}

impl Default for ControllerParams {
    fn default() -> Self {
        Self {
            velocity: VELOCITY_PID_GAIN,
            angular_velocity: ANGULAR_VELOCITY_PID_GAIN,
            side_wall: WALL_ADJUST_SIDE_PID_GAIN,
        }
    }
}

#[derive(Serialize, Deserialize, MaxSize, Copy, Clone, Debug, PartialEq)]
pub struct PersistentDataFileContents {
    pub controller_params: ControllerParams,
    pub maze_walls: WallBytes,
}

impl Default for PersistentDataFileContents {
    fn default() -> Self {
        Self {
            controller_params: ControllerParams::default(),
            maze_walls: [[0; MAZE_SIZE]; MAZE_SIZE],
        }
    }
}

/// Voltage applied to each motor [V]
#[derive(Serialize, Deserialize, MaxSize, Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotorVoltages {
    pub left: f32,
    pub right: f32,
}

impl MotorVoltages {
    pub const fn zeroed() -> Self {
        Self {
            left: 0.,
            right: 0.,
        }
    }
}

#[derive(Serialize, Deserialize, MaxSize, Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MouseState {
    #[default]
    Idle,
    Calibrating,
    Searching,
    Returning,
    FastRun,
    Error,
}

#[derive(Serialize, Deserialize, MaxSize, Copy, Clone, Debug, PartialEq)]
pub struct Telemetry {
    // Metadata
    pub timestamp: f32,
    pub error_count: u32,
    pub state: MouseState,
    pub controller_params: ControllerParams,

    // Sensor readings
    pub battery_voltage: f32,
    pub velocity: f32,
    pub angular_velocity: f32,
    pub angle: f32,
    pub length: f32,
    pub walls: [WallState; 4],

    // Estimates
    pub x: f32,
    pub y: f32,
    pub cell_x: u8,
    pub cell_y: u8,

    // Output
    pub motor_voltages: MotorVoltages,
}

#[derive(Serialize, Deserialize, MaxSize, Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleCommand {
    StartSearch,
    StartShortestRun,
    Stop,
    CalibrateImu(u32),
    UpdateControllerParams(ControllerParams),
    ClearMaze,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_fits_in_a_single_notification() {
        // ATT MTU of 128 less the 3 byte notification header
        assert!(Telemetry::POSTCARD_MAX_SIZE <= 125);
    }

    #[test]
    fn ble_command_round_trips_through_postcard() {
        let command = BleCommand::UpdateControllerParams(ControllerParams::default());
        let mut buffer = [0u8; BleCommand::POSTCARD_MAX_SIZE];
        let used = postcard::to_slice(&command, &mut buffer).unwrap();
        let decoded: BleCommand = postcard::from_bytes(used).unwrap();
        assert_eq!(decoded, command);
    }
}
