use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_sync::signal::Signal;

use embedded_cli::Command;

use micromouse_x::buzzer::Melody;
use micromouse_x::datatypes::{BleCommand, ControllerParams, MouseState, Telemetry};
use micromouse_x::maze::{Map, WallBytes};
use micromouse_x::motion::MotionParameter;
use micromouse_x::sensor::Sensed;

use crate::rtos;

const BLE_COMMAND_CHANNEL_SIZE: usize = 4;
const RUN_REQUEST_CHANNEL_SIZE: usize = 2;
const PERSISTENT_DATA_CHANNEL_SIZE: usize = 2;
const BUZZER_QUEUE_SIZE: usize = 4;

pub type TelemetrySignal = Signal<NoopRawMutex, Telemetry>;
pub type SensedSignal = Signal<NoopRawMutex, Sensed>;

pub type BleCommandChannel = Channel<NoopRawMutex, BleCommand, BLE_COMMAND_CHANNEL_SIZE>;
pub type BleCommandSender = Sender<'static, NoopRawMutex, BleCommand, BLE_COMMAND_CHANNEL_SIZE>;
pub type BleCommandReceiver =
    Receiver<'static, NoopRawMutex, BleCommand, BLE_COMMAND_CHANNEL_SIZE>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, defmt::Format)]
pub enum RunRequest {
    Search,
    ShortestRun,
    ClearMaze,
}

pub type RunRequestChannel = Channel<NoopRawMutex, RunRequest, RUN_REQUEST_CHANNEL_SIZE>;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PersistentDataUpdate {
    ControllerParams(ControllerParams),
    MazeWalls(WallBytes),
}

pub type PersistentDataChannel =
    Channel<NoopRawMutex, PersistentDataUpdate, PERSISTENT_DATA_CHANNEL_SIZE>;

/// Mailbox holding the next manoeuvre for the control loop.
pub type MotionQueue = rtos::Queue<MotionParameter, 1>;
pub type MotionDoneSignal = Signal<NoopRawMutex, ()>;
pub type StopSignal = Signal<NoopRawMutex, ()>;

pub type BuzzerQueue = rtos::Queue<Melody, BUZZER_QUEUE_SIZE>;

/// Maze shared between the run task and the CLI.
pub type SharedMap = Mutex<NoopRawMutex, RefCell<Map>>;

pub type MouseStateSignal = Signal<NoopRawMutex, MouseState>;

/// Current mouse state, readable at any time, with change notification for the indicator.
pub struct MouseStatus {
    current: Mutex<NoopRawMutex, Cell<MouseState>>,
    changed: MouseStateSignal,
}

impl MouseStatus {
    pub const fn new() -> Self {
        Self {
            current: Mutex::new(Cell::new(MouseState::Idle)),
            changed: Signal::new(),
        }
    }

    pub fn get(&self) -> MouseState {
        self.current.lock(|state| state.get())
    }

    pub fn set(&self, state: MouseState) {
        self.current.lock(|current| current.set(state));
        self.changed.signal(state);
    }

    pub async fn wait_change(&self) -> MouseState {
        self.changed.wait().await
    }
}

#[derive(Debug, Command)]
pub enum UsbCommand {
    /// Print the BLE MAC address
    BleAddress,

    /// Print the averaged battery voltage
    Battery,

    /// Print the latest wall sensor and odometry readings
    Sensors,

    /// Draw the maze map
    Maze,

    /// Drive the motors open loop while idle; 0 0 releases them
    MotorSet {
        /// Left motor voltage [mV]
        left: i32,
        /// Right motor voltage [mV]
        right: i32,
    },

    /// Set PID gains: 0 velocity, 1 angular velocity, 2 side wall
    GainSet { id: u8, kp: f32, ki: f32, kd: f32 },

    /// Start a search run
    Search,

    /// Start a shortest path run over the searched maze
    FastRun,

    /// Stop any run and release the motors
    Stop,

    /// Calibrate the IMU offsets; keep the mouse level and still
    Calibrate { samples: u32 },

    /// Forget every observed wall
    MazeClear,
}
