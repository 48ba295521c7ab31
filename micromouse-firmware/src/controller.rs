use defmt::*;
use embassy_nrf::peripherals;
use embassy_time::Instant;

use micromouse_x::buzzer::Melody;
use micromouse_x::datatypes::{ControllerParams, MotorVoltages, MouseState, Telemetry, Vec3f};
use micromouse_x::imu::{ImuOffsetState, ImuOffsetsBuilder, ImuSample};
use micromouse_x::motion::{Motion, MotionPattern};
use micromouse_x::sensor::{Sensed, Sensor, WARM_UP_COUNTS};

use crate::datatypes::{
    BuzzerQueue, MotionDoneSignal, MotionQueue, MouseStatus, SensedSignal, SharedMap,
    TelemetrySignal,
};
use crate::motor::Motors;
use crate::sensor::{SensorDevices, SensorReadings};
use crate::xerror::XResult;

const MS_TO_SEC: f32 = 0.001;
const US_TO_SEC: f32 = 0.000_001;
const ITERATIONS_PER_TELEMETRY: u32 = 10;

/// State the control loop exchanges with the other tasks.
pub struct ControlLinks {
    pub motion_queue: &'static MotionQueue,
    pub motion_done: &'static MotionDoneSignal,
    pub sensed: &'static SensedSignal,
    pub telemetry: &'static TelemetrySignal,
    pub status: &'static MouseStatus,
    pub buzzer: &'static BuzzerQueue,
    pub map: &'static SharedMap,
}

enum Calibration {
    Inactive,
    Requested(u32),
    Running(ImuOffsetsBuilder),
}

/// Sensors in, motor voltages out, once per control period.
pub struct Controller {
    devices: SensorDevices,
    motors: Motors<'static, peripherals::PWM0>,
    sensor: Sensor,
    motion: Motion,
    links: ControlLinks,
    calibration: Calibration,
    manual_voltages: Option<MotorVoltages>,
    motion_done_signalled: bool,
    error_count: u32,
    iteration: u32,
    last_update: Instant,
}

impl Controller {
    pub async fn create_and_initialize(
        mut devices: SensorDevices,
        motors: Motors<'static, peripherals::PWM0>,
        params: ControllerParams,
        accel_user_offsets: [i8; 3],
        links: ControlLinks,
    ) -> XResult<Self> {
        devices.configure(accel_user_offsets).await?;

        let mut sensor = Sensor::new();
        let mut last_update = Instant::now();
        for _ in 0..WARM_UP_COUNTS {
            let readings = devices.read().await?;
            let now = Instant::now();
            sensor.update(&readings.inputs, (now - last_update).as_micros() as u32);
            last_update = now;
        }
        sensor.reset();
        info!("Battery at {} V.", sensor.get().battery_voltage);

        Ok(Self {
            devices,
            motors,
            sensor,
            motion: Motion::new(params),
            links,
            calibration: Calibration::Inactive,
            manual_voltages: None,
            motion_done_signalled: true,
            error_count: 0,
            iteration: 0,
            last_update,
        })
    }

    pub fn params(self: &Self) -> ControllerParams {
        self.motion.params()
    }

    pub fn set_params(self: &mut Self, params: ControllerParams) {
        self.motion.set_params(params);
    }

    pub fn sensed(self: &Self) -> Sensed {
        self.sensor.get()
    }

    pub fn error_count(self: &Self) -> u32 {
        self.error_count
    }

    /// Starts an IMU offset calibration over `samples` control periods.
    pub fn start_imu_calibration(self: &mut Self, samples: u32) {
        self.calibration = Calibration::Requested(samples);
    }

    pub fn is_calibrating(self: &Self) -> bool {
        !matches!(self.calibration, Calibration::Inactive)
    }

    /// Drops any calibration and manual drive. The motors coast until the next motion.
    pub fn cancel(self: &mut Self) {
        self.calibration = Calibration::Inactive;
        self.manual_voltages = None;
        self.motors.disable();
    }

    /// Open loop drive while no motion is active; zero voltages release the motors.
    pub fn set_manual_voltages(self: &mut Self, voltages: MotorVoltages) {
        if voltages == MotorVoltages::zeroed() {
            self.manual_voltages = None;
            self.motors.disable();
        } else {
            self.manual_voltages = Some(voltages);
            self.motors.enable();
        }
    }

    pub async fn update(self: &mut Self) {
        if let Calibration::Requested(samples) = self.calibration {
            match self.devices.clear_imu_offsets().await {
                Ok(()) => {
                    info!("IMU calibration over {} samples.", samples);
                    self.calibration = Calibration::Running(ImuOffsetsBuilder::new(samples));
                }
                Err(e) => {
                    error!("Failed to clear IMU offsets: {:?}", e);
                    self.finish_calibration(false);
                }
            }
        }

        let readings = match self.devices.read().await {
            Ok(readings) => readings,
            Err(e) => {
                self.error_count = self.error_count.wrapping_add(1);
                warn!("Sensor read failed: {:?}", e);
                return;
            }
        };
        let now = Instant::now();
        let delta_us = (now - self.last_update).as_micros() as u32;
        self.last_update = now;

        self.update_calibration(&readings).await;

        let sensed = self.sensor.update(&readings.inputs, delta_us);
        self.update_motion(&sensed, delta_us as f32 * US_TO_SEC);
        self.links.sensed.signal(sensed);

        if self.iteration % ITERATIONS_PER_TELEMETRY == 0 {
            self.links.telemetry.signal(self.telemetry(now, &sensed));
        }
        self.iteration = self.iteration.wrapping_add(1);
    }

    async fn update_calibration(self: &mut Self, readings: &SensorReadings) {
        let Calibration::Running(builder) = self.calibration else {
            return;
        };
        let sample = ImuSample::from_raw(&readings.raw_imu, Vec3f::zeroed());
        match builder.update(sample) {
            ImuOffsetState::InProgress(builder) => {
                self.calibration = Calibration::Running(builder);
            }
            ImuOffsetState::Ready(offsets) => {
                info!("IMU offsets: {:?}", offsets);
                let applied = match self.devices.apply_imu_offsets(&offsets).await {
                    Ok(()) => true,
                    Err(e) => {
                        error!("Failed to apply IMU offsets: {:?}", e);
                        false
                    }
                };
                self.finish_calibration(applied);
            }
        }
    }

    fn finish_calibration(self: &mut Self, success: bool) {
        self.calibration = Calibration::Inactive;
        self.sensor.reset();
        let (state, melody) = if success {
            (MouseState::Idle, Melody::Accept)
        } else {
            (MouseState::Error, Melody::Error)
        };
        self.links.status.set(state);
        if self.links.buzzer.send(melody).is_err() {
            debug!("Buzzer queue full; dropped {:?}.", melody);
        }
    }

    fn update_motion(self: &mut Self, sensed: &Sensed, dt: f32) {
        if let Some(param) = self.links.motion_queue.try_receive() {
            if param.pattern == MotionPattern::Free {
                self.motors.disable();
            } else {
                self.manual_voltages = None;
                self.motors.enable();
            }
            self.motion.start(param, sensed);
            self.motion_done_signalled = false;
        }

        let output = self.motion.update(sensed, dt);
        if output.done && !self.motion_done_signalled {
            self.links.motion_done.signal(());
            self.motion_done_signalled = true;
        }

        if self.motion.param().pattern != MotionPattern::Free {
            self.motors.speed(output.voltages, sensed.battery_voltage);
        } else if let Some(voltages) = self.manual_voltages {
            self.motors.speed(voltages, sensed.battery_voltage);
        }
    }

    fn telemetry(self: &Self, now: Instant, sensed: &Sensed) -> Telemetry {
        let position = self.links.map.lock(|map| map.borrow().position());
        Telemetry {
            timestamp: now.as_millis() as f32 * MS_TO_SEC,
            error_count: self.error_count,
            state: self.links.status.get(),
            controller_params: self.motion.params(),
            battery_voltage: sensed.battery_voltage,
            velocity: sensed.velocity,
            angular_velocity: sensed.angular_velocity,
            angle: sensed.angle,
            length: sensed.length,
            walls: sensed.walls.as_array(),
            x: sensed.x,
            y: sensed.y,
            cell_x: position.x,
            cell_y: position.y,
            motor_voltages: self.motors.voltages(),
        }
    }
}
