#![no_main]
#![no_std]

use core::cell::RefCell;
use core::fmt::Write as _;
use core::mem;

use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Instant, Timer};

use embassy_nrf::gpio::Pin;
use embassy_nrf::interrupt::InterruptExt;
use embassy_nrf::pac;
use embassy_nrf::pwm::SequencePwm;
use embassy_nrf::saadc;
use embassy_nrf::spim::{self, Spim};
use embassy_nrf::usb;
use embassy_nrf::usb::vbus_detect::SoftwareVbusDetect;
use embassy_nrf::{bind_interrupts, interrupt, peripherals};

use nrf_softdevice::{SocEvent, Softdevice};

use defmt::{debug, info, unwrap, warn};
use static_cell::StaticCell;
use ufmt::uwrite;

use micromouse_firmware::adc::AnalogInputs;
use micromouse_firmware::ble_server;
use micromouse_firmware::buzzer::{self, Buzzer};
use micromouse_firmware::controller::{ControlLinks, Controller};
use micromouse_firmware::datatypes::{
    BleCommandChannel, BleCommandSender, BuzzerQueue, MotionDoneSignal, MotionQueue, MouseStatus,
    PersistentDataChannel, PersistentDataUpdate, RunRequest, RunRequestChannel, SensedSignal,
    SharedMap, StopSignal, TelemetrySignal, UsbCommand,
};
use micromouse_firmware::encoder::Encoder;
use micromouse_firmware::imu::Imu;
use micromouse_firmware::indicator;
use micromouse_firmware::motor::Motors;
use micromouse_firmware::persistent_data::{self, PersistentDataService};
use micromouse_firmware::photo::Photo;
use micromouse_firmware::run::{self, Run, RunContext};
use micromouse_firmware::sensor::SensorDevices;
use micromouse_firmware::spi::SpiDevice;
use micromouse_firmware::usb_serial::{self, FmtWriter};

use micromouse_x::buzzer::Melody;
use micromouse_x::datatypes::{BleCommand, MotorVoltages, MouseState};
use micromouse_x::imu::DEFAULT_ACCEL_USER_OFFSETS;
use micromouse_x::maze::{GoalArea, Map};
use micromouse_x::motion::MotionParameter;
use micromouse_x::parameters::{BATTERY_LOW_VOLTAGE, CONTROL_PERIOD_US};

const CLI_COMMANDS_PER_ITERATION: usize = 4;

bind_interrupts!(struct SpiIrqs {
    SPIM0_SPIS0_TWIM0_TWIS0_SPI0_TWI0 => spim::InterruptHandler<peripherals::TWISPI0>;
    SPIM1_SPIS1_TWIM1_TWIS1_SPI1_TWI1 => spim::InterruptHandler<peripherals::TWISPI1>;
});

bind_interrupts!(struct SaadcIrqs {
    SAADC => saadc::InterruptHandler;
});

bind_interrupts!(struct UsbdIrqs {
    USBD => usb::InterruptHandler<peripherals::USBD>;
});

/// Where BLE and CLI commands are forwarded.
struct CommandLinks {
    status: &'static MouseStatus,
    run_requests: &'static RunRequestChannel,
    stop: &'static StopSignal,
    motion_queue: &'static MotionQueue,
    persistent_data: &'static PersistentDataChannel,
    buzzer: &'static BuzzerQueue,
}

impl CommandLinks {
    fn request_run(self: &Self, controller: &Controller, request: RunRequest) {
        let state = self.status.get();
        if !matches!(state, MouseState::Idle | MouseState::Error) || controller.is_calibrating() {
            warn!("Busy ({:?}); ignoring {:?}.", state, request);
            return;
        }
        let battery_voltage = controller.sensed().battery_voltage;
        if request != RunRequest::ClearMaze && battery_voltage < BATTERY_LOW_VOLTAGE {
            warn!("Battery low ({} V); refusing {:?}.", battery_voltage, request);
            if self.buzzer.send(Melody::Error).is_err() {
                debug!("Buzzer queue full; dropped error melody.");
            }
            return;
        }
        if self.run_requests.try_send(request).is_err() {
            warn!("Run request queue full.");
        }
    }

    fn dispatch(self: &Self, controller: &mut Controller, command: BleCommand) {
        info!("Command: {:?}", command);
        match command {
            BleCommand::StartSearch => self.request_run(controller, RunRequest::Search),
            BleCommand::StartShortestRun => self.request_run(controller, RunRequest::ShortestRun),
            BleCommand::ClearMaze => self.request_run(controller, RunRequest::ClearMaze),
            BleCommand::Stop => {
                self.stop.signal(());
                self.motion_queue.overwrite(MotionParameter::free());
                controller.cancel();
                self.status.set(MouseState::Idle);
            }
            BleCommand::CalibrateImu(samples) => {
                if self.status.get() != MouseState::Idle {
                    warn!("Calibration only runs while idle.");
                    return;
                }
                controller.start_imu_calibration(samples);
                self.status.set(MouseState::Calibrating);
            }
            BleCommand::UpdateControllerParams(params) => {
                controller.set_params(params);
                if self
                    .persistent_data
                    .try_send(PersistentDataUpdate::ControllerParams(params))
                    .is_err()
                {
                    warn!("Persistent data queue full; gains not saved.");
                }
            }
        }
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Micromouse");

    // Priorities 0, 1 and 4 belong to the softdevice
    let mut nrf_config = embassy_nrf::config::Config::default();
    nrf_config.gpiote_interrupt_priority = interrupt::Priority::P2;
    nrf_config.time_interrupt_priority = interrupt::Priority::P2;
    let p = embassy_nrf::init(nrf_config);
    start_hfxo();

    // POWER_CLOCK is owned by the softdevice, so VBUS events reach the USB driver through SoC events
    static VBUS: StaticCell<SoftwareVbusDetect> = StaticCell::new();
    let vbus = VBUS.init(SoftwareVbusDetect::new(true, true));

    let sd = Softdevice::enable(&ble_server::softdevice_config());

    // Inter-task plumbing
    static TELEMETRY: StaticCell<TelemetrySignal> = StaticCell::new();
    let telemetry_signal = TELEMETRY.init(TelemetrySignal::new());
    static BLE_COMMANDS: StaticCell<BleCommandChannel> = StaticCell::new();
    let ble_commands = BLE_COMMANDS.init(BleCommandChannel::new());
    static BLE_COMMAND_TX: StaticCell<BleCommandSender> = StaticCell::new();
    let ble_command_tx = BLE_COMMAND_TX.init(ble_commands.sender());
    let ble_command_rx = ble_commands.receiver();
    static SENSED_SIGNAL: StaticCell<SensedSignal> = StaticCell::new();
    let sensed_signal = SENSED_SIGNAL.init(SensedSignal::new());
    static MOTION_QUEUE: MotionQueue = MotionQueue::new();
    static MOTION_DONE_SIGNAL: StaticCell<MotionDoneSignal> = StaticCell::new();
    let motion_done_signal = MOTION_DONE_SIGNAL.init(MotionDoneSignal::new());
    static STOP_SIGNAL: StaticCell<StopSignal> = StaticCell::new();
    let stop_signal = STOP_SIGNAL.init(StopSignal::new());
    static BUZZER_QUEUE: BuzzerQueue = BuzzerQueue::new();
    static MOUSE_STATUS: StaticCell<MouseStatus> = StaticCell::new();
    let mouse_status = MOUSE_STATUS.init(MouseStatus::new());
    static RUN_REQUEST_CHANNEL: StaticCell<RunRequestChannel> = StaticCell::new();
    let run_request_channel = RUN_REQUEST_CHANNEL.init(RunRequestChannel::new());
    static PERSISTENT_DATA_CHANNEL: StaticCell<PersistentDataChannel> = StaticCell::new();
    let persistent_data_channel = PERSISTENT_DATA_CHANNEL.init(PersistentDataChannel::new());
    static MAP: StaticCell<SharedMap> = StaticCell::new();
    let map: &'static SharedMap =
        MAP.init_with(|| Mutex::new(RefCell::new(Map::new(&GoalArea::default()))));

    interrupt::USBD.set_priority(interrupt::Priority::P3);
    let (usb_device, serial_port, console) =
        usb_serial::init(usb::Driver::new(p.USBD, UsbdIrqs, &*vbus));

    let server = unwrap!(ble_server::Server::new(sd, telemetry_signal, ble_command_tx));
    let sd: &'static Softdevice = sd;

    // Flash access needs the softdevice running
    unwrap!(spawner.spawn(softdevice_task(sd, vbus)));
    let persistent_data = PersistentDataService::new(sd).await;
    let stored = persistent_data.get_contents();
    map.lock(|map| map.borrow_mut().import(&stored.maze_walls));
    unwrap!(spawner.spawn(persistent_data::persistent_data_task(
        persistent_data,
        persistent_data_channel
    )));

    // Feedback
    let indicator_pwm = unwrap!(SequencePwm::new_1ch(
        p.PWM2,
        p.P1_10,
        indicator::pwm_config()
    ));
    let buzzer = Buzzer::new(p.PWM1, p.P0_08.degrade());

    // Photo sensors and battery
    let adc_config = saadc::Config::default();
    let adc_channels = [
        saadc::ChannelConfig::single_ended(p.P0_02), // left 90°
        saadc::ChannelConfig::single_ended(p.P0_03), // left 45°
        saadc::ChannelConfig::single_ended(p.P0_04), // right 45°
        saadc::ChannelConfig::single_ended(p.P0_05), // right 90°
        saadc::ChannelConfig::single_ended(p.P0_29), // battery divider
    ];
    interrupt::SAADC.set_priority(interrupt::Priority::P2);
    let adc = AnalogInputs::new(saadc::Saadc::new(p.SAADC, SaadcIrqs, adc_config, adc_channels)).await;
    let photo = Photo::new([
        p.P1_01.degrade(),
        p.P1_02.degrade(),
        p.P1_03.degrade(),
        p.P1_04.degrade(),
    ]);

    // IMU on SPIM0, both encoders share SPIM1
    let mut imu_spi_config = spim::Config::default();
    imu_spi_config.frequency = spim::Frequency::M8;
    imu_spi_config.mode = spim::MODE_3;
    interrupt::SPIM0_SPIS0_TWIM0_TWIS0_SPI0_TWI0.set_priority(interrupt::Priority::P2);
    let imu_spim = Spim::new(p.TWISPI0, SpiIrqs, p.P0_14, p.P0_15, p.P0_13, imu_spi_config);

    let mut encoder_spi_config = spim::Config::default();
    encoder_spi_config.frequency = spim::Frequency::M8;
    encoder_spi_config.mode = spim::MODE_1;
    interrupt::SPIM1_SPIS1_TWIM1_TWIS1_SPI1_TWI1.set_priority(interrupt::Priority::P2);
    let encoder_spim = Spim::new(p.TWISPI1, SpiIrqs, p.P1_15, p.P1_14, p.P1_13, encoder_spi_config);

    let devices = SensorDevices::new(
        imu_spim,
        Imu::new(SpiDevice::new(p.P0_24.degrade())),
        encoder_spim,
        Encoder::new(SpiDevice::new(p.P1_12.degrade())),
        Encoder::new(SpiDevice::new(p.P1_11.degrade())),
        adc,
        photo,
    );

    let motors = Motors::new(
        p.PWM0,
        p.P0_07.degrade(), // left IN1
        p.P0_26.degrade(), // left IN2
        p.P0_27.degrade(), // right IN1
        p.P0_06.degrade(), // right IN2
    );

    unwrap!(spawner.spawn(indicator::indicator_task(indicator_pwm, mouse_status)));
    unwrap!(spawner.spawn(buzzer::buzzer_task(buzzer, &BUZZER_QUEUE)));
    unwrap!(spawner.spawn(usb_serial::usb_task(usb_device)));
    unwrap!(spawner.spawn(usb_serial::serial_task(serial_port)));
    unwrap!(spawner.spawn(ble_server::ble_task(sd, server)));
    unwrap!(spawner.spawn(run::run_task(RunContext {
        run: Run::new(&MOTION_QUEUE, motion_done_signal, stop_signal),
        requests: run_request_channel,
        map,
        sensed: sensed_signal,
        status: mouse_status,
        buzzer: &BUZZER_QUEUE,
        persistent_data: persistent_data_channel,
    })));

    let mut controller = unwrap!(Controller::create_and_initialize(
        devices,
        motors,
        stored.controller_params,
        DEFAULT_ACCEL_USER_OFFSETS,
        ControlLinks {
            motion_queue: &MOTION_QUEUE,
            motion_done: motion_done_signal,
            sensed: sensed_signal,
            telemetry: telemetry_signal,
            status: mouse_status,
            buzzer: &BUZZER_QUEUE,
            map,
        },
    )
    .await);

    let commands = CommandLinks {
        status: mouse_status,
        run_requests: run_request_channel,
        stop: stop_signal,
        motion_queue: &MOTION_QUEUE,
        persistent_data: persistent_data_channel,
        buzzer: &BUZZER_QUEUE,
    };

    mouse_status.set(MouseState::Idle);
    if BUZZER_QUEUE.send(Melody::Startup).is_err() {
        debug!("Buzzer queue full; dropped startup melody.");
    }

    let period = Duration::from_micros(CONTROL_PERIOD_US as u64);
    let mut deadline = Instant::now();
    loop {
        deadline += period;
        Timer::at(deadline).await;

        while let Ok(command) = ble_command_rx.try_receive() {
            commands.dispatch(&mut controller, command);
        }

        // CLI commands that change state are queued and go through the same path as BLE ones
        let mut cli_commands = CliCommands::new();
        let _ = console.process_pending_commands(|cli_handle, command| match command {
            UsbCommand::BleAddress => {
                let bytes = nrf_softdevice::ble::get_address(sd).bytes();
                let mut writer = FmtWriter::new(cli_handle.writer());
                for (i, byte) in bytes.iter().rev().enumerate() {
                    let separator = if i == 0 { "" } else { ":" };
                    let _ = write!(writer, "{}{:02X}", separator, byte);
                }
                Ok(())
            }
            UsbCommand::Battery => {
                let sensed = controller.sensed();
                let _ = write!(
                    FmtWriter::new(cli_handle.writer()),
                    "{:.2} V",
                    sensed.battery_voltage
                );
                Ok(())
            }
            UsbCommand::Sensors => {
                let sensed = controller.sensed();
                let mut writer = FmtWriter::new(cli_handle.writer());
                for (name, wall) in ["L90", "L45", "R45", "R90"]
                    .iter()
                    .zip(sensed.walls.as_array())
                {
                    let _ = write!(writer, "{}: {} ({})\r\n", name, wall.exist as u8, wall.error);
                }
                let _ = write!(
                    writer,
                    "v {:.3} m/s, w {:.3} rad/s, angle {:.1} deg, length {:.1} mm\r\n",
                    sensed.velocity, sensed.angular_velocity, sensed.angle, sensed.length
                );
                let _ = write!(
                    writer,
                    "x {:.1} mm, y {:.1} mm, sensor errors {}",
                    sensed.x,
                    sensed.y,
                    controller.error_count()
                );
                Ok(())
            }
            UsbCommand::Maze => {
                let mut writer = FmtWriter::new(cli_handle.writer());
                map.lock(|map| {
                    let _ = write!(writer, "{}", map.borrow().display(false));
                });
                Ok(())
            }
            UsbCommand::MotorSet { left, right } => {
                if mouse_status.get() == MouseState::Idle && !controller.is_calibrating() {
                    uwrite!(cli_handle.writer(), "Driving motors at {} / {} mV.", left, right)?;
                    controller.set_manual_voltages(MotorVoltages {
                        left: left as f32 / 1000.0,
                        right: right as f32 / 1000.0,
                    });
                } else {
                    uwrite!(cli_handle.writer(), "Mouse is busy; manual drive disallowed.")?;
                }
                Ok(())
            }
            UsbCommand::GainSet { id, kp, ki, kd } => {
                let mut params = controller.params();
                let gains = match id {
                    0 => &mut params.velocity,
                    1 => &mut params.angular_velocity,
                    2 => &mut params.side_wall,
                    _ => {
                        uwrite!(cli_handle.writer(), "Invalid gain ID {}.", id)?;
                        return Ok(());
                    }
                };
                gains.p = kp;
                gains.i = ki;
                gains.d = kd;
                queue_cli_command(&mut cli_commands, BleCommand::UpdateControllerParams(params));
                Ok(())
            }
            UsbCommand::Search => {
                queue_cli_command(&mut cli_commands, BleCommand::StartSearch);
                Ok(())
            }
            UsbCommand::FastRun => {
                queue_cli_command(&mut cli_commands, BleCommand::StartShortestRun);
                Ok(())
            }
            UsbCommand::Stop => {
                queue_cli_command(&mut cli_commands, BleCommand::Stop);
                Ok(())
            }
            UsbCommand::Calibrate { samples } => {
                queue_cli_command(&mut cli_commands, BleCommand::CalibrateImu(samples));
                Ok(())
            }
            UsbCommand::MazeClear => {
                queue_cli_command(&mut cli_commands, BleCommand::ClearMaze);
                Ok(())
            }
        });
        for command in cli_commands {
            commands.dispatch(&mut controller, command);
        }

        controller.update().await;
    }
}

type CliCommands = heapless::Vec<BleCommand, CLI_COMMANDS_PER_ITERATION>;

fn queue_cli_command(commands: &mut CliCommands, command: BleCommand) {
    if let Err(command) = commands.push(command) {
        warn!("Too many CLI commands in one period; dropped {:?}.", command);
    }
}

/// The USB peripheral and the encoders' SPI timing need the crystal oscillator.
fn start_hfxo() {
    let clock: pac::CLOCK = unsafe { mem::transmute(()) };
    clock.tasks_hfclkstart.write(|w| unsafe { w.bits(1) });
    while clock.events_hfclkstarted.read().bits() == 0 {}
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice, vbus: &'static SoftwareVbusDetect) -> ! {
    use nrf_softdevice::raw;

    // SAFETY: plain softdevice calls, made once the softdevice is enabled
    unsafe {
        raw::sd_clock_hfclk_request();
        raw::sd_power_usbdetected_enable(1);
        raw::sd_power_usbremoved_enable(1);
        raw::sd_power_usbpwrrdy_enable(1);
    }
    sd.run_with_callback(|event: SocEvent| match event {
        SocEvent::PowerUsbDetected => vbus.detected(true),
        SocEvent::PowerUsbRemoved => vbus.detected(false),
        SocEvent::PowerUsbPowerReady => vbus.ready(),
        _ => (),
    })
    .await
}
