use core::mem;

use embassy_futures::select::{select, Either};

use nrf_softdevice::ble::advertisement_builder::{
    Flag, LegacyAdvertisementBuilder, LegacyAdvertisementPayload, ServiceList, ServiceUuid16,
};
use nrf_softdevice::ble::{gatt_server, peripheral, Connection};
use nrf_softdevice::raw;
use nrf_softdevice::Softdevice;

use defmt::*;
use postcard::experimental::max_size::MaxSize;

use micromouse_x::battery::lipo_1s_charge_percent;
use micromouse_x::datatypes::{BleCommand, Telemetry};

use crate::datatypes::{BleCommandSender, TelemetrySignal};

const DEVICE_NAME: &[u8] = b"Micromouse";
const MOUSE_SERVICE_UUID: u128 = 0x3b0a7e52_6a4d_4c39_9d0e_5f1c2b8a6d01;

/// Only every Nth telemetry frame (100 Hz) goes over the air.
const TELEMETRY_DECIMATION: u32 = 5;

// 7.5 ms connection interval in 1.25 ms units
const CONN_INTERVAL: u16 = 6;
const CONN_SUPERVISION_TIMEOUT_10MS: u16 = 400;

#[nrf_softdevice::gatt_service(uuid = "180f")]
struct BatteryService {
    #[characteristic(uuid = "2a19", read, notify)]
    level: u8,
}

#[nrf_softdevice::gatt_service(uuid = "3b0a7e52-6a4d-4c39-9d0e-5f1c2b8a6d01")]
struct MouseService {
    #[characteristic(uuid = "3b0a7e52-6a4d-4c39-9d0e-5f1c2b8a6d02", read, notify)]
    telemetry: [u8; Telemetry::POSTCARD_MAX_SIZE],
    #[characteristic(uuid = "3b0a7e52-6a4d-4c39-9d0e-5f1c2b8a6d03", write)]
    command: heapless::Vec<u8, { BleCommand::POSTCARD_MAX_SIZE }>,
}

#[nrf_softdevice::gatt_server]
struct GattTable {
    battery: BatteryService,
    mouse: MouseService,
}

/// GATT table plus the channels it bridges to the rest of the firmware.
pub struct Server {
    gatt: GattTable,
    telemetry: &'static TelemetrySignal,
    commands: &'static BleCommandSender,
}

impl Server {
    pub fn new(
        sd: &mut Softdevice,
        telemetry: &'static TelemetrySignal,
        commands: &'static BleCommandSender,
    ) -> Result<Self, gatt_server::RegisterError> {
        Ok(Self {
            gatt: GattTable::new(sd)?,
            telemetry,
            commands,
        })
    }

    fn publish(self: &Self, connection: &Connection, telemetry: &Telemetry) {
        let level = lipo_1s_charge_percent(telemetry.battery_voltage) as u8;
        let _ = self.gatt.battery.level_set(&level);

        let mut encoded = [0u8; Telemetry::POSTCARD_MAX_SIZE];
        if postcard::to_slice(telemetry, &mut encoded).is_err() {
            warn!("Telemetry did not fit its characteristic.");
            return;
        }
        // notify fails until the client subscribes; the value stays readable either way
        if self.gatt.mouse.telemetry_notify(connection, &encoded).is_err() {
            let _ = self.gatt.mouse.telemetry_set(&encoded);
        }
    }

    async fn stream_telemetry(self: &Self, connection: &Connection) {
        let mut frame = 0u32;
        loop {
            let telemetry = self.telemetry.wait().await;
            if frame % TELEMETRY_DECIMATION == 0 {
                self.publish(connection, &telemetry);
            }
            frame = frame.wrapping_add(1);
        }
    }

    fn on_command_write(self: &Self, bytes: &[u8]) {
        let Ok(command) = postcard::from_bytes::<BleCommand>(bytes) else {
            warn!("Malformed BLE command ({} bytes).", bytes.len());
            return;
        };
        debug!("BLE command: {:?}", command);
        if self.commands.try_send(command).is_err() {
            warn!("BLE command channel full; dropped {:?}", command);
        }
    }

    fn on_event(self: &Self, event: GattTableEvent) {
        match event {
            GattTableEvent::Battery(BatteryServiceEvent::LevelCccdWrite { notifications }) => {
                debug!("Battery notifications: {}", notifications)
            }
            GattTableEvent::Mouse(MouseServiceEvent::TelemetryCccdWrite { notifications }) => {
                debug!("Telemetry notifications: {}", notifications)
            }
            GattTableEvent::Mouse(MouseServiceEvent::CommandWrite(bytes)) => {
                self.on_command_write(&bytes)
            }
        }
    }
}

/// Softdevice settings: internal RC low frequency clock, one peripheral link with a
/// 128 byte ATT MTU so a whole telemetry frame fits one notification.
pub fn softdevice_config() -> nrf_softdevice::Config {
    let device_name = raw::ble_gap_cfg_device_name_t {
        p_value: DEVICE_NAME.as_ptr() as *mut u8,
        current_len: DEVICE_NAME.len() as u16,
        max_len: DEVICE_NAME.len() as u16,
        // Read only over the air, so the static name is never written through p_value
        write_perm: unsafe { mem::zeroed() },
        _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
            raw::BLE_GATTS_VLOC_STACK as u8,
        ),
    };

    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t { att_mtu: 128 }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(device_name),
        ..Default::default()
    }
}

#[embassy_executor::task]
pub async fn ble_task(sd: &'static Softdevice, server: Server) -> ! {
    static ADVERTISEMENT: LegacyAdvertisementPayload = LegacyAdvertisementBuilder::new()
        .flags(&[Flag::GeneralDiscovery, Flag::LE_Only])
        .services_16(ServiceList::Complete, &[ServiceUuid16::BATTERY])
        .services_128(ServiceList::Complete, &[MOUSE_SERVICE_UUID.to_le_bytes()])
        .build();
    static SCAN_RESPONSE: LegacyAdvertisementPayload =
        LegacyAdvertisementBuilder::new().full_name("Micromouse").build();

    let config = peripheral::Config::default();

    loop {
        let advertisement = peripheral::ConnectableAdvertisement::ScannableUndirected {
            adv_data: &ADVERTISEMENT,
            scan_data: &SCAN_RESPONSE,
        };
        let connection = match peripheral::advertise_connectable(sd, advertisement, &config).await {
            Ok(connection) => connection,
            Err(e) => {
                error!("Advertising failed: {:?}", e);
                continue;
            }
        };
        info!("BLE client connected.");

        if let Err(e) = connection.set_conn_params(raw::ble_gap_conn_params_t {
            min_conn_interval: CONN_INTERVAL,
            max_conn_interval: CONN_INTERVAL,
            slave_latency: 0,
            conn_sup_timeout: CONN_SUPERVISION_TIMEOUT_10MS,
        }) {
            warn!("Connection parameter update rejected: {:?}", e);
        }

        let gatt = gatt_server::run(&connection, &server.gatt, |event| server.on_event(event));
        if let Either::Second(reason) = select(server.stream_telemetry(&connection), gatt).await {
            info!("BLE client disconnected ({:?}).", reason);
        }
    }
}
