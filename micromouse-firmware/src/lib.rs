#![no_main]
#![no_std]

use {defmt_rtt as _, panic_probe as _};

pub mod adc;
pub mod ble_server;
pub mod buzzer;
pub mod controller;
pub mod datatypes;
pub mod encoder;
pub mod imu;
pub mod indicator;
pub mod motor;
pub mod persistent_data;
pub mod photo;
pub mod rtos;
pub mod run;
pub mod sensor;
pub mod spi;
pub mod usb_serial;
pub mod xerror;
