#![cfg_attr(not(feature = "std"), no_std)]

mod lib {
    #[cfg(feature = "defmt")]
    pub use defmt::panic;
    #[cfg(feature = "std")]
    pub use std::panic;
}

pub mod adc;
pub mod average;
pub mod battery;
pub mod buzzer;
pub mod datatypes;
pub mod encoder;
pub mod imu;
pub mod indicator;
pub mod maze;
pub mod motion;
pub mod motor;
pub mod odometry;
pub mod parameters;
pub mod photo;
pub mod pid;
pub mod queue;
pub mod search;
pub mod sensor;
