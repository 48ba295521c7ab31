use embassy_nrf::gpio::{AnyPin, Level, Output, OutputDrive};
use embassy_nrf::spim::{self, Spim};

use crate::xerror::XResult;

/// One device on a shared SPIM bus, selected by its own active-low chip select line.
pub struct SpiDevice {
    cs: Output<'static>,
}

impl SpiDevice {
    /// Takes the chip select pin and drives it inactive (high).
    pub fn new(cs: AnyPin) -> Self {
        Self {
            cs: Output::new(cs, Level::High, OutputDrive::Standard),
        }
    }

    /// Full-duplex transfer with chip select asserted for its whole duration.
    pub async fn transfer<T: spim::Instance>(
        self: &mut Self,
        bus: &mut Spim<'_, T>,
        read: &mut [u8],
        write: &[u8],
    ) -> XResult<()> {
        self.cs.set_low();
        let result = bus.transfer(read, write).await;
        self.cs.set_high();

        Ok(result?)
    }

    pub async fn transfer_in_place<T: spim::Instance>(
        self: &mut Self,
        bus: &mut Spim<'_, T>,
        data: &mut [u8],
    ) -> XResult<()> {
        self.cs.set_low();
        let result = bus.transfer_in_place(data).await;
        self.cs.set_high();

        Ok(result?)
    }
}
