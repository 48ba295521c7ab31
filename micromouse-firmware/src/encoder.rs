use defmt::*;
use embassy_nrf::spim::{Instance, Spim};

use micromouse_x::encoder::{command_frame, decode_angle, REG_ANGULAR_DATA, REG_MASTER_RESET};

use crate::spi::SpiDevice;
use crate::xerror::XResult;

/// 14-bit magnetic angle sensor behind one wheel.
///
/// The sensor answers a command in the following frame, so every read returns the angle requested
/// by the previous one.
pub struct Encoder {
    device: SpiDevice,
    angle: u16,
    invalid_count: u32,
}

impl Encoder {
    pub fn new(device: SpiDevice) -> Self {
        Self {
            device,
            angle: 0,
            invalid_count: 0,
        }
    }

    pub async fn configure<'a, T: Instance>(&mut self, spim: &mut Spim<'a, T>) -> XResult<()> {
        self.send_frame(spim, command_frame(REG_MASTER_RESET, false))
            .await?;
        // Queue the first angle so the next update has data to return
        self.send_frame(spim, command_frame(REG_ANGULAR_DATA, true))
            .await?;
        Ok(())
    }

    /// Requests the next angle and returns the latest valid one. Corrupt responses keep the
    /// previous angle.
    pub async fn update<'a, T: Instance>(&mut self, spim: &mut Spim<'a, T>) -> XResult<u16> {
        let response = self
            .send_frame(spim, command_frame(REG_ANGULAR_DATA, true))
            .await?;
        match decode_angle(response) {
            Some(angle) => self.angle = angle,
            None => {
                self.invalid_count = self.invalid_count.wrapping_add(1);
                debug!("Encoder response {:04x} rejected.", response);
            }
        }
        Ok(self.angle)
    }

    pub fn angle(&self) -> u16 {
        self.angle
    }

    pub fn invalid_count(&self) -> u32 {
        self.invalid_count
    }

    async fn send_frame<'a, T: Instance>(
        &mut self,
        spim: &mut Spim<'a, T>,
        frame: u16,
    ) -> XResult<u16> {
        let mut buffer = frame.to_be_bytes();
        self.device.transfer_in_place(spim, &mut buffer).await?;
        Ok(u16::from_be_bytes(buffer))
    }
}
