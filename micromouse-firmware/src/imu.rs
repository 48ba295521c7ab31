use bitfield_struct::bitfield;
use bytemuck::{Pod, Zeroable};
use defmt::*;
use embassy_nrf::spim::{Instance, Spim};
use embassy_time::Timer;

use micromouse_x::imu::RawImuSample;

use crate::spi::SpiDevice;
use crate::xerror::{XError, XResult};

const READ_FLAG: u8 = 0x80;

const REG_ADDRESS_WHOAMI: u8 = 0x0F;
const REG_ADDRESS_CTRL1_XL: u8 = 0x10;
const REG_ADDRESS_CTRL2_G: u8 = 0x11;
const REG_ADDRESS_CTRL3_C: u8 = 0x12;
const REG_ADDRESS_CTRL4_C: u8 = 0x13;
const REG_ADDRESS_CTRL6_C: u8 = 0x15;
const REG_ADDRESS_CTRL7_G: u8 = 0x16;
const REG_ADDRESS_STATUS: u8 = 0x1E;
const REG_ADDRESS_X_OFS_USR: u8 = 0x73;

const WHOAMI_EXPECTED: u8 = 0x6B;

// 1.66 kHz for both sensors
const ODR_1660_HZ: u8 = 0b1000;

#[bitfield(u8)]
struct RegCtrl1Xl {
    __: bool,
    lpf2_xl_en: bool,
    #[bits(2)]
    fs_xl: u8,
    #[bits(4)]
    odr_xl: u8,
}

#[bitfield(u8)]
struct RegCtrl2G {
    fs_4000: bool,
    fs_125: bool,
    #[bits(2)]
    fs_g: u8,
    #[bits(4)]
    odr_g: u8,
}

#[bitfield(u8)]
struct RegCtrl3C {
    sw_reset: bool,
    __: bool,
    if_inc: bool,
    sim: bool,
    pp_od: bool,
    h_lactive: bool,
    bdu: bool,
    boot: bool,
}

#[bitfield(u8)]
struct RegCtrl4C {
    __: bool,
    lpf1_sel_g: bool,
    i2c_disable: bool,
    drdy_mask: bool,
    __: bool,
    int2_on_int1: bool,
    sleep_g: bool,
    __: bool,
}

#[bitfield(u8)]
struct RegCtrl6C {
    #[bits(3)]
    ftype: u8,
    usr_off_w: bool,
    xl_hm_mode: bool,
    #[bits(3)]
    trig_en: u8,
}

#[bitfield(u8)]
struct RegCtrl7G {
    ois_on: bool,
    usr_off_on_out: bool,
    #[bits(2)]
    __: u8,
    #[bits(2)]
    hpm_g: u8,
    hp_en_g: bool,
    g_hm_mode: bool,
}

#[bitfield(u8)]
struct RegStatus {
    xlda: bool,
    gda: bool,
    tda: bool,
    #[bits(5)]
    __: u8,
}

// Register dump starting at STATUS_REG; OUTX_L_G follows after the temperature output.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct DataReadBuffer {
    address_echo: u8,
    status: u8,
    reserved: u8,
    temp_lsb: u8,
    temp_msb: u8,
    gyro_x_lsb: u8,
    gyro_x_msb: u8,
    gyro_y_lsb: u8,
    gyro_y_msb: u8,
    gyro_z_lsb: u8,
    gyro_z_msb: u8,
    accel_x_lsb: u8,
    accel_x_msb: u8,
    accel_y_lsb: u8,
    accel_y_msb: u8,
    accel_z_lsb: u8,
    accel_z_msb: u8,
}

/// LSM6DSR 6-axis IMU on a 4-wire SPI bus.
pub struct Imu {
    device: SpiDevice,
}

impl Imu {
    pub fn new(device: SpiDevice) -> Self {
        Self { device }
    }

    pub async fn configure<'a, T: Instance>(
        &mut self,
        spim: &mut Spim<'a, T>,
        accel_user_offsets: [i8; 3],
    ) -> XResult<()> {
        // Check device ID
        let whoami_val = self.read_register(spim, REG_ADDRESS_WHOAMI).await?;
        if whoami_val != WHOAMI_EXPECTED {
            error!("LSM6DSR device ID did not match expected (got {}).", whoami_val);
            return Err(XError::Invalid);
        }

        // Reset to defaults, then wait for the reset bit to clear
        let ctrl3 = RegCtrl3C::new().with_sw_reset(true);
        self.write_register(spim, REG_ADDRESS_CTRL3_C, ctrl3.into())
            .await?;
        Timer::after_millis(10).await;
        let ctrl3 = RegCtrl3C::from(self.read_register(spim, REG_ADDRESS_CTRL3_C).await?);
        if ctrl3.sw_reset() {
            return Err(XError::Timeout);
        }

        let ctrl3 = RegCtrl3C::new()
            .with_bdu(true) // don't mix LSB/MSB of different samples
            .with_if_inc(true); // auto-increment on multi-byte reads
        self.write_register(spim, REG_ADDRESS_CTRL3_C, ctrl3.into())
            .await?;

        let ctrl4 = RegCtrl4C::new().with_i2c_disable(true);
        self.write_register(spim, REG_ADDRESS_CTRL4_C, ctrl4.into())
            .await?;

        self.set_accel_user_offsets(spim, accel_user_offsets)
            .await?;

        let ctrl1 = RegCtrl1Xl::new()
            .with_odr_xl(ODR_1660_HZ)
            .with_fs_xl(0b00); // +/-2g, 0.061 mg/LSB
        self.write_register(spim, REG_ADDRESS_CTRL1_XL, ctrl1.into())
            .await?;

        let ctrl2 = RegCtrl2G::new()
            .with_odr_g(ODR_1660_HZ)
            .with_fs_g(0b11); // +/-2000 dps, 70 mdps/LSB
        self.write_register(spim, REG_ADDRESS_CTRL2_G, ctrl2.into())
            .await?;

        Ok(())
    }

    /// Writes the accelerometer user offsets (2^-10 g/LSB) and applies them to the outputs.
    pub async fn set_accel_user_offsets<'a, T: Instance>(
        &mut self,
        spim: &mut Spim<'a, T>,
        offsets: [i8; 3],
    ) -> XResult<()> {
        let ctrl6 = RegCtrl6C::new().with_usr_off_w(false);
        self.write_register(spim, REG_ADDRESS_CTRL6_C, ctrl6.into())
            .await?;

        let mut write_buffer = [REG_ADDRESS_X_OFS_USR, 0, 0, 0];
        for (dst, offset) in write_buffer[1..].iter_mut().zip(offsets) {
            *dst = offset as u8;
        }
        let mut read_buffer = [0u8; 4];
        self.device
            .transfer(spim, &mut read_buffer, &write_buffer)
            .await?;

        let ctrl7 = RegCtrl7G::new().with_usr_off_on_out(true);
        self.write_register(spim, REG_ADDRESS_CTRL7_G, ctrl7.into())
            .await?;

        Ok(())
    }

    pub async fn read<'a, T: Instance>(&mut self, spim: &mut Spim<'a, T>) -> XResult<RawImuSample> {
        let mut read_buffer = DataReadBuffer::zeroed();
        let mut write_buffer = [0u8; core::mem::size_of::<DataReadBuffer>()];
        write_buffer[0] = REG_ADDRESS_STATUS | READ_FLAG;
        self.device
            .transfer(spim, bytemuck::bytes_of_mut(&mut read_buffer), &write_buffer)
            .await?;

        let status = RegStatus::from(read_buffer.status);
        if !status.gda() || !status.xlda() {
            debug!("Data not ready when LSM6DSR read was performed!");
        }

        let word = |lsb: u8, msb: u8| i16::from_le_bytes([lsb, msb]);
        Ok(RawImuSample {
            gyro: [
                word(read_buffer.gyro_x_lsb, read_buffer.gyro_x_msb),
                word(read_buffer.gyro_y_lsb, read_buffer.gyro_y_msb),
                word(read_buffer.gyro_z_lsb, read_buffer.gyro_z_msb),
            ],
            accel: [
                word(read_buffer.accel_x_lsb, read_buffer.accel_x_msb),
                word(read_buffer.accel_y_lsb, read_buffer.accel_y_msb),
                word(read_buffer.accel_z_lsb, read_buffer.accel_z_msb),
            ],
        })
    }

    async fn read_register<'a, T: Instance>(
        &mut self,
        spim: &mut Spim<'a, T>,
        address: u8,
    ) -> XResult<u8> {
        let mut read_buffer = [0u8; 2];
        self.device
            .transfer(spim, &mut read_buffer, &[address | READ_FLAG, 0])
            .await?;
        Ok(read_buffer[1])
    }

    async fn write_register<'a, T: Instance>(
        &mut self,
        spim: &mut Spim<'a, T>,
        address: u8,
        value: u8,
    ) -> XResult<()> {
        let mut read_buffer = [0u8; 2];
        self.device
            .transfer(spim, &mut read_buffer, &[address, value])
            .await
    }
}
