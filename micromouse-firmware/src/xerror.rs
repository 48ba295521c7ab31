use embassy_nrf::spim;
use nrf_softdevice::FlashError;

// Basic intra-project error type
#[derive(Debug, defmt::Format)]
pub enum XError {
    Spi(spim::Error),
    Flash(FlashError),
    Invalid,
    Timeout,
    Aborted,
    CrcMismatch,
    SerializationFailure,
}

impl From<spim::Error> for XError {
    fn from(err: spim::Error) -> Self {
        XError::Spi(err)
    }
}

impl From<FlashError> for XError {
    fn from(err: FlashError) -> Self {
        XError::Flash(err)
    }
}

pub type XResult<T> = Result<T, XError>;
