use embassy_futures::select::{select, Either};
use embassy_nrf::usb::vbus_detect::SoftwareVbusDetect;
use embassy_nrf::usb::Driver;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::pipe::{self, Pipe};
use embassy_usb::class::cdc_acm::{CdcAcmClass, State};
use embassy_usb::driver::EndpointError;
use embassy_usb::{Builder, Config, UsbDevice};

use defmt::{info, unwrap, warn};
use embedded_cli::cli::{Cli, CliBuilder, CliHandle};
use static_cell::StaticCell;

use crate::datatypes::UsbCommand;

const USB_MAX_PACKET_SIZE: u8 = 64;
const MAX_COMMAND_LEN: usize = 128;
// Large enough for the uncoloured maze drawing
const MAX_RESPONSE_LEN: usize = 12 * 1024;
const HISTORY_LEN: usize = 512;
const INGRESS_CHUNK_LEN: usize = 16;

pub type UsbDriver = Driver<'static, &'static SoftwareVbusDetect>;

type IngressPipe = Pipe<NoopRawMutex, MAX_COMMAND_LEN>;
type EgressPipe = Pipe<NoopRawMutex, MAX_RESPONSE_LEN>;

/// Raised when a response overflows the egress pipe; the rest of the response is dropped.
#[derive(Debug)]
pub struct ConsoleWriteError(pipe::TryWriteError);

impl embedded_io::Error for ConsoleWriteError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::OutOfMemory
    }
}

impl From<pipe::TryWriteError> for ConsoleWriteError {
    fn from(value: pipe::TryWriteError) -> Self {
        Self(value)
    }
}

/// CLI output end of the egress pipe. Never blocks, so commands can answer from the control loop.
pub struct ConsoleWriter {
    egress: pipe::Writer<'static, NoopRawMutex, MAX_RESPONSE_LEN>,
}

impl embedded_io::ErrorType for ConsoleWriter {
    type Error = ConsoleWriteError;
}

impl embedded_io::Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(self.egress.try_write(buf)?)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        // serial_task drains the pipe
        Ok(())
    }
}

/// Lets `core::fmt` output (floats, `Display` impls) go to a `ufmt` writer such as the CLI's.
pub struct FmtWriter<'a, W: ufmt::uWrite + ?Sized> {
    inner: &'a mut W,
}

impl<'a, W: ufmt::uWrite + ?Sized> FmtWriter<'a, W> {
    pub fn new(inner: &'a mut W) -> Self {
        Self { inner }
    }
}

impl<W: ufmt::uWrite + ?Sized> core::fmt::Write for FmtWriter<'_, W> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.inner.write_str(s).map_err(|_| core::fmt::Error)
    }
}

pub type ConsoleHandle<'a> = CliHandle<'a, &'static mut ConsoleWriter, ConsoleWriteError>;

/// Command line fed from the USB serial port.
pub struct Console {
    ingress: pipe::Reader<'static, NoopRawMutex, MAX_COMMAND_LEN>,
    cli: Cli<&'static mut ConsoleWriter, ConsoleWriteError, &'static mut [u8], &'static mut [u8]>,
}

impl Console {
    /// Feeds every byte received since the last call to the CLI and runs `handler` for each
    /// complete command. Returns the number of bytes consumed.
    pub fn process_pending_commands(
        &mut self,
        mut handler: impl FnMut(&mut ConsoleHandle<'_>, UsbCommand) -> Result<(), ConsoleWriteError>,
    ) -> usize {
        let mut consumed = 0;
        let mut chunk = [0u8; INGRESS_CHUNK_LEN];
        while let Ok(len) = self.ingress.try_read(&mut chunk) {
            for byte in &chunk[..len] {
                let _ = self.cli.process_byte::<UsbCommand, _>(
                    *byte,
                    &mut UsbCommand::processor(|cli, command| handler(cli, command)),
                );
            }
            consumed += len;
        }
        consumed
    }
}

/// USB side of the console: the CDC-ACM class and the far ends of both pipes.
pub struct SerialPort {
    class: CdcAcmClass<'static, UsbDriver>,
    ingress: pipe::Writer<'static, NoopRawMutex, MAX_COMMAND_LEN>,
    egress: pipe::Reader<'static, NoopRawMutex, MAX_RESPONSE_LEN>,
}

impl SerialPort {
    async fn pump(self: &mut Self) -> Result<(), EndpointError> {
        let mut rx_packet = [0u8; USB_MAX_PACKET_SIZE as usize];
        let mut tx_packet = [0u8; USB_MAX_PACKET_SIZE as usize];
        loop {
            match select(
                self.class.read_packet(&mut rx_packet),
                self.egress.read(&mut tx_packet),
            )
            .await
            {
                Either::First(received) => {
                    let received = received?;
                    // NOTE: try_write only. The control loop drains ingress between iterations
                    //       and this task is also the only one emptying egress.
                    if self.ingress.try_write(&rx_packet[..received]).is_err() {
                        warn!("Console input overflow; dropped {} bytes.", received);
                    }
                }
                Either::Second(len) => {
                    self.class.write_packet(&tx_packet[..len]).await?;
                }
            }
        }
    }
}

fn device_config() -> Config<'static> {
    let mut config = Config::new(0xc0de, 0xcafe);
    config.manufacturer = Some("micromouse");
    config.product = Some("micromouse console");
    config.serial_number = Some("00000001");
    config.max_power = 100;
    config.max_packet_size_0 = USB_MAX_PACKET_SIZE;

    // Interface association descriptors so Windows binds the CDC-ACM driver
    config.device_class = 0xEF;
    config.device_sub_class = 0x02;
    config.device_protocol = 0x01;
    config.composite_with_iads = true;
    config
}

pub fn init(
    driver: UsbDriver,
) -> (
    UsbDevice<'static, UsbDriver>,
    &'static mut SerialPort,
    &'static mut Console,
) {
    static STATE: StaticCell<State> = StaticCell::new();
    static CONFIG_DESC: StaticCell<[u8; 256]> = StaticCell::new();
    static BOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
    static MSOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
    static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();

    let mut builder = Builder::new(
        driver,
        device_config(),
        &mut CONFIG_DESC.init_with(|| [0; 256])[..],
        &mut BOS_DESC.init_with(|| [0; 256])[..],
        &mut MSOS_DESC.init_with(|| [0; 256])[..],
        &mut CONTROL_BUF.init_with(|| [0; 64])[..],
    );
    let class = CdcAcmClass::new(
        &mut builder,
        STATE.init(State::new()),
        u16::from(USB_MAX_PACKET_SIZE),
    );
    let usb = builder.build();

    static INGRESS_PIPE: StaticCell<IngressPipe> = StaticCell::new();
    let (ingress_reader, ingress_writer) = INGRESS_PIPE.init_with(IngressPipe::new).split();
    static EGRESS_PIPE: StaticCell<EgressPipe> = StaticCell::new();
    let (egress_reader, egress_writer) = EGRESS_PIPE.init_with(EgressPipe::new).split();

    static SERIAL_PORT: StaticCell<SerialPort> = StaticCell::new();
    let serial_port = SERIAL_PORT.init_with(|| SerialPort {
        class,
        ingress: ingress_writer,
        egress: egress_reader,
    });

    static COMMAND_BUFFER: StaticCell<[u8; MAX_COMMAND_LEN]> = StaticCell::new();
    static HISTORY_BUFFER: StaticCell<[u8; HISTORY_LEN]> = StaticCell::new();
    static CONSOLE_WRITER: StaticCell<ConsoleWriter> = StaticCell::new();
    static CONSOLE: StaticCell<Console> = StaticCell::new();

    let cli = unwrap!(CliBuilder::default()
        .writer(CONSOLE_WRITER.init_with(|| ConsoleWriter {
            egress: egress_writer,
        }))
        .command_buffer(COMMAND_BUFFER.init_with(|| [0; MAX_COMMAND_LEN]).as_mut_slice())
        .history_buffer(HISTORY_BUFFER.init_with(|| [0; HISTORY_LEN]).as_mut_slice())
        .build()
        .ok());
    let console = CONSOLE.init_with(|| Console {
        ingress: ingress_reader,
        cli,
    });

    (usb, serial_port, console)
}

#[embassy_executor::task]
pub async fn usb_task(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    device.run().await
}

#[embassy_executor::task]
pub async fn serial_task(port: &'static mut SerialPort) -> ! {
    loop {
        port.class.wait_connection().await;
        info!("Connected to USB host");
        match port.pump().await {
            Ok(()) | Err(EndpointError::Disabled) => info!("Disconnected from USB host"),
            Err(err) => warn!("Unexpected USB error {:?}", err),
        };
    }
}
