use bytemuck::{Pod, Zeroable};
use core::mem::{size_of, MaybeUninit};
use defmt::*;
use embedded_storage_async::nor_flash::{NorFlash, ReadNorFlash};
use nrf_softdevice::{Flash, Softdevice};
use postcard::experimental::max_size::MaxSize;

use micromouse_x::datatypes::PersistentDataFileContents;

use crate::datatypes::{PersistentDataChannel, PersistentDataUpdate};
use crate::xerror::{XError, XResult};

const PAGE_SIZE: usize = 4096;
const CHECKSUM: crc::Crc<u32, crc::NoTable> = crc::Crc::<u32, crc::NoTable>::new(&crc::CRC_32_ISCSI);

/// Flash image of the stored contents: a CRC over the postcard payload, then the payload.
#[repr(C, packed)]
#[derive(Copy, Clone)]
struct Record {
    crc: u32,
    payload: [u8; PersistentDataFileContents::POSTCARD_MAX_SIZE],
}
// bytemuck's derives stop at small arrays; both fields are plain bytes with no padding.
unsafe impl Zeroable for Record {}
unsafe impl Pod for Record {}

const _: () = assert!(size_of::<Record>() <= PAGE_SIZE);

impl Record {
    fn encode(contents: &PersistentDataFileContents) -> XResult<Self> {
        let mut record = Self::zeroed();
        postcard::to_slice(contents, &mut record.payload)
            .map_err(|_| XError::SerializationFailure)?;
        record.crc = CHECKSUM.checksum(&record.payload);
        Ok(record)
    }

    fn decode(self: &Self) -> XResult<PersistentDataFileContents> {
        let stored = self.crc;
        let computed = CHECKSUM.checksum(&self.payload);
        if stored != computed {
            warn!("Stored CRC {:08x}, computed {:08x}.", stored, computed);
            return Err(XError::CrcMismatch);
        }
        postcard::from_bytes(&self.payload).map_err(|_| XError::SerializationFailure)
    }
}

#[link_section = ".userdata.PAGE"]
static USERDATA_PAGE: MaybeUninit<[u8; PAGE_SIZE]> = MaybeUninit::uninit();

fn page_start() -> u32 {
    USERDATA_PAGE.as_ptr() as u32
}

/// Controller gains and the searched maze, kept in one flash page.
pub struct PersistentDataService {
    flash: Flash,
    contents: PersistentDataFileContents,
}

impl PersistentDataService {
    /// Loads the stored page. A blank, corrupt or outdated page falls back to defaults.
    pub async fn new(sd: &Softdevice) -> Self {
        let mut flash = Flash::take(sd);
        let contents = match Self::load(&mut flash).await {
            Ok(contents) => contents,
            Err(e) => {
                warn!("No usable persistent data ({:?}); using defaults.", e);
                PersistentDataFileContents::default()
            }
        };
        Self { flash, contents }
    }

    pub fn get_contents(self: &Self) -> PersistentDataFileContents {
        self.contents
    }

    /// Applies `modifier` and rewrites the page, unless nothing changed.
    pub async fn update_contents(
        self: &mut Self,
        modifier: impl FnOnce(&mut PersistentDataFileContents),
    ) {
        let mut updated = self.contents;
        modifier(&mut updated);
        if updated == self.contents {
            return;
        }
        self.contents = updated;
        if let Err(e) = self.store().await {
            error!("Failed to write persistent data: {:?}", e);
        }
    }

    async fn load(flash: &mut Flash) -> XResult<PersistentDataFileContents> {
        let mut record = Record::zeroed();
        flash
            .read(page_start(), bytemuck::bytes_of_mut(&mut record))
            .await?;
        record.decode()
    }

    async fn store(self: &mut Self) -> XResult<()> {
        let record = Record::encode(&self.contents)?;
        let start = page_start();
        self.flash.erase(start, start + PAGE_SIZE as u32).await?;
        self.flash.write(start, bytemuck::bytes_of(&record)).await?;
        Ok(())
    }
}

#[embassy_executor::task]
pub async fn persistent_data_task(
    mut service: PersistentDataService,
    updates: &'static PersistentDataChannel,
) -> ! {
    loop {
        let update = updates.receive().await;
        service
            .update_contents(|contents| match update {
                PersistentDataUpdate::ControllerParams(params) => {
                    contents.controller_params = params
                }
                PersistentDataUpdate::MazeWalls(walls) => contents.maze_walls = walls,
            })
            .await;
    }
}
