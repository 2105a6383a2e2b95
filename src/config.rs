pub type BaseType = usize;

pub type Lpn = BaseType;
pub type PageIdx = BaseType;
pub type LineId = BaseType;
pub type Counter = BaseType;
pub type Nanos = u64;

/// P2L value of a physical page that no logical page owns.
pub const INVALID_LPN: Lpn = Lpn::MAX;

/// Max number of extra logical owners a single physical page may pick up
/// through deduplication.
pub const DEDUP_REF_CAP: u32 = 15;

/// Raw device shape and timing, fixed for the lifetime of the device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub sector_size: BaseType,
    pub sectors_per_page: BaseType,
    pub pages_per_block: BaseType,
    pub blocks_per_plane: BaseType,
    pub planes_per_lun: BaseType,
    pub luns_per_channel: BaseType,
    pub channels: BaseType,

    pub page_read_lat: Nanos,
    pub page_write_lat: Nanos,
    pub block_erase_lat: Nanos,

    /// Background GC kicks in once this percentage of lines is in use.
    pub gc_thres_pcent: u8,
    /// Writes force GC before proceeding past this percentage.
    pub gc_thres_pcent_high: u8,
    /// Charge GC reads, writes and erases to the timing model.
    pub enable_gc_delay: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            sector_size: 512,
            sectors_per_page: 8,
            pages_per_block: 256,
            blocks_per_plane: 256,
            planes_per_lun: 1,
            luns_per_channel: 8,
            channels: 8,

            page_read_lat: 40_000,
            page_write_lat: 200_000,
            block_erase_lat: 2_000_000,

            gc_thres_pcent: 75,
            gc_thres_pcent_high: 95,
            enable_gc_delay: true,
        }
    }
}

impl DeviceConfig {
    /// Tiny single-lun device used by the unit tests.
    #[cfg(test)]
    pub fn tiny(pages_per_block: BaseType, blocks_per_plane: BaseType) -> Self {
        DeviceConfig {
            pages_per_block,
            blocks_per_plane,
            luns_per_channel: 1,
            channels: 1,
            ..DeviceConfig::default()
        }
    }
}
