use crate::config::{BaseType, DeviceConfig};
use crate::error::{FtlError, Result};

/// Device shape with every derived total precomputed. Built once from a
/// `DeviceConfig` and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub sector_size: BaseType,
    pub sectors_per_page: BaseType,
    pub pages_per_block: BaseType,
    pub blocks_per_plane: BaseType,
    pub planes_per_lun: BaseType,
    pub luns_per_channel: BaseType,
    pub channels: BaseType,

    pub page_size: BaseType,
    pub total_sectors: BaseType,

    pub pages_per_plane: BaseType,
    pub pages_per_lun: BaseType,
    pub pages_per_channel: BaseType,
    pub total_pages: BaseType,

    pub blocks_per_lun: BaseType,
    pub blocks_per_channel: BaseType,
    pub total_blocks: BaseType,

    pub total_luns: BaseType,

    // a line is one block index taken across every lun
    pub blocks_per_line: BaseType,
    pub pages_per_line: BaseType,
    pub total_lines: BaseType,

    /// Background GC runs once free lines drop to this count.
    pub gc_thres_lines: BaseType,
    /// Writes force GC once free lines drop to this count.
    pub gc_thres_lines_high: BaseType,
}

impl Geometry {
    pub fn new(cfg: &DeviceConfig) -> Result<Self> {
        let counts = [
            cfg.sector_size,
            cfg.sectors_per_page,
            cfg.pages_per_block,
            cfg.blocks_per_plane,
            cfg.planes_per_lun,
            cfg.luns_per_channel,
            cfg.channels,
        ];
        if counts.iter().any(|&c| c == 0) {
            return Err(FtlError::Config("every geometry count must be non-zero"));
        }
        // lines are built from plane 0 only
        if cfg.planes_per_lun != 1 {
            return Err(FtlError::Config("exactly one plane per lun is supported"));
        }
        if cfg.blocks_per_plane < 2 {
            return Err(FtlError::Config("need at least two lines (one open, one spare)"));
        }
        if cfg.gc_thres_pcent > 100 || cfg.gc_thres_pcent_high > 100 {
            return Err(FtlError::Config("gc thresholds are percentages"));
        }
        if cfg.gc_thres_pcent > cfg.gc_thres_pcent_high {
            return Err(FtlError::Config("low gc threshold above the high one"));
        }

        let page_size = cfg.sector_size * cfg.sectors_per_page;

        let pages_per_plane = cfg.pages_per_block * cfg.blocks_per_plane;
        let pages_per_lun = pages_per_plane * cfg.planes_per_lun;
        let pages_per_channel = pages_per_lun * cfg.luns_per_channel;
        let total_pages = pages_per_channel * cfg.channels;

        let blocks_per_lun = cfg.blocks_per_plane * cfg.planes_per_lun;
        let blocks_per_channel = blocks_per_lun * cfg.luns_per_channel;
        let total_blocks = blocks_per_channel * cfg.channels;

        let total_luns = cfg.luns_per_channel * cfg.channels;

        let blocks_per_line = total_luns;
        let pages_per_line = blocks_per_line * cfg.pages_per_block;
        let total_lines = blocks_per_lun;

        Ok(Geometry {
            sector_size: cfg.sector_size,
            sectors_per_page: cfg.sectors_per_page,
            pages_per_block: cfg.pages_per_block,
            blocks_per_plane: cfg.blocks_per_plane,
            planes_per_lun: cfg.planes_per_lun,
            luns_per_channel: cfg.luns_per_channel,
            channels: cfg.channels,

            page_size,
            total_sectors: total_pages * cfg.sectors_per_page,

            pages_per_plane,
            pages_per_lun,
            pages_per_channel,
            total_pages,

            blocks_per_lun,
            blocks_per_channel,
            total_blocks,

            total_luns,

            blocks_per_line,
            pages_per_line,
            total_lines,

            gc_thres_lines: free_lines_at(cfg.gc_thres_pcent, total_lines),
            gc_thres_lines_high: free_lines_at(cfg.gc_thres_pcent_high, total_lines),
        })
    }

    pub fn capacity_bytes(&self) -> usize {
        self.total_pages * self.page_size
    }
}

/// Number of free lines left when `pcent` percent of `lines` are in use.
fn free_lines_at(pcent: u8, lines: BaseType) -> BaseType {
    (lines * (100 - pcent as BaseType)) / 100
}
