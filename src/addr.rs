use std::fmt;
use std::ops::RangeInclusive;

use num_integer::Integer;

use crate::config::{BaseType, Lpn, PageIdx};
use crate::error::{FtlError, Result};
use crate::geometry::Geometry;

/// Physical page address. Unmapped logical pages are represented by the
/// absence of a `Ppa` (`Option::None`), never by a magic value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Ppa {
    pub ch: BaseType,
    pub lun: BaseType,
    pub pl: BaseType,
    pub blk: BaseType,
    pub pg: BaseType,
    pub sec: BaseType,
}

impl fmt::Display for Ppa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ch{}/lun{}/pl{}/blk{}/pg{}",
            self.ch, self.lun, self.pl, self.blk, self.pg
        )
    }
}

impl Ppa {
    pub fn is_within(&self, geo: &Geometry) -> bool {
        self.ch < geo.channels
            && self.lun < geo.luns_per_channel
            && self.pl < geo.planes_per_lun
            && self.blk < geo.blocks_per_plane
            && self.pg < geo.pages_per_block
            && self.sec < geo.sectors_per_page
    }

    fn check(&self, geo: &Geometry) -> Result<()> {
        if self.is_within(geo) {
            Ok(())
        } else {
            Err(FtlError::BadAddress(*self))
        }
    }

    /// Flat page index: weighted sum over the channel/lun/plane/block/page
    /// hierarchy.
    pub fn page_index(&self, geo: &Geometry) -> Result<PageIdx> {
        self.check(geo)?;
        Ok(self.ch * geo.pages_per_channel
            + self.lun * geo.pages_per_lun
            + self.pl * geo.pages_per_plane
            + self.blk * geo.pages_per_block
            + self.pg)
    }

    pub fn from_page_index(idx: PageIdx, geo: &Geometry) -> Result<Ppa> {
        if idx >= geo.total_pages {
            return Err(FtlError::Invariant(format!(
                "page index {} beyond {} pages",
                idx, geo.total_pages
            )));
        }
        let (ch, rest) = idx.div_rem(&geo.pages_per_channel);
        let (lun, rest) = rest.div_rem(&geo.pages_per_lun);
        let (pl, rest) = rest.div_rem(&geo.pages_per_plane);
        let (blk, pg) = rest.div_rem(&geo.pages_per_block);
        Ok(Ppa { ch, lun, pl, blk, pg, sec: 0 })
    }

    /// Index of the enclosing block in a flat block array.
    pub fn block_index(&self, geo: &Geometry) -> Result<BaseType> {
        self.check(geo)?;
        Ok(self.ch * geo.blocks_per_channel
            + self.lun * geo.blocks_per_lun
            + self.pl * geo.blocks_per_plane
            + self.blk)
    }

    /// Index of the enclosing lun across the whole device.
    pub fn lun_index(&self, geo: &Geometry) -> Result<BaseType> {
        self.check(geo)?;
        Ok(self.ch * geo.luns_per_channel + self.lun)
    }

    /// Byte offset of this page in a page-addressed backing store.
    pub fn byte_offset(&self, geo: &Geometry) -> Result<usize> {
        Ok(self.page_index(geo)? * geo.page_size)
    }
}

/// Inclusive range of logical pages touched by `nlb` sectors starting at
/// sector `slba`.
pub fn lpn_range(geo: &Geometry, slba: usize, nlb: usize) -> Result<RangeInclusive<Lpn>> {
    if nlb == 0 {
        return Err(FtlError::EmptyRequest);
    }
    let start = Integer::div_floor(&slba, &geo.sectors_per_page);
    let last = slba.checked_add(nlb - 1).ok_or(FtlError::OutOfRange {
        lpn: Lpn::MAX,
        total: geo.total_pages,
    })?;
    let end = Integer::div_floor(&last, &geo.sectors_per_page);
    if end >= geo.total_pages {
        return Err(FtlError::OutOfRange { lpn: end, total: geo.total_pages });
    }
    Ok(start..=end)
}
