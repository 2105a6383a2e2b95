use log::debug;

use crate::addr::Ppa;
use crate::config::{BaseType, LineId};
use crate::error::{invariant, Result};
use crate::geometry::Geometry;
use crate::line::LineManager;

/// Cursor over the open line. Consecutive pages are striped across
/// channels first, then luns, before moving to the next page index, so
/// back-to-back writes land on different luns.
#[derive(Debug, Clone)]
pub struct WritePointer {
    pub curline: LineId,
    pub ch: BaseType,
    pub lun: BaseType,
    pub pg: BaseType,
    pub blk: BaseType,
    pub pl: BaseType,
}

impl WritePointer {
    pub fn new(lm: &mut LineManager) -> Result<Self> {
        let curline = lm.take_free_line()?;
        Ok(WritePointer {
            curline,
            ch: 0,
            lun: 0,
            pg: 0,
            blk: curline,
            pl: 0,
        })
    }

    /// Where the next program lands. Does not move the cursor.
    pub fn next_page(&self) -> Ppa {
        Ppa {
            ch: self.ch,
            lun: self.lun,
            pl: self.pl,
            blk: self.blk,
            pg: self.pg,
            sec: 0,
        }
    }

    pub fn advance(&mut self, geo: &Geometry, lm: &mut LineManager) -> Result<()> {
        invariant!(self.ch < geo.channels, "write pointer channel {} out of range", self.ch);
        self.ch += 1;
        if self.ch < geo.channels {
            return Ok(());
        }
        self.ch = 0;

        invariant!(self.lun < geo.luns_per_channel, "write pointer lun {} out of range", self.lun);
        self.lun += 1;
        if self.lun < geo.luns_per_channel {
            return Ok(());
        }
        self.lun = 0;

        invariant!(self.pg < geo.pages_per_block, "write pointer page {} out of range", self.pg);
        self.pg += 1;
        if self.pg < geo.pages_per_block {
            return Ok(());
        }
        self.pg = 0;

        lm.reclassify_on_fill(self.curline)?;
        self.curline = lm.take_free_line()?;
        self.blk = self.curline;
        debug!("write pointer moved to line {}", self.curline);

        invariant!(
            self.blk < geo.blocks_per_plane,
            "line {} has no block index",
            self.blk
        );
        invariant!(
            self.pg == 0 && self.lun == 0 && self.ch == 0 && self.pl == 0,
            "write pointer not rewound after line switch"
        );
        Ok(())
    }
}
