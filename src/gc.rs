use log::{debug, info, warn};

use crate::addr::Ppa;
use crate::backend::{DataMover, Direction};
use crate::config::LineId;
use crate::error::{invariant, FtlError, Result};
use crate::ftl::Ftl;
use crate::nand::PageState;
use crate::timing::NandOp;

impl<M: DataMover> Ftl<M> {
    /// One garbage-collection pass over the best victim line. Blocks that
    /// still hold dedup references are left alone; the line only goes back
    /// to Free if every one of its blocks was cleaned. Returns false when
    /// no victim qualified.
    pub fn do_gc(&mut self, force: bool) -> Result<bool> {
        let Some(victim) = self.lines.select_victim(force) else {
            return Ok(false);
        };
        let line = self.lines.line(victim);
        info!(
            "GC line {}: {} valid, {} invalid, {} free lines left",
            victim,
            line.vpc,
            line.ipc,
            self.lines.free_count()
        );
        self.stats.gc_runs += 1;

        let mut freed = true;
        for ch in 0..self.geo.channels {
            for lun in 0..self.geo.luns_per_channel {
                let ppa = Ppa { ch, lun, pl: 0, blk: victim, pg: 0, sec: 0 };
                if self.nand.block(&ppa)?.is_referenced() {
                    debug!("GC skips referenced block {}", ppa);
                    self.stats.blocks_skipped += 1;
                    freed = false;
                    continue;
                }
                self.clean_block(&ppa)?;
                self.erase_block(&ppa, victim)?;
            }
        }

        if freed {
            self.lines.return_to_free(victim)?;
            self.stats.lines_reclaimed += 1;
        } else {
            warn!("line {} keeps referenced blocks and stays out of rotation", victim);
        }
        Ok(true)
    }

    /// Migrates every valid page of the block to the write pointer.
    fn clean_block(&mut self, blk: &Ppa) -> Result<()> {
        let mut moved = 0;
        for pg in 0..self.geo.pages_per_block {
            let ppa = Ppa { pg, ..*blk };
            match self.nand.page(&ppa)?.state {
                PageState::Free => {
                    return Err(FtlError::Invariant(format!(
                        "victim line holds unwritten page {}",
                        ppa
                    )));
                }
                PageState::Invalid => {}
                PageState::Valid => {
                    self.gc_read_page(&ppa)?;
                    self.gc_write_page(&ppa)?;
                    moved += 1;
                }
            }
        }
        let vpc = self.nand.block(blk)?.vpc;
        invariant!(vpc == moved, "block {} moved {} of {} valid pages", blk, moved, vpc);
        Ok(())
    }

    fn gc_read_page(&mut self, ppa: &Ppa) -> Result<()> {
        if self.gc_delay {
            let now = self.clock.now_ns();
            self.timing.advance(ppa, NandOp::Read, now)?;
        }
        let offset = ppa.byte_offset(&self.geo)?;
        self.mover.copy(offset, &mut self.scratch, Direction::FromDevice)
    }

    /// Programs the page held in scratch at the write pointer and re-points
    /// its owner at the new copy. The old page stays Valid until erase.
    fn gc_write_page(&mut self, old: &Ppa) -> Result<()> {
        let old_idx = old.page_index(&self.geo)?;
        let lpn = self
            .p2l
            .get(old_idx)
            .ok_or_else(|| FtlError::Invariant(format!("valid page {} has no owner", old)))?;
        invariant!(
            self.l2p.get(lpn) == Some(*old),
            "owner {} of {} maps elsewhere",
            lpn,
            old
        );

        let new = self.wp.next_page();
        let new_idx = new.page_index(&self.geo)?;
        self.mover
            .copy(new_idx * self.geo.page_size, &mut self.scratch, Direction::ToDevice)?;

        self.l2p.set(lpn, new);
        self.p2l.set(new_idx, lpn);
        self.p2l.clear(old_idx);
        self.mark_page_valid(&new)?;
        self.dedup.relocate(old_idx, new, new_idx);
        self.wp.advance(&self.geo, &mut self.lines)?;

        if self.gc_delay {
            let now = self.clock.now_ns();
            self.timing.advance(&new, NandOp::Write, now)?;
        }
        self.stats.gc_bytes_written += self.geo.page_size as u64;
        Ok(())
    }

    fn erase_block(&mut self, ppa: &Ppa, line: LineId) -> Result<()> {
        let (vpc, ipc) = self.nand.block_mut(ppa)?.erase()?;
        self.lines.on_block_erased(line, vpc, ipc)?;
        if self.gc_delay {
            let now = self.clock.now_ns();
            self.timing.advance(ppa, NandOp::Erase, now)?;
        }
        Ok(())
    }
}
