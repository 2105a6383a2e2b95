use crate::addr::Ppa;
use crate::config::{BaseType, Counter};
use crate::error::{invariant, Result};
use crate::geometry::Geometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Free,
    Valid,
    Invalid,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub state: PageState,
    /// Dedup claims currently pointing at this page.
    pub rpc: u32,
}

impl Page {
    fn new() -> Self {
        Page { state: PageState::Free, rpc: 0 }
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub pages: Vec<Page>,
    pub vpc: Counter,
    pub ipc: Counter,
    /// Sum of the constituent pages' dedup references.
    pub rpc: Counter,
    pub erase_cnt: Counter,
}

impl Block {
    pub fn new(pages_per_block: BaseType) -> Self {
        Block {
            pages: vec![Page::new(); pages_per_block],
            vpc: 0,
            ipc: 0,
            rpc: 0,
            erase_cnt: 0,
        }
    }

    pub fn is_referenced(&self) -> bool {
        self.rpc > 0
    }

    /// Resets every page to Free and returns the (valid, invalid) counts the
    /// block held before the erase.
    pub fn erase(&mut self) -> Result<(Counter, Counter)> {
        invariant!(self.rpc == 0, "erasing a block still holding {} references", self.rpc);
        for page in self.pages.iter_mut() {
            page.state = PageState::Free;
            page.rpc = 0;
        }
        let counts = (self.vpc, self.ipc);
        self.vpc = 0;
        self.ipc = 0;
        self.erase_cnt += 1;
        Ok(counts)
    }
}

/// Every block of the device in one flat array, addressed through `Ppa`.
pub struct NandArray {
    geo: Geometry,
    blocks: Vec<Block>,
}

impl NandArray {
    pub fn new(geo: Geometry) -> Self {
        NandArray {
            geo,
            blocks: vec![Block::new(geo.pages_per_block); geo.total_blocks],
        }
    }

    pub fn block(&self, ppa: &Ppa) -> Result<&Block> {
        let idx = ppa.block_index(&self.geo)?;
        Ok(&self.blocks[idx])
    }

    pub fn block_mut(&mut self, ppa: &Ppa) -> Result<&mut Block> {
        let idx = ppa.block_index(&self.geo)?;
        Ok(&mut self.blocks[idx])
    }

    pub fn page(&self, ppa: &Ppa) -> Result<&Page> {
        Ok(&self.block(ppa)?.pages[ppa.pg])
    }

    /// Free -> Valid, bumping the block's valid count.
    pub fn mark_valid(&mut self, ppa: &Ppa) -> Result<()> {
        let ppb = self.geo.pages_per_block;
        let blk = self.block_mut(ppa)?;
        let pg = &mut blk.pages[ppa.pg];
        invariant!(pg.state == PageState::Free, "page {} is {:?}, expected Free", ppa, pg.state);
        pg.state = PageState::Valid;
        invariant!(blk.vpc < ppb, "block of {} already fully valid", ppa);
        blk.vpc += 1;
        Ok(())
    }

    /// Valid -> Invalid, moving one page from the block's valid to its
    /// invalid count.
    pub fn mark_invalid(&mut self, ppa: &Ppa) -> Result<()> {
        let ppb = self.geo.pages_per_block;
        let blk = self.block_mut(ppa)?;
        let pg = &mut blk.pages[ppa.pg];
        invariant!(pg.state == PageState::Valid, "page {} is {:?}, expected Valid", ppa, pg.state);
        invariant!(pg.rpc == 0, "invalidating page {} with {} references", ppa, pg.rpc);
        pg.state = PageState::Invalid;
        invariant!(blk.ipc < ppb, "block of {} already fully invalid", ppa);
        invariant!(blk.vpc > 0, "block of {} has no valid pages", ppa);
        blk.ipc += 1;
        blk.vpc -= 1;
        Ok(())
    }

    /// Records one more dedup claim on the page.
    pub fn add_reference(&mut self, ppa: &Ppa) -> Result<()> {
        let blk = self.block_mut(ppa)?;
        let pg = &mut blk.pages[ppa.pg];
        invariant!(pg.state == PageState::Valid, "referencing {:?} page {}", pg.state, ppa);
        pg.rpc += 1;
        blk.rpc += 1;
        Ok(())
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }
}
