use std::collections::HashMap;
use std::fmt;

use crate::addr::Ppa;
use crate::config::{PageIdx, DEDUP_REF_CAP};
use crate::error::{FtlError, Result};

/// Opaque content digest handed in by the hash provider. The FTL never
/// looks inside it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(Box<[u8]>);

impl ContentHash {
    pub fn new(bytes: &[u8]) -> Self {
        ContentHash(bytes.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter().take(8) {
            write!(f, "{:02x}", b)?;
        }
        if self.0.len() > 8 {
            write!(f, "..")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Claim {
    ppa: Ppa,
    idx: PageIdx,
    cnt: u32,
}

/// Content hash -> physical pages holding that content, each page with its
/// own capped claim count.
pub struct DedupIndex {
    entries: HashMap<ContentHash, Vec<Claim>>,
    // reverse lookup so a page can be dropped or moved without knowing its hash
    owners: HashMap<PageIdx, ContentHash>,
    cap: u32,
}

impl Default for DedupIndex {
    fn default() -> Self {
        DedupIndex::with_cap(DEDUP_REF_CAP)
    }
}

impl DedupIndex {
    pub fn new() -> Self {
        DedupIndex::default()
    }

    pub fn with_cap(cap: u32) -> Self {
        DedupIndex {
            entries: HashMap::new(),
            owners: HashMap::new(),
            cap,
        }
    }

    /// True iff some page holding `hash` can take one more claim.
    pub fn has_capacity(&self, hash: &ContentHash) -> bool {
        self.entries
            .get(hash)
            .map_or(false, |claims| claims.iter().any(|c| c.cnt < self.cap))
    }

    /// Adds a claim to the first page of `hash` still under the cap and
    /// returns it. The caller mirrors the claim on the page, block and line.
    pub fn claim(&mut self, hash: &ContentHash) -> Result<Ppa> {
        let cap = self.cap;
        let claim = self
            .entries
            .get_mut(hash)
            .and_then(|claims| claims.iter_mut().find(|c| c.cnt < cap))
            .ok_or_else(|| FtlError::Invariant(format!("claim on {:?} without capacity", hash)))?;
        claim.cnt += 1;
        Ok(claim.ppa)
    }

    /// Records a freshly programmed page holding `hash`, with no claims yet.
    pub fn register(&mut self, hash: ContentHash, ppa: Ppa, idx: PageIdx) {
        self.entries
            .entry(hash.clone())
            .or_default()
            .push(Claim { ppa, idx, cnt: 0 });
        self.owners.insert(idx, hash);
    }

    /// Drops the page at `idx` from whatever hash it was registered under.
    /// Returns the claim count it carried.
    pub fn forget(&mut self, idx: PageIdx) -> Option<u32> {
        let hash = self.owners.remove(&idx)?;
        let claims = self.entries.get_mut(&hash)?;
        let pos = claims.iter().position(|c| c.idx == idx)?;
        let cnt = claims.remove(pos).cnt;
        if claims.is_empty() {
            self.entries.remove(&hash);
        }
        Some(cnt)
    }

    /// Re-points the page at `old` to its new home after GC migration.
    pub fn relocate(&mut self, old: PageIdx, ppa: Ppa, idx: PageIdx) {
        let Some(hash) = self.owners.remove(&old) else {
            return;
        };
        if let Some(claim) = self
            .entries
            .get_mut(&hash)
            .and_then(|claims| claims.iter_mut().find(|c| c.idx == old))
        {
            claim.ppa = ppa;
            claim.idx = idx;
        }
        self.owners.insert(idx, hash);
    }

    /// Claims currently held on the page at `idx`.
    pub fn claims_on(&self, idx: PageIdx) -> u32 {
        self.owners
            .get(&idx)
            .and_then(|hash| self.entries.get(hash))
            .and_then(|claims| claims.iter().find(|c| c.idx == idx))
            .map_or(0, |c| c.cnt)
    }

    /// Pages registered under `hash`, in registration order.
    pub fn pages_of(&self, hash: &ContentHash) -> Vec<(Ppa, u32)> {
        self.entries
            .get(hash)
            .map(|claims| claims.iter().map(|c| (c.ppa, c.cnt)).collect())
            .unwrap_or_default()
    }

    pub fn hash_count(&self) -> usize {
        self.entries.len()
    }

    pub fn page_count(&self) -> usize {
        self.owners.len()
    }
}
