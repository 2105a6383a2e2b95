use std::collections::HashMap;
use std::fmt;

use crate::addr::Ppa;
use crate::config::{Lpn, PageIdx, INVALID_LPN};

/// Logical-to-physical map. Sparse: only logical pages that were ever
/// written have an entry, and entries are only ever overwritten.
#[derive(Default)]
pub struct L2p {
    entries: HashMap<Lpn, Ppa>,
}

impl L2p {
    pub fn new() -> Self {
        L2p::default()
    }

    pub fn get(&self, lpn: Lpn) -> Option<Ppa> {
        self.entries.get(&lpn).copied()
    }

    /// Returns the previous mapping, if any.
    pub fn set(&mut self, lpn: Lpn, ppa: Ppa) -> Option<Ppa> {
        self.entries.insert(lpn, ppa)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Lpn, Ppa)> + '_ {
        self.entries.iter().map(|(&lpn, &ppa)| (lpn, ppa))
    }
}

impl fmt::Debug for L2p {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lpns: Vec<_> = self.entries.keys().copied().collect();
        lpns.sort_unstable();
        writeln!(f, "=== L2P: {} lpns mapped ===", lpns.len())?;
        for lpn in lpns {
            writeln!(f, "  LPN [{:<6}] -> {}", lpn, self.entries[&lpn])?;
        }
        Ok(())
    }
}

/// Physical-to-logical ("reverse") map, one slot per physical page.
pub struct P2l {
    entries: Vec<Lpn>,
}

impl P2l {
    pub fn new(total_pages: usize) -> Self {
        P2l { entries: vec![INVALID_LPN; total_pages] }
    }

    /// Owner of the page, `None` when the slot holds the invalid sentinel.
    pub fn get(&self, idx: PageIdx) -> Option<Lpn> {
        match self.entries[idx] {
            INVALID_LPN => None,
            lpn => Some(lpn),
        }
    }

    pub fn set(&mut self, idx: PageIdx, lpn: Lpn) {
        self.entries[idx] = lpn;
    }

    pub fn clear(&mut self, idx: PageIdx) {
        self.entries[idx] = INVALID_LPN;
    }
}
