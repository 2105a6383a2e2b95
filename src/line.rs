use log::{debug, trace};

use crate::config::{Counter, LineId};
use crate::error::{invariant, FtlError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    Free,
    /// Current write target of the write pointer.
    Open,
    Victim,
    Full,
    /// Written out but holding dedup references, so in no list.
    Parked,
    /// Taken off the Victim list by GC and not (yet) returned to Free.
    Detached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Free,
    Victim,
    Full,
}

#[derive(Debug, Clone)]
pub struct Line {
    pub id: LineId,
    pub vpc: Counter,
    pub ipc: Counter,
    pub rpc: Counter,
    pub state: LineState,
    prev: Option<LineId>,
    next: Option<LineId>,
}

/// Head/tail of an intrusive list threaded through `Line::prev/next`.
#[derive(Debug, Default, Clone, Copy)]
struct LineList {
    head: Option<LineId>,
    tail: Option<LineId>,
    len: usize,
}

pub struct LineManager {
    lines: Vec<Line>,
    pages_per_line: Counter,
    free: LineList,
    victim: LineList,
    full: LineList,
}

impl LineManager {
    pub fn new(total_lines: usize, pages_per_line: Counter) -> Self {
        let mut lm = LineManager {
            lines: (0..total_lines)
                .map(|id| Line {
                    id,
                    vpc: 0,
                    ipc: 0,
                    rpc: 0,
                    state: LineState::Free,
                    prev: None,
                    next: None,
                })
                .collect(),
            pages_per_line,
            free: LineList::default(),
            victim: LineList::default(),
            full: LineList::default(),
        };
        for id in 0..total_lines {
            lm.push_back(ListKind::Free, id);
        }
        lm
    }

    fn list_mut(&mut self, kind: ListKind) -> &mut LineList {
        match kind {
            ListKind::Free => &mut self.free,
            ListKind::Victim => &mut self.victim,
            ListKind::Full => &mut self.full,
        }
    }

    fn list(&self, kind: ListKind) -> &LineList {
        match kind {
            ListKind::Free => &self.free,
            ListKind::Victim => &self.victim,
            ListKind::Full => &self.full,
        }
    }

    fn push_back(&mut self, kind: ListKind, id: LineId) {
        let tail = self.list(kind).tail;
        self.lines[id].prev = tail;
        self.lines[id].next = None;
        match tail {
            Some(t) => self.lines[t].next = Some(id),
            None => self.list_mut(kind).head = Some(id),
        }
        let list = self.list_mut(kind);
        list.tail = Some(id);
        list.len += 1;
        self.lines[id].state = match kind {
            ListKind::Free => LineState::Free,
            ListKind::Victim => LineState::Victim,
            ListKind::Full => LineState::Full,
        };
    }

    fn unlink(&mut self, kind: ListKind, id: LineId) {
        let (prev, next) = (self.lines[id].prev, self.lines[id].next);
        match prev {
            Some(p) => self.lines[p].next = next,
            None => self.list_mut(kind).head = next,
        }
        match next {
            Some(n) => self.lines[n].prev = prev,
            None => self.list_mut(kind).tail = prev,
        }
        self.lines[id].prev = None;
        self.lines[id].next = None;
        self.list_mut(kind).len -= 1;
    }

    fn iter_list(&self, kind: ListKind) -> impl Iterator<Item = &Line> + '_ {
        std::iter::successors(self.list(kind).head.map(|id| &self.lines[id]), move |l| {
            l.next.map(|id| &self.lines[id])
        })
    }

    pub fn line(&self, id: LineId) -> &Line {
        &self.lines[id]
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn free_count(&self) -> usize {
        self.free.len
    }

    pub fn victim_count(&self) -> usize {
        self.victim.len
    }

    pub fn full_count(&self) -> usize {
        self.full.len
    }

    pub fn parked_count(&self) -> usize {
        self.count_in(LineState::Parked)
    }

    pub fn detached_count(&self) -> usize {
        self.count_in(LineState::Detached)
    }

    fn count_in(&self, state: LineState) -> usize {
        self.lines.iter().filter(|l| l.state == state).count()
    }

    /// Pops the head of the Free list and opens it for writing.
    pub fn take_free_line(&mut self) -> Result<LineId> {
        let id = self.free.head.ok_or(FtlError::NoFreeLine)?;
        self.unlink(ListKind::Free, id);
        self.lines[id].state = LineState::Open;
        trace!("opened line {}, {} free left", id, self.free.len);
        Ok(id)
    }

    /// Files the line the write pointer just ran off the end of.
    pub fn reclassify_on_fill(&mut self, id: LineId) -> Result<()> {
        let line = &self.lines[id];
        invariant!(line.state == LineState::Open, "closing line {} in state {:?}", id, line.state);
        if line.vpc == self.pages_per_line {
            invariant!(line.ipc == 0, "full line {} has {} invalid pages", id, line.ipc);
            self.push_back(ListKind::Full, id);
        } else if line.rpc == 0 {
            invariant!(line.ipc > 0, "closed line {} has neither full nor invalid pages", id);
            self.push_back(ListKind::Victim, id);
        } else {
            debug!("line {} closed with {} references, parking it", id, line.rpc);
            self.lines[id].state = LineState::Parked;
        }
        Ok(())
    }

    /// Resets the line's counters and appends it to the Free list.
    pub fn return_to_free(&mut self, id: LineId) -> Result<()> {
        let line = &self.lines[id];
        invariant!(
            line.state == LineState::Detached,
            "freeing line {} in state {:?}",
            id,
            line.state
        );
        invariant!(line.rpc == 0, "freeing line {} with {} references", id, line.rpc);
        let line = &mut self.lines[id];
        line.vpc = 0;
        line.ipc = 0;
        line.rpc = 0;
        self.push_back(ListKind::Free, id);
        Ok(())
    }

    /// Picks the victim with the fewest valid pages and detaches it. Unless
    /// `force`, a victim with fewer than 1/8 of its pages invalid is not
    /// worth cleaning yet.
    pub fn select_victim(&mut self, force: bool) -> Option<LineId> {
        let best = self.iter_list(ListKind::Victim).min_by_key(|l| l.vpc)?;
        if !force && best.ipc < self.pages_per_line / 8 {
            return None;
        }
        let id = best.id;
        self.unlink(ListKind::Victim, id);
        self.lines[id].state = LineState::Detached;
        Some(id)
    }

    pub fn on_page_valid(&mut self, id: LineId) -> Result<()> {
        let ppl = self.pages_per_line;
        let line = &mut self.lines[id];
        invariant!(line.vpc < ppl, "line {} already has {} valid pages", id, line.vpc);
        line.vpc += 1;
        Ok(())
    }

    /// Moves one page of the line from valid to invalid. A line that was
    /// full leaves the Full list: to Victim, or parked if referenced.
    pub fn on_page_invalid(&mut self, id: LineId) -> Result<()> {
        let ppl = self.pages_per_line;
        let line = &mut self.lines[id];
        invariant!(line.ipc < ppl, "line {} already has {} invalid pages", id, line.ipc);
        invariant!(line.vpc > 0, "line {} has no valid pages", id);
        let was_full = line.vpc == ppl;
        line.ipc += 1;
        line.vpc -= 1;

        if was_full && line.state == LineState::Full {
            let referenced = line.rpc > 0;
            self.unlink(ListKind::Full, id);
            if referenced {
                self.lines[id].state = LineState::Parked;
            } else {
                self.push_back(ListKind::Victim, id);
            }
        }
        Ok(())
    }

    /// Records a dedup claim on one of the line's pages. The line keeps its
    /// list membership; GC skips the referenced block when it gets there.
    pub fn on_reference(&mut self, id: LineId) {
        self.lines[id].rpc += 1;
    }

    /// Drops an erased block's counts from its line.
    pub fn on_block_erased(&mut self, id: LineId, vpc: Counter, ipc: Counter) -> Result<()> {
        let line = &mut self.lines[id];
        invariant!(
            line.vpc >= vpc && line.ipc >= ipc,
            "line {} ({}v/{}i) smaller than erased block ({}v/{}i)",
            id,
            line.vpc,
            line.ipc,
            vpc,
            ipc
        );
        line.vpc -= vpc;
        line.ipc -= ipc;
        Ok(())
    }
}
