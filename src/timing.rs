use std::cell::Cell;

use time::OffsetDateTime;

use crate::addr::Ppa;
use crate::config::{DeviceConfig, Nanos};
use crate::error::Result;
use crate::geometry::Geometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NandOp {
    Read,
    Write,
    Erase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Latencies {
    pub read: Nanos,
    pub write: Nanos,
    pub erase: Nanos,
}

impl Latencies {
    pub fn from_config(cfg: &DeviceConfig) -> Self {
        Latencies {
            read: cfg.page_read_lat,
            write: cfg.page_write_lat,
            erase: cfg.block_erase_lat,
        }
    }

    fn of(&self, op: NandOp) -> Nanos {
        match op {
            NandOp::Read => self.read,
            NandOp::Write => self.write,
            NandOp::Erase => self.erase,
        }
    }
}

/// Source of "now" for requests issued with a zero timestamp.
pub trait Clock: Send {
    fn now_ns(&self) -> Nanos;
}

pub struct WallClock;

impl Clock for WallClock {
    fn now_ns(&self) -> Nanos {
        OffsetDateTime::now_utc().unix_timestamp_nanos() as Nanos
    }
}

/// Clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    now: Cell<Nanos>,
}

impl ManualClock {
    pub fn new(start: Nanos) -> Self {
        ManualClock { now: Cell::new(start) }
    }

    pub fn set(&self, now: Nanos) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> Nanos {
        self.now.get()
    }
}

/// Per-lun "next available" ledger. Operations on one lun queue behind
/// each other; distinct luns never interact.
pub struct TimingModel {
    geo: Geometry,
    lat: Latencies,
    next_avail: Vec<Nanos>,
}

impl TimingModel {
    pub fn new(geo: Geometry, lat: Latencies) -> Self {
        TimingModel {
            geo,
            lat,
            next_avail: vec![0; geo.total_luns],
        }
    }

    /// Charges `op` on the lun holding `ppa`, issued at `stime` (already
    /// resolved, never the zero sentinel). Returns the latency seen by the
    /// issuer: queueing delay plus the op's own cost.
    pub fn advance(&mut self, ppa: &Ppa, op: NandOp, stime: Nanos) -> Result<Nanos> {
        let lun = ppa.lun_index(&self.geo)?;
        let start = stime.max(self.next_avail[lun]);
        self.next_avail[lun] = start + self.lat.of(op);
        Ok(self.next_avail[lun] - stime)
    }

    pub fn next_available(&self, ppa: &Ppa) -> Result<Nanos> {
        Ok(self.next_avail[ppa.lun_index(&self.geo)?])
    }
}
