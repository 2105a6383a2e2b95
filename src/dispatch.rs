use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_queue::ArrayQueue;
use log::{error, info, warn};

use crate::backend::DataMover;
use crate::config::{BaseType, Nanos};
use crate::dedup::ContentHash;
use crate::error::Result;
use crate::ftl::Ftl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Read,
    Write,
    Trim,
}

/// One host command as it travels through the rings.
#[derive(Debug)]
pub struct IoRequest {
    pub id: u64,
    pub op: IoOp,
    /// First sector.
    pub slba: BaseType,
    /// Sector count.
    pub nlb: BaseType,
    /// Issue time in ns; zero means "now".
    pub stime: Nanos,
    /// One digest per logical page, writes only.
    pub hashes: Vec<ContentHash>,
    /// Payload laid out page by page. May be empty, in which case only the
    /// mapping and timing are exercised.
    pub data: Vec<u8>,
    /// Filled in on completion.
    pub latency: Nanos,
    pub expire_time: Nanos,
}

impl IoRequest {
    fn new(id: u64, op: IoOp, slba: BaseType, nlb: BaseType, stime: Nanos) -> Self {
        IoRequest {
            id,
            op,
            slba,
            nlb,
            stime,
            hashes: Vec::new(),
            data: Vec::new(),
            latency: 0,
            expire_time: stime,
        }
    }

    pub fn read(id: u64, slba: BaseType, nlb: BaseType, stime: Nanos) -> Self {
        IoRequest::new(id, IoOp::Read, slba, nlb, stime)
    }

    pub fn write(
        id: u64,
        slba: BaseType,
        nlb: BaseType,
        stime: Nanos,
        hashes: Vec<ContentHash>,
        data: Vec<u8>,
    ) -> Self {
        IoRequest {
            hashes,
            data,
            ..IoRequest::new(id, IoOp::Write, slba, nlb, stime)
        }
    }

    pub fn trim(id: u64, slba: BaseType, nlb: BaseType, stime: Nanos) -> Self {
        IoRequest::new(id, IoOp::Trim, slba, nlb, stime)
    }
}

#[derive(Debug)]
pub struct Completion {
    pub req: IoRequest,
    pub status: Result<Nanos>,
}

/// Bounded submission/completion ring pairs, one per upstream poller.
pub struct Rings {
    to_ftl: Vec<ArrayQueue<IoRequest>>,
    to_poller: Vec<ArrayQueue<Completion>>,
}

impl Rings {
    pub fn new(pollers: usize, depth: usize) -> Arc<Self> {
        Arc::new(Rings {
            to_ftl: (0..pollers).map(|_| ArrayQueue::new(depth)).collect(),
            to_poller: (0..pollers).map(|_| ArrayQueue::new(depth)).collect(),
        })
    }

    pub fn pollers(&self) -> usize {
        self.to_ftl.len()
    }

    /// Hands the request back when the ring is full.
    pub fn submit(&self, poller: usize, req: IoRequest) -> std::result::Result<(), IoRequest> {
        self.to_ftl[poller].push(req)
    }

    pub fn poll(&self, poller: usize) -> Option<Completion> {
        self.to_poller[poller].pop()
    }

    /// Requests not yet picked up by the worker.
    pub fn pending(&self) -> usize {
        self.to_ftl.iter().map(|q| q.len()).sum()
    }

    /// True when every queued request sits behind a full completion ring.
    fn stalled(&self) -> bool {
        self.to_ftl
            .iter()
            .zip(&self.to_poller)
            .all(|(sq, cq)| sq.is_empty() || cq.is_full())
    }
}

/// Single consumer that drains every submission ring into the FTL.
pub struct FtlWorker<M: DataMover> {
    ftl: Ftl<M>,
    rings: Arc<Rings>,
    stop: Arc<AtomicBool>,
    halted: bool,
}

impl<M: DataMover + 'static> FtlWorker<M> {
    pub fn new(ftl: Ftl<M>, rings: Arc<Rings>) -> Self {
        FtlWorker {
            ftl,
            rings,
            stop: Arc::new(AtomicBool::new(false)),
            halted: false,
        }
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn ftl(&self) -> &Ftl<M> {
        &self.ftl
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Serves at most one request from each ring. Returns how many were
    /// served.
    pub fn run_once(&mut self) -> usize {
        let mut served = 0;
        for i in 0..self.rings.pollers() {
            if self.halted {
                break;
            }
            // leave the request queued until there is room for its completion
            if self.rings.to_poller[i].is_full() {
                continue;
            }
            let Some(mut req) = self.rings.to_ftl[i].pop() else {
                continue;
            };

            let status = self.ftl.submit(&mut req);
            match &status {
                Ok(lat) => {
                    req.latency = *lat;
                    req.expire_time += *lat;
                }
                Err(e) if e.is_fatal() => {
                    error!("request {} hit a fatal error, halting: {}", req.id, e);
                    self.halted = true;
                }
                Err(e) => warn!("request {} rejected: {}", req.id, e),
            }

            if let Err(done) = self.rings.to_poller[i].push(Completion { req, status }) {
                error!("completion ring {} overflowed, dropping request {}", i, done.req.id);
            }
            served += 1;

            if !self.halted {
                if let Err(e) = self.ftl.background_gc() {
                    error!("background GC failed, halting: {}", e);
                    self.halted = true;
                }
            }
        }
        served
    }

    /// Polls until asked to stop and every ring is drained, or until a
    /// fatal error halts the device. Once stopped, requests stuck behind
    /// completion rings nobody reaps are left queued.
    pub fn run(&mut self) {
        loop {
            if self.halted {
                break;
            }
            if self.run_once() == 0 {
                if self.stop.load(Ordering::Acquire) {
                    let pending = self.rings.pending();
                    if pending == 0 {
                        break;
                    }
                    if self.rings.stalled() {
                        warn!("stopping with {} requests behind full completion rings", pending);
                        break;
                    }
                }
                thread::yield_now();
            }
        }
        info!("FTL worker exiting\n{}", self.ftl.stats());
    }

    /// Moves the worker to its own thread. Joining yields the device back.
    pub fn spawn(mut self) -> JoinHandle<Ftl<M>> {
        thread::spawn(move || {
            self.run();
            self.ftl
        })
    }
}
