#![allow(dead_code)]

mod addr;
mod backend;
mod config;
mod dedup;
mod dispatch;
mod error;
mod ftl;
mod gc;
mod geometry;
mod line;
mod mapping;
mod nand;
mod timing;
mod wp;

#[macro_use]
extern crate log;
extern crate simplelog;

use std::process;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rand::prelude::*;
use simplelog::*;
use time::macros::format_description;

use crate::backend::{page_hashes, DramBackend};
use crate::config::*;
use crate::dispatch::{FtlWorker, IoRequest, Rings};
use crate::error::{FtlError, Result};
use crate::ftl::Ftl;

const POLLERS: usize = 2;
const RING_DEPTH: usize = 64;
/// Share of random writes that reuse one of a few well-known payloads.
const DUP_RATIO: f64 = 0.02;
const DUP_PATTERNS: u64 = 16;

type Worker = JoinHandle<Ftl<DramBackend>>;

/// Keeps every ring busy, retrying while a ring is full and counting the
/// completions that come back.
struct Driver {
    rings: Arc<Rings>,
    spp: BaseType,
    page_size: BaseType,
    next_id: u64,
    completed: u64,
    failed: u64,
}

impl Driver {
    /// Queues a one-page write whose payload is derived from `tag`. Returns
    /// false once the worker is gone.
    fn write_page(&mut self, worker: &Worker, lpn: Lpn, tag: u64) -> bool {
        let mut data = vec![0; self.page_size];
        data[..8].copy_from_slice(&tag.to_le_bytes());
        let hashes = page_hashes(&data, self.page_size);
        let id = self.next_id;
        self.next_id += 1;

        let poller = id as usize % POLLERS;
        let mut req = IoRequest::write(id, lpn * self.spp, self.spp, 0, hashes, data);
        while let Err(back) = self.rings.submit(poller, req) {
            if worker.is_finished() {
                return false;
            }
            req = back;
            self.reap();
            thread::yield_now();
        }
        true
    }

    fn reap(&mut self) {
        for p in 0..POLLERS {
            while let Some(done) = self.rings.poll(p) {
                self.completed += 1;
                if let Err(e) = done.status {
                    warn!("request {} failed: {}", done.req.id, e);
                    self.failed += 1;
                }
            }
        }
    }
}

fn run() -> Result<()> {
    let cfg = DeviceConfig {
        pages_per_block: 64,
        blocks_per_plane: 64,
        luns_per_channel: 4,
        channels: 2,
        ..DeviceConfig::default()
    };
    let ftl = Ftl::new(&cfg)?;
    let max_lpn = ftl.geometry().total_pages * 3 / 4;
    let page_size = ftl.geometry().page_size;

    let rings = Rings::new(POLLERS, RING_DEPTH);
    let worker = FtlWorker::new(ftl, rings.clone());
    let stop = worker.stop_handle();
    let handle = worker.spawn();

    let mut drv = Driver {
        rings,
        spp: cfg.sectors_per_page,
        page_size,
        next_id: 0,
        completed: 0,
        failed: 0,
    };
    let mut tag = DUP_PATTERNS;
    let mut alive = true;

    for lpn in 0..max_lpn {
        alive = drv.write_page(&handle, lpn, tag);
        tag += 1;
        if !alive {
            break;
        }
    }
    info!("Drive preconditioned: {} pages", max_lpn);

    let mut rng: SmallRng = SmallRng::seed_from_u64(7);

    for c in 0..4 {
        if !alive {
            break;
        }
        for _ in 0..max_lpn {
            let lpn = rng.gen_range(0..max_lpn);
            let content = if rng.gen_bool(DUP_RATIO) {
                rng.gen_range(0..DUP_PATTERNS)
            } else {
                tag += 1;
                tag
            };
            alive = drv.write_page(&handle, lpn, content);
            if !alive {
                break;
            }
        }
        drv.reap();
        info!("Capacity {} randomly written", c);
    }
    if !alive {
        warn!("FTL worker halted early, see errors above");
    }

    while drv.rings.pending() > 0 && !handle.is_finished() {
        drv.reap();
        thread::yield_now();
    }
    stop.store(true, Ordering::Release);
    while !handle.is_finished() {
        drv.reap();
        thread::yield_now();
    }
    let ftl = handle
        .join()
        .map_err(|_| FtlError::Invariant("FTL worker panicked".into()))?;
    drv.reap();

    info!(
        "{} requests, {} completed, {} failed",
        drv.next_id, drv.completed, drv.failed
    );
    info!("Final stats:\n{}", ftl.stats());
    info!(
        "lines: {} free, {} victim, {} full, {} parked, {} detached",
        ftl.lines().free_count(),
        ftl.lines().victim_count(),
        ftl.lines().full_count(),
        ftl.lines().parked_count(),
        ftl.lines().detached_count()
    );
    Ok(())
}

fn main() {
    let log_cfg = ConfigBuilder::new()
        .set_time_format_custom(format_description!("[hour]:[minute]:[second].[subsecond]"))
        .build();

    if let Err(e) = SimpleLogger::init(LevelFilter::Info, log_cfg) {
        eprintln!("logger setup failed: {}", e);
    }

    if let Err(e) = run() {
        error!("simulation aborted: {}", e);
        process::exit(1);
    }
}
