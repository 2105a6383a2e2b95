use std::fmt;

use byte_unit::Byte;
use log::{debug, info, trace};

use crate::addr::{lpn_range, Ppa};
use crate::backend::{DataMover, Direction, DramBackend};
use crate::config::{DeviceConfig, Nanos};
use crate::dedup::{ContentHash, DedupIndex};
use crate::dispatch::{IoOp, IoRequest};
use crate::error::{invariant, FtlError, Result};
use crate::geometry::Geometry;
use crate::line::LineManager;
use crate::mapping::{L2p, P2l};
use crate::nand::NandArray;
use crate::timing::{Clock, Latencies, NandOp, TimingModel, WallClock};
use crate::wp::WritePointer;

/// Process-lifetime counters.
#[derive(Debug, Default, Clone)]
pub struct FtlStats {
    pub host_bytes_written: u64,
    /// Bytes actually programmed for host writes (dedup misses only).
    pub nand_bytes_written: u64,
    pub gc_bytes_written: u64,
    pub dedup_hits: u64,
    pub dedup_misses: u64,
    pub gc_runs: u64,
    pub lines_reclaimed: u64,
    pub blocks_skipped: u64,
}

impl FtlStats {
    /// Write amplification: bytes programmed to flash per byte the host sent.
    pub fn waf(&self) -> f64 {
        if self.host_bytes_written == 0 {
            return 0.0;
        }
        (self.nand_bytes_written + self.gc_bytes_written) as f64 / self.host_bytes_written as f64
    }
}

fn pretty(bytes: u64) -> String {
    Byte::from(bytes as usize).get_appropriate_unit(true).to_string()
}

impl fmt::Display for FtlStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "host written:  {}", pretty(self.host_bytes_written))?;
        writeln!(f, "nand written:  {}", pretty(self.nand_bytes_written))?;
        writeln!(f, "gc written:    {}", pretty(self.gc_bytes_written))?;
        writeln!(f, "dedup:         {} hits / {} misses", self.dedup_hits, self.dedup_misses)?;
        writeln!(
            f,
            "gc:            {} runs, {} lines reclaimed, {} blocks skipped",
            self.gc_runs, self.lines_reclaimed, self.blocks_skipped
        )?;
        write!(f, "WAF:           {:.4}", self.waf())
    }
}

/// Whole device state. Owned by a single worker; nothing in here is shared.
pub struct Ftl<M: DataMover = DramBackend> {
    pub(crate) geo: Geometry,
    pub(crate) gc_delay: bool,
    pub(crate) nand: NandArray,
    pub(crate) lines: LineManager,
    pub(crate) wp: WritePointer,
    pub(crate) l2p: L2p,
    pub(crate) p2l: P2l,
    pub(crate) dedup: DedupIndex,
    pub(crate) timing: TimingModel,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) mover: M,
    pub(crate) stats: FtlStats,
    /// One page of payload in flight during GC migration.
    pub(crate) scratch: Vec<u8>,
}

impl Ftl<DramBackend> {
    /// Device backed by host memory, timed against the wall clock.
    pub fn new(cfg: &DeviceConfig) -> Result<Self> {
        let geo = Geometry::new(cfg)?;
        Ftl::with_parts(cfg, DramBackend::new(geo.capacity_bytes()), Box::new(WallClock))
    }
}

impl<M: DataMover> Ftl<M> {
    pub fn with_parts(cfg: &DeviceConfig, mover: M, clock: Box<dyn Clock>) -> Result<Self> {
        let geo = Geometry::new(cfg)?;
        let mut lines = LineManager::new(geo.total_lines, geo.pages_per_line);
        let wp = WritePointer::new(&mut lines)?;

        info!(
            "FTL up: {} ch x {} luns, {} lines of {} pages, capacity {}",
            geo.channels,
            geo.luns_per_channel,
            geo.total_lines,
            geo.pages_per_line,
            Byte::from(geo.capacity_bytes()).get_appropriate_unit(true).to_string()
        );
        debug!(
            "gc below {} free lines, forced below {}",
            geo.gc_thres_lines, geo.gc_thres_lines_high
        );

        Ok(Ftl {
            geo,
            gc_delay: cfg.enable_gc_delay,
            nand: NandArray::new(geo),
            lines,
            wp,
            l2p: L2p::new(),
            p2l: P2l::new(geo.total_pages),
            dedup: DedupIndex::new(),
            timing: TimingModel::new(geo, Latencies::from_config(cfg)),
            clock,
            mover,
            stats: FtlStats::default(),
            scratch: vec![0; geo.page_size],
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geo
    }

    pub fn stats(&self) -> &FtlStats {
        &self.stats
    }

    pub fn lines(&self) -> &LineManager {
        &self.lines
    }

    pub fn nand(&self) -> &NandArray {
        &self.nand
    }

    pub fn l2p(&self) -> &L2p {
        &self.l2p
    }

    pub fn p2l(&self) -> &P2l {
        &self.p2l
    }

    pub fn dedup(&self) -> &DedupIndex {
        &self.dedup
    }

    pub fn timing(&self) -> &TimingModel {
        &self.timing
    }

    pub fn write_pointer(&self) -> &WritePointer {
        &self.wp
    }

    pub fn mover(&self) -> &M {
        &self.mover
    }

    /// Zero issue time means "now".
    pub(crate) fn resolve_time(&self, stime: Nanos) -> Nanos {
        if stime == 0 {
            self.clock.now_ns()
        } else {
            stime
        }
    }

    pub fn should_gc(&self) -> bool {
        self.lines.free_count() <= self.geo.gc_thres_lines
    }

    pub fn should_gc_high(&self) -> bool {
        self.lines.free_count() <= self.geo.gc_thres_lines_high
    }

    pub(crate) fn mark_page_valid(&mut self, ppa: &Ppa) -> Result<()> {
        self.nand.mark_valid(ppa)?;
        self.lines.on_page_valid(ppa.blk)
    }

    pub(crate) fn mark_page_invalid(&mut self, ppa: &Ppa) -> Result<()> {
        self.nand.mark_invalid(ppa)?;
        self.lines.on_page_invalid(ppa.blk)
    }

    /// Hands out an existing page holding `hash` and records the extra
    /// reference on the page, its block and its line.
    fn claim_shared(&mut self, hash: &ContentHash) -> Result<Ppa> {
        let ppa = self.dedup.claim(hash)?;
        self.nand.add_reference(&ppa)?;
        self.lines.on_reference(ppa.blk);
        Ok(ppa)
    }

    /// Runs one request to completion and returns its latency.
    pub fn submit(&mut self, req: &mut IoRequest) -> Result<Nanos> {
        match req.op {
            IoOp::Write => self.write(req),
            IoOp::Read => self.read(req),
            IoOp::Trim => self.trim(req),
        }
    }

    /// Writes every logical page of the request. Pages whose content is
    /// already on flash (and under the claim cap) only get remapped; the
    /// rest are programmed at the write pointer. Returns the slowest page.
    pub fn write(&mut self, req: &mut IoRequest) -> Result<Nanos> {
        let lpns = lpn_range(&self.geo, req.slba, req.nlb)?;
        let pages = lpns.end() - lpns.start() + 1;
        if req.hashes.len() < pages {
            return Err(FtlError::MissingHash { pages, hashes: req.hashes.len() });
        }
        let stime = self.resolve_time(req.stime);

        while self.should_gc_high() {
            if !self.do_gc(true)? {
                break;
            }
        }

        let mut maxlat = 0;
        for (i, lpn) in lpns.enumerate() {
            if let Some(old) = self.l2p.get(lpn) {
                // still-shared pages stay valid for their other owners
                if !self.nand.block(&old)?.is_referenced() {
                    self.mark_page_invalid(&old)?;
                    let old_idx = old.page_index(&self.geo)?;
                    self.p2l.clear(old_idx);
                    let stale = self.dedup.forget(old_idx);
                    invariant!(
                        matches!(stale, None | Some(0)),
                        "invalidated page {} still carried {:?} claims",
                        old,
                        stale
                    );
                }
            }

            let hash = &req.hashes[i];
            if self.dedup.has_capacity(hash) {
                let ppa = self.claim_shared(hash)?;
                self.l2p.set(lpn, ppa);
                self.stats.dedup_hits += 1;
                trace!("lpn {} dedup hit on {}", lpn, ppa);
                continue;
            }

            let ppa = self.wp.next_page();
            let idx = ppa.page_index(&self.geo)?;
            let (from, to) = page_span(req.data.len(), i, self.geo.page_size);
            self.mover
                .copy(idx * self.geo.page_size, &mut req.data[from..to], Direction::ToDevice)?;

            self.l2p.set(lpn, ppa);
            self.p2l.set(idx, lpn);
            self.mark_page_valid(&ppa)?;
            self.dedup.register(hash.clone(), ppa, idx);
            self.wp.advance(&self.geo, &mut self.lines)?;

            let lat = self.timing.advance(&ppa, NandOp::Write, stime)?;
            maxlat = maxlat.max(lat);
            self.stats.dedup_misses += 1;
            self.stats.nand_bytes_written += self.geo.page_size as u64;
        }

        self.stats.host_bytes_written += (req.nlb * self.geo.sector_size) as u64;
        Ok(maxlat)
    }

    /// Charges a read for every mapped page of the request and copies the
    /// payload out when the request brought a buffer. Never-written pages
    /// cost nothing.
    pub fn read(&mut self, req: &mut IoRequest) -> Result<Nanos> {
        let lpns = lpn_range(&self.geo, req.slba, req.nlb)?;
        let stime = self.resolve_time(req.stime);

        let mut maxlat = 0;
        for (i, lpn) in lpns.enumerate() {
            let Some(ppa) = self.l2p.get(lpn) else {
                continue;
            };
            if !ppa.is_within(&self.geo) {
                continue;
            }
            let lat = self.timing.advance(&ppa, NandOp::Read, stime)?;
            maxlat = maxlat.max(lat);

            let (from, to) = page_span(req.data.len(), i, self.geo.page_size);
            if from < to {
                self.mover.copy(
                    ppa.byte_offset(&self.geo)?,
                    &mut req.data[from..to],
                    Direction::FromDevice,
                )?;
            }
        }
        Ok(maxlat)
    }

    /// Accepted and range-checked, otherwise a no-op.
    pub fn trim(&mut self, req: &mut IoRequest) -> Result<Nanos> {
        lpn_range(&self.geo, req.slba, req.nlb)?;
        Ok(0)
    }

    /// Opportunistic GC run between requests.
    pub fn background_gc(&mut self) -> Result<()> {
        if self.should_gc() {
            self.do_gc(false)?;
        }
        Ok(())
    }
}

/// Byte span of the `i`-th page inside a request buffer of `len` bytes;
/// empty once the buffer runs out.
fn page_span(len: usize, i: usize, page_size: usize) -> (usize, usize) {
    let from = (i * page_size).min(len);
    let to = ((i + 1) * page_size).min(len);
    (from, to)
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::config::{Lpn, DEDUP_REF_CAP};
    use crate::line::LineState;
    use crate::nand::PageState;
    use crate::timing::ManualClock;
    use rand::prelude::*;
    use simplelog::{Config, LevelFilter, TestLogger};

    pub fn init_log() {
        let _ = TestLogger::init(LevelFilter::Debug, Config::default());
    }

    pub fn test_ftl(cfg: &DeviceConfig) -> Ftl {
        init_log();
        let geo = Geometry::new(cfg).unwrap();
        Ftl::with_parts(
            cfg,
            DramBackend::new(geo.capacity_bytes()),
            Box::new(ManualClock::new(1_000_000)),
        )
        .unwrap()
    }

    pub fn hash_of(tag: u64) -> ContentHash {
        ContentHash::new(&tag.to_le_bytes())
    }

    /// One-page write of `lpn` carrying content tagged `tag`.
    pub fn write_page(ftl: &mut Ftl, lpn: Lpn, tag: u64) -> Result<Nanos> {
        let spp = ftl.geometry().sectors_per_page;
        let page = vec![tag as u8; ftl.geometry().page_size];
        let mut req = IoRequest::write(0, lpn * spp, spp, 0, vec![hash_of(tag)], page);
        ftl.write(&mut req)
    }

    pub fn read_page(ftl: &mut Ftl, lpn: Lpn) -> Vec<u8> {
        let spp = ftl.geometry().sectors_per_page;
        let mut req = IoRequest::read(0, lpn * spp, spp, 0);
        req.data = vec![0; ftl.geometry().page_size];
        ftl.read(&mut req).unwrap();
        req.data
    }

    /// Cross-checks every counter and table against the page states.
    pub fn check_invariants(ftl: &Ftl) {
        let geo = ftl.geometry();
        let lm = ftl.lines();

        assert_eq!(
            lm.free_count()
                + lm.victim_count()
                + lm.full_count()
                + lm.parked_count()
                + lm.detached_count()
                + 1,
            geo.total_lines
        );
        assert_eq!(lm.line(ftl.write_pointer().curline).state, LineState::Open);

        let mut line_vpc = vec![0; geo.total_lines];
        let mut line_ipc = vec![0; geo.total_lines];
        let mut line_rpc = vec![0; geo.total_lines];
        for idx in (0..geo.total_pages).step_by(geo.pages_per_block) {
            let ppa = Ppa::from_page_index(idx, geo).unwrap();
            let blk = ftl.nand().block(&ppa).unwrap();
            let valid = blk.pages.iter().filter(|p| p.state == PageState::Valid).count();
            let invalid = blk.pages.iter().filter(|p| p.state == PageState::Invalid).count();
            let refs: u32 = blk.pages.iter().map(|p| p.rpc).sum();
            assert!(blk.vpc + blk.ipc <= geo.pages_per_block);
            assert_eq!((blk.vpc, blk.ipc, blk.rpc), (valid, invalid, refs as usize));
            line_vpc[ppa.blk] += valid;
            line_ipc[ppa.blk] += invalid;
            line_rpc[ppa.blk] += refs as usize;

            for (pg, page) in blk.pages.iter().enumerate() {
                assert!(page.rpc <= DEDUP_REF_CAP);
                assert_eq!(page.rpc, ftl.dedup().claims_on(idx + pg));
            }
        }
        for line in lm.lines() {
            assert_eq!(line.vpc, line_vpc[line.id], "line {} vpc", line.id);
            assert_eq!(line.ipc, line_ipc[line.id], "line {} ipc", line.id);
            assert_eq!(line.rpc, line_rpc[line.id], "line {} rpc", line.id);
        }

        for (lpn, ppa) in ftl.l2p().iter() {
            let page = ftl.nand().page(&ppa).unwrap();
            assert_eq!(page.state, PageState::Valid, "lpn {} -> {}", lpn, ppa);
            if !ftl.nand().block(&ppa).unwrap().is_referenced() {
                let idx = ppa.page_index(geo).unwrap();
                assert_eq!(ftl.p2l().get(idx), Some(lpn), "p2l of {}", ppa);
            }
        }
    }

    #[test]
    fn fresh_write_lands_on_write_pointer() {
        let mut ftl = test_ftl(&DeviceConfig::tiny(4, 8));
        let first = ftl.write_pointer().next_page();

        let lat = write_page(&mut ftl, 0, 1).unwrap();
        assert_eq!(lat, DeviceConfig::default().page_write_lat);
        assert_eq!(ftl.l2p().get(0), Some(first));
        assert_eq!(ftl.nand().page(&first).unwrap().state, PageState::Valid);
        assert_eq!(ftl.write_pointer().next_page(), Ppa { pg: 1, ..first });
        assert_eq!(ftl.mover().copies(), 1);
        check_invariants(&ftl);
    }

    #[test]
    fn same_content_shares_a_page() {
        let mut ftl = test_ftl(&DeviceConfig::tiny(4, 8));
        write_page(&mut ftl, 0, 1).unwrap();
        let cursor = ftl.write_pointer().next_page();

        let lat = write_page(&mut ftl, 1, 1).unwrap();
        assert_eq!(lat, 0);
        let shared = ftl.l2p().get(0).unwrap();
        assert_eq!(ftl.l2p().get(1), Some(shared));
        assert_eq!(ftl.nand().page(&shared).unwrap().rpc, 1);
        assert_eq!(ftl.nand().block(&shared).unwrap().rpc, 1);
        assert_eq!(ftl.lines().line(shared.blk).rpc, 1);
        assert_eq!(ftl.write_pointer().next_page(), cursor);
        assert_eq!(ftl.mover().copies(), 1);
        assert_eq!((ftl.stats().dedup_hits, ftl.stats().dedup_misses), (1, 1));

        assert_eq!(read_page(&mut ftl, 1), read_page(&mut ftl, 0));
        check_invariants(&ftl);
    }

    #[test]
    fn overwrite_invalidates_old_page() {
        let mut ftl = test_ftl(&DeviceConfig::tiny(4, 8));
        write_page(&mut ftl, 0, 1).unwrap();
        let old = ftl.l2p().get(0).unwrap();
        let old_idx = old.page_index(ftl.geometry()).unwrap();

        write_page(&mut ftl, 0, 2).unwrap();
        let new = ftl.l2p().get(0).unwrap();
        assert_ne!(new, old);
        assert_eq!(ftl.nand().page(&old).unwrap().state, PageState::Invalid);
        assert_eq!(ftl.nand().page(&new).unwrap().state, PageState::Valid);
        assert_eq!(ftl.p2l().get(old_idx), None);
        // stale content is gone from the index, so it cannot be claimed
        assert!(!ftl.dedup().has_capacity(&hash_of(1)));
        assert_eq!(read_page(&mut ftl, 0), vec![2u8; ftl.geometry().page_size]);
        check_invariants(&ftl);
    }

    #[test]
    fn overwrite_of_shared_page_keeps_it_valid() {
        let mut ftl = test_ftl(&DeviceConfig::tiny(4, 8));
        write_page(&mut ftl, 0, 1).unwrap();
        write_page(&mut ftl, 1, 1).unwrap();
        let shared = ftl.l2p().get(0).unwrap();

        write_page(&mut ftl, 0, 2).unwrap();
        assert_ne!(ftl.l2p().get(0), Some(shared));
        assert_eq!(ftl.l2p().get(1), Some(shared));
        assert_eq!(ftl.nand().page(&shared).unwrap().state, PageState::Valid);
        assert_eq!(read_page(&mut ftl, 1), vec![1u8; ftl.geometry().page_size]);
        check_invariants(&ftl);
    }

    #[test]
    fn claim_cap_forces_a_new_copy() {
        let mut ftl = test_ftl(&DeviceConfig::tiny(32, 8));
        write_page(&mut ftl, 0, 7).unwrap();
        for lpn in 1..=DEDUP_REF_CAP as Lpn {
            write_page(&mut ftl, lpn, 7).unwrap();
        }
        let first = ftl.l2p().get(0).unwrap();
        assert_eq!(ftl.nand().page(&first).unwrap().rpc, DEDUP_REF_CAP);
        assert_eq!(ftl.mover().copies(), 1);

        let lpn = DEDUP_REF_CAP as Lpn + 1;
        write_page(&mut ftl, lpn, 7).unwrap();
        let second = ftl.l2p().get(lpn).unwrap();
        assert_ne!(second, first);
        assert_eq!(ftl.nand().page(&second).unwrap().rpc, 0);
        assert_eq!(ftl.mover().copies(), 2);
        assert_eq!(ftl.dedup().pages_of(&hash_of(7)), vec![(first, DEDUP_REF_CAP), (second, 0)]);
        check_invariants(&ftl);
    }

    #[test]
    fn reads_of_unwritten_pages_are_free() {
        let mut ftl = test_ftl(&DeviceConfig::tiny(4, 8));
        let mut req = IoRequest::read(0, 0, 64, 0);
        assert_eq!(ftl.read(&mut req).unwrap(), 0);

        write_page(&mut ftl, 2, 1).unwrap();
        let mut req = IoRequest::read(0, 0, 64, 5_000_000);
        assert_eq!(ftl.read(&mut req).unwrap(), DeviceConfig::default().page_read_lat);
    }

    #[test]
    fn zero_issue_time_uses_the_clock() {
        let mut ftl = test_ftl(&DeviceConfig::tiny(4, 8));
        write_page(&mut ftl, 0, 1).unwrap();
        let ppa = ftl.l2p().get(0).unwrap();
        let write_lat = DeviceConfig::default().page_write_lat;
        assert_eq!(ftl.timing().next_available(&ppa).unwrap(), 1_000_000 + write_lat);
    }

    #[test]
    fn multi_page_write_reports_slowest_page() {
        let mut ftl = test_ftl(&DeviceConfig::tiny(8, 8));
        let geo = *ftl.geometry();
        let data = vec![3u8; 3 * geo.page_size];
        let hashes = vec![hash_of(1), hash_of(2), hash_of(3)];
        let mut req = IoRequest::write(0, 0, 3 * geo.sectors_per_page, 10_000, hashes, data);
        // single lun: the three programs queue behind each other
        assert_eq!(ftl.write(&mut req).unwrap(), 3 * DeviceConfig::default().page_write_lat);
        assert_eq!(ftl.l2p().len(), 3);
        check_invariants(&ftl);
    }

    #[test]
    fn malformed_requests_are_rejected_untouched() {
        let mut ftl = test_ftl(&DeviceConfig::tiny(4, 8));
        let geo = *ftl.geometry();

        let mut req = IoRequest::write(0, geo.total_sectors, 8, 0, vec![hash_of(1)], vec![]);
        assert!(matches!(ftl.write(&mut req), Err(FtlError::OutOfRange { .. })));

        let mut req = IoRequest::write(0, 0, 16, 0, vec![hash_of(1)], vec![]);
        assert!(matches!(
            ftl.write(&mut req),
            Err(FtlError::MissingHash { pages: 2, hashes: 1 })
        ));

        let mut req = IoRequest::read(0, 0, 0, 0);
        assert!(matches!(ftl.read(&mut req), Err(FtlError::EmptyRequest)));

        assert_eq!(ftl.l2p().len(), 0);
        assert_eq!(ftl.stats().host_bytes_written, 0);
        check_invariants(&ftl);
    }

    fn watermark_cfg() -> DeviceConfig {
        // 8 lines: background GC at 4 free, forced at 2
        DeviceConfig {
            gc_thres_pcent: 50,
            gc_thres_pcent_high: 75,
            ..DeviceConfig::tiny(4, 8)
        }
    }

    #[test]
    fn write_past_high_watermark_forces_gc() {
        let mut ftl = test_ftl(&watermark_cfg());
        let mut k = 0;
        while !ftl.should_gc_high() {
            write_page(&mut ftl, k % 4, 1_000 + k as u64).unwrap();
            k += 1;
        }
        assert_eq!(ftl.stats().gc_runs, 0);
        assert!(ftl.lines().victim_count() > 0);

        write_page(&mut ftl, 0, 999).unwrap();
        assert_eq!(ftl.stats().gc_runs, 1);
        assert_eq!(ftl.stats().lines_reclaimed, 1);
        assert!(ftl.lines().free_count() > ftl.geometry().gc_thres_lines_high);
        check_invariants(&ftl);
    }

    #[test]
    fn forced_gc_gives_up_without_victims() {
        let mut ftl = test_ftl(&watermark_cfg());
        let mut lpn = 0;
        while !ftl.should_gc_high() {
            write_page(&mut ftl, lpn, lpn as u64).unwrap();
            lpn += 1;
        }
        assert_eq!(ftl.lines().victim_count(), 0);

        write_page(&mut ftl, lpn, lpn as u64).unwrap();
        assert_eq!(ftl.stats().gc_runs, 0);
        assert!(ftl.l2p().get(lpn).is_some());
        check_invariants(&ftl);
    }

    #[test]
    fn stale_claim_on_invalidated_page_is_fatal() {
        let mut ftl = test_ftl(&DeviceConfig::tiny(4, 8));
        write_page(&mut ftl, 0, 1).unwrap();
        // claim lands in the index but never on the page itself
        ftl.dedup.claim(&hash_of(1)).unwrap();
        let before = ftl.stats().host_bytes_written;

        let err = write_page(&mut ftl, 0, 2).unwrap_err();
        assert!(matches!(err, FtlError::Invariant(_)));
        assert_eq!(ftl.stats().host_bytes_written, before);
    }

    #[test]
    fn host_bytes_count_completed_writes_only() {
        let mut ftl = test_ftl(&DeviceConfig::tiny(4, 8));
        write_page(&mut ftl, 0, 1).unwrap();
        write_page(&mut ftl, 1, 1).unwrap();
        let page = ftl.geometry().page_size as u64;
        assert_eq!(ftl.stats().host_bytes_written, 2 * page);

        let mut req = IoRequest::write(0, 8, 16, 0, vec![hash_of(3)], vec![]);
        assert!(ftl.write(&mut req).is_err());
        assert_eq!(ftl.stats().host_bytes_written, 2 * page);
    }

    #[test]
    fn trim_is_accepted_and_ignored() {
        let mut ftl = test_ftl(&DeviceConfig::tiny(4, 8));
        write_page(&mut ftl, 0, 1).unwrap();
        let mut req = IoRequest::trim(0, 0, 8, 0);
        assert_eq!(ftl.submit(&mut req).unwrap(), 0);
        assert!(ftl.l2p().get(0).is_some());
    }

    #[test]
    fn random_overwrites_keep_tables_consistent() {
        let cfg = DeviceConfig {
            pages_per_block: 8,
            blocks_per_plane: 16,
            luns_per_channel: 2,
            channels: 2,
            gc_thres_pcent_high: 90,
            ..DeviceConfig::default()
        };
        let mut ftl = test_ftl(&cfg);
        let mut rng = SmallRng::seed_from_u64(7);
        let mut latest = vec![None; 200];

        for i in 0..3_000u64 {
            let lpn = rng.gen_range(0..latest.len());
            // unique content per write: no sharing
            let tag = 1_000 + i;
            write_page(&mut ftl, lpn, tag).unwrap();
            latest[lpn] = Some(tag as u8);
            ftl.background_gc().unwrap();
            if i % 250 == 0 {
                check_invariants(&ftl);
            }
        }
        check_invariants(&ftl);
        assert!(ftl.stats().gc_runs > 0);
        assert!(ftl.stats().waf() >= 1.0);
        assert_eq!(ftl.lines().parked_count() + ftl.lines().detached_count(), 0);

        for (lpn, tag) in latest.iter().enumerate() {
            if let Some(tag) = tag {
                assert_eq!(read_page(&mut ftl, lpn), vec![*tag; cfg.sector_size * 8]);
            }
        }
    }

    #[test]
    fn random_duplicates_keep_claims_consistent() {
        let cfg = DeviceConfig {
            pages_per_block: 8,
            blocks_per_plane: 32,
            luns_per_channel: 2,
            channels: 2,
            ..DeviceConfig::default()
        };
        let mut ftl = test_ftl(&cfg);
        let mut rng = SmallRng::seed_from_u64(11);

        for i in 0..400u64 {
            let lpn = rng.gen_range(0..100);
            let tag = if rng.gen_bool(0.5) { rng.gen_range(0..4) } else { 100 + i };
            write_page(&mut ftl, lpn, tag).unwrap();
            ftl.background_gc().unwrap();
            check_invariants(&ftl);
        }
        assert!(ftl.stats().dedup_hits > 0);
    }
}
