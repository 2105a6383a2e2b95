use thiserror::Error;

use crate::addr::Ppa;
use crate::config::Lpn;

/// FTL specialized Result type.
pub type Result<T> = std::result::Result<T, FtlError>;

#[derive(Error, Debug)]
pub enum FtlError {
    /// Allocation needed a fresh line and the free list was empty.
    #[error("no free lines left, device is out of space")]
    NoFreeLine,
    /// Internal bookkeeping disagrees with itself.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
    #[error("logical page {lpn} is beyond device capacity of {total} pages")]
    OutOfRange { lpn: Lpn, total: usize },
    #[error("request covers zero sectors")]
    EmptyRequest,
    #[error("write spans {pages} pages but carries {hashes} content hashes")]
    MissingHash { pages: usize, hashes: usize },
    #[error("invalid device configuration: {0}")]
    Config(&'static str),
    #[error("physical address {0} is outside the device geometry")]
    BadAddress(Ppa),
    #[error("backing store access {offset}+{len} exceeds {size} bytes")]
    Backend { offset: usize, len: usize, size: usize },
}

impl FtlError {
    /// Fatal errors leave the device unable to make progress; everything
    /// else only rejects the request that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FtlError::NoFreeLine | FtlError::Invariant(_))
    }
}

/// Return `FtlError::Invariant` from the enclosing function unless `cond` holds.
macro_rules! invariant {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::FtlError::Invariant(format!($($arg)+)));
        }
    };
}

pub(crate) use invariant;
