use thiserror::Error;

use super::memory::{Address, Placement};

/// Failure of an allocator request. The block list is left
/// untouched whenever one of these is returned.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    #[error("invalid size {0}: sizes must be positive")]
    InvalidSize(u64),
    #[error("no free block can hold {size} units at {placement}")]
    NoSpace { size: u64, placement: Placement },
    #[error("no allocated block starts at address {0}")]
    InvalidAddress(Address),
}

/// A broken partition of the address space, as reported by
/// `Allocator::verify`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("the block list is empty")]
    Empty,
    #[error("the first block starts at {0} instead of 0")]
    MisplacedStart(Address),
    #[error("block at index {0} has size 0")]
    ZeroSized(usize),
    #[error("block at index {index} starts at {found}, expected {expected}")]
    Gap {
        index: usize,
        expected: Address,
        found: Address,
    },
    #[error("free block at index {0} is followed by another free block")]
    Uncoalesced(usize),
    #[error("blocks cover {covered} units of a {total} unit space")]
    SizeMismatch { covered: u64, total: u64 },
}
