//! Simulator of a single contiguous memory space, managed by a
//! first-fit block-list allocator that can also place requests
//! at fixed positions.
//!
//! The allocator lives in [`core::allocator`]; [`shell`] is the
//! interactive front-end that drives it from text commands.

pub mod core;
pub mod shell;

pub use crate::core::allocator::{
    Address,
    AllocError,
    Allocator,
    Block,
    BlockState,
    LayoutError,
    Placement,
};
