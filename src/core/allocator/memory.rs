use std::fmt;

/// Address within the simulated memory space. Blocks are
/// identified by the address they start at.
pub type Address = u64;

/// Whether a block is handed out or available.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockState {
    /// The block can be used to satisfy an allocation.
    Free,
    /// The block belongs to a caller until it is deallocated.
    Allocated,
}

impl BlockState {
    /// Label used when the block list is displayed.
    pub fn label(self) -> &'static str {
        match self {
            BlockState::Free => "Free",
            BlockState::Allocated => "Allocated",
        }
    }
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Contiguous range of the address space, either free or
/// allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    /// First address covered by the block.
    pub start: Address,
    /// Number of addresses covered by the block. Never zero.
    pub size: u64,
    /// Current state of the block.
    pub state: BlockState,
}

impl Block {
    pub fn new(start: Address, size: u64, state: BlockState) -> Self {
        Self { start, size, state }
    }

    pub fn free(start: Address, size: u64) -> Self {
        Self::new(start, size, BlockState::Free)
    }

    pub fn allocated(start: Address, size: u64) -> Self {
        Self::new(start, size, BlockState::Allocated)
    }

    /// One past the last address of the block.
    pub fn end(&self) -> Address {
        self.start + self.size
    }

    pub fn is_free(&self) -> bool {
        self.state == BlockState::Free
    }

    pub fn contains(&self, address: Address) -> bool {
        self.start <= address && address < self.end()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Start: {}, Size: {}, {}", self.start, self.size, self.state)
    }
}

/// Where an allocation is requested to land.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// The lowest free block that is large enough.
    FirstFit,
    /// Exactly at the given address.
    At(Address),
}

impl From<Option<Address>> for Placement {
    fn from(position: Option<Address>) -> Self {
        match position {
            Some(address) => Placement::At(address),
            None => Placement::FirstFit,
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::FirstFit => f.write_str("first fit"),
            Placement::At(address) => write!(f, "position {address}"),
        }
    }
}
