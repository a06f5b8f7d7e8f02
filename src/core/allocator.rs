mod error;
mod memory;

pub use error::{AllocError, LayoutError};
pub use memory::{Address, Block, BlockState, Placement};

use log::{debug, trace};

/// Memory allocator that manages a single contiguous address
/// space and hands out ranges from it, either first-fit or at
/// a requested position.
///
/// The space is kept as a list of blocks sorted by start
/// address. The blocks always partition `0..total_size`
/// exactly, and no two free blocks are ever adjacent.
#[derive(Clone, Debug)]
pub struct Allocator {
    /// Size of the address space, fixed at construction.
    total_size: u64,
    /// Blocks the address space is comprised of, in address
    /// order.
    blocks: Vec<Block>,
}

impl Allocator {
    pub fn new(total_size: u64) -> Result<Self, AllocError> {
        if total_size == 0 {
            return Err(AllocError::InvalidSize(total_size));
        }

        // At first nothing is allocated, so the space holds a
        // single free block that spans all of it.
        debug!("Created a {total_size} unit address space.");
        Ok(Self {
            total_size,
            blocks: vec![Block::free(0, total_size)],
        })
    }

    /// Allocates `size` units, at `position` if one is given and
    /// with first-fit otherwise. Returns the start address of the
    /// allocation.
    pub fn allocate(
        &mut self,
        size: u64,
        position: Option<Address>,
    ) -> Result<Address, AllocError> {
        match Placement::from(position) {
            Placement::FirstFit => self.first_fit(size),
            Placement::At(position) => self.allocate_at(size, position),
        }
    }

    /// Allocates `size` units from the lowest free block that is
    /// large enough.
    pub fn first_fit(&mut self, size: u64) -> Result<Address, AllocError> {
        if size == 0 {
            return Err(AllocError::InvalidSize(size));
        }

        trace!("First-fit scan of {} blocks for {size} units.", self.blocks.len());
        let index = self.blocks
            .iter()
            .position(|block| block.is_free() && block.size >= size)
            .ok_or(AllocError::NoSpace {
                size,
                placement: Placement::FirstFit,
            })?;

        let block = &mut self.blocks[index];
        let start = block.start;
        let remainder = block.size - size;

        // The allocation keeps the start of the free block. If
        // the block is larger than requested, the rest of it is
        // split off into a new free block right after.
        block.size = size;
        block.state = BlockState::Allocated;
        if remainder > 0 {
            debug!("Splitting {remainder} free units off at {}.", start + size);
            self.blocks.insert(index + 1, Block::free(start + size, remainder));
        }

        debug!("Allocated {size} units at {start}.");
        debug_assert_eq!(self.verify(), Ok(()));
        Ok(start)
    }

    /// Allocates `size` units starting exactly at `position`. The
    /// free block containing `position` must extend at least
    /// `size` units past it.
    pub fn allocate_at(
        &mut self,
        size: u64,
        position: Address,
    ) -> Result<Address, AllocError> {
        if size == 0 {
            return Err(AllocError::InvalidSize(size));
        }

        // Only one block can contain the position, so this either
        // finds it free and large enough from the position onward,
        // or nothing at all.
        let index = self.blocks
            .iter()
            .position(|block| {
                block.is_free()
                    && block.contains(position)
                    && block.end() - position >= size
            })
            .ok_or(AllocError::NoSpace {
                size,
                placement: Placement::At(position),
            })?;

        let block = self.blocks[index];
        let leading = position - block.start;
        let trailing = block.end() - position - size;

        // Replace the free block by up to three pieces: the free
        // space before the position, the allocation itself, and
        // the free space after it. Empty pieces are dropped so no
        // block ends up with a zero size.
        let pieces = (leading > 0)
            .then(|| Block::free(block.start, leading))
            .into_iter()
            .chain(Some(Block::allocated(position, size)))
            .chain((trailing > 0).then(|| Block::free(position + size, trailing)));
        self.blocks.splice(index..=index, pieces);

        debug!("Allocated {size} units at {position} ({leading} free before, {trailing} after).");
        debug_assert_eq!(self.verify(), Ok(()));
        Ok(position)
    }

    /// Frees the allocated block starting at `address` and merges
    /// it with its free neighbours.
    pub fn deallocate(&mut self, address: Address) -> Result<(), AllocError> {
        // Only an exact match on the start of an allocated block
        // counts: addresses inside a block, outside the space or
        // on a free block are all rejected.
        let block = self.blocks
            .iter_mut()
            .find(|block| block.start == address && block.state == BlockState::Allocated)
            .ok_or(AllocError::InvalidAddress(address))?;

        block.state = BlockState::Free;
        debug!("Released {} units at {address}.", block.size);

        self.merge_free_blocks();
        debug_assert_eq!(self.verify(), Ok(()));
        Ok(())
    }

    fn merge_free_blocks(&mut self) {
        let count = self.blocks.len();

        // `dedup_by` hands over each block along with the last one
        // that was kept before it. When both are free the block is
        // absorbed into its predecessor, which keeps growing, so a
        // whole run of free blocks collapses into one.
        self.blocks.dedup_by(|next, prev| {
            let mergeable = prev.is_free() && next.is_free();
            if mergeable {
                prev.size += next.size;
            }
            mergeable
        });

        if self.blocks.len() < count {
            debug!("Merged {} free blocks.", count - self.blocks.len());
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Copy of the current block list.
    pub fn snapshot(&self) -> Vec<Block> {
        self.blocks.clone()
    }

    /// The block list as `(start, size, state label)` triples.
    pub fn display(&self) -> Vec<(Address, u64, &'static str)> {
        self.blocks
            .iter()
            .map(|block| (block.start, block.size, block.state.label()))
            .collect()
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.blocks
            .iter()
            .filter(|block| block.state == BlockState::Allocated)
            .map(|block| block.size)
            .sum()
    }

    pub fn free_bytes(&self) -> u64 {
        self.total_size - self.allocated_bytes()
    }

    /// Size of the largest free block, or 0 when everything is
    /// allocated. Falls below `free_bytes` as the space fragments.
    pub fn largest_free_block(&self) -> u64 {
        self.blocks
            .iter()
            .filter(|block| block.is_free())
            .map(|block| block.size)
            .max()
            .unwrap_or(0)
    }

    pub fn free_block_count(&self) -> usize {
        self.blocks.iter().filter(|block| block.is_free()).count()
    }

    /// Fraction of the space that is allocated, in `[0, 1]`.
    pub fn utilization(&self) -> f64 {
        self.allocated_bytes() as f64 / self.total_size as f64
    }

    /// Allocated share of the space in whole percent, rounded
    /// down.
    pub fn utilization_percent(&self) -> u8 {
        let percent = u128::from(self.allocated_bytes()) * 100 / u128::from(self.total_size);
        percent as u8
    }

    /// Checks that the blocks partition the address space: they
    /// start at 0, follow each other without gaps or overlaps,
    /// are never empty, end at `total_size`, and no two free
    /// blocks are adjacent.
    pub fn verify(&self) -> Result<(), LayoutError> {
        let first = self.blocks.first().ok_or(LayoutError::Empty)?;
        if first.start != 0 {
            return Err(LayoutError::MisplacedStart(first.start));
        }

        let mut expected = 0;
        for (index, block) in self.blocks.iter().enumerate() {
            if block.size == 0 {
                return Err(LayoutError::ZeroSized(index));
            }
            if block.start != expected {
                return Err(LayoutError::Gap {
                    index,
                    expected,
                    found: block.start,
                });
            }
            expected = block.end();
        }

        if let Some(index) = self.blocks
            .windows(2)
            .position(|pair| pair[0].is_free() && pair[1].is_free())
        {
            return Err(LayoutError::Uncoalesced(index));
        }

        if expected != self.total_size {
            return Err(LayoutError::SizeMismatch {
                covered: expected,
                total: self.total_size,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::BlockState::{Allocated, Free};

    fn layout(allocator: &Allocator) -> Vec<(Address, u64, BlockState)> {
        allocator
            .blocks()
            .iter()
            .map(|block| (block.start, block.size, block.state))
            .collect()
    }

    #[test]
    fn new_space_is_one_free_block() {
        let allocator = Allocator::new(100).unwrap();

        assert_eq!(layout(&allocator), vec![(0, 100, Free)]);
        assert_eq!(allocator.display(), vec![(0, 100, "Free")]);
        assert_eq!(allocator.total_size(), 100);
    }

    #[test]
    fn new_rejects_empty_space() {
        assert_eq!(Allocator::new(0).unwrap_err(), AllocError::InvalidSize(0));
    }

    #[test]
    fn first_fit_splits_leading_block() {
        let mut allocator = Allocator::new(100).unwrap();

        assert_eq!(allocator.allocate(30, None), Ok(0));
        assert_eq!(layout(&allocator), vec![(0, 30, Allocated), (30, 70, Free)]);
    }

    #[test]
    fn exact_fit_fills_space() {
        let mut allocator = Allocator::new(100).unwrap();
        allocator.allocate(30, None).unwrap();

        assert_eq!(allocator.allocate(70, None), Ok(30));
        assert_eq!(layout(&allocator), vec![(0, 30, Allocated), (30, 70, Allocated)]);
        assert_eq!(
            allocator.allocate(1, None),
            Err(AllocError::NoSpace { size: 1, placement: Placement::FirstFit })
        );
        assert_eq!(allocator.utilization_percent(), 100);
    }

    #[test]
    fn deallocate_coalesces_back_to_single_block() {
        let mut allocator = Allocator::new(100).unwrap();
        allocator.allocate(30, None).unwrap();
        allocator.allocate(70, None).unwrap();

        assert_eq!(allocator.deallocate(0), Ok(()));
        assert_eq!(layout(&allocator), vec![(0, 30, Free), (30, 70, Allocated)]);

        assert_eq!(allocator.deallocate(30), Ok(()));
        assert_eq!(layout(&allocator), vec![(0, 100, Free)]);
    }

    #[test]
    fn deallocate_unknown_address_fails() {
        let mut allocator = Allocator::new(100).unwrap();

        assert_eq!(allocator.deallocate(50), Err(AllocError::InvalidAddress(50)));
        assert_eq!(layout(&allocator), vec![(0, 100, Free)]);
    }

    #[test]
    fn deallocate_requires_exact_allocated_start() {
        let mut allocator = Allocator::new(100).unwrap();
        allocator.allocate(40, None).unwrap();

        // Mid-block, free block, and out of range.
        assert_eq!(allocator.deallocate(10), Err(AllocError::InvalidAddress(10)));
        assert_eq!(allocator.deallocate(40), Err(AllocError::InvalidAddress(40)));
        assert_eq!(allocator.deallocate(500), Err(AllocError::InvalidAddress(500)));

        assert_eq!(allocator.deallocate(0), Ok(()));
        assert_eq!(allocator.deallocate(0), Err(AllocError::InvalidAddress(0)));
    }

    #[test]
    fn zero_size_is_rejected() {
        let mut allocator = Allocator::new(100).unwrap();

        assert_eq!(allocator.allocate(0, None), Err(AllocError::InvalidSize(0)));
        assert_eq!(allocator.allocate(0, Some(10)), Err(AllocError::InvalidSize(0)));
        assert_eq!(layout(&allocator), vec![(0, 100, Free)]);
    }

    #[test]
    fn fixed_position_splits_both_sides() {
        let mut allocator = Allocator::new(100).unwrap();

        assert_eq!(allocator.allocate(20, Some(40)), Ok(40));
        assert_eq!(
            layout(&allocator),
            vec![(0, 40, Free), (40, 20, Allocated), (60, 40, Free)]
        );
    }

    #[test]
    fn fixed_position_at_block_start() {
        let mut allocator = Allocator::new(100).unwrap();

        assert_eq!(allocator.allocate_at(25, 0), Ok(0));
        assert_eq!(layout(&allocator), vec![(0, 25, Allocated), (25, 75, Free)]);
    }

    #[test]
    fn fixed_position_reaching_block_end() {
        let mut allocator = Allocator::new(100).unwrap();

        assert_eq!(allocator.allocate_at(25, 75), Ok(75));
        assert_eq!(layout(&allocator), vec![(0, 75, Free), (75, 25, Allocated)]);
    }

    #[test]
    fn fixed_position_inside_later_free_block() {
        let mut allocator = Allocator::new(100).unwrap();
        allocator.allocate(30, None).unwrap();

        assert_eq!(allocator.allocate_at(70, 30), Ok(30));
        assert_eq!(layout(&allocator), vec![(0, 30, Allocated), (30, 70, Allocated)]);
    }

    #[test]
    fn fixed_position_checks_space_after_position() {
        let mut allocator = Allocator::new(100).unwrap();

        // The block is large enough overall, but only 10 units
        // remain from position 90.
        assert_eq!(
            allocator.allocate(20, Some(90)),
            Err(AllocError::NoSpace { size: 20, placement: Placement::At(90) })
        );
        assert_eq!(layout(&allocator), vec![(0, 100, Free)]);
    }

    #[test]
    fn fixed_position_rejects_allocated_or_outside_range() {
        let mut allocator = Allocator::new(100).unwrap();
        allocator.allocate(50, None).unwrap();

        assert!(matches!(allocator.allocate_at(5, 10), Err(AllocError::NoSpace { .. })));
        assert!(matches!(allocator.allocate_at(5, 100), Err(AllocError::NoSpace { .. })));
        assert_eq!(layout(&allocator), vec![(0, 50, Allocated), (50, 50, Free)]);
    }

    #[test]
    fn freeing_between_free_blocks_merges_all_three() {
        let mut allocator = Allocator::new(90).unwrap();
        let a = allocator.allocate(30, None).unwrap();
        let b = allocator.allocate(30, None).unwrap();
        let c = allocator.allocate(30, None).unwrap();

        allocator.deallocate(a).unwrap();
        allocator.deallocate(c).unwrap();
        assert_eq!(layout(&allocator), vec![(0, 30, Free), (30, 30, Allocated), (60, 30, Free)]);

        allocator.deallocate(b).unwrap();
        assert_eq!(layout(&allocator), vec![(0, 90, Free)]);
    }

    #[test]
    fn merge_never_absorbs_allocated_neighbours() {
        let mut allocator = Allocator::new(100).unwrap();
        allocator.allocate(10, None).unwrap();
        allocator.allocate(10, None).unwrap();
        allocator.allocate(10, None).unwrap();

        allocator.deallocate(10).unwrap();
        assert_eq!(
            layout(&allocator),
            vec![(0, 10, Allocated), (10, 10, Free), (20, 10, Allocated), (30, 70, Free)]
        );
    }

    #[test]
    fn first_fit_picks_lowest_hole() {
        let mut allocator = Allocator::new(100).unwrap();
        for _ in 0..5 {
            allocator.allocate(20, None).unwrap();
        }
        allocator.deallocate(20).unwrap();
        allocator.deallocate(60).unwrap();

        assert_eq!(allocator.first_fit(15), Ok(20));
        assert_eq!(allocator.first_fit(15), Ok(60));
        assert_eq!(allocator.first_fit(5), Ok(35));
    }

    #[test]
    fn fragmentation_is_observable() {
        let mut allocator = Allocator::new(100).unwrap();
        for _ in 0..4 {
            allocator.allocate(25, None).unwrap();
        }
        allocator.deallocate(0).unwrap();
        allocator.deallocate(50).unwrap();

        assert_eq!(allocator.free_bytes(), 50);
        assert_eq!(allocator.largest_free_block(), 25);
        assert_eq!(allocator.free_block_count(), 2);
        assert!(matches!(allocator.allocate(30, None), Err(AllocError::NoSpace { .. })));
    }

    #[test]
    fn utilization_tracks_allocated_share() {
        let mut allocator = Allocator::new(3).unwrap();
        assert_eq!(allocator.utilization(), 0.0);

        allocator.allocate(1, None).unwrap();
        assert_eq!(allocator.allocated_bytes(), 1);
        assert_eq!(allocator.utilization_percent(), 33);
        assert!((allocator.utilization() - 1.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn verify_reports_broken_layouts() {
        let mut allocator = Allocator::new(100).unwrap();

        allocator.blocks = vec![Block::free(0, 50), Block::free(50, 50)];
        assert_eq!(allocator.verify(), Err(LayoutError::Uncoalesced(0)));

        allocator.blocks = vec![Block::allocated(0, 50), Block::free(60, 40)];
        assert_eq!(
            allocator.verify(),
            Err(LayoutError::Gap { index: 1, expected: 50, found: 60 })
        );

        allocator.blocks = vec![Block::allocated(0, 50)];
        assert_eq!(
            allocator.verify(),
            Err(LayoutError::SizeMismatch { covered: 50, total: 100 })
        );

        allocator.blocks = vec![Block::free(0, 0), Block::allocated(0, 100)];
        assert_eq!(allocator.verify(), Err(LayoutError::ZeroSized(0)));

        allocator.blocks = vec![Block::free(5, 95)];
        assert_eq!(allocator.verify(), Err(LayoutError::MisplacedStart(5)));

        allocator.blocks = Vec::new();
        assert_eq!(allocator.verify(), Err(LayoutError::Empty));
    }

    #[test]
    fn instances_are_independent() {
        let mut first = Allocator::new(10).unwrap();
        let second = Allocator::new(10).unwrap();

        first.allocate(10, None).unwrap();
        assert_eq!(second.free_bytes(), 10);
    }
}
