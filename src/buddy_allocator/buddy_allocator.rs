//! Binary buddy allocator for a single page.
//!
//! A page starts out as one free block of `MAX_LEVEL`. Allocations split
//! blocks in halves until the requested level is reached and frees merge a
//! block with its buddy for as long as the buddy is free as well.
//!
//! The allocator keeps only the free-list heads. Every other piece of state
//! lives in the block headers inside the page, so the page memory is passed
//! into each call.
//!
//! # Notes
//! https://en.wikipedia.org/wiki/Buddy_memory_allocation

use super::header::BlockHeader;
use crate::error::ArenaError;
use crate::globals::{HEADER_SIZE, MAX_LEVEL, MAX_SIZE, MIN_LEVEL, MIN_SIZE, NUM_LEVELS, PAGE_SIZE};
use core::cmp;

/// A buddy allocator over one `PAGE_SIZE` slice of the arena.
#[derive(Debug, Clone)]
pub struct BuddyAllocator {
    /// Offset at which this page starts in the arena. Only used
    /// to report global offsets.
    base: usize,

    /// Head of the free list for each level, `MIN_LEVEL` first.
    /// The rest of each list is threaded through block headers.
    free_lists: [Option<usize>; NUM_LEVELS],
}

impl core::fmt::Display for BuddyAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "  Page @ {} / Free list heads: ", self.base)?;
        for level in MIN_LEVEL..=MAX_LEVEL {
            match self.free_lists[list_index(level)] {
                Some(head) => write!(f, "{} in L{} / ", head, level)?,
                None => write!(f, "- in L{} / ", level)?,
            }
        }
        Ok(())
    }
}

fn list_index(level: u8) -> usize {
    (level - MIN_LEVEL) as usize
}

fn check_page(memory: &[u8]) -> Result<(), ArenaError> {
    if memory.len() == PAGE_SIZE {
        Ok(())
    } else {
        Err(ArenaError::PageSize(memory.len()))
    }
}

fn next_free(memory: &[u8], block: usize) -> Option<usize> {
    match BlockHeader::read(memory, block) {
        Some(BlockHeader::Free { next }) => next,
        _ => None,
    }
}

impl BuddyAllocator {
    /// Create the allocator for the page `memory` that starts at `base` in
    /// the arena. The whole page becomes a single free block.
    pub fn new(memory: &mut [u8], base: usize) -> Result<BuddyAllocator, ArenaError> {
        check_page(memory)?;
        BlockHeader::Free { next: None }.write(memory, 0);

        let mut free_lists = [None; NUM_LEVELS];
        free_lists[list_index(MAX_LEVEL)] = Some(0);
        Ok(BuddyAllocator { base, free_lists })
    }

    /// Offset of this page in the arena.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Smallest level whose blocks hold `block_size` bytes.
    /// Sizes beyond a whole page have no level.
    pub fn level_for(block_size: usize) -> Option<u8> {
        if block_size > MAX_SIZE {
            return None;
        }
        let size = cmp::max(block_size, MIN_SIZE);
        Some(size.next_power_of_two().trailing_zeros() as u8)
    }

    /// Level used for a request of `size` payload bytes.
    pub fn level_for_payload(size: usize) -> Option<u8> {
        size.checked_add(HEADER_SIZE).and_then(Self::level_for)
    }

    /// The block that together with `block` makes up the parent block.
    pub fn get_buddy(block: usize, level: u8) -> usize {
        block ^ (1 << level)
    }

    /// Iterate over the free list of `level`, head first.
    pub fn free_blocks<'a>(&self, memory: &'a [u8], level: u8) -> FreeBlocks<'a> {
        let next = if (MIN_LEVEL..=MAX_LEVEL).contains(&level) {
            self.free_lists[list_index(level)]
        } else {
            None
        };
        FreeBlocks { memory, next }
    }

    /// Whether the page has merged back into a single free block.
    pub fn is_empty(&self) -> bool {
        self.free_lists
            .iter()
            .enumerate()
            .all(|(i, head)| match head {
                Some(0) => i == list_index(MAX_LEVEL),
                Some(_) => false,
                None => i != list_index(MAX_LEVEL),
            })
    }

    fn push(&mut self, memory: &mut [u8], level: u8, block: usize) {
        let head = &mut self.free_lists[list_index(level)];
        BlockHeader::Free { next: *head }.write(memory, block);
        *head = Some(block);
    }

    fn pop(&mut self, memory: &[u8], level: u8) -> Option<usize> {
        let head = &mut self.free_lists[list_index(level)];
        let block = head.take()?;
        *head = next_free(memory, block);
        Some(block)
    }

    /// Remove `target` from the free list of `level`. Returns false
    /// if it is not on that list.
    fn unlink(&mut self, memory: &mut [u8], level: u8, target: usize) -> bool {
        let head = &mut self.free_lists[list_index(level)];
        if *head == Some(target) {
            *head = next_free(memory, target);
            return true;
        }

        let mut current = *head;
        while let Some(block) = current {
            let next = next_free(memory, block);
            if next == Some(target) {
                let after = next_free(memory, target);
                BlockHeader::Free { next: after }.write(memory, block);
                return true;
            }
            current = next;
        }
        false
    }

    /// Validate a page-local payload offset and return its block and level.
    fn live_block(&self, memory: &[u8], offset: usize) -> Result<(usize, u8), ArenaError> {
        check_page(memory)?;
        let global = self.base + offset;
        let block = offset
            .checked_sub(HEADER_SIZE)
            .filter(|block| block % MIN_SIZE == 0 && *block < PAGE_SIZE)
            .ok_or(ArenaError::InvalidOffset(global))?;

        match BlockHeader::read(memory, block) {
            Some(BlockHeader::Allocated { level }) if block % (1 << level) == 0 => {
                Ok((block, level))
            }
            Some(BlockHeader::Free { .. }) => Err(ArenaError::DoubleFree(global)),
            _ => Err(ArenaError::InvalidOffset(global)),
        }
    }

    /// Payload bytes available behind the page-local `offset`.
    pub fn usable_size(&self, memory: &[u8], offset: usize) -> Result<usize, ArenaError> {
        self.live_block(memory, offset)
            .map(|(_, level)| (1 << level) - HEADER_SIZE)
    }
}

// Allocation support.
impl BuddyAllocator {
    /// Allocate `size` payload bytes and return the page-local offset of the
    /// payload. `None` means this page cannot serve the request.
    pub fn alloc(&mut self, memory: &mut [u8], size: usize) -> Option<usize> {
        check_page(memory).ok()?;
        let req_level = Self::level_for_payload(size)?;
        let mut level =
            (req_level..=MAX_LEVEL).find(|level| self.free_lists[list_index(*level)].is_some())?;
        let block = self.pop(memory, level)?;

        // Keep the lower half and hand the upper half to the level below.
        while level > req_level {
            level -= 1;
            self.push(memory, level, Self::get_buddy(block, level));
        }

        BlockHeader::Allocated { level }.write(memory, block);
        crate::arena_trace!(
            memory,
            "[BA] Page @ {} allocated L{} block at {} for {} bytes",
            self.base,
            level,
            block,
            size
        );
        Some(block + HEADER_SIZE)
    }

    /// Try to extend the allocation at `offset` to hold `new_size` bytes
    /// without moving it. This only works when the block is the lower
    /// buddy at every level up to the target and all those upper buddies
    /// are free. The page is left untouched when it returns false.
    pub fn grow_in_place(
        &mut self,
        memory: &mut [u8],
        offset: usize,
        new_size: usize,
    ) -> Result<bool, ArenaError> {
        let (block, level) = self.live_block(memory, offset)?;
        let target = match Self::level_for_payload(new_size) {
            Some(target) => target,
            None => return Ok(false),
        };
        if target <= level {
            return Ok(true);
        }

        let view: &[u8] = memory;
        let absorbable = (level..target).all(|l| {
            let buddy = Self::get_buddy(block, l);
            buddy > block && self.free_blocks(view, l).any(|free| free == buddy)
        });
        if !absorbable {
            return Ok(false);
        }

        for l in level..target {
            self.unlink(memory, l, Self::get_buddy(block, l));
        }
        BlockHeader::Allocated { level: target }.write(memory, block);
        crate::arena_trace!(
            memory,
            "[BA] Page @ {} grew block at {} from L{} to L{}",
            self.base,
            block,
            level,
            target
        );
        Ok(true)
    }
}

// Deallocation support.
impl BuddyAllocator {
    /// Free the allocation at the page-local `offset`, merging it with its
    /// buddies as far as possible.
    pub fn dealloc(&mut self, memory: &mut [u8], offset: usize) -> Result<(), ArenaError> {
        let (mut block, mut level) = self.live_block(memory, offset)?;
        // Blocks absorbed by a merge keep this header, so freeing them
        // again is still recognised.
        BlockHeader::Free { next: None }.write(memory, block);

        while level < MAX_LEVEL {
            let buddy = Self::get_buddy(block, level);
            if !self.unlink(memory, level, buddy) {
                break;
            }
            block = cmp::min(block, buddy);
            level += 1;
        }

        self.push(memory, level, block);
        crate::arena_trace!(
            memory,
            "[BA] Page @ {} freed offset {}, now a free L{} block at {}",
            self.base,
            offset,
            level,
            block
        );
        Ok(())
    }
}

/// Iterator over the blocks of one free list.
pub struct FreeBlocks<'a> {
    memory: &'a [u8],
    next: Option<usize>,
}

impl Iterator for FreeBlocks<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let block = self.next?;
        self.next = next_free(self.memory, block);
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> (Vec<u8>, BuddyAllocator) {
        let mut memory = vec![0u8; PAGE_SIZE];
        let allocator = BuddyAllocator::new(&mut memory, 0).unwrap();
        (memory, allocator)
    }

    #[test]
    fn level_boundaries() {
        assert_eq!(BuddyAllocator::level_for(1), Some(MIN_LEVEL));
        assert_eq!(BuddyAllocator::level_for(31), Some(5));
        assert_eq!(BuddyAllocator::level_for(32), Some(5));
        assert_eq!(BuddyAllocator::level_for(33), Some(6));
        assert_eq!(BuddyAllocator::level_for(64), Some(6));
        assert_eq!(BuddyAllocator::level_for(PAGE_SIZE), Some(MAX_LEVEL));
        assert_eq!(BuddyAllocator::level_for(PAGE_SIZE + 1), None);
    }

    #[test]
    fn level_is_monotonic() {
        let mut previous = MIN_LEVEL;
        for size in 0..=PAGE_SIZE {
            let level = BuddyAllocator::level_for(size).unwrap();
            assert!(level >= previous, "level dropped at {}", size);
            assert!(1usize << level >= size.max(MIN_SIZE));
            previous = level;
        }
    }

    #[test]
    fn payload_levels_count_the_header() {
        assert_eq!(BuddyAllocator::level_for_payload(24), Some(5));
        assert_eq!(BuddyAllocator::level_for_payload(25), Some(6));
        assert_eq!(BuddyAllocator::level_for_payload(56), Some(6));
        assert_eq!(BuddyAllocator::level_for_payload(4088), Some(MAX_LEVEL));
        assert_eq!(BuddyAllocator::level_for_payload(4089), None);
        assert_eq!(BuddyAllocator::level_for_payload(usize::MAX), None);
    }

    #[test]
    fn buddy_is_involutive() {
        assert_eq!(BuddyAllocator::get_buddy(0, 10), 1024);
        for level in MIN_LEVEL..MAX_LEVEL {
            for block in (0..PAGE_SIZE).step_by(1 << level) {
                let buddy = BuddyAllocator::get_buddy(block, level);
                assert_eq!(BuddyAllocator::get_buddy(buddy, level), block);
                assert!(buddy < PAGE_SIZE);
            }
        }
    }

    #[test]
    fn new_page_is_one_block() {
        let (memory, allocator) = page();
        assert!(allocator.is_empty());
        assert_eq!(
            allocator.free_blocks(&memory, MAX_LEVEL).collect::<Vec<_>>(),
            vec![0]
        );
        for level in MIN_LEVEL..MAX_LEVEL {
            assert_eq!(allocator.free_blocks(&memory, level).count(), 0);
        }
    }

    #[test]
    fn split_leaves_one_buddy_per_level() {
        let (mut memory, mut allocator) = page();
        assert_eq!(allocator.alloc(&mut memory, 1), Some(HEADER_SIZE));
        for level in MIN_LEVEL..MAX_LEVEL {
            assert_eq!(
                allocator.free_blocks(&memory, level).collect::<Vec<_>>(),
                vec![1 << level]
            );
        }
        assert_eq!(allocator.free_blocks(&memory, MAX_LEVEL).count(), 0);
    }

    #[test]
    fn whole_page_allocation() {
        let (mut memory, mut allocator) = page();
        assert_eq!(allocator.alloc(&mut memory, 4088), Some(HEADER_SIZE));
        assert_eq!(allocator.alloc(&mut memory, 0), None);
        allocator.dealloc(&mut memory, HEADER_SIZE).unwrap();
        assert!(allocator.is_empty());
    }

    #[test]
    fn unlink_from_the_middle_of_a_list() {
        let (mut memory, mut allocator) = page();
        let offsets: Vec<_> = (0..4)
            .map(|_| allocator.alloc(&mut memory, 24).unwrap())
            .collect();
        // 0 and 64 go to the L5 list, then 32 has to be found behind 64.
        allocator.dealloc(&mut memory, offsets[0]).unwrap();
        allocator.dealloc(&mut memory, offsets[2]).unwrap();
        assert_eq!(
            allocator.free_blocks(&memory, MIN_LEVEL).collect::<Vec<_>>(),
            vec![64, 0]
        );
        allocator.dealloc(&mut memory, offsets[1]).unwrap();
        assert_eq!(
            allocator.free_blocks(&memory, MIN_LEVEL).collect::<Vec<_>>(),
            vec![64]
        );
        assert_eq!(
            allocator.free_blocks(&memory, 6).collect::<Vec<_>>(),
            vec![0]
        );
        allocator.dealloc(&mut memory, offsets[3]).unwrap();
        assert!(allocator.is_empty());
    }

    #[test]
    fn grow_absorbs_free_upper_buddies() {
        let (mut memory, mut allocator) = page();
        let offset = allocator.alloc(&mut memory, 24).unwrap();
        assert_eq!(allocator.grow_in_place(&mut memory, offset, 200), Ok(true));
        assert_eq!(allocator.usable_size(&memory, offset), Ok(256 - HEADER_SIZE));
        assert_eq!(allocator.free_blocks(&memory, MIN_LEVEL).count(), 0);
        assert_eq!(allocator.free_blocks(&memory, 7).count(), 0);
        assert_eq!(
            allocator.free_blocks(&memory, 8).collect::<Vec<_>>(),
            vec![256]
        );
        allocator.dealloc(&mut memory, offset).unwrap();
        assert!(allocator.is_empty());
    }

    #[test]
    fn grow_refuses_upper_blocks() {
        let (mut memory, mut allocator) = page();
        let first = allocator.alloc(&mut memory, 24).unwrap();
        let second = allocator.alloc(&mut memory, 24).unwrap();
        allocator.dealloc(&mut memory, first).unwrap();
        assert_eq!(allocator.grow_in_place(&mut memory, second, 56), Ok(false));
        assert_eq!(allocator.usable_size(&memory, second), Ok(24));
    }

    #[test]
    fn short_page_memory_is_refused() {
        let mut short = vec![0u8; 16];
        assert_eq!(
            BuddyAllocator::new(&mut short, 0).unwrap_err(),
            ArenaError::PageSize(16)
        );

        let (mut memory, mut allocator) = page();
        let offset = allocator.alloc(&mut memory, 24).unwrap();
        assert_eq!(allocator.alloc(&mut short, 24), None);
        assert_eq!(
            allocator.dealloc(&mut short, offset),
            Err(ArenaError::PageSize(16))
        );
        assert_eq!(
            allocator.grow_in_place(&mut short, offset, 100),
            Err(ArenaError::PageSize(16))
        );
        assert_eq!(
            allocator.usable_size(&short, offset),
            Err(ArenaError::PageSize(16))
        );
        allocator.dealloc(&mut memory, offset).unwrap();
        assert!(allocator.is_empty());
    }

    #[test]
    fn display_lists_heads() {
        let (_, allocator) = page();
        let text = allocator.to_string();
        assert!(text.contains("0 in L12"));
        assert!(text.contains("- in L5"));
    }
}
