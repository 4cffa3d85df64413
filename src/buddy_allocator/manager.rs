//! Arena manager: owns the backing buffer and one buddy allocator per page.

use super::buddy_allocator::{BuddyAllocator, FreeBlocks};
use crate::error::ArenaError;
use crate::globals::{ARENA_PAGE_SIZE, MAX_ALLOC_SIZE, PAGE_SIZE};

/// Offset-based allocator over a fixed-capacity byte arena.
///
/// Offsets handed out are global: `page_index * PAGE_SIZE + local_offset`.
/// Pages are appended one at a time whenever every existing page fails a
/// request, and are never removed.
///
/// The manager is not synchronized. Callers sharing it across threads need
/// to wrap it in a lock of their own.
#[derive(Debug, Clone)]
pub struct MemoryManager {
    /// Backing buffer. Its length is fixed at construction.
    arena: Vec<u8>,

    /// Page allocators in creation order. Page `i` covers
    /// `arena[i * PAGE_SIZE..(i + 1) * PAGE_SIZE]`.
    pages: Vec<BuddyAllocator>,
}

fn page_memory(arena: &[u8], index: usize) -> &[u8] {
    &arena[index * PAGE_SIZE..(index + 1) * PAGE_SIZE]
}

fn page_memory_mut(arena: &mut [u8], index: usize) -> &mut [u8] {
    &mut arena[index * PAGE_SIZE..(index + 1) * PAGE_SIZE]
}

impl MemoryManager {
    /// Reserve an arena of `capacity_pages` 64 KiB units and set up its
    /// first page.
    pub fn new(capacity_pages: usize) -> Result<MemoryManager, ArenaError> {
        let capacity = capacity_pages
            .checked_mul(ARENA_PAGE_SIZE)
            .filter(|capacity| *capacity > 0)
            .ok_or(ArenaError::InvalidCapacity(capacity_pages))?;

        let mut arena = vec![0u8; capacity];
        let first = BuddyAllocator::new(page_memory_mut(&mut arena, 0), 0)?;
        crate::arena_debug!(
            memory,
            "[MM] Reserved arena of {} KB ({} pages max)",
            capacity / 1024,
            capacity / PAGE_SIZE
        );
        Ok(MemoryManager {
            arena,
            pages: vec![first],
        })
    }

    /// Size of the arena in bytes.
    pub fn capacity(&self) -> usize {
        self.arena.len()
    }

    /// Number of pages created so far.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Number of pages the arena can hold.
    pub fn max_pages(&self) -> usize {
        self.arena.len() / PAGE_SIZE
    }

    /// Free list of `level` on page `page`, as page-local block offsets.
    /// `None` if the page does not exist yet.
    pub fn free_blocks(&self, page: usize, level: u8) -> Option<FreeBlocks<'_>> {
        self.pages
            .get(page)
            .map(|allocator| allocator.free_blocks(page_memory(&self.arena, page), level))
    }

    /// Whether page `page` has merged back into a single free block.
    pub fn is_page_empty(&self, page: usize) -> Option<bool> {
        self.pages.get(page).map(BuddyAllocator::is_empty)
    }

    /// Split a global offset into the page index and the local offset.
    fn locate(&self, offset: usize) -> Result<(usize, usize), ArenaError> {
        let index = offset / PAGE_SIZE;
        if index < self.pages.len() {
            Ok((index, offset % PAGE_SIZE))
        } else {
            Err(ArenaError::InvalidOffset(offset))
        }
    }

    /// Bind a new page to the next unused stride of the arena.
    fn extend(&mut self) -> Result<usize, ArenaError> {
        let index = self.pages.len();
        if index >= self.max_pages() {
            crate::arena_warn!(
                memory,
                "[MM] Arena exhausted after {} pages",
                self.pages.len()
            );
            return Err(ArenaError::ArenaExhausted {
                capacity: self.capacity(),
            });
        }

        let base = index * PAGE_SIZE;
        let page = BuddyAllocator::new(page_memory_mut(&mut self.arena, index), base)?;
        self.pages.push(page);
        crate::arena_debug!(memory, "[MM] Added page #{} at {}", index, base);
        Ok(index)
    }
}

// Allocation support.
impl MemoryManager {
    /// Allocate `size` payload bytes and return the global offset of the payload.
    pub fn allocate(&mut self, size: usize) -> Result<usize, ArenaError> {
        if size > MAX_ALLOC_SIZE {
            return Err(ArenaError::OversizedRequest {
                size,
                max: MAX_ALLOC_SIZE,
            });
        }

        // Loop through the pages until one of them can serve the request.
        let arena = &mut self.arena;
        let allocation = self
            .pages
            .iter_mut()
            .enumerate()
            .find_map(|(i, page)| {
                page.alloc(page_memory_mut(arena, i), size)
                    .map(|offset| i * PAGE_SIZE + offset)
            });
        if let Some(offset) = allocation {
            return Ok(offset);
        }

        let index = self.extend()?;
        self.pages[index]
            .alloc(page_memory_mut(&mut self.arena, index), size)
            .map(|offset| index * PAGE_SIZE + offset)
            .ok_or(ArenaError::ArenaExhausted {
                capacity: self.arena.len(),
            })
    }

    /// Payload bytes available behind a live allocation.
    pub fn usable_size(&self, offset: usize) -> Result<usize, ArenaError> {
        let (index, local) = self.locate(offset)?;
        self.pages[index].usable_size(page_memory(&self.arena, index), local)
    }

    /// Payload of a live allocation.
    pub fn bytes(&self, offset: usize) -> Result<&[u8], ArenaError> {
        let size = self.usable_size(offset)?;
        Ok(&self.arena[offset..offset + size])
    }

    /// Mutable payload of a live allocation.
    pub fn bytes_mut(&mut self, offset: usize) -> Result<&mut [u8], ArenaError> {
        let size = self.usable_size(offset)?;
        Ok(&mut self.arena[offset..offset + size])
    }

    /// Resize the allocation at `offset` to hold `new_size` bytes.
    ///
    /// Shrinking, or growing within the current block, keeps the offset.
    /// Growing first tries to absorb free buddies in place and otherwise
    /// moves the payload to a new block. On error the original allocation
    /// is left as it was.
    pub fn realloc(&mut self, offset: usize, new_size: usize) -> Result<usize, ArenaError> {
        if new_size > MAX_ALLOC_SIZE {
            return Err(ArenaError::OversizedRequest {
                size: new_size,
                max: MAX_ALLOC_SIZE,
            });
        }

        let (index, local) = self.locate(offset)?;
        let old_size = self.usable_size(offset)?;
        if new_size <= old_size {
            return Ok(offset);
        }

        let grown = self.pages[index].grow_in_place(
            page_memory_mut(&mut self.arena, index),
            local,
            new_size,
        )?;
        if grown {
            return Ok(offset);
        }

        let new_offset = self.allocate(new_size)?;
        self.arena
            .copy_within(offset..offset + old_size, new_offset);
        self.free(offset)?;
        crate::arena_trace!(
            memory,
            "[MM] Moved {} bytes from {} to {}",
            old_size,
            offset,
            new_offset
        );
        Ok(new_offset)
    }
}

// Deallocation support.
impl MemoryManager {
    /// Free the allocation at the global `offset`.
    ///
    /// Offsets are checked against the block header only. A stale offset
    /// whose block has since been handed out again at the same position
    /// passes that check and frees the current owner's block.
    pub fn free(&mut self, offset: usize) -> Result<(), ArenaError> {
        let (index, local) = self.locate(offset)?;
        let result =
            self.pages[index].dealloc(page_memory_mut(&mut self.arena, index), local);
        if let Err(error) = &result {
            crate::arena_warn!(memory, "[MM] Could not free offset {}: {}", offset, error);
        }
        result
    }
}

impl core::fmt::Display for MemoryManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(
            f,
            "MemoryManager: Pages: {} of {} / Capacity: {} KB",
            self.pages.len(),
            self.max_pages(),
            self.capacity() / 1024
        )?;

        for page in self.pages.iter() {
            writeln!(f, "{}", page)?;
        }

        Ok(())
    }
}
