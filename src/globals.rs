//! Layout constants shared by the page allocator and the manager.

/// Size of a page in bytes. Every page is managed by its own buddy allocator.
pub const PAGE_SIZE: usize = 4096;

/// Unit in which arena capacity is requested.
pub const ARENA_PAGE_SIZE: usize = 64 * 1024; // 64 KiB

/// Level of the smallest block (32 bytes).
pub const MIN_LEVEL: u8 = 5;
pub const MIN_SIZE: usize = 1 << MIN_LEVEL;

/// Level of the largest block, which spans a whole page.
pub const MAX_LEVEL: u8 = 12;
pub const MAX_SIZE: usize = 1 << MAX_LEVEL;

/// Number of free lists kept per page, one per level.
pub const NUM_LEVELS: usize = (MAX_LEVEL - MIN_LEVEL + 1) as usize;

/// Every block starts with a single header word.
pub const HEADER_SIZE: usize = core::mem::size_of::<u64>();

/// Largest payload a single allocation can request.
pub const MAX_ALLOC_SIZE: usize = MAX_SIZE - HEADER_SIZE;
