//! Offset-based buddy allocator over a fixed-capacity byte arena.
//!
//! The arena is cut into `PAGE_SIZE` pages, each managed by its own binary
//! buddy allocator. [`MemoryManager`] hands out global offsets into the
//! arena and routes frees back to the page that owns them.
//!
//! ```
//! use buddy_arena::MemoryManager;
//!
//! let mut manager = MemoryManager::new(1).unwrap();
//! let offset = manager.allocate(56).unwrap();
//! manager.bytes_mut(offset).unwrap()[..5].copy_from_slice(b"hello");
//! assert_eq!(&manager.bytes(offset).unwrap()[..5], b"hello");
//! manager.free(offset).unwrap();
//! ```

#[macro_use]
pub mod log;

pub mod buddy_allocator;
pub mod error;
pub mod globals;
pub mod logging;

pub use buddy_allocator::buddy_allocator::{BuddyAllocator, FreeBlocks};
pub use buddy_allocator::manager::MemoryManager;
pub use error::ArenaError;

/// Initialize logs to stdout for applications embedding the arena.
pub fn initialize_logging(level: ::log::LevelFilter) -> Result<(), ::log::SetLoggerError> {
    log::init_trace_log(logging::TraceLogger::stdout(), level)
}
