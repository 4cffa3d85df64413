//! Buddy Memory Allocator.
//! module `buddy_allocator` is the per-page allocator and the `manager`
//! routes requests across all pages of the arena.

pub mod buddy_allocator;
pub(crate) mod header;
pub mod manager;
