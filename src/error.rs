//! Errors reported by the arena manager.

/// Failure of an arena operation.
///
/// Running out of room on a single page is not an error; the manager
/// handles it by moving on to another page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    #[error("cannot reserve an arena of {0} 64 KiB pages")]
    InvalidCapacity(usize),
    #[error("requested {size} bytes but a single allocation is limited to {max} bytes")]
    OversizedRequest { size: usize, max: usize },
    #[error("arena of {capacity} bytes has no room for another page")]
    ArenaExhausted { capacity: usize },
    #[error("page memory is {0} bytes instead of one page")]
    PageSize(usize),
    #[error("offset {0} does not start an allocation")]
    InvalidOffset(usize),
    #[error("offset {0} was already freed")]
    DoubleFree(usize),
}
