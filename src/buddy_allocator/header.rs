//! Block header word.
//!
//! Every block starts with a single little-endian `u64`. The two top bits
//! tag the word; the remaining bits hold either the link to the next block
//! of a free list or the level of an allocated block.

use crate::globals::{HEADER_SIZE, MAX_LEVEL, MIN_LEVEL, PAGE_SIZE};

const TAG_SHIFT: u32 = 62;
const TAG_MASK: u64 = 0b11 << TAG_SHIFT;
const TAG_FREE: u64 = 0b01 << TAG_SHIFT;
const TAG_ALLOCATED: u64 = 0b10 << TAG_SHIFT;

/// Link value marking the last block of a free list.
const END_OF_LIST: u64 = 0xFFFF;

/// Decoded contents of a block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockHeader {
    /// The block sits on a free list. `next` is the page-local offset of
    /// the following block of the same level.
    Free { next: Option<usize> },

    /// The block is handed out. The level gives back its size on free.
    Allocated { level: u8 },
}

impl BlockHeader {
    pub fn encode(self) -> u64 {
        match self {
            BlockHeader::Free { next: Some(next) } => TAG_FREE | next as u64,
            BlockHeader::Free { next: None } => TAG_FREE | END_OF_LIST,
            BlockHeader::Allocated { level } => TAG_ALLOCATED | u64::from(level),
        }
    }

    /// Returns `None` for words that were never written as a header, such
    /// as zeroed memory or payload bytes.
    pub fn decode(word: u64) -> Option<BlockHeader> {
        let payload = word & !TAG_MASK;
        match word & TAG_MASK {
            TAG_FREE if payload == END_OF_LIST => Some(BlockHeader::Free { next: None }),
            TAG_FREE if payload < PAGE_SIZE as u64 => Some(BlockHeader::Free {
                next: Some(payload as usize),
            }),
            TAG_ALLOCATED if (u64::from(MIN_LEVEL)..=u64::from(MAX_LEVEL)).contains(&payload) => {
                Some(BlockHeader::Allocated {
                    level: payload as u8,
                })
            }
            _ => None,
        }
    }

    /// Read the header of the block at `block` in a page.
    pub fn read(memory: &[u8], block: usize) -> Option<BlockHeader> {
        let bytes = memory.get(block..block.checked_add(HEADER_SIZE)?)?;
        let mut word = [0u8; HEADER_SIZE];
        word.copy_from_slice(bytes);
        Self::decode(u64::from_le_bytes(word))
    }

    /// Write this header to the block at `block` in a page.
    pub fn write(self, memory: &mut [u8], block: usize) {
        memory[block..block + HEADER_SIZE].copy_from_slice(&self.encode().to_le_bytes());
    }
}
