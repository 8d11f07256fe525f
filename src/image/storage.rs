//! Reference-counted sample storage shared by image views.

use crate::error::{Error, Result};

const ALIGNMENT: usize = std::mem::align_of::<u128>();

/// A zero-initialised, 16-byte aligned block of memory.
///
/// Views never own a block exclusively; they hold it through an `Arc` and
/// address into it with element offsets. The block itself carries no shape.
/// Writers go through [`DataBlock::as_ptr`]; the frameworks hand each thread
/// disjoint output lines and only ever read from inputs.
#[derive(Debug)]
pub struct DataBlock {
    words: Vec<u128>,
    bytes: usize,
}

impl DataBlock {
    pub fn new(bytes: usize) -> Result<Self> {
        let bytes = bytes.max(1);
        let count = bytes.div_ceil(ALIGNMENT);
        let mut words = Vec::new();
        words
            .try_reserve_exact(count)
            .map_err(|_| Error::Allocation { bytes })?;
        words.resize(count, 0);
        Ok(DataBlock { words, bytes })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.words.as_ptr() as *mut u8
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    /// One past the last byte.
    pub fn end_ptr(&self) -> *mut u8 {
        self.as_ptr().wrapping_add(self.len())
    }
}
