//! Power-of-two size classes for the buddy policy.

#[cfg(feature = "log")]
use log::warn;

use crate::PAGE_SIZE;

/// Size classes from 32 bytes up to a whole page
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(usize)]
pub enum SizeClass {
    Bytes32 = 32,
    Bytes64 = 64,
    Bytes128 = 128,
    Bytes256 = 256,
    Bytes512 = 512,
    Bytes1024 = 1024,
    Bytes2048 = 2048,
    Bytes4096 = 4096,
    Bytes8192 = 8192,
}

impl SizeClass {
    pub const COUNT: usize = 9;
    pub const MIN: SizeClass = SizeClass::Bytes32;
    pub const MAX: SizeClass = SizeClass::Bytes8192;
    const MIN_SHIFT: u32 = 5;

    /// Smallest class holding `size` bytes, header overhead included.
    ///
    /// Returns `None` when `size` is larger than a page.
    pub fn from_size(size: usize) -> Option<Self> {
        if size > PAGE_SIZE {
            warn!("size class: {} bytes exceeds page size {}", size, PAGE_SIZE);
            return None;
        }

        let rounded = size.max(Self::MIN.size()).next_power_of_two();
        Self::from_index((rounded.trailing_zeros() - Self::MIN_SHIFT) as usize)
    }

    pub const fn size(&self) -> usize {
        *self as usize
    }

    /// Index into per-class tables, `log2(size) - 5`
    pub const fn to_index(&self) -> usize {
        (self.size().trailing_zeros() - Self::MIN_SHIFT) as usize
    }

    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(SizeClass::Bytes32),
            1 => Some(SizeClass::Bytes64),
            2 => Some(SizeClass::Bytes128),
            3 => Some(SizeClass::Bytes256),
            4 => Some(SizeClass::Bytes512),
            5 => Some(SizeClass::Bytes1024),
            6 => Some(SizeClass::Bytes2048),
            7 => Some(SizeClass::Bytes4096),
            8 => Some(SizeClass::Bytes8192),
            _ => None,
        }
    }

    /// Class of the two halves produced by splitting a block of this class
    pub const fn half(&self) -> Option<Self> {
        match self.to_index() {
            0 => None,
            i => Self::from_index(i - 1),
        }
    }

    /// Class of the block produced by merging two buddies of this class
    pub const fn double(&self) -> Option<Self> {
        Self::from_index(self.to_index() + 1)
    }

    /// Iterate over all classes from `self` up to the page class
    pub fn upward(self) -> impl Iterator<Item = SizeClass> {
        (self.to_index()..Self::COUNT).filter_map(Self::from_index)
    }

    /// Iterate over every class, smallest first
    pub fn all() -> impl Iterator<Item = SizeClass> {
        Self::MIN.upward()
    }
}
