//! Process-wide allocators for bounded integer ranges.

use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Returned when every number in a pool is in use.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("number pool exhausted: all numbers in range {min}..={max} are allocated")]
pub struct PoolExhausted {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug)]
struct Bitset {
    words: Vec<u64>,
    count: usize,
}

impl Bitset {
    fn get(&self, idx: usize) -> bool {
        self.words[idx / 64] & (1 << (idx % 64)) != 0
    }

    fn set(&mut self, idx: usize) {
        self.words[idx / 64] |= 1 << (idx % 64);
    }

    fn clear(&mut self, idx: usize) {
        self.words[idx / 64] &= !(1 << (idx % 64));
    }

    fn first_clear(&self, len: usize) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, word)| **word != u64::MAX)
            .map(|(i, word)| i * 64 + word.trailing_ones() as usize)
            .filter(|idx| *idx < len)
    }
}

/// Allocator for numbers in `min..=max`.
///
/// All operations take a single mutex, so `auto_allocate` is atomic with respect
/// to concurrent allocations and never blocks waiting for a free number.
#[derive(Debug)]
pub struct DynamicNumberPool {
    min: u32,
    max: u32,
    bits: Mutex<Bitset>,
}

impl DynamicNumberPool {
    pub fn new(min: u32, max: u32) -> crate::Result<Self> {
        if min > max {
            return Err(crate::Error::InvalidPoolRange { min, max });
        }
        let len = (max - min) as usize + 1;
        Ok(Self {
            min,
            max,
            bits: Mutex::new(Bitset {
                words: vec![0; len.div_ceil(64)],
                count: 0,
            }),
        })
    }

    pub fn range(&self) -> (u32, u32) {
        (self.min, self.max)
    }

    fn len(&self) -> usize {
        (self.max - self.min) as usize + 1
    }

    fn index(&self, number: u32) -> crate::Result<usize> {
        if number < self.min || number > self.max {
            return Err(crate::Error::OutOfPoolRange {
                number,
                min: self.min,
                max: self.max,
            });
        }
        Ok((number - self.min) as usize)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Bitset> {
        self.bits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate the lowest free number.
    pub fn auto_allocate(&self) -> Result<u32, PoolExhausted> {
        let mut bits = self.lock();
        let idx = bits.first_clear(self.len()).ok_or(PoolExhausted {
            min: self.min,
            max: self.max,
        })?;
        bits.set(idx);
        bits.count += 1;
        Ok(self.min + idx as u32)
    }

    /// Mark a specific number as allocated.
    pub fn allocate(&self, number: u32) -> crate::Result<()> {
        let idx = self.index(number)?;
        let mut bits = self.lock();
        if bits.get(idx) {
            return Err(crate::Error::AlreadyAllocated(number));
        }
        bits.set(idx);
        bits.count += 1;
        Ok(())
    }

    /// Release a number. Returns whether it was allocated.
    pub fn deallocate(&self, number: u32) -> bool {
        let Ok(idx) = self.index(number) else {
            return false;
        };
        let mut bits = self.lock();
        if !bits.get(idx) {
            return false;
        }
        bits.clear(idx);
        bits.count -= 1;
        true
    }

    pub fn is_allocated(&self, number: u32) -> bool {
        self.index(number)
            .map(|idx| self.lock().get(idx))
            .unwrap_or(false)
    }

    pub fn allocated_count(&self) -> usize {
        self.lock().count
    }
}

/// Pool of TCP ports for backup shipping sessions.
#[derive(Debug)]
pub struct PortPool {
    inner: DynamicNumberPool,
}

impl PortPool {
    pub fn new(start: u16, end: u16) -> crate::Result<Self> {
        Ok(Self {
            inner: DynamicNumberPool::new(u32::from(start), u32::from(end))?,
        })
    }

    pub fn allocate(&self) -> Result<u16, PoolExhausted> {
        // The range is built from u16 bounds, so every allocated number fits.
        self.inner.auto_allocate().map(|port| port as u16)
    }

    /// First and last port of the pool.
    pub fn range(&self) -> (u16, u16) {
        let (start, end) = self.inner.range();
        // Built from u16 bounds in `new`.
        (start as u16, end as u16)
    }

    pub fn release(&self, port: u16) -> bool {
        self.inner.deallocate(u32::from(port))
    }

    /// Reserve a port that is already in use, e.g. one held by a persisted session.
    pub fn mark_allocated(&self, port: u16) -> crate::Result<()> {
        self.inner.allocate(u32::from(port))
    }

    pub fn is_allocated(&self, port: u16) -> bool {
        self.inner.is_allocated(u32::from(port))
    }

    pub fn allocated_count(&self) -> usize {
        self.inner.allocated_count()
    }
}
