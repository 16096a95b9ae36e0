//! Simulated heap for the interpreter
//!
//! This module provides a fixed-size, byte-addressable arena with:
//! - First-fit allocation at allocation-unit granularity
//! - A liveness bitmap with one bit per unit
//! - Address-only [`MemoryView`]s that re-check liveness on every access
//!
//! # Addressing
//!
//! Heap offset `n` lives at address `HEAP_BASE_ADDRESS + n`. Addresses below the
//! base are never issued, which keeps `0` free to act as NULL.
//!
//! # Validity
//!
//! Validity is a property of the *current* bitmap, not of any handle. A view into
//! freed memory fails with [`MemoryError::InvalidAccess`] until some later
//! allocation covers the same units again, at which point it silently becomes
//! valid and observes the new owner's bytes. Use-after-free and wild pointers
//! therefore become deterministic, catchable faults.

use super::allocation::Allocation;
use super::Address;
use crate::interpreter::constants::HEAP_BASE_ADDRESS;
use crate::interpreter::errors::MemoryError;
use parking_lot::Mutex;
use std::sync::Arc;

/// Fixed-width little-endian values that can be read from or written to the heap.
pub trait Scalar: Copy {
    const SIZE: usize;

    fn decode(bytes: &[u8]) -> Self;
    fn encode(self, out: &mut [u8]);
}

macro_rules! impl_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl Scalar for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                #[inline]
                fn decode(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_le_bytes(buf)
                }

                #[inline]
                fn encode(self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_scalar!(u8, i8, u16, i16, u32, i32, u64, i64);

const BITS_PER_WORD: usize = 64;

/// Bytes plus the liveness bitmap. Only ever touched under the heap lock.
#[derive(Debug)]
struct HeapState {
    bytes: Vec<u8>,
    bitmap: Vec<u64>,
    used_units: usize,
}

impl HeapState {
    #[inline]
    fn is_live(&self, unit: usize) -> bool {
        (self.bitmap[unit / BITS_PER_WORD] >> (unit % BITS_PER_WORD)) & 1 == 1
    }

    fn mark(&mut self, first: usize, count: usize, live: bool) {
        for unit in first..first + count {
            let mask = 1u64 << (unit % BITS_PER_WORD);
            if live {
                self.bitmap[unit / BITS_PER_WORD] |= mask;
            } else {
                self.bitmap[unit / BITS_PER_WORD] &= !mask;
            }
        }
    }

    /// Lowest unit index starting a free run of `needed` units.
    fn find_free_run(&self, needed: usize, total_units: usize) -> Option<usize> {
        let mut run_start = 0;
        let mut run_len = 0;
        for unit in 0..total_units {
            if self.is_live(unit) {
                run_len = 0;
                run_start = unit + 1;
            } else {
                run_len += 1;
                if run_len == needed {
                    return Some(run_start);
                }
            }
        }
        None
    }
}

#[derive(Debug)]
struct HeapCore {
    size: usize,
    unit: usize,
    total_units: usize,
    state: Mutex<HeapState>,
}

impl HeapCore {
    /// Translate `[address, address + len)` into a heap offset, failing unless
    /// every covered unit is currently live.
    fn live_offset(
        &self,
        state: &HeapState,
        address: Address,
        len: usize,
    ) -> Result<usize, MemoryError> {
        let invalid = MemoryError::InvalidAccess { address, len };
        let offset = address
            .checked_sub(HEAP_BASE_ADDRESS)
            .and_then(|o| usize::try_from(o).ok())
            .ok_or_else(|| invalid.clone())?;
        let end = offset.checked_add(len).ok_or_else(|| invalid.clone())?;
        if len == 0 || end > self.size {
            return Err(invalid);
        }
        let first = offset / self.unit;
        let last = (end - 1) / self.unit;
        if (first..=last).all(|unit| state.is_live(unit)) {
            Ok(offset)
        } else {
            Err(invalid)
        }
    }

    fn units_for(&self, size: usize) -> usize {
        size.div_ceil(self.unit)
    }
}

/// Shared handle to a simulated heap. Cloning is cheap; all clones see the
/// same bytes and bitmap.
#[derive(Debug, Clone)]
pub struct SimulatedHeap {
    core: Arc<HeapCore>,
}

impl SimulatedHeap {
    /// Create a heap of `size` bytes with allocation granularity `unit`.
    /// `size` must be a non-zero multiple of `unit`.
    pub fn new(size: usize, unit: usize) -> Result<Self, MemoryError> {
        if unit == 0 || size == 0 || size % unit != 0 {
            return Err(MemoryError::InvalidGeometry { size, unit });
        }
        let total_units = size / unit;
        let state = HeapState {
            bytes: vec![0; size],
            bitmap: vec![0; total_units.div_ceil(BITS_PER_WORD)],
            used_units: 0,
        };
        Ok(SimulatedHeap {
            core: Arc::new(HeapCore {
                size,
                unit,
                total_units,
                state: Mutex::new(state),
            }),
        })
    }

    /// Reserve the lowest-addressed free run that fits `size` bytes, rounded up
    /// to whole units.
    pub fn allocate(&self, size: usize) -> Result<Allocation, MemoryError> {
        if size == 0 {
            return Err(MemoryError::ZeroSizedAllocation);
        }
        let needed = self.core.units_for(size);
        let mut state = self.core.state.lock();
        let available = (self.core.total_units - state.used_units) * self.core.unit;
        if needed > self.core.total_units {
            return Err(MemoryError::OutOfMemory {
                requested: size,
                available,
            });
        }
        let first = state
            .find_free_run(needed, self.core.total_units)
            .ok_or(MemoryError::OutOfMemory {
                requested: size,
                available,
            })?;
        state.mark(first, needed, true);
        state.used_units += needed;
        drop(state);

        let address = HEAP_BASE_ADDRESS + (first * self.core.unit) as u64;
        tracing::trace!(address, size, units = needed, "heap allocate");
        Ok(Allocation::owning(self.clone(), address, size))
    }

    /// Construct a view at `address`. Never validates anything by itself.
    pub fn view(&self, address: Address) -> MemoryView {
        MemoryView {
            heap: self.clone(),
            address,
        }
    }

    /// Return the units backing `[address, address + size)` to the free pool.
    pub(crate) fn release(&self, address: Address, size: usize) {
        let Some(offset) = address
            .checked_sub(HEAP_BASE_ADDRESS)
            .and_then(|o| usize::try_from(o).ok())
        else {
            return;
        };
        let first = offset / self.core.unit;
        let count = self.core.units_for(size);
        if first + count > self.core.total_units {
            return;
        }
        let mut state = self.core.state.lock();
        let freed = (first..first + count).filter(|&u| state.is_live(u)).count();
        state.mark(first, count, false);
        state.used_units -= freed;
        tracing::trace!(address, size, units = count, "heap free");
    }

    /// Copy `len` bytes from `address` into a fresh buffer.
    pub fn read_bytes(&self, address: Address, len: usize) -> Result<Vec<u8>, MemoryError> {
        let state = self.core.state.lock();
        let offset = self.core.live_offset(&state, address, len)?;
        Ok(state.bytes[offset..offset + len].to_vec())
    }

    /// Overwrite the bytes at `address` with `bytes`.
    pub fn write_bytes(&self, address: Address, bytes: &[u8]) -> Result<(), MemoryError> {
        let mut state = self.core.state.lock();
        let offset = self.core.live_offset(&state, address, bytes.len())?;
        state.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Read a scalar at `address`.
    pub fn read<T: Scalar>(&self, address: Address) -> Result<T, MemoryError> {
        let state = self.core.state.lock();
        let offset = self.core.live_offset(&state, address, T::SIZE)?;
        Ok(T::decode(&state.bytes[offset..offset + T::SIZE]))
    }

    /// Write a scalar at `address`.
    pub fn write<T: Scalar>(&self, address: Address, value: T) -> Result<(), MemoryError> {
        let mut state = self.core.state.lock();
        let offset = self.core.live_offset(&state, address, T::SIZE)?;
        value.encode(&mut state.bytes[offset..offset + T::SIZE]);
        Ok(())
    }

    /// `memmove` between two live ranges. Zero-length copies always succeed.
    pub fn copy(&self, dst: Address, src: Address, len: usize) -> Result<(), MemoryError> {
        if len == 0 {
            return Ok(());
        }
        let mut state = self.core.state.lock();
        let from = self.core.live_offset(&state, src, len)?;
        let to = self.core.live_offset(&state, dst, len)?;
        state.bytes.copy_within(from..from + len, to);
        Ok(())
    }

    /// Whether every byte of `[address, address + len)` is currently live.
    pub fn is_live(&self, address: Address, len: usize) -> bool {
        let state = self.core.state.lock();
        self.core.live_offset(&state, address, len).is_ok()
    }

    pub fn capacity(&self) -> usize {
        self.core.size
    }

    pub fn unit_size(&self) -> usize {
        self.core.unit
    }

    pub fn base_address(&self) -> Address {
        HEAP_BASE_ADDRESS
    }

    /// Bytes reserved by live allocations, counted in whole units.
    pub fn used_bytes(&self) -> usize {
        self.core.state.lock().used_units * self.core.unit
    }

    pub fn free_bytes(&self) -> usize {
        self.capacity() - self.used_bytes()
    }
}

/// A coordinate into the heap. Holds no ownership and no tie to any
/// [`Allocation`]; every access consults the heap's current bitmap.
#[derive(Debug, Clone)]
pub struct MemoryView {
    heap: SimulatedHeap,
    address: Address,
}

impl MemoryView {
    pub fn address(&self) -> Address {
        self.address
    }

    fn at(&self, offset: usize, len: usize) -> Result<Address, MemoryError> {
        self.address
            .checked_add(offset as u64)
            .ok_or(MemoryError::InvalidAccess {
                address: self.address,
                len,
            })
    }

    pub fn read<T: Scalar>(&self, offset: usize) -> Result<T, MemoryError> {
        self.heap.read(self.at(offset, T::SIZE)?)
    }

    pub fn write<T: Scalar>(&self, offset: usize, value: T) -> Result<(), MemoryError> {
        self.heap.write(self.at(offset, T::SIZE)?, value)
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<Vec<u8>, MemoryError> {
        self.heap.read_bytes(self.at(offset, len)?, len)
    }

    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) -> Result<(), MemoryError> {
        self.heap.write_bytes(self.at(offset, bytes.len())?, bytes)
    }

    /// Read a NUL-terminated string starting at this view. Every byte, the
    /// terminator included, must be live.
    pub fn read_c_string(&self) -> Result<String, MemoryError> {
        let mut bytes = Vec::new();
        let mut offset = 0;
        loop {
            let byte: u8 = self.read(offset)?;
            if byte == 0 {
                break;
            }
            bytes.push(byte);
            offset += 1;
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
