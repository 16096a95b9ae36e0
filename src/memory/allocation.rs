//! Owning handles to heap ranges
//!
//! An [`Allocation`] is the only thing that can return memory to the
//! [`SimulatedHeap`]. It is move-only and frees its units exactly once, when an
//! owning instance is dropped. [`Allocation::slice`] produces a handle of the
//! same shape over a sub-range that never frees anything, which is how a
//! callee writes its struct result into storage its caller owns.
//!
//! Accesses through an allocation are bounded by its *declared* size, not the
//! rounded unit size, and still go through the heap's liveness check.

use super::heap::{MemoryView, Scalar, SimulatedHeap};
use super::Address;
use crate::interpreter::errors::MemoryError;

#[derive(Debug)]
pub struct Allocation {
    heap: SimulatedHeap,
    address: Address,
    size: usize,
    owned: bool,
}

impl Allocation {
    pub(crate) fn owning(heap: SimulatedHeap, address: Address, size: usize) -> Self {
        Allocation {
            heap,
            address,
            size,
            owned: true,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether dropping this handle frees memory
    pub fn is_owning(&self) -> bool {
        self.owned
    }

    pub fn view(&self) -> MemoryView {
        self.heap.view(self.address)
    }

    pub fn heap(&self) -> &SimulatedHeap {
        &self.heap
    }

    /// Non-owning handle over `[offset, offset + len)` of this allocation.
    pub fn slice(&self, offset: usize, len: usize) -> Result<Allocation, MemoryError> {
        self.check_bounds(offset, len)?;
        Ok(Allocation {
            heap: self.heap.clone(),
            address: self.address + offset as u64,
            size: len,
            owned: false,
        })
    }

    fn check_bounds(&self, offset: usize, len: usize) -> Result<(), MemoryError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(MemoryError::InvalidAccess {
                address: self.address.wrapping_add(offset as u64),
                len,
            }),
        }
    }

    pub fn read<T: Scalar>(&self, offset: usize) -> Result<T, MemoryError> {
        self.check_bounds(offset, T::SIZE)?;
        self.heap.read(self.address + offset as u64)
    }

    pub fn write<T: Scalar>(&self, offset: usize, value: T) -> Result<(), MemoryError> {
        self.check_bounds(offset, T::SIZE)?;
        self.heap.write(self.address + offset as u64, value)
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<Vec<u8>, MemoryError> {
        self.check_bounds(offset, len)?;
        self.heap.read_bytes(self.address + offset as u64, len)
    }

    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) -> Result<(), MemoryError> {
        self.check_bounds(offset, bytes.len())?;
        self.heap.write_bytes(self.address + offset as u64, bytes)
    }

    /// Zero the whole declared range
    pub fn clear(&self) -> Result<(), MemoryError> {
        self.heap.write_bytes(self.address, &vec![0; self.size])
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if self.owned {
            self.heap.release(self.address, self.size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn drop_frees_units() {
        let heap = SimulatedHeap::new(16, 4).unwrap();
        let a = heap.allocate(6).unwrap();
        assert_eq!(heap.used_bytes(), 8);
        drop(a);
        assert_eq!(heap.used_bytes(), 0);
    }

    #[test]
    fn slice_does_not_free() {
        let heap = SimulatedHeap::new(16, 4).unwrap();
        let a = heap.allocate(8).unwrap();
        a.write::<u32>(4, 7).unwrap();

        let field = a.slice(4, 4).unwrap();
        assert!(!field.is_owning());
        assert_eq!(field.address(), a.address() + 4);
        assert_eq!(field.read::<u32>(0).unwrap(), 7);
        drop(field);

        assert_eq!(heap.used_bytes(), 8);
        assert_eq!(a.read::<u32>(4).unwrap(), 7);
    }

    #[test]
    fn slice_outlives_owner_but_not_liveness() {
        let heap = SimulatedHeap::new(16, 4).unwrap();
        let a = heap.allocate(4).unwrap();
        let field = a.slice(0, 4).unwrap();
        drop(a);
        assert!(field.read::<u32>(0).is_err());
    }

    #[test]
    fn declared_bound_is_enforced() {
        let heap = SimulatedHeap::new(16, 4).unwrap();
        let a = heap.allocate(2).unwrap();
        assert!(a.write::<u16>(0, 1).is_ok());
        // The unit is 4 bytes wide, but only 2 were asked for.
        assert!(matches!(
            a.write::<u32>(0, 1),
            Err(MemoryError::InvalidAccess { .. })
        ));
        assert!(a.slice(1, 2).is_err());
    }

    #[test]
    fn clear_zeroes_declared_range() {
        let heap = SimulatedHeap::new(16, 4).unwrap();
        let a = heap.allocate(4).unwrap();
        a.write::<u32>(0, u32::MAX).unwrap();
        a.clear().unwrap();
        assert_eq!(a.read::<u32>(0).unwrap(), 0);
    }
}
