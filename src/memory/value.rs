//! Runtime value representation
//!
//! A [`Value`] is what an expression evaluates to. Scalars are carried by value;
//! structs are carried by *reference* to their heap storage, so passing a
//! struct around never copies it until something stores it into another place.
//!
//! # Layout
//!
//! - `int`: 4 bytes, little-endian `i32`
//! - `char`: 1 byte, `i8`
//! - pointer: 8 bytes, little-endian `u64` address
//! - struct: fields packed back to back, no padding

use super::heap::SimulatedHeap;
use super::Address;
use crate::ast::{StructDef, Type};
use crate::interpreter::errors::{MemoryError, RuntimeError};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Void,
    Int(i32),
    Char(i8),
    Pointer(Address),
    Struct { address: Address, def: Arc<StructDef> },
}

impl Value {
    /// Integer view of a value, promoting `char` the way C does.
    pub fn as_int(&self) -> Result<i32, RuntimeError> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Char(c) => Ok(*c as i32),
            other => Err(RuntimeError::type_mismatch("int", other)),
        }
    }

    pub fn as_pointer(&self) -> Result<Address, RuntimeError> {
        match self {
            Value::Pointer(addr) => Ok(*addr),
            Value::Int(0) => Ok(0),
            other => Err(RuntimeError::type_mismatch("pointer", other)),
        }
    }

    /// C truthiness: non-zero scalars and non-NULL pointers are true.
    pub fn is_truthy(&self) -> Result<bool, RuntimeError> {
        match self {
            Value::Int(n) => Ok(*n != 0),
            Value::Char(c) => Ok(*c != 0),
            Value::Pointer(addr) => Ok(*addr != 0),
            other => Err(RuntimeError::type_mismatch("scalar", other)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Pointer(0))
    }
}

/// Convert `value` to `ty`, applying the implicit conversions assignment allows.
pub fn coerce(value: Value, ty: &Type) -> Result<Value, RuntimeError> {
    match (value, ty) {
        (Value::Int(n), Type::Int) => Ok(Value::Int(n)),
        (Value::Char(c), Type::Int) => Ok(Value::Int(c as i32)),
        (Value::Int(n), Type::Char) => Ok(Value::Char(n as i8)),
        (Value::Char(c), Type::Char) => Ok(Value::Char(c)),
        (Value::Pointer(addr), Type::Pointer(_)) => Ok(Value::Pointer(addr)),
        (Value::Int(0), Type::Pointer(_)) => Ok(Value::Pointer(0)),
        (Value::Struct { address, def }, Type::Struct(expected)) if def.name == expected.name => {
            Ok(Value::Struct { address, def })
        }
        (Value::Void, Type::Void) => Ok(Value::Void),
        (other, ty) => Err(RuntimeError::type_mismatch(ty.to_string(), other)),
    }
}

/// Read a value of type `ty` stored at `address`.
pub fn load(heap: &SimulatedHeap, address: Address, ty: &Type) -> Result<Value, RuntimeError> {
    match ty {
        Type::Int => Ok(Value::Int(heap.read::<i32>(address)?)),
        Type::Char => Ok(Value::Char(heap.read::<i8>(address)?)),
        Type::Pointer(_) => Ok(Value::Pointer(heap.read::<u64>(address)?)),
        Type::Struct(def) => {
            let size = def.size();
            if !heap.is_live(address, size) {
                return Err(MemoryError::InvalidAccess { address, len: size }.into());
            }
            Ok(Value::Struct {
                address,
                def: Arc::clone(def),
            })
        }
        Type::Void => Err(RuntimeError::type_mismatch("object type", "void")),
    }
}

/// Write `value` (after coercion to `ty`) at `address`. Structs are copied
/// byte for byte from their source storage.
pub fn store(
    heap: &SimulatedHeap,
    address: Address,
    ty: &Type,
    value: Value,
) -> Result<(), RuntimeError> {
    match coerce(value, ty)? {
        Value::Int(n) => heap.write::<i32>(address, n)?,
        Value::Char(c) => heap.write::<i8>(address, c)?,
        Value::Pointer(addr) => heap.write::<u64>(address, addr)?,
        Value::Struct { address: src, def } => heap.copy(address, src, def.size())?,
        Value::Void => return Err(RuntimeError::type_mismatch("object type", "void")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Field;
    use pretty_assertions::assert_eq;

    fn point() -> Arc<StructDef> {
        Arc::new(StructDef::new(
            "Point",
            vec![Field::new("x", Type::Int), Field::new("y", Type::Int)],
        ))
    }

    #[test]
    fn scalars_round_trip_through_heap() {
        let heap = SimulatedHeap::new(64, 8).unwrap();
        let a = heap.allocate(8).unwrap();
        store(&heap, a.address(), &Type::Int, Value::Int(-5)).unwrap();
        assert_eq!(load(&heap, a.address(), &Type::Int).unwrap(), Value::Int(-5));

        let ptr = Type::Int.pointer_to();
        store(&heap, a.address(), &ptr, Value::Int(0)).unwrap();
        assert_eq!(load(&heap, a.address(), &ptr).unwrap(), Value::Pointer(0));
    }

    #[test]
    fn char_truncates_int() {
        assert_eq!(coerce(Value::Int(0x141), &Type::Char).unwrap(), Value::Char(0x41));
    }

    #[test]
    fn struct_store_copies_bytes() {
        let heap = SimulatedHeap::new(64, 8).unwrap();
        let def = point();
        let ty = Type::Struct(Arc::clone(&def));
        let src = heap.allocate(def.size()).unwrap();
        let dst = heap.allocate(def.size()).unwrap();
        src.write::<i32>(0, 3).unwrap();
        src.write::<i32>(4, 4).unwrap();

        let value = load(&heap, src.address(), &ty).unwrap();
        store(&heap, dst.address(), &ty, value).unwrap();
        src.write::<i32>(0, 100).unwrap();

        assert_eq!(dst.read::<i32>(0).unwrap(), 3);
        assert_eq!(dst.read::<i32>(4).unwrap(), 4);
    }

    #[test]
    fn struct_load_checks_liveness() {
        let heap = SimulatedHeap::new(64, 8).unwrap();
        let def = point();
        let a = heap.allocate(def.size()).unwrap();
        let address = a.address();
        drop(a);
        assert!(load(&heap, address, &Type::Struct(def)).is_err());
    }

    #[test]
    fn rejects_mismatched_struct() {
        let other = Arc::new(StructDef::new("Other", vec![Field::new("v", Type::Int)]));
        let value = Value::Struct {
            address: 0x1000,
            def: other,
        };
        assert!(coerce(value, &Type::Struct(point())).is_err());
    }
}
