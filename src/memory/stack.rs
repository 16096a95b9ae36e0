//! Variable bindings and the call stack
//!
//! This module provides the binding chain the interpreter resolves names against:
//! - [`Variable`]: a typed binding that owns its heap storage
//! - [`Scope`]: one block's bindings
//! - [`FunctionFrame`]: the scopes of a single function invocation
//! - [`CallStack`]: the frame stack with a hard depth limit
//!
//! # Resolution
//!
//! A frame resolves a name through its own scopes, innermost first, and then
//! defers to the global scope. Callers' frames are never consulted, so the
//! scoping is lexical rather than dynamic.
//!
//! # Lifetime
//!
//! Dropping a scope drops its variables, and dropping a variable drops its
//! [`Allocation`], so leaving a block or returning from a function releases the
//! corresponding heap units.

use super::allocation::Allocation;
use super::heap::SimulatedHeap;
use super::value::{self, Value};
use super::Address;
use crate::ast::Type;
use crate::interpreter::errors::{MemoryError, RuntimeError, StackError};
use rustc_hash::FxHashMap;

/// A named (or temporary) object living on the simulated heap
#[derive(Debug)]
pub struct Variable {
    ty: Type,
    storage: Allocation,
}

impl Variable {
    /// Allocate zero-filled storage for an object of type `ty`.
    pub fn allocate(heap: &SimulatedHeap, ty: Type) -> Result<Self, RuntimeError> {
        let size = ty.size();
        if size == 0 {
            return Err(RuntimeError::type_mismatch("object type", ty.to_string()));
        }
        let storage = heap.allocate(size)?;
        storage.clear()?;
        Ok(Variable { ty, storage })
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn address(&self) -> Address {
        self.storage.address()
    }

    pub fn storage(&self) -> &Allocation {
        &self.storage
    }

    pub fn load(&self) -> Result<Value, RuntimeError> {
        value::load(self.storage.heap(), self.address(), &self.ty)
    }

    pub fn store(&self, value: Value) -> Result<(), RuntimeError> {
        value::store(self.storage.heap(), self.address(), &self.ty, value)
    }
}

/// Bindings introduced by one block
#[derive(Debug, Default)]
pub struct Scope {
    bindings: FxHashMap<String, Variable>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` in this scope. A previous binding of the same name in this
    /// scope is dropped, freeing its storage.
    pub fn add_variable(&mut self, name: impl Into<String>, var: Variable) {
        self.bindings.insert(name.into(), var);
    }

    pub fn get_variable(&self, name: &str) -> Option<&Variable> {
        self.bindings.get(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }
}

/// Caller-owned storage a struct-returning callee copies its result into.
///
/// The callee only holds a non-owning slice; the caller's temporary keeps the
/// bytes alive and frees them.
#[derive(Debug)]
pub struct ReturnBuffer {
    storage: Allocation,
}

impl ReturnBuffer {
    pub fn over(owner: &Allocation) -> Result<Self, MemoryError> {
        Ok(ReturnBuffer {
            storage: owner.slice(0, owner.size())?,
        })
    }

    pub fn address(&self) -> Address {
        self.storage.address()
    }

    pub fn size(&self) -> usize {
        self.storage.size()
    }

    /// Copy `len` bytes from `src` into the buffer.
    pub fn fill_from(&self, src: Address, len: usize) -> Result<(), MemoryError> {
        let bytes = self.storage.heap().read_bytes(src, len)?;
        self.storage.write_bytes(0, &bytes)
    }
}

/// Activation record for one function invocation
#[derive(Debug)]
pub struct FunctionFrame {
    pub function_name: String,
    root: Scope,
    nested: Vec<Scope>,
    returned: bool,
    return_value: Value,
    return_buffer: Option<ReturnBuffer>,
}

impl FunctionFrame {
    pub fn new(function_name: impl Into<String>, return_buffer: Option<ReturnBuffer>) -> Self {
        FunctionFrame {
            function_name: function_name.into(),
            root: Scope::new(),
            nested: Vec::new(),
            returned: false,
            return_value: Value::Void,
            return_buffer,
        }
    }

    /// Enter a block scope
    pub fn push_scope(&mut self) {
        self.nested.push(Scope::new());
    }

    /// Leave the innermost block scope. The root scope cannot be popped.
    pub fn pop_scope(&mut self) -> Result<(), StackError> {
        self.nested.pop().map(drop).ok_or(StackError::StackUnderflow)
    }

    pub fn current_scope(&self) -> &Scope {
        self.nested.last().unwrap_or(&self.root)
    }

    pub fn current_scope_mut(&mut self) -> &mut Scope {
        self.nested.last_mut().unwrap_or(&mut self.root)
    }

    /// Number of scopes, root included
    pub fn scope_depth(&self) -> usize {
        self.nested.len() + 1
    }

    /// Look `name` up in this frame only, innermost scope first.
    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        self.nested
            .iter()
            .rev()
            .chain(std::iter::once(&self.root))
            .find_map(|scope| scope.get_variable(name))
    }

    pub fn mark_returned(&mut self, value: Value) -> Result<(), StackError> {
        if self.returned {
            return Err(StackError::AlreadyReturned);
        }
        self.returned = true;
        self.return_value = value;
        Ok(())
    }

    pub fn has_returned(&self) -> bool {
        self.returned
    }

    pub fn return_value(&self) -> &Value {
        &self.return_value
    }

    /// Consume the frame, releasing its scopes, and yield the return value.
    pub fn into_return_value(self) -> Value {
        self.return_value
    }

    pub fn return_buffer(&self) -> Option<&ReturnBuffer> {
        self.return_buffer.as_ref()
    }
}

/// The call stack
#[derive(Debug)]
pub struct CallStack {
    frames: Vec<FunctionFrame>,
    max_depth: usize,
}

impl CallStack {
    pub fn new(max_depth: usize) -> Self {
        CallStack {
            frames: Vec::new(),
            max_depth,
        }
    }

    /// Push a new frame, refusing to exceed the depth limit
    pub fn push_frame(&mut self, frame: FunctionFrame) -> Result<(), StackError> {
        if self.frames.len() >= self.max_depth {
            return Err(StackError::StackOverflow {
                limit: self.max_depth,
            });
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop_frame(&mut self) -> Result<FunctionFrame, StackError> {
        self.frames.pop().ok_or(StackError::StackUnderflow)
    }

    pub fn current_frame(&self) -> Option<&FunctionFrame> {
        self.frames.last()
    }

    pub fn current_frame_mut(&mut self) -> Option<&mut FunctionFrame> {
        self.frames.last_mut()
    }

    /// Get all frames, outermost first
    pub fn frames(&self) -> &[FunctionFrame] {
        &self.frames
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};

    fn int_var(heap: &SimulatedHeap, n: i32) -> Variable {
        let var = Variable::allocate(heap, Type::Int).unwrap();
        var.store(Value::Int(n)).unwrap();
        var
    }

    #[test]
    fn redeclaring_frees_previous_binding() {
        let heap = SimulatedHeap::new(64, 8).unwrap();
        let mut scope = Scope::new();
        scope.add_variable("x", int_var(&heap, 1));
        let first = scope.get_variable("x").unwrap().address();
        assert_eq!(heap.used_bytes(), 8);

        scope.add_variable("x", int_var(&heap, 2));
        assert_eq!(heap.used_bytes(), 8);
        assert_ne!(scope.get_variable("x").unwrap().address(), first);
        assert!(!heap.is_live(first, 4));
        assert_eq!(scope.get_variable("x").unwrap().load().unwrap(), Value::Int(2));
        assert_eq!(scope.len(), 1);
    }

    #[test]
    fn inner_scope_shadows_and_releases() {
        let heap = SimulatedHeap::new(64, 8).unwrap();
        let mut frame = FunctionFrame::new("f", None);
        frame.current_scope_mut().add_variable("x", int_var(&heap, 1));

        frame.push_scope();
        frame.current_scope_mut().add_variable("x", int_var(&heap, 2));
        assert_eq!(frame.lookup("x").unwrap().load().unwrap(), Value::Int(2));
        assert_eq!(heap.used_bytes(), 16);

        frame.pop_scope().unwrap();
        assert_eq!(frame.lookup("x").unwrap().load().unwrap(), Value::Int(1));
        assert_eq!(heap.used_bytes(), 8);
    }

    #[test]
    fn root_scope_is_not_poppable() {
        let mut frame = FunctionFrame::new("f", None);
        assert_eq!(frame.pop_scope(), Err(StackError::StackUnderflow));
        assert_eq!(frame.scope_depth(), 1);
    }

    #[test]
    fn frame_returns_once() {
        let mut frame = FunctionFrame::new("f", None);
        frame.mark_returned(Value::Int(1)).unwrap();
        assert_eq!(
            frame.mark_returned(Value::Int(2)),
            Err(StackError::AlreadyReturned)
        );
        assert_eq!(frame.return_value(), &Value::Int(1));
    }

    #[test]
    fn return_buffer_does_not_own_storage() {
        let heap = SimulatedHeap::new(64, 8).unwrap();
        let target = Variable::allocate(&heap, Type::Int).unwrap();
        let source = int_var(&heap, 9);

        let buffer = ReturnBuffer::over(target.storage()).unwrap();
        let frame = FunctionFrame::new("f", Some(buffer));
        let buffer = frame.return_buffer().unwrap();
        assert_eq!(buffer.address(), target.address());
        buffer.fill_from(source.address(), 4).unwrap();
        assert_eq!(
            buffer.fill_from(source.address(), 8),
            Err(MemoryError::InvalidAccess {
                address: target.address(),
                len: 8
            })
        );

        drop(frame);
        assert_eq!(target.load().unwrap(), Value::Int(9));
    }

    #[test]
    fn call_stack_enforces_depth() {
        let mut stack = CallStack::new(2);
        stack.push_frame(FunctionFrame::new("a", None)).unwrap();
        stack.push_frame(FunctionFrame::new("b", None)).unwrap();
        assert_eq!(
            stack.push_frame(FunctionFrame::new("c", None)),
            Err(StackError::StackOverflow { limit: 2 })
        );
        stack.pop_frame().unwrap();
        stack.pop_frame().unwrap();
        assert!(matches!(stack.pop_frame(), Err(StackError::StackUnderflow)));
    }
}
