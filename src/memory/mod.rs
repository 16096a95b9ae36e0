//! Memory model for the virtual machine
//!
//! This module provides the core memory abstractions:
//! - [`heap`]: the simulated byte arena, its liveness bitmap and address-only views
//! - [`allocation`]: RAII ownership of heap ranges
//! - [`value`]: runtime values and their byte encoding
//! - [`stack`]: variables, scopes, function frames and the call stack
//!
//! Every interpreted object, locals included, lives in the simulated heap.
//! Pointers are plain integers; the only safety net is the per-access liveness
//! check performed by the heap.

pub mod allocation;
pub mod heap;
pub mod stack;
pub mod value;

pub use allocation::Allocation;
pub use heap::{MemoryView, Scalar, SimulatedHeap};
pub use stack::{CallStack, FunctionFrame, ReturnBuffer, Scope, Variable};
pub use value::Value;

/// Memory address type (64-bit)
pub type Address = u64;
