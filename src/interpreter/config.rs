//! Virtual machine configuration
//!
//! [`VmConfig`] carries the heap geometry and execution limits supplied by the
//! host at construction time. Defaults come from [`constants`](super::constants).

use super::constants::{
    DEFAULT_ENTRY_POINT, DEFAULT_HEAP_SIZE, DEFAULT_MAX_CALL_DEPTH, DEFAULT_UNIT_SIZE,
    DEFAULT_WORKER_STACK_SIZE,
};
use super::errors::VmError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Total heap capacity in bytes
    pub heap_size: usize,
    /// Allocation granularity in bytes
    pub unit_size: usize,
    /// Maximum number of nested function frames
    pub max_call_depth: usize,
    /// Name of the function run after the globals
    pub entry_point: String,
    /// Native stack size of the worker thread
    pub worker_stack_size: usize,
}

impl VmConfig {
    pub fn new() -> Self {
        VmConfig {
            heap_size: DEFAULT_HEAP_SIZE,
            unit_size: DEFAULT_UNIT_SIZE,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            worker_stack_size: DEFAULT_WORKER_STACK_SIZE,
        }
    }

    pub fn with_heap(mut self, heap_size: usize, unit_size: usize) -> Self {
        self.heap_size = heap_size;
        self.unit_size = unit_size;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = name.into();
        self
    }

    pub fn with_worker_stack_size(mut self, bytes: usize) -> Self {
        self.worker_stack_size = bytes;
        self
    }

    /// Reject geometries and limits the engine cannot honour.
    pub fn validate(&self) -> Result<(), VmError> {
        if self.unit_size == 0 {
            return Err(VmError::Config("unit size must be non-zero".to_string()));
        }
        if self.heap_size == 0 {
            return Err(VmError::Config("heap size must be non-zero".to_string()));
        }
        if self.heap_size % self.unit_size != 0 {
            return Err(VmError::Config(format!(
                "heap size {} is not a multiple of unit size {}",
                self.heap_size, self.unit_size
            )));
        }
        if self.max_call_depth == 0 {
            return Err(VmError::Config(
                "call depth limit must be non-zero".to_string(),
            ));
        }
        if self.entry_point.is_empty() {
            return Err(VmError::Config("entry point name is empty".to_string()));
        }
        Ok(())
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self::new()
    }
}
