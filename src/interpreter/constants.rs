// Constants for the virtual machine

/// First address handed out by the simulated heap.
/// Everything below it is the reserved prefix, so address 0 is always NULL.
pub const HEAP_BASE_ADDRESS: u64 = 0x0000_1000;

/// Default heap capacity in bytes (1 MiB)
pub const DEFAULT_HEAP_SIZE: usize = 1024 * 1024;

/// Default allocation unit in bytes
pub const DEFAULT_UNIT_SIZE: usize = 8;

/// Hard cap on nested function frames
pub const DEFAULT_MAX_CALL_DEPTH: usize = 4096;

/// Native stack for the worker thread; deep interpreted recursion needs room
pub const DEFAULT_WORKER_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Function invoked after the global statements have run
pub const DEFAULT_ENTRY_POINT: &str = "main";
