//! Error types for the virtual machine
//!
//! Errors fall into four groups:
//!
//! - [`MemoryError`]: simulated heap failures (exhaustion, dead or wild access)
//! - [`StackError`]: frame and scope discipline violations
//! - [`RuntimeError`]: everything that can stop an interpreted program; memory and
//!   stack errors convert into it with `?`
//! - [`VmError`] / [`ThreadError`]: misuse of the host-facing API, raised on the
//!   caller's thread and never deferred into the worker
//!
//! Inside the worker, failures travel as [`Unwind`], which keeps a requested
//! shutdown ([`Unwind::Terminated`]) distinct from a genuine program fault.

use crate::ast::SourceLocation;
use crate::memory::Address;
use std::fmt;
use thiserror::Error;

/// Result type used by statement execution and expression evaluation.
pub type ExecResult<T> = Result<T, Unwind>;

/// Failures raised by the simulated heap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("out of memory: requested {requested} bytes, {available} bytes free")]
    OutOfMemory { requested: usize, available: usize },

    #[error("invalid memory access: {len} byte(s) at 0x{address:x}")]
    InvalidAccess { address: Address, len: usize },

    #[error("allocation size must be greater than zero")]
    ZeroSizedAllocation,

    #[error("invalid heap geometry: size {size}, unit {unit}")]
    InvalidGeometry { size: usize, unit: usize },
}

/// Violations of the frame/scope discipline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    #[error("stack overflow: call depth limit of {limit} exceeded")]
    StackOverflow { limit: usize },

    #[error("stack underflow: nothing to pop")]
    StackUnderflow,

    #[error("no active function frame")]
    NoActiveFrame,

    #[error("function has already returned")]
    AlreadyReturned,
}

/// Errors that terminate an interpreted program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Stack(#[from] StackError),

    #[error("no entry point: function '{0}' not found")]
    NoEntryPoint(String),

    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("undefined function '{0}'")]
    UndefinedFunction(String),

    #[error("function '{function}' expects {expected} argument(s), got {got}")]
    ArgumentCountMismatch {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("type error: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("{0} by zero")]
    DivisionByZero(&'static str),

    #[error("integer overflow in {0}")]
    IntegerOverflow(&'static str),

    #[error("expression is not assignable")]
    NotAnLvalue,

    #[error("struct '{struct_name}' has no field '{field}'")]
    MissingStructField { struct_name: String, field: String },

    #[error("invalid free of address 0x{0:x}")]
    InvalidFree(Address),

    #[error("invalid malloc size: {0} (must be positive)")]
    InvalidMallocSize(i32),

    #[error("string literal #{0} is not in the string table")]
    UndefinedString(usize),

    #[error("invalid printf format: {0}")]
    InvalidPrintfFormat(String),

    #[error("worker thread panicked: {0}")]
    WorkerPanicked(String),
}

impl RuntimeError {
    pub fn type_mismatch(expected: impl Into<String>, got: impl fmt::Debug) -> Self {
        RuntimeError::TypeMismatch {
            expected: expected.into(),
            got: format!("{:?}", got),
        }
    }
}

/// A runtime error together with the statement that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub error: RuntimeError,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "{} at line {}", self.error, loc.line),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// How execution leaves a statement early.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unwind {
    #[error(transparent)]
    Fault(#[from] RuntimeError),

    /// The organizer asked the worker to stop. Never reported as an error.
    #[error("execution terminated")]
    Terminated,
}

impl From<MemoryError> for Unwind {
    fn from(e: MemoryError) -> Self {
        Unwind::Fault(e.into())
    }
}

impl From<StackError> for Unwind {
    fn from(e: StackError) -> Self {
        Unwind::Fault(e.into())
    }
}

impl From<crate::interpreter::thread::Cancelled> for Unwind {
    fn from(_: crate::interpreter::thread::Cancelled) -> Self {
        Unwind::Terminated
    }
}

/// Organizer-side misuse of [`ExecutionThread`](crate::interpreter::thread::ExecutionThread).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThreadError {
    #[error("worker has already been started")]
    AlreadyStarted,

    #[error("worker has not been started")]
    NotStarted,

    #[error("worker is not in step mode")]
    NotStepping,

    #[error("worker has been terminated")]
    Terminated,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}

/// Lifecycle misuse of [`VirtualMachine`](crate::interpreter::engine::VirtualMachine).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("virtual machine has already been started")]
    AlreadyStarted,

    #[error("virtual machine has not been started")]
    NotStarted,

    #[error("virtual machine is not running")]
    NotRunning,

    #[error("program has not finished normally")]
    NotFinished,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Thread(#[from] ThreadError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}
