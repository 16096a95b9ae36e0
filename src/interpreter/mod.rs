//! Execution engine
//!
//! This module provides the machinery that runs a [`Program`](crate::ast::Program):
//! - [`thread`]: the cooperative single-step worker thread
//! - [`context`]: interpreter state and the statement-boundary protocol
//! - [`executor`]: binds one worker to one program and captures its result
//! - [`engine`]: the [`VirtualMachine`] lifecycle façade
//! - [`errors`]: error types for every layer
//!
//! # Execution Model
//!
//! Statements and expressions execute on a dedicated worker thread. Before each
//! statement's effect runs, the worker passes a cooperation point where the host
//! can hold it, advance it by exactly one statement, or cancel it.
//!
//! # Built-in Functions
//!
//! `printf`, `puts`, `putchar`, `malloc` and `free` are provided by [`builtins`]
//! and resolved like user functions.

pub mod builtins;
pub mod calls;
pub mod config;
pub mod constants;
pub mod context;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod expressions;
pub mod statements;
pub mod terminal;
pub mod thread;

pub use config::VmConfig;
pub use context::ExecutionContext;
pub use engine::VirtualMachine;
pub use errors::{Fault, MemoryError, RuntimeError, StackError, ThreadError, VmError};
pub use executor::Executor;
pub use thread::{ExecutionThread, Outcome, RunMode};
