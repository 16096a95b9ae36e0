//! # Introduction
//!
//! `cvm` is the execution core of a C interpreter. It runs a program tree on a
//! dedicated worker thread over a simulated, liveness-checked heap, and lets the
//! host either run the program to completion or advance it one statement at a
//! time.
//!
//! ## Execution pipeline
//!
//! ```text
//! Program → VirtualMachine → Executor → ExecutionThread → Statement/Expression
//!                                              ↓
//!                                    ExecutionContext → SimulatedHeap
//! ```
//!
//! 1. [`ast`] — the program representation and the `Statement`, `Expression`
//!    and `Callable` contracts the engine drives.
//! 2. [`interpreter`] — the worker thread, execution context, executor and the
//!    [`interpreter::VirtualMachine`] façade.
//! 3. [`memory`] — the [`memory::SimulatedHeap`] with its RAII
//!    [`memory::Allocation`] handles and address-only [`memory::MemoryView`]s,
//!    plus scopes and function frames.
//!
//! ## Example
//!
//! ```
//! use cvm::ast::{BinOp, Expr, FunctionDef, Program, Stmt, Type};
//! use cvm::interpreter::{VirtualMachine, VmConfig};
//!
//! let program = Program::new().with_function(FunctionDef::new(
//!     "main",
//!     Type::Int,
//!     vec![],
//!     vec![Stmt::ret(Some(Expr::binary(BinOp::Mul, Expr::int(6), Expr::int(7))))],
//! ));
//!
//! let mut vm = VirtualMachine::new(program, VmConfig::default()).unwrap();
//! vm.execute_blocking().unwrap();
//! assert_eq!(vm.exit_code(), Ok(42));
//! ```

pub mod ast;
pub mod interpreter;
pub mod memory;
