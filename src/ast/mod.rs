//! Program representation consumed by the execution engine
//!
//! The engine only depends on three contracts:
//! - [`Statement`]: one unit of execution; the engine wraps every call with the
//!   returned-check and the cooperation point
//! - [`Expression`]: evaluates to a [`Value`], optionally to an assignable [`Place`]
//! - [`Callable`]: anything invocable by name, user function or built-in alike
//!
//! [`nodes`] supplies concrete `Stmt`/`Expr` enums implementing them, and
//! [`program`] bundles globals, functions and the string table.

pub mod nodes;
pub mod program;

pub use nodes::{BinOp, Expr, Field, Param, Stmt, StructDef, Type, UnOp};
pub use program::{FunctionDef, Program};

use crate::interpreter::context::ExecutionContext;
use crate::interpreter::errors::{ExecResult, RuntimeError};
use crate::memory::{Address, ReturnBuffer, Value};
use std::fmt;

/// Source location information for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// An assignable heap location
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub address: Address,
    pub ty: Type,
}

pub trait Statement: Send + Sync + fmt::Debug {
    fn location(&self) -> SourceLocation;

    /// Run the statement's effect. Callers go through
    /// [`ExecutionContext::execute_statement`], never call this directly.
    fn execute(&self, ctx: &mut ExecutionContext) -> ExecResult<()>;
}

pub trait Expression: Send + Sync + fmt::Debug {
    fn evaluate(&self, ctx: &mut ExecutionContext) -> ExecResult<Value>;

    /// Resolve to a heap location. Only lvalues override this.
    fn place(&self, _ctx: &mut ExecutionContext) -> ExecResult<Place> {
        Err(RuntimeError::NotAnLvalue.into())
    }
}

/// Arguments for a single call
#[derive(Debug, Default)]
pub struct Invocation {
    pub args: Vec<Value>,
    /// Caller-owned space for a struct result
    pub return_buffer: Option<ReturnBuffer>,
}

impl Invocation {
    pub fn new(args: Vec<Value>) -> Self {
        Invocation {
            args,
            return_buffer: None,
        }
    }
}

pub trait Callable: Send + Sync {
    fn name(&self) -> &str;

    fn return_type(&self) -> Type;

    fn execute(&self, ctx: &mut ExecutionContext, invocation: Invocation) -> ExecResult<Value>;
}
