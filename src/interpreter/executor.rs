//! Program executor
//!
//! [`Executor`] binds one [`ExecutionThread`] to one program. The worker it
//! spawns builds an [`ExecutionContext`] wired to the thread's cooperation point
//! and then:
//!
//! 1. materializes the string-literal table in the heap
//! 2. locates the entry point, failing with `NoEntryPoint` if it is missing
//! 3. runs the global statements in order, with no frame active
//! 4. invokes the entry point like any other call and keeps its result as the
//!    exit status
//!
//! A fault ends the worker as [`Outcome::Failed`]; a termination request ends it
//! as [`Outcome::Cancelled`] and is never reported.

use super::config::VmConfig;
use super::context::{ExecutionContext, SharedCursor};
use super::errors::{ExecResult, Fault, RuntimeError, ThreadError, Unwind, VmError};
use super::terminal::{MockTerminal, SharedTerminal};
use super::thread::{Cooperator, ExecutionThread, Outcome, RunMode};
use crate::ast::{Callable, Invocation, Program, SourceLocation};
use crate::memory::{SimulatedHeap, Value};
use std::sync::Arc;

pub struct Executor {
    thread: ExecutionThread<i32, Fault>,
    terminal: SharedTerminal,
    cursor: SharedCursor,
}

impl Executor {
    pub fn new(program: Arc<Program>, heap: SimulatedHeap, config: &VmConfig) -> Self {
        let terminal = MockTerminal::shared();
        let cursor = SharedCursor::default();

        let worker_terminal = Arc::clone(&terminal);
        let worker_cursor = Arc::clone(&cursor);
        let entry_point = config.entry_point.clone();
        let max_call_depth = config.max_call_depth;

        let thread = ExecutionThread::new(move |cooperator: Cooperator| {
            let mut ctx = ExecutionContext::new(program, heap, max_call_depth)
                .with_terminal(worker_terminal)
                .with_cooperator(cooperator)
                .with_cursor(worker_cursor);
            let result = run_program(&mut ctx, &entry_point);
            let location = ctx.current_location();
            match result {
                Ok(status) => {
                    tracing::debug!(status, "program finished");
                    Outcome::Finished(status)
                }
                Err(Unwind::Terminated) => {
                    tracing::debug!(?location, "program cancelled");
                    Outcome::Cancelled
                }
                Err(Unwind::Fault(error)) => {
                    tracing::warn!(%error, ?location, "runtime error");
                    Outcome::Failed(Fault { error, location })
                }
            }
        })
        .with_stack_size(config.worker_stack_size);

        Executor {
            thread,
            terminal,
            cursor,
        }
    }

    /// Run the program to completion on the worker thread.
    pub fn run_blocking(&mut self) -> Result<(), ThreadError> {
        self.thread.run_blocking()
    }

    /// Start the worker parked before its first statement.
    pub fn start_stepping(&mut self) -> Result<(), ThreadError> {
        self.thread.start_async(RunMode::WaitForResume)
    }

    /// Execute exactly one more statement.
    pub fn step(&mut self) -> Result<(), ThreadError> {
        self.thread.cycle()
    }

    /// Let the worker take one more statement without waiting for it.
    pub fn resume(&mut self) -> Result<(), ThreadError> {
        self.thread.resume()
    }

    pub fn terminate(&mut self) {
        self.thread.terminate();
    }

    pub fn is_started(&self) -> bool {
        self.thread.is_started()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_running()
    }

    /// Valid only once the program has finished normally.
    pub fn exit_status(&mut self) -> Result<i32, VmError> {
        match self.thread.outcome() {
            Some(Outcome::Finished(status)) => Ok(*status),
            _ => Err(VmError::NotFinished),
        }
    }

    /// The fault that ended the program, if any. Cancellation is not a fault.
    pub fn runtime_error(&mut self) -> Option<Fault> {
        match self.thread.outcome()? {
            Outcome::Failed(fault) => Some(fault.clone()),
            Outcome::Panicked(message) => Some(Fault {
                error: RuntimeError::WorkerPanicked(message.clone()),
                location: None,
            }),
            Outcome::Finished(_) | Outcome::Cancelled => None,
        }
    }

    pub fn terminal(&self) -> &SharedTerminal {
        &self.terminal
    }

    /// Statement the worker is parked before (or last entered)
    pub fn current_location(&self) -> Option<SourceLocation> {
        *self.cursor.lock()
    }
}

fn run_program(ctx: &mut ExecutionContext, entry_point: &str) -> ExecResult<i32> {
    ctx.load_string_table()?;

    let program = Arc::clone(ctx.program());
    let entry = program
        .function(entry_point)
        .ok_or_else(|| RuntimeError::NoEntryPoint(entry_point.to_string()))?;

    for stmt in program.globals() {
        ctx.execute_statement(stmt)?;
    }

    let status = entry.execute(ctx, Invocation::default())?;
    Ok(exit_status(&status))
}

fn exit_status(value: &Value) -> i32 {
    match value {
        Value::Int(n) => *n,
        Value::Char(c) => *c as i32,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, FunctionDef, Stmt, Type};
    use pretty_assertions::assert_eq;

    fn executor(program: Program) -> Executor {
        let config = VmConfig::default().with_heap(4096, 8);
        let heap = SimulatedHeap::new(config.heap_size, config.unit_size).unwrap();
        Executor::new(Arc::new(program), heap, &config)
    }

    fn returning(n: i32) -> Program {
        Program::new().with_function(FunctionDef::new(
            "main",
            Type::Int,
            vec![],
            vec![Stmt::ret(Some(Expr::int(n))).at(1)],
        ))
    }

    #[test]
    fn exit_status_from_entry_point() {
        let mut exec = executor(returning(42));
        exec.run_blocking().unwrap();
        assert_eq!(exec.exit_status(), Ok(42));
        assert_eq!(exec.runtime_error(), None);
    }

    #[test]
    fn exit_status_before_finish_fails() {
        let mut exec = executor(returning(1));
        assert_eq!(exec.exit_status(), Err(VmError::NotFinished));
        exec.start_stepping().unwrap();
        assert_eq!(exec.exit_status(), Err(VmError::NotFinished));
        exec.terminate();
        assert_eq!(exec.exit_status(), Err(VmError::NotFinished));
        assert_eq!(exec.runtime_error(), None);
    }

    #[test]
    fn missing_entry_point() {
        let mut exec = executor(Program::new());
        exec.run_blocking().unwrap();
        assert_eq!(
            exec.runtime_error(),
            Some(Fault {
                error: RuntimeError::NoEntryPoint("main".to_string()),
                location: None,
            })
        );
    }

    #[test]
    fn cursor_tracks_parked_statement() {
        let program = Program::new().with_function(FunctionDef::new(
            "main",
            Type::Int,
            vec![],
            vec![
                Stmt::decl("x", Type::Int, Some(Expr::int(5))).at(1),
                Stmt::ret(Some(Expr::var("x"))).at(2),
            ],
        ));
        let mut exec = executor(program);
        exec.start_stepping().unwrap();

        exec.step().unwrap();
        assert!(exec.is_running());
        assert_eq!(exec.current_location().map(|l| l.line), Some(2));

        exec.step().unwrap();
        assert!(!exec.is_running());
        assert_eq!(exec.exit_status(), Ok(5));
    }
}
