// Virtual machine façade

use super::config::VmConfig;
use super::errors::{Fault, VmError};
use super::executor::Executor;
use crate::ast::{Program, SourceLocation};
use crate::memory::SimulatedHeap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VmState {
    NotStarted,
    Running,
    Terminated,
}

/// A single-use virtual machine running one program.
///
/// The machine moves `NotStarted → Running → Terminated`. It is started either
/// with [`execute_blocking`](Self::execute_blocking), which returns once the
/// program has ended, or with [`start_sync`](Self::start_sync), after which each
/// [`execute_next_statement`](Self::execute_next_statement) runs exactly one
/// statement. Both routes yield the same exit code or runtime error.
///
/// Program memory and output may be inspected between steps and after the run:
/// the worker is parked or gone whenever one of those calls has returned.
pub struct VirtualMachine {
    state: VmState,
    heap: SimulatedHeap,
    executor: Executor,
}

impl VirtualMachine {
    pub fn new(program: Program, config: VmConfig) -> Result<Self, VmError> {
        config.validate()?;
        let heap = SimulatedHeap::new(config.heap_size, config.unit_size)?;
        let executor = Executor::new(Arc::new(program), heap.clone(), &config);
        tracing::info!(
            heap_size = config.heap_size,
            unit_size = config.unit_size,
            entry_point = %config.entry_point,
            "virtual machine created"
        );
        Ok(VirtualMachine {
            state: VmState::NotStarted,
            heap,
            executor,
        })
    }

    fn begin(&mut self) -> Result<(), VmError> {
        if self.state != VmState::NotStarted {
            return Err(VmError::AlreadyStarted);
        }
        self.state = VmState::Running;
        Ok(())
    }

    /// Run the whole program, blocking until it ends.
    pub fn execute_blocking(&mut self) -> Result<(), VmError> {
        self.begin()?;
        tracing::info!("executing program");
        self.executor.run_blocking()?;
        self.state = VmState::Terminated;
        tracing::info!("program ended");
        Ok(())
    }

    /// Start the program parked before its first statement. Does not block.
    pub fn start_sync(&mut self) -> Result<(), VmError> {
        self.begin()?;
        tracing::info!("program started in step mode");
        self.executor.start_stepping()?;
        Ok(())
    }

    /// Execute exactly one statement, blocking until the worker has parked
    /// before the next one or the program has ended.
    pub fn execute_next_statement(&mut self) -> Result<(), VmError> {
        match self.state {
            VmState::NotStarted => return Err(VmError::NotStarted),
            VmState::Terminated => return Err(VmError::NotRunning),
            VmState::Running => {}
        }
        if !self.executor.is_running() {
            self.state = VmState::Terminated;
            return Err(VmError::NotRunning);
        }
        self.executor.step()?;
        if !self.executor.is_running() {
            self.state = VmState::Terminated;
            tracing::info!("program ended");
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state == VmState::Running && self.executor.is_running()
    }

    /// The entry point's return value. Fails unless the program ended normally.
    pub fn exit_code(&mut self) -> Result<i32, VmError> {
        self.executor.exit_status()
    }

    /// The fault that ended the program, if it ended with one.
    pub fn runtime_error(&mut self) -> Option<Fault> {
        self.executor.runtime_error()
    }

    /// Stop the program and wait for the worker to exit. Idempotent; a machine
    /// that was never started can no longer be started afterwards.
    pub fn terminate(&mut self) {
        self.executor.terminate();
        if self.state != VmState::Terminated {
            tracing::info!("virtual machine terminated");
        }
        self.state = VmState::Terminated;
    }

    /// The program's heap
    pub fn memory(&self) -> &SimulatedHeap {
        &self.heap
    }

    /// Everything the program has printed so far
    pub fn output(&self) -> String {
        self.executor.terminal().lock().contents()
    }

    pub fn output_lines(&self) -> Vec<String> {
        self.executor.terminal().lock().get_output()
    }

    /// Location of the statement the worker is parked before
    pub fn current_location(&self) -> Option<SourceLocation> {
        self.executor.current_location()
    }
}

impl Drop for VirtualMachine {
    fn drop(&mut self) {
        self.executor.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, FunctionDef, Stmt, Type};
    use pretty_assertions::assert_eq;

    fn program() -> Program {
        Program::new().with_function(FunctionDef::new(
            "main",
            Type::Int,
            vec![],
            vec![
                Stmt::decl("x", Type::Int, Some(Expr::int(3))),
                Stmt::ret(Some(Expr::var("x"))),
            ],
        ))
    }

    fn vm() -> VirtualMachine {
        VirtualMachine::new(program(), VmConfig::default().with_heap(1024, 8)).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let result = VirtualMachine::new(program(), VmConfig::default().with_heap(100, 0));
        assert!(matches!(result, Err(VmError::Config(_))));
    }

    #[test]
    fn single_use() {
        let mut vm = vm();
        vm.execute_blocking().unwrap();
        assert_eq!(vm.exit_code(), Ok(3));
        assert_eq!(vm.execute_blocking(), Err(VmError::AlreadyStarted));
        assert_eq!(vm.start_sync(), Err(VmError::AlreadyStarted));
        assert_eq!(vm.execute_next_statement(), Err(VmError::NotRunning));
    }

    #[test]
    fn stepping_requires_start() {
        let mut vm = vm();
        assert_eq!(vm.execute_next_statement(), Err(VmError::NotStarted));
        assert!(!vm.is_running());
    }

    #[test]
    fn terminate_before_start_prevents_start() {
        let mut vm = vm();
        vm.terminate();
        vm.terminate();
        assert_eq!(vm.start_sync(), Err(VmError::AlreadyStarted));
        assert_eq!(vm.runtime_error(), None);
    }

    #[test]
    fn stepping_after_terminate_fails() {
        let mut vm = vm();
        vm.start_sync().unwrap();
        vm.execute_next_statement().unwrap();
        vm.terminate();
        assert!(!vm.is_running());
        assert_eq!(vm.execute_next_statement(), Err(VmError::NotRunning));
        assert_eq!(vm.exit_code(), Err(VmError::NotFinished));
        assert_eq!(vm.runtime_error(), None);
    }
}
