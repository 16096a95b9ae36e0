//! Execution context
//!
//! [`ExecutionContext`] is the interpreter state the worker thread owns:
//!
//! - the global [`Scope`] and the [`CallStack`] of function frames
//! - the statement stack, whose top is the statement currently executing
//! - the temporaries created while evaluating the current statements
//! - the materialized string table and `malloc`'d blocks
//! - the cooperation hook that ties statement boundaries to the
//!   [`ExecutionThread`](super::thread::ExecutionThread) handshake
//!
//! # Statement boundaries
//!
//! Every statement runs through [`ExecutionContext::execute_statement`]. Once the
//! current frame has returned, statements become no-ops; otherwise the statement
//! is pushed, the cooperation point is passed, and only then does its effect run.
//! Statements are therefore the unit of external observability.
//!
//! Temporaries (struct return buffers) live until the statement that created
//! them has finished, whether it succeeded or not.

use super::builtins;
use super::errors::{ExecResult, MemoryError, RuntimeError, StackError};
use super::terminal::{MockTerminal, SharedTerminal};
use super::thread::Cooperator;
use crate::ast::{Callable, Program, SourceLocation, Statement, Type};
use crate::memory::{
    Address, Allocation, CallStack, FunctionFrame, ReturnBuffer, Scope, SimulatedHeap, Value,
    Variable,
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Location of the statement the worker is about to run, readable by the host
pub type SharedCursor = Arc<Mutex<Option<SourceLocation>>>;

pub struct ExecutionContext {
    program: Arc<Program>,
    heap: SimulatedHeap,
    globals: Scope,
    stack: CallStack,
    statement_stack: Vec<SourceLocation>,
    temporaries: Vec<Variable>,
    string_table: Vec<Allocation>,
    dynamic: FxHashMap<Address, Allocation>,
    builtins: FxHashMap<&'static str, Arc<dyn Callable>>,
    terminal: SharedTerminal,
    cooperator: Option<Cooperator>,
    cursor: Option<SharedCursor>,
}

impl ExecutionContext {
    pub fn new(program: Arc<Program>, heap: SimulatedHeap, max_call_depth: usize) -> Self {
        ExecutionContext {
            program,
            heap,
            globals: Scope::new(),
            stack: CallStack::new(max_call_depth),
            statement_stack: Vec::new(),
            temporaries: Vec::new(),
            string_table: Vec::new(),
            dynamic: FxHashMap::default(),
            builtins: builtins::standard_library(),
            terminal: MockTerminal::shared(),
            cooperator: None,
            cursor: None,
        }
    }

    pub fn with_terminal(mut self, terminal: SharedTerminal) -> Self {
        self.terminal = terminal;
        self
    }

    /// Wire statement entry to a worker's cooperation point.
    pub fn with_cooperator(mut self, cooperator: Cooperator) -> Self {
        self.cooperator = Some(cooperator);
        self
    }

    pub fn with_cursor(mut self, cursor: SharedCursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn heap(&self) -> &SimulatedHeap {
        &self.heap
    }

    pub fn terminal(&self) -> &SharedTerminal {
        &self.terminal
    }

    // ---------------------------------------------------------------------
    // String table
    // ---------------------------------------------------------------------

    /// Copy every string literal into the heap as a NUL-terminated block.
    pub fn load_string_table(&mut self) -> Result<(), RuntimeError> {
        let program = Arc::clone(&self.program);
        for literal in program.strings() {
            let bytes = literal.as_bytes();
            let block = self.heap.allocate(bytes.len() + 1)?;
            block.write_bytes(0, bytes)?;
            block.write::<u8>(bytes.len(), 0)?;
            self.string_table.push(block);
        }
        tracing::debug!(count = self.string_table.len(), "string table loaded");
        Ok(())
    }

    pub fn string_address(&self, index: usize) -> Result<Address, RuntimeError> {
        self.string_table
            .get(index)
            .map(Allocation::address)
            .ok_or(RuntimeError::UndefinedString(index))
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    /// Run one statement under the engine's boundary protocol.
    pub fn execute_statement(&mut self, stmt: &dyn Statement) -> ExecResult<()> {
        if self.current_function_has_returned() {
            return Ok(());
        }
        self.statement_stack.push(stmt.location());
        let mark = self.temporary_mark();
        let result = self.on_statement_enter().and_then(|()| stmt.execute(self));
        self.release_temporaries(mark);
        result?;
        // Left in place on failure so the fault can be attributed.
        self.statement_stack.pop();
        Ok(())
    }

    /// Called immediately before a statement's effect runs.
    fn on_statement_enter(&mut self) -> ExecResult<()> {
        if let Some(cursor) = &self.cursor {
            *cursor.lock() = self.statement_stack.last().copied();
        }
        if let Some(cooperator) = &self.cooperator {
            cooperator.cooperate()?;
        }
        Ok(())
    }

    /// The innermost statement currently executing
    pub fn current_location(&self) -> Option<SourceLocation> {
        self.statement_stack.last().copied()
    }

    pub fn statement_depth(&self) -> usize {
        self.statement_stack.len()
    }

    // ---------------------------------------------------------------------
    // Frames and scopes
    // ---------------------------------------------------------------------

    pub fn push_function_frame(
        &mut self,
        function_name: &str,
        return_buffer: Option<ReturnBuffer>,
    ) -> Result<(), StackError> {
        self.stack
            .push_frame(FunctionFrame::new(function_name, return_buffer))?;
        tracing::debug!(function = function_name, depth = self.stack.depth(), "push frame");
        Ok(())
    }

    pub fn pop_function_frame(&mut self) -> Result<FunctionFrame, StackError> {
        let frame = self.stack.pop_frame()?;
        tracing::debug!(
            function = %frame.function_name,
            depth = self.stack.depth(),
            "pop frame"
        );
        Ok(frame)
    }

    pub fn push_scope(&mut self) -> Result<(), StackError> {
        self.stack
            .current_frame_mut()
            .ok_or(StackError::NoActiveFrame)?
            .push_scope();
        Ok(())
    }

    pub fn pop_scope(&mut self) -> Result<(), StackError> {
        self.stack
            .current_frame_mut()
            .ok_or(StackError::NoActiveFrame)?
            .pop_scope()
    }

    pub fn call_depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn current_frame(&self) -> Option<&FunctionFrame> {
        self.stack.current_frame()
    }

    /// Innermost scope of the active frame, or the global scope when no
    /// function is running.
    pub fn current_scope_mut(&mut self) -> &mut Scope {
        match self.stack.current_frame_mut() {
            Some(frame) => frame.current_scope_mut(),
            None => &mut self.globals,
        }
    }

    pub fn global_scope(&self) -> &Scope {
        &self.globals
    }

    // ---------------------------------------------------------------------
    // Variables
    // ---------------------------------------------------------------------

    /// Allocate and bind a variable in the current scope.
    pub fn declare_variable(
        &mut self,
        name: &str,
        ty: Type,
        init: Option<Value>,
    ) -> Result<Address, RuntimeError> {
        let var = Variable::allocate(&self.heap, ty)?;
        if let Some(value) = init {
            var.store(value)?;
        }
        let address = var.address();
        self.current_scope_mut().add_variable(name, var);
        Ok(address)
    }

    /// Resolve `name` in the active frame, then in the globals.
    pub fn lookup_variable(&self, name: &str) -> Result<&Variable, RuntimeError> {
        self.stack
            .current_frame()
            .and_then(|frame| frame.lookup(name))
            .or_else(|| self.globals.get_variable(name))
            .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_string()))
    }

    /// Allocate an unnamed object that lives until the enclosing statement ends.
    pub fn allocate_temporary(&mut self, ty: Type) -> Result<&Variable, RuntimeError> {
        let var = Variable::allocate(&self.heap, ty)?;
        self.temporaries.push(var);
        Ok(&self.temporaries[self.temporaries.len() - 1])
    }

    pub fn temporary_mark(&self) -> usize {
        self.temporaries.len()
    }

    /// Free every temporary created since `mark` was taken.
    pub fn release_temporaries(&mut self, mark: usize) {
        if self.temporaries.len() > mark {
            tracing::trace!(count = self.temporaries.len() - mark, "release temporaries");
            self.temporaries.truncate(mark);
        }
    }

    // ---------------------------------------------------------------------
    // Return protocol
    // ---------------------------------------------------------------------

    pub fn return_current_function(&mut self, value: Value) -> Result<(), StackError> {
        self.stack
            .current_frame_mut()
            .ok_or(StackError::NoActiveFrame)?
            .mark_returned(value)
    }

    pub fn current_function_has_returned(&self) -> bool {
        self.stack
            .current_frame()
            .is_some_and(FunctionFrame::has_returned)
    }

    pub fn current_return_buffer(&self) -> Option<&ReturnBuffer> {
        self.stack
            .current_frame()
            .and_then(FunctionFrame::return_buffer)
    }

    // ---------------------------------------------------------------------
    // Calls
    // ---------------------------------------------------------------------

    /// User functions shadow built-ins of the same name.
    pub fn resolve_callable(&self, name: &str) -> Result<Arc<dyn Callable>, RuntimeError> {
        if let Some(function) = self.program.function(name) {
            return Ok(Arc::clone(function) as Arc<dyn Callable>);
        }
        self.builtins
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedFunction(name.to_string()))
    }

    // ---------------------------------------------------------------------
    // Dynamic memory
    // ---------------------------------------------------------------------

    pub fn malloc(&mut self, size: usize) -> Result<Address, MemoryError> {
        let block = self.heap.allocate(size)?;
        let address = block.address();
        self.dynamic.insert(address, block);
        Ok(address)
    }

    pub fn free(&mut self, address: Address) -> Result<(), RuntimeError> {
        self.dynamic
            .remove(&address)
            .map(drop)
            .ok_or(RuntimeError::InvalidFree(address))
    }

    /// Blocks obtained from `malloc` and not yet freed
    pub fn live_dynamic_allocations(&self) -> usize {
        self.dynamic.len()
    }

    // ---------------------------------------------------------------------
    // Output
    // ---------------------------------------------------------------------

    pub fn print(&self, text: String) {
        self.terminal.lock().print(text, self.current_location());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Field, FunctionDef, Stmt, StructDef};
    use pretty_assertions::assert_eq;

    fn context() -> ExecutionContext {
        let heap = SimulatedHeap::new(1024, 8).unwrap();
        ExecutionContext::new(Arc::new(Program::new()), heap, 8)
    }

    #[test]
    fn globals_are_active_without_frames() {
        let mut ctx = context();
        ctx.declare_variable("g", Type::Int, Some(Value::Int(1)))
            .unwrap();
        assert_eq!(ctx.global_scope().len(), 1);
        assert!(!ctx.current_function_has_returned());
        assert_eq!(ctx.push_scope(), Err(StackError::NoActiveFrame));
        assert_eq!(ctx.pop_scope(), Err(StackError::NoActiveFrame));
    }

    #[test]
    fn frames_see_globals_but_not_callers() {
        let mut ctx = context();
        ctx.declare_variable("g", Type::Int, Some(Value::Int(1)))
            .unwrap();

        ctx.push_function_frame("caller", None).unwrap();
        ctx.declare_variable("local", Type::Int, Some(Value::Int(2)))
            .unwrap();

        ctx.push_function_frame("callee", None).unwrap();
        assert!(ctx.lookup_variable("g").is_ok());
        assert_eq!(
            ctx.lookup_variable("local").unwrap_err(),
            RuntimeError::UndefinedVariable("local".to_string())
        );
        ctx.declare_variable("local", Type::Int, Some(Value::Int(3)))
            .unwrap();
        ctx.pop_function_frame().unwrap();

        let local = ctx.lookup_variable("local").unwrap();
        assert_eq!(local.load().unwrap(), Value::Int(2));
    }

    #[test]
    fn popping_frame_frees_its_storage() {
        let mut ctx = context();
        ctx.push_function_frame("f", None).unwrap();
        ctx.declare_variable("a", Type::Int, None).unwrap();
        ctx.push_scope().unwrap();
        ctx.declare_variable("b", Type::Int, None).unwrap();
        assert_eq!(ctx.heap().used_bytes(), 16);
        ctx.pop_function_frame().unwrap();
        assert_eq!(ctx.heap().used_bytes(), 0);
    }

    #[test]
    fn root_scope_cannot_be_popped() {
        let mut ctx = context();
        ctx.push_function_frame("f", None).unwrap();
        ctx.push_scope().unwrap();
        ctx.pop_scope().unwrap();
        assert_eq!(ctx.pop_scope(), Err(StackError::StackUnderflow));
    }

    #[test]
    fn call_depth_is_capped() {
        let mut ctx = context();
        for _ in 0..8 {
            ctx.push_function_frame("f", None).unwrap();
        }
        assert_eq!(
            ctx.push_function_frame("f", None),
            Err(StackError::StackOverflow { limit: 8 })
        );
        assert_eq!(ctx.call_depth(), 8);
    }

    #[test]
    fn statements_after_return_are_skipped() {
        let mut ctx = context();
        ctx.push_function_frame("f", None).unwrap();
        ctx.declare_variable("x", Type::Int, Some(Value::Int(0)))
            .unwrap();

        ctx.return_current_function(Value::Int(7)).unwrap();
        let assign = Stmt::expr(Expr::assign(Expr::var("x"), Expr::int(99)));
        ctx.execute_statement(&assign).unwrap();

        assert_eq!(
            ctx.lookup_variable("x").unwrap().load().unwrap(),
            Value::Int(0)
        );
        assert_eq!(
            ctx.return_current_function(Value::Int(8)),
            Err(StackError::AlreadyReturned)
        );
        let frame = ctx.pop_function_frame().unwrap();
        assert_eq!(frame.into_return_value(), Value::Int(7));
    }

    fn point_maker(body_tail: Stmt) -> Program {
        let point = Type::Struct(Arc::new(StructDef::new(
            "Point",
            vec![Field::new("x", Type::Int), Field::new("y", Type::Int)],
        )));
        Program::new().with_function(FunctionDef::new(
            "make",
            point.clone(),
            vec![],
            vec![
                Stmt::decl("p", point, None),
                Stmt::expr(Expr::assign(Expr::member(Expr::var("p"), "x"), Expr::int(4))),
                body_tail,
            ],
        ))
    }

    fn in_main(program: Program) -> ExecutionContext {
        let heap = SimulatedHeap::new(1024, 8).unwrap();
        let mut ctx = ExecutionContext::new(Arc::new(program), heap, 8);
        ctx.push_function_frame("main", None).unwrap();
        ctx.declare_variable("r", Type::Int, None).unwrap();
        ctx
    }

    #[test]
    fn temporaries_end_with_their_statement() {
        let mut ctx = in_main(point_maker(Stmt::ret(Some(Expr::var("p")))));
        let stmt = Stmt::expr(Expr::assign(
            Expr::var("r"),
            Expr::member(Expr::call("make", vec![]), "x"),
        ));
        // More calls than the heap could hold return buffers for at once.
        for _ in 0..200 {
            ctx.execute_statement(&stmt).unwrap();
        }
        assert_eq!(
            ctx.lookup_variable("r").unwrap().load().unwrap(),
            Value::Int(4)
        );
        assert_eq!(ctx.temporary_mark(), 0);
        assert_eq!(ctx.heap().used_bytes(), 8);
    }

    #[test]
    fn temporaries_released_when_statement_fails() {
        let mut ctx = in_main(point_maker(Stmt::expr(Expr::var("missing"))));
        let stmt = Stmt::expr(Expr::call("make", vec![]));
        assert_eq!(
            ctx.execute_statement(&stmt),
            Err(RuntimeError::UndefinedVariable("missing".to_string()).into())
        );
        assert_eq!(ctx.temporary_mark(), 0);
        assert_eq!(ctx.call_depth(), 1);
        assert_eq!(ctx.heap().used_bytes(), 8);
    }

    #[test]
    fn return_outside_function_fails() {
        let mut ctx = context();
        assert_eq!(
            ctx.return_current_function(Value::Void),
            Err(StackError::NoActiveFrame)
        );
    }

    #[test]
    fn free_rejects_unknown_and_double_free() {
        let mut ctx = context();
        let p = ctx.malloc(12).unwrap();
        assert_eq!(ctx.live_dynamic_allocations(), 1);
        ctx.free(p).unwrap();
        assert_eq!(ctx.free(p), Err(RuntimeError::InvalidFree(p)));
        assert_eq!(ctx.free(0x42), Err(RuntimeError::InvalidFree(0x42)));
    }

    #[test]
    fn string_table_is_nul_terminated() {
        let mut program = Program::new();
        let idx = program.intern("hey");
        let heap = SimulatedHeap::new(256, 8).unwrap();
        let mut ctx = ExecutionContext::new(Arc::new(program), heap.clone(), 4);
        ctx.load_string_table().unwrap();
        let addr = ctx.string_address(idx).unwrap();
        assert_eq!(heap.view(addr).read_c_string().unwrap(), "hey");
        assert_eq!(
            ctx.string_address(5),
            Err(RuntimeError::UndefinedString(5))
        );
    }
}
