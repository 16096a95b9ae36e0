//! User-defined function invocation

use super::context::ExecutionContext;
use super::errors::{ExecResult, RuntimeError};
use crate::ast::{Callable, FunctionDef, Invocation, Type};
use crate::memory::value::coerce;
use crate::memory::Value;

impl Callable for FunctionDef {
    fn name(&self) -> &str {
        &self.name
    }

    fn return_type(&self) -> Type {
        self.return_type.clone()
    }

    fn execute(&self, ctx: &mut ExecutionContext, invocation: Invocation) -> ExecResult<Value> {
        if invocation.args.len() != self.params.len() {
            return Err(RuntimeError::ArgumentCountMismatch {
                function: self.name.clone(),
                expected: self.params.len(),
                got: invocation.args.len(),
            }
            .into());
        }

        ctx.push_function_frame(&self.name, invocation.return_buffer)?;
        let result = self.run_body(ctx, invocation.args);
        // The frame goes away on every path, releasing its locals.
        let frame = ctx.pop_function_frame()?;
        result?;

        // Falling off the end yields void whatever the declared type.
        match frame.into_return_value() {
            Value::Void => Ok(Value::Void),
            value => Ok(coerce(value, &self.return_type)?),
        }
    }
}

impl FunctionDef {
    fn run_body(&self, ctx: &mut ExecutionContext, args: Vec<Value>) -> ExecResult<()> {
        for (param, arg) in self.params.iter().zip(args) {
            ctx.declare_variable(&param.name, param.param_type.clone(), Some(arg))?;
        }
        self.body
            .iter()
            .try_for_each(|stmt| ctx.execute_statement(stmt))
    }
}
