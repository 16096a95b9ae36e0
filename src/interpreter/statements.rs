//! Statement execution
//!
//! [`Stmt`] implements [`Statement`]. Nested statements (block bodies, branches,
//! loop bodies) are always dispatched back through
//! [`ExecutionContext::execute_statement`], so each of them is a separate step
//! and is skipped once the enclosing function has returned.
//!
//! # Control flow
//!
//! - `Block` opens a scope for its body and closes it even when the body fails
//! - `While` re-checks the returned flag before every iteration and releases
//!   the condition's temporaries after each test
//! - `Return` records the value on the frame; struct results are copied into the
//!   caller's return buffer before the callee's storage goes away

use super::context::ExecutionContext;
use super::errors::ExecResult;
use crate::ast::{Expression, SourceLocation, Statement, Stmt};
use crate::memory::Value;

impl Statement for Stmt {
    fn location(&self) -> SourceLocation {
        Stmt::location(self)
    }

    fn execute(&self, ctx: &mut ExecutionContext) -> ExecResult<()> {
        match self {
            Stmt::VarDecl {
                name,
                var_type,
                init,
                ..
            } => {
                let value = match init {
                    Some(expr) => Some(expr.evaluate(ctx)?),
                    None => None,
                };
                let address = ctx.declare_variable(name, var_type.clone(), value)?;
                tracing::trace!(%name, address, "declare");
                Ok(())
            }

            Stmt::Expr { expr, .. } => {
                expr.evaluate(ctx)?;
                Ok(())
            }

            Stmt::Block { body, .. } => execute_block(ctx, body),

            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                if condition.evaluate(ctx)?.is_truthy()? {
                    ctx.execute_statement(then_branch.as_ref())
                } else if let Some(else_branch) = else_branch {
                    ctx.execute_statement(else_branch.as_ref())
                } else {
                    Ok(())
                }
            }

            Stmt::While {
                condition, body, ..
            } => {
                loop {
                    if ctx.current_function_has_returned() {
                        return Ok(());
                    }
                    // Each test of the condition is its own full expression.
                    let mark = ctx.temporary_mark();
                    let proceed = condition.evaluate(ctx).and_then(|v| Ok(v.is_truthy()?));
                    ctx.release_temporaries(mark);
                    if !proceed? {
                        return Ok(());
                    }
                    ctx.execute_statement(body.as_ref())?;
                }
            }

            Stmt::Return { expr, .. } => {
                let value = match expr {
                    Some(expr) => expr.evaluate(ctx)?,
                    None => Value::Void,
                };
                let value = match (value, ctx.current_return_buffer()) {
                    (Value::Struct { address, def }, Some(buffer)) => {
                        buffer.fill_from(address, def.size())?;
                        Value::Struct {
                            address: buffer.address(),
                            def,
                        }
                    }
                    (value, _) => value,
                };
                ctx.return_current_function(value)?;
                Ok(())
            }
        }
    }
}

fn execute_block(ctx: &mut ExecutionContext, body: &[Stmt]) -> ExecResult<()> {
    ctx.push_scope()?;
    let result = body
        .iter()
        .try_for_each(|stmt| ctx.execute_statement(stmt));
    let popped = ctx.pop_scope();
    result?;
    popped?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, Expr, Field, FunctionDef, Program, StructDef, Type};
    use crate::interpreter::errors::{RuntimeError, Unwind};
    use crate::memory::SimulatedHeap;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn in_function() -> ExecutionContext {
        let heap = SimulatedHeap::new(1024, 8).unwrap();
        let mut ctx = ExecutionContext::new(Arc::new(Program::new()), heap, 16);
        ctx.push_function_frame("test", None).unwrap();
        ctx
    }

    fn int_of(ctx: &ExecutionContext, name: &str) -> i32 {
        ctx.lookup_variable(name)
            .unwrap()
            .load()
            .unwrap()
            .as_int()
            .unwrap()
    }

    #[test]
    fn while_loop_counts() {
        let mut ctx = in_function();
        let body = vec![
            Stmt::decl("i", Type::Int, Some(Expr::int(0))),
            Stmt::while_loop(
                Expr::binary(BinOp::Lt, Expr::var("i"), Expr::int(5)),
                Stmt::block(vec![Stmt::expr(Expr::assign(
                    Expr::var("i"),
                    Expr::binary(BinOp::Add, Expr::var("i"), Expr::int(1)),
                ))]),
            ),
        ];
        for stmt in &body {
            ctx.execute_statement(stmt).unwrap();
        }
        assert_eq!(int_of(&ctx, "i"), 5);
    }

    #[test]
    fn loop_condition_temporaries_are_released_each_test() {
        // struct Point one() { struct Point p; p.x = 1; return p; }
        let point = Type::Struct(Arc::new(StructDef::new(
            "Point",
            vec![Field::new("x", Type::Int), Field::new("y", Type::Int)],
        )));
        let one = FunctionDef::new(
            "one",
            point.clone(),
            vec![],
            vec![
                Stmt::decl("p", point, None),
                Stmt::expr(Expr::assign(Expr::member(Expr::var("p"), "x"), Expr::int(1))),
                Stmt::ret(Some(Expr::var("p"))),
            ],
        );
        let heap = SimulatedHeap::new(1024, 8).unwrap();
        let program = Program::new().with_function(one);
        let mut ctx = ExecutionContext::new(Arc::new(program), heap, 16);
        ctx.push_function_frame("test", None).unwrap();

        // while (i < 300 && one().x) i = i + 1;
        let stmts = vec![
            Stmt::decl("i", Type::Int, Some(Expr::int(0))),
            Stmt::while_loop(
                Expr::binary(
                    BinOp::And,
                    Expr::binary(BinOp::Lt, Expr::var("i"), Expr::int(300)),
                    Expr::member(Expr::call("one", vec![]), "x"),
                ),
                Stmt::expr(Expr::assign(
                    Expr::var("i"),
                    Expr::binary(BinOp::Add, Expr::var("i"), Expr::int(1)),
                )),
            ),
        ];
        for stmt in &stmts {
            ctx.execute_statement(stmt).unwrap();
        }
        assert_eq!(int_of(&ctx, "i"), 300);
        assert_eq!(ctx.heap().used_bytes(), 8);
    }

    #[test]
    fn block_scope_is_released() {
        let mut ctx = in_function();
        let block = Stmt::block(vec![Stmt::decl("tmp", Type::Int, Some(Expr::int(1)))]);
        ctx.execute_statement(&block).unwrap();
        assert!(ctx.lookup_variable("tmp").is_err());
        assert_eq!(ctx.heap().used_bytes(), 0);
    }

    #[test]
    fn block_scope_is_released_on_fault() {
        let mut ctx = in_function();
        let block = Stmt::block(vec![
            Stmt::decl("tmp", Type::Int, Some(Expr::int(1))),
            Stmt::expr(Expr::var("missing")).at(9),
        ]);
        let err = ctx.execute_statement(&block).unwrap_err();
        assert_eq!(
            err,
            Unwind::Fault(RuntimeError::UndefinedVariable("missing".to_string()))
        );
        assert_eq!(ctx.heap().used_bytes(), 0);
        assert_eq!(ctx.current_location().map(|l| l.line), Some(9));
    }

    #[test]
    fn if_takes_else_branch() {
        let mut ctx = in_function();
        ctx.execute_statement(&Stmt::decl("r", Type::Int, Some(Expr::int(0))))
            .unwrap();
        let stmt = Stmt::if_else(
            Expr::int(0),
            Stmt::expr(Expr::assign(Expr::var("r"), Expr::int(1))),
            Some(Stmt::expr(Expr::assign(Expr::var("r"), Expr::int(2)))),
        );
        ctx.execute_statement(&stmt).unwrap();
        assert_eq!(int_of(&ctx, "r"), 2);
    }

    #[test]
    fn return_inside_loop_stops_iteration() {
        let mut ctx = in_function();
        let stmts = vec![
            Stmt::decl("n", Type::Int, Some(Expr::int(0))),
            Stmt::while_loop(
                Expr::int(1),
                Stmt::block(vec![
                    Stmt::expr(Expr::assign(
                        Expr::var("n"),
                        Expr::binary(BinOp::Add, Expr::var("n"), Expr::int(1)),
                    )),
                    Stmt::if_else(
                        Expr::binary(BinOp::Eq, Expr::var("n"), Expr::int(3)),
                        Stmt::ret(Some(Expr::var("n"))),
                        None,
                    ),
                ]),
            ),
        ];
        for stmt in &stmts {
            ctx.execute_statement(stmt).unwrap();
        }
        assert!(ctx.current_function_has_returned());
        let frame = ctx.pop_function_frame().unwrap();
        assert_eq!(frame.into_return_value(), Value::Int(3));
    }
}
