//! Expression evaluation
//!
//! [`Expr`] implements [`Expression`]. Arithmetic is carried out on `i32` with
//! overflow and division checks; `char` operands are promoted first. Comparison
//! and logical operators yield `int` 0 or 1, and `&&`/`||` short-circuit.
//!
//! Lvalues (`x`, `*p`, `s.f`) resolve to a [`Place`]; `&e` takes the address of
//! a place and assignment stores through one.

use super::context::ExecutionContext;
use super::errors::{ExecResult, RuntimeError};
use crate::ast::{BinOp, Expr, Expression, Invocation, Place, UnOp};
use crate::memory::value;
use crate::memory::{ReturnBuffer, Value};

impl Expression for Expr {
    fn evaluate(&self, ctx: &mut ExecutionContext) -> ExecResult<Value> {
        match self {
            Expr::IntLiteral(n) => Ok(Value::Int(*n)),
            Expr::CharLiteral(c) => Ok(Value::Char(*c)),
            Expr::StringLiteral(index) => Ok(Value::Pointer(ctx.string_address(*index)?)),
            Expr::Null => Ok(Value::Pointer(0)),

            Expr::Variable(name) => Ok(ctx.lookup_variable(name)?.load()?),

            Expr::Binary { op, left, right } => evaluate_binary(ctx, *op, left, right),

            Expr::Unary { op, operand } => {
                let value = operand.evaluate(ctx)?;
                match op {
                    UnOp::Neg => value
                        .as_int()?
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| RuntimeError::IntegerOverflow("negation").into()),
                    UnOp::Not => Ok(bool_value(!value.is_truthy()?)),
                }
            }

            Expr::AddrOf(operand) => Ok(Value::Pointer(operand.place(ctx)?.address)),

            Expr::Deref { .. } | Expr::Member { .. } => {
                let place = self.place(ctx)?;
                Ok(value::load(ctx.heap(), place.address, &place.ty)?)
            }

            Expr::Assign { target, value: rhs } => {
                let rhs = rhs.evaluate(ctx)?;
                let place = target.place(ctx)?;
                value::store(ctx.heap(), place.address, &place.ty, rhs)?;
                Ok(value::load(ctx.heap(), place.address, &place.ty)?)
            }

            Expr::Call { name, args } => {
                let callee = ctx.resolve_callable(name)?;
                let args = args
                    .iter()
                    .map(|arg| arg.evaluate(ctx))
                    .collect::<ExecResult<Vec<_>>>()?;

                let return_type = callee.return_type();
                let return_buffer = if return_type.is_struct() {
                    let temporary = ctx.allocate_temporary(return_type)?;
                    Some(ReturnBuffer::over(temporary.storage())?)
                } else {
                    None
                };

                callee.execute(
                    ctx,
                    Invocation {
                        args,
                        return_buffer,
                    },
                )
            }
        }
    }

    fn place(&self, ctx: &mut ExecutionContext) -> ExecResult<Place> {
        match self {
            Expr::Variable(name) => {
                let var = ctx.lookup_variable(name)?;
                Ok(Place {
                    address: var.address(),
                    ty: var.ty().clone(),
                })
            }

            Expr::Deref { pointer, pointee } => {
                let address = pointer.evaluate(ctx)?.as_pointer()?;
                Ok(Place {
                    address,
                    ty: pointee.clone(),
                })
            }

            // Struct values are references, so an rvalue struct (a call
            // result) still has a place.
            Expr::Member { object, field } => match object.evaluate(ctx)? {
                Value::Struct { address, def } => {
                    let (offset, ty) =
                        def.field(field)
                            .ok_or_else(|| RuntimeError::MissingStructField {
                                struct_name: def.name.clone(),
                                field: field.clone(),
                            })?;
                    Ok(Place {
                        address: address + offset as u64,
                        ty: ty.clone(),
                    })
                }
                other => Err(RuntimeError::type_mismatch("struct", other).into()),
            },

            _ => Err(RuntimeError::NotAnLvalue.into()),
        }
    }
}

fn bool_value(b: bool) -> Value {
    Value::Int(b as i32)
}

fn evaluate_binary(
    ctx: &mut ExecutionContext,
    op: BinOp,
    left: &Expr,
    right: &Expr,
) -> ExecResult<Value> {
    match op {
        BinOp::And => {
            if !left.evaluate(ctx)?.is_truthy()? {
                return Ok(bool_value(false));
            }
            return Ok(bool_value(right.evaluate(ctx)?.is_truthy()?));
        }
        BinOp::Or => {
            if left.evaluate(ctx)?.is_truthy()? {
                return Ok(bool_value(true));
            }
            return Ok(bool_value(right.evaluate(ctx)?.is_truthy()?));
        }
        _ => {}
    }

    let lhs = left.evaluate(ctx)?;
    let rhs = right.evaluate(ctx)?;

    if matches!(lhs, Value::Pointer(_)) || matches!(rhs, Value::Pointer(_)) {
        return Ok(compare_pointers(op, &lhs, &rhs)?);
    }

    let a = lhs.as_int()?;
    let b = rhs.as_int()?;
    let result = match op {
        BinOp::Add => a
            .checked_add(b)
            .ok_or(RuntimeError::IntegerOverflow("addition"))?,
        BinOp::Sub => a
            .checked_sub(b)
            .ok_or(RuntimeError::IntegerOverflow("subtraction"))?,
        BinOp::Mul => a
            .checked_mul(b)
            .ok_or(RuntimeError::IntegerOverflow("multiplication"))?,
        BinOp::Div => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero("division").into());
            }
            a.checked_div(b)
                .ok_or(RuntimeError::IntegerOverflow("division"))?
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero("modulo").into());
            }
            a.checked_rem(b)
                .ok_or(RuntimeError::IntegerOverflow("modulo"))?
        }
        BinOp::Eq => (a == b) as i32,
        BinOp::Ne => (a != b) as i32,
        BinOp::Lt => (a < b) as i32,
        BinOp::Le => (a <= b) as i32,
        BinOp::Gt => (a > b) as i32,
        BinOp::Ge => (a >= b) as i32,
        BinOp::And | BinOp::Or => unreachable!("short-circuit operators handled above"),
    };
    Ok(Value::Int(result))
}

/// Pointers only support comparison, including against a literal `0`.
fn compare_pointers(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
    let a = lhs.as_pointer()?;
    let b = rhs.as_pointer()?;
    let result = match op {
        BinOp::Eq => a == b,
        BinOp::Ne => a != b,
        BinOp::Lt => a < b,
        BinOp::Le => a <= b,
        BinOp::Gt => a > b,
        BinOp::Ge => a >= b,
        _ => {
            return Err(RuntimeError::TypeMismatch {
                expected: "int operands".to_string(),
                got: format!("{:?} {:?} {:?}", lhs, op, rhs),
            })
        }
    };
    Ok(bool_value(result))
}
