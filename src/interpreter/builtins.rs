//! Built-in function implementations
//!
//! These are resolved by name when no user function of the same name exists.
//!
//! # Supported Built-ins
//!
//! - `printf(format, ...)`: formatted output to the terminal
//! - `puts(s)`, `putchar(c)`: unformatted output
//! - `malloc(size)`: heap allocation; yields `NULL` when the heap is exhausted
//! - `free(ptr)`: release a `malloc`'d block; `free(NULL)` does nothing
//!
//! # Implementation Notes
//!
//! - `printf` supports `%d`, `%i`, `%u`, `%x`, `%c`, `%s`, `%p` and `%%`
//! - `free` of an address that `malloc` did not return, or that was already
//!   freed, is a runtime error

use super::context::ExecutionContext;
use super::errors::{ExecResult, MemoryError, RuntimeError};
use crate::ast::{Callable, Invocation, Type};
use crate::memory::{Address, Value};
use rustc_hash::FxHashMap;
use std::sync::Arc;

type BuiltinFn = fn(&mut ExecutionContext, &[Value]) -> ExecResult<Value>;

/// A host-implemented function
pub struct Builtin {
    name: &'static str,
    return_type: Type,
    /// `None` for variadic functions
    arity: Option<usize>,
    func: BuiltinFn,
}

impl Callable for Builtin {
    fn name(&self) -> &str {
        self.name
    }

    fn return_type(&self) -> Type {
        self.return_type.clone()
    }

    fn execute(&self, ctx: &mut ExecutionContext, invocation: Invocation) -> ExecResult<Value> {
        if let Some(expected) = self.arity {
            if invocation.args.len() != expected {
                return Err(RuntimeError::ArgumentCountMismatch {
                    function: self.name.to_string(),
                    expected,
                    got: invocation.args.len(),
                }
                .into());
            }
        }
        (self.func)(ctx, &invocation.args)
    }
}

pub fn standard_library() -> FxHashMap<&'static str, Arc<dyn Callable>> {
    let builtins = [
        Builtin {
            name: "printf",
            return_type: Type::Int,
            arity: None,
            func: builtin_printf,
        },
        Builtin {
            name: "puts",
            return_type: Type::Int,
            arity: Some(1),
            func: builtin_puts,
        },
        Builtin {
            name: "putchar",
            return_type: Type::Int,
            arity: Some(1),
            func: builtin_putchar,
        },
        Builtin {
            name: "malloc",
            return_type: Type::Void.pointer_to(),
            arity: Some(1),
            func: builtin_malloc,
        },
        Builtin {
            name: "free",
            return_type: Type::Void,
            arity: Some(1),
            func: builtin_free,
        },
    ];
    builtins
        .into_iter()
        .map(|b| (b.name, Arc::new(b) as Arc<dyn Callable>))
        .collect()
}

fn builtin_printf(ctx: &mut ExecutionContext, args: &[Value]) -> ExecResult<Value> {
    let (format, rest) = args.split_first().ok_or_else(|| {
        RuntimeError::InvalidPrintfFormat("printf requires at least one argument".to_string())
    })?;
    let format = read_string(ctx, format.as_pointer()?)?;
    let output = format_printf(ctx, &format, rest)?;
    let written = output.len() as i32;
    ctx.print(output);
    Ok(Value::Int(written))
}

fn builtin_puts(ctx: &mut ExecutionContext, args: &[Value]) -> ExecResult<Value> {
    let mut text = read_string(ctx, args[0].as_pointer()?)?;
    text.push('\n');
    ctx.print(text);
    Ok(Value::Int(0))
}

fn builtin_putchar(ctx: &mut ExecutionContext, args: &[Value]) -> ExecResult<Value> {
    let c = args[0].as_int()?;
    ctx.print(char::from(c as u8).to_string());
    Ok(Value::Int(c & 0xff))
}

fn builtin_malloc(ctx: &mut ExecutionContext, args: &[Value]) -> ExecResult<Value> {
    let size = args[0].as_int()?;
    if size <= 0 {
        return Err(RuntimeError::InvalidMallocSize(size).into());
    }
    match ctx.malloc(size as usize) {
        Ok(address) => {
            tracing::trace!(size, address, "malloc");
            Ok(Value::Pointer(address))
        }
        Err(MemoryError::OutOfMemory { requested, available }) => {
            tracing::trace!(requested, available, "malloc exhausted heap");
            Ok(Value::Pointer(0))
        }
        Err(e) => Err(e.into()),
    }
}

fn builtin_free(ctx: &mut ExecutionContext, args: &[Value]) -> ExecResult<Value> {
    let address = args[0].as_pointer()?;
    if address != 0 {
        ctx.free(address)?;
        tracing::trace!(address, "free");
    }
    Ok(Value::Void)
}

fn read_string(ctx: &ExecutionContext, address: Address) -> Result<String, RuntimeError> {
    Ok(ctx.heap().view(address).read_c_string()?)
}

fn format_printf(
    ctx: &ExecutionContext,
    format: &str,
    args: &[Value],
) -> Result<String, RuntimeError> {
    let mut output = String::new();
    let mut chars = format.chars();
    let mut args = args.iter();

    let mut next_arg = |spec: char| {
        args.next().ok_or_else(|| {
            RuntimeError::InvalidPrintfFormat(format!("missing argument for %{}", spec))
        })
    };

    while let Some(ch) = chars.next() {
        if ch != '%' {
            output.push(ch);
            continue;
        }
        let Some(spec) = chars.next() else {
            output.push('%');
            break;
        };
        match spec {
            '%' => output.push('%'),
            'd' | 'i' => {
                let n = next_arg(spec)?.as_int()?;
                output.push_str(&n.to_string());
            }
            'u' => {
                let n = next_arg(spec)?.as_int()?;
                output.push_str(&(n as u32).to_string());
            }
            'x' => {
                let n = next_arg(spec)?.as_int()?;
                output.push_str(&format!("{:x}", n as u32));
            }
            'c' => {
                let n = next_arg(spec)?.as_int()?;
                output.push(char::from(n as u8));
            }
            's' => match next_arg(spec)?.as_pointer()? {
                0 => output.push_str("(null)"),
                address => output.push_str(&read_string(ctx, address)?),
            },
            'p' => {
                let address = next_arg(spec)?.as_pointer()?;
                output.push_str(&format!("0x{:x}", address));
            }
            other => {
                return Err(RuntimeError::InvalidPrintfFormat(format!(
                    "unsupported format specifier %{}",
                    other
                )));
            }
        }
    }

    Ok(output)
}
