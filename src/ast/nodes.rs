// AST node definitions for the virtual machine

use super::SourceLocation;
use std::fmt;
use std::sync::Arc;

/// Object types. Sizes are fixed and platform-independent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Void,
    Int,
    Char,
    Pointer(Box<Type>),
    Struct(Arc<StructDef>),
}

impl Type {
    /// Size in bytes; `void` has none
    pub fn size(&self) -> usize {
        match self {
            Type::Void => 0,
            Type::Int => 4,
            Type::Char => 1,
            Type::Pointer(_) => 8,
            Type::Struct(def) => def.size(),
        }
    }

    pub fn pointer_to(self) -> Type {
        Type::Pointer(Box::new(self))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int => write!(f, "int"),
            Type::Char => write!(f, "char"),
            Type::Pointer(inner) => write!(f, "{}*", inner),
            Type::Struct(def) => write!(f, "struct {}", def.name),
        }
    }
}

/// Struct field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub field_type: Type,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: Type) -> Self {
        Field {
            name: name.into(),
            field_type,
        }
    }
}

/// Struct definition; fields are packed in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Field>,
}

impl StructDef {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        StructDef {
            name: name.into(),
            fields,
        }
    }

    pub fn size(&self) -> usize {
        self.fields.iter().map(|f| f.field_type.size()).sum()
    }

    /// Byte offset and type of `name`
    pub fn field(&self, name: &str) -> Option<(usize, &Type)> {
        let mut offset = 0;
        for field in &self.fields {
            if field.name == name {
                return Some((offset, &field.field_type));
            }
            offset += field.field_type.size();
        }
        None
    }
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub param_type: Type,
}

impl Param {
    pub fn new(name: impl Into<String>, param_type: Type) -> Self {
        Param {
            name: name.into(),
            param_type,
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg, // -x
    Not, // !x
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLiteral(i32),
    CharLiteral(i8),
    /// Index into the program's string table
    StringLiteral(usize),
    Null,
    Variable(String),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    AddrOf(Box<Expr>),
    Deref {
        pointer: Box<Expr>,
        pointee: Type,
    },
    Member {
        object: Box<Expr>,
        field: String,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn int(n: i32) -> Self {
        Expr::IntLiteral(n)
    }

    pub fn char(c: u8) -> Self {
        Expr::CharLiteral(c as i8)
    }

    pub fn string(index: usize) -> Self {
        Expr::StringLiteral(index)
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Variable(name.into())
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn addr_of(operand: Expr) -> Self {
        Expr::AddrOf(Box::new(operand))
    }

    pub fn deref(pointer: Expr, pointee: Type) -> Self {
        Expr::Deref {
            pointer: Box::new(pointer),
            pointee,
        }
    }

    pub fn member(object: Expr, field: impl Into<String>) -> Self {
        Expr::Member {
            object: Box::new(object),
            field: field.into(),
        }
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Expr::Assign {
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    VarDecl {
        name: String,
        var_type: Type,
        init: Option<Expr>,
        location: SourceLocation,
    },
    Expr {
        expr: Expr,
        location: SourceLocation,
    },
    Block {
        body: Vec<Stmt>,
        location: SourceLocation,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
        location: SourceLocation,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
        location: SourceLocation,
    },
    Return {
        expr: Option<Expr>,
        location: SourceLocation,
    },
}

impl Stmt {
    pub fn decl(name: impl Into<String>, var_type: Type, init: Option<Expr>) -> Self {
        Stmt::VarDecl {
            name: name.into(),
            var_type,
            init,
            location: SourceLocation::default(),
        }
    }

    pub fn expr(expr: Expr) -> Self {
        Stmt::Expr {
            expr,
            location: SourceLocation::default(),
        }
    }

    pub fn block(body: Vec<Stmt>) -> Self {
        Stmt::Block {
            body,
            location: SourceLocation::default(),
        }
    }

    pub fn if_else(condition: Expr, then_branch: Stmt, else_branch: Option<Stmt>) -> Self {
        Stmt::If {
            condition,
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
            location: SourceLocation::default(),
        }
    }

    pub fn while_loop(condition: Expr, body: Stmt) -> Self {
        Stmt::While {
            condition,
            body: Box::new(body),
            location: SourceLocation::default(),
        }
    }

    pub fn ret(expr: Option<Expr>) -> Self {
        Stmt::Return {
            expr,
            location: SourceLocation::default(),
        }
    }

    /// Attach a source line
    pub fn at(mut self, line: usize) -> Self {
        *self.location_mut() = SourceLocation::new(line, 1);
        self
    }

    pub fn location(&self) -> SourceLocation {
        match self {
            Stmt::VarDecl { location, .. }
            | Stmt::Expr { location, .. }
            | Stmt::Block { location, .. }
            | Stmt::If { location, .. }
            | Stmt::While { location, .. }
            | Stmt::Return { location, .. } => *location,
        }
    }

    fn location_mut(&mut self) -> &mut SourceLocation {
        match self {
            Stmt::VarDecl { location, .. }
            | Stmt::Expr { location, .. }
            | Stmt::Block { location, .. }
            | Stmt::If { location, .. }
            | Stmt::While { location, .. }
            | Stmt::Return { location, .. } => location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn struct_fields_are_packed() {
        let def = StructDef::new(
            "Mixed",
            vec![
                Field::new("c", Type::Char),
                Field::new("n", Type::Int),
                Field::new("p", Type::Char.pointer_to()),
            ],
        );
        assert_eq!(def.size(), 13);
        assert_eq!(def.field("n").map(|(off, _)| off), Some(1));
        assert_eq!(def.field("p").map(|(off, _)| off), Some(5));
        assert!(def.field("missing").is_none());
    }

    #[test]
    fn type_display() {
        let point = Arc::new(StructDef::new("Point", vec![]));
        assert_eq!(Type::Int.pointer_to().pointer_to().to_string(), "int**");
        assert_eq!(Type::Struct(point).to_string(), "struct Point");
    }

    #[test]
    fn at_sets_line() {
        assert_eq!(Stmt::ret(None).at(7).location().line, 7);
    }
}
