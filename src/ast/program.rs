//! Whole-program container
//!
//! A [`Program`] is immutable once handed to the virtual machine. It is shared
//! with the worker thread behind an `Arc`, which is why every node type is
//! `Send + Sync`.

use super::nodes::{Param, Stmt, Type};
use super::SourceLocation;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A user-defined function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub return_type: Type,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub location: SourceLocation,
}

impl FunctionDef {
    pub fn new(
        name: impl Into<String>,
        return_type: Type,
        params: Vec<Param>,
        body: Vec<Stmt>,
    ) -> Self {
        FunctionDef {
            name: name.into(),
            return_type,
            params,
            body,
            location: SourceLocation::default(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct Program {
    globals: Vec<Stmt>,
    functions: FxHashMap<String, Arc<FunctionDef>>,
    strings: Vec<String>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a top-level statement; globals run in insertion order.
    pub fn add_global(&mut self, stmt: Stmt) {
        self.globals.push(stmt);
    }

    pub fn with_global(mut self, stmt: Stmt) -> Self {
        self.add_global(stmt);
        self
    }

    /// Register a function, replacing any earlier definition of the same name.
    pub fn add_function(&mut self, function: FunctionDef) {
        self.functions
            .insert(function.name.clone(), Arc::new(function));
    }

    pub fn with_function(mut self, function: FunctionDef) -> Self {
        self.add_function(function);
        self
    }

    /// Add a string literal to the table, returning its index. Identical
    /// literals share one entry.
    pub fn intern(&mut self, literal: impl Into<String>) -> usize {
        let literal = literal.into();
        if let Some(index) = self.strings.iter().position(|s| *s == literal) {
            return index;
        }
        self.strings.push(literal);
        self.strings.len() - 1
    }

    pub fn function(&self, name: &str) -> Option<&Arc<FunctionDef>> {
        self.functions.get(name)
    }

    pub fn globals(&self) -> &[Stmt] {
        &self.globals
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }
}
