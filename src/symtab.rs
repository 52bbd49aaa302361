//! Name resolution as the generator consumes it: the [`Resolver`] contract, and a
//! [`SymbolTable`] that satisfies it for a whole [`Program`].
use crate::ast::{Expr, Function, Item, Place, Program, Statement, Variable};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Function(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global scope"),
            Self::Function(name) => write!(f, "scope of `{}`", name),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unknown name `{name}` in {scope}")]
    UnknownName { scope: Scope, name: String },
    #[error("`{0}` is not a function")]
    NotAFunction(String),
    #[error("no {0}")]
    UnknownScope(Scope),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    #[error("`{name}` was already declared in {scope}")]
    Redeclared { scope: Scope, name: String },
}

/// What the generator needs to know about names it did not declare itself.
pub trait Resolver {
    /// Memory location of `name` as seen from `scope`
    fn resolve(&self, scope: &Scope, name: &str) -> Result<i32, ResolveError>;
    /// Global cell holding the entry address of `function`
    fn resolve_function_slot(&self, scope: &Scope, function: &str) -> Result<i32, ResolveError>;
    /// `(slot index, name)` of every declared parameter of `function`
    fn scope_parameters(&self, function: &str) -> Result<Vec<(usize, String)>, ResolveError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Array(usize),
    Function,
    Parameter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub location: i32,
}

type Names = HashMap<String, Symbol>;

/// Scopes are flat: one global scope and one per function. Globals are laid out from address 0
/// in declaration order; names first used by top-level statements become globals at that point.
#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: HashMap<Scope, Names>,
    next_global: i32,
}

impl SymbolTable {
    pub fn build(program: &Program) -> Result<Self, SymbolError> {
        let mut table = Self::default();
        table.scopes.insert(Scope::Global, Names::new());
        // declarations first, so a statement may use a global declared after it
        for item in &program.items {
            match item {
                Item::Variable(variable) => table.declare_global(variable)?,
                Item::Function(function) => table.declare_function(function)?,
                Item::Statement(_) => {}
            }
        }
        for item in &program.items {
            if let Item::Statement(statement) = item {
                table.declare_implicit(statement);
            }
        }
        Ok(table)
    }

    fn declare_function(&mut self, function: &Function) -> Result<(), SymbolError> {
        self.allocate_global(&function.name, SymbolKind::Function, 1)?;
        let scope = Scope::Function(function.name.clone());
        let mut names = Names::new();
        for (index, parameter) in function.parameters.iter().enumerate() {
            let location = index as i32;
            insert_unique(&mut names, &scope, parameter, SymbolKind::Parameter, location)?;
        }
        let mut next_local = 0;
        for local in &function.locals {
            insert_unique(&mut names, &scope, &local.name, kind_of(local), next_local)?;
            next_local += local.slots() as i32;
        }
        self.scopes.insert(scope, names);
        Ok(())
    }

    /// Number of global cells handed out so far
    pub fn global_size(&self) -> i32 {
        self.next_global
    }

    pub fn lookup(&self, scope: &Scope, name: &str) -> Option<&Symbol> {
        self.scopes.get(scope)?.get(name)
    }

    fn globals_mut(&mut self) -> &mut Names {
        self.scopes.entry(Scope::Global).or_default()
    }

    fn declare_global(&mut self, variable: &Variable) -> Result<(), SymbolError> {
        self.allocate_global(&variable.name, kind_of(variable), variable.slots())
    }

    fn allocate_global(
        &mut self,
        name: &str,
        kind: SymbolKind,
        slots: usize,
    ) -> Result<(), SymbolError> {
        let location = self.next_global;
        insert_unique(self.globals_mut(), &Scope::Global, name, kind, location)?;
        self.next_global += slots as i32;
        Ok(())
    }

    fn declare_implicit(&mut self, statement: &Statement) {
        match statement {
            Statement::If {
                test,
                then_branch,
                else_branch,
            } => {
                self.declare_implicit_expr(test);
                then_branch.iter().for_each(|s| self.declare_implicit(s));
                else_branch.iter().for_each(|s| self.declare_implicit(s));
            }
            Statement::Repeat { body, test } => {
                body.iter().for_each(|s| self.declare_implicit(s));
                self.declare_implicit_expr(test);
            }
            Statement::Assign { target, value } => {
                self.declare_implicit_place(target);
                self.declare_implicit_expr(value);
            }
            Statement::Read { target } => self.declare_implicit_place(target),
            Statement::Write { value } | Statement::Expression(value) => {
                self.declare_implicit_expr(value)
            }
            Statement::Return(value) => {
                if let Some(value) = value {
                    self.declare_implicit_expr(value)
                }
            }
        }
    }

    fn declare_implicit_place(&mut self, place: &Place) {
        if let Some(index) = &place.index {
            self.declare_implicit_expr(index);
        }
        self.declare_implicit_name(&place.name);
    }

    fn declare_implicit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Constant(_) => {}
            Expr::Identifier(name) => self.declare_implicit_name(name),
            Expr::Index { name, index } => {
                self.declare_implicit_expr(index);
                self.declare_implicit_name(name);
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.declare_implicit_expr(lhs);
                self.declare_implicit_expr(rhs);
            }
            Expr::Call { arguments, .. } => {
                arguments.iter().for_each(|a| self.declare_implicit_expr(a))
            }
        }
    }

    fn declare_implicit_name(&mut self, name: &str) {
        if self.lookup(&Scope::Global, name).is_none() {
            tracing::trace!(
                target: "symtab",
                "implicitly declaring {name:?} at {}",
                self.next_global
            );
            let location = self.next_global;
            self.globals_mut().insert(
                name.to_string(),
                Symbol {
                    kind: SymbolKind::Variable,
                    location,
                },
            );
            self.next_global += 1;
        }
    }
}

fn kind_of(variable: &Variable) -> SymbolKind {
    match variable.length {
        Some(length) => SymbolKind::Array(length),
        None => SymbolKind::Variable,
    }
}

fn insert_unique(
    names: &mut Names,
    scope: &Scope,
    name: &str,
    kind: SymbolKind,
    location: i32,
) -> Result<(), SymbolError> {
    if names.contains_key(name) {
        return Err(SymbolError::Redeclared {
            scope: scope.clone(),
            name: name.to_string(),
        });
    }
    names.insert(name.to_string(), Symbol { kind, location });
    Ok(())
}

impl Resolver for SymbolTable {
    fn resolve(&self, scope: &Scope, name: &str) -> Result<i32, ResolveError> {
        if !self.scopes.contains_key(scope) {
            return Err(ResolveError::UnknownScope(scope.clone()));
        }
        self.lookup(scope, name)
            .or_else(|| self.lookup(&Scope::Global, name))
            .map(|symbol| symbol.location)
            .ok_or_else(|| ResolveError::UnknownName {
                scope: scope.clone(),
                name: name.to_string(),
            })
    }

    fn resolve_function_slot(&self, scope: &Scope, function: &str) -> Result<i32, ResolveError> {
        // functions only ever live in the global scope
        match self.lookup(&Scope::Global, function) {
            Some(Symbol {
                kind: SymbolKind::Function,
                location,
            }) => Ok(*location),
            Some(_) => Err(ResolveError::NotAFunction(function.to_string())),
            None => Err(ResolveError::UnknownName {
                scope: scope.clone(),
                name: function.to_string(),
            }),
        }
    }

    fn scope_parameters(&self, function: &str) -> Result<Vec<(usize, String)>, ResolveError> {
        let scope = Scope::Function(function.to_string());
        let names = self
            .scopes
            .get(&scope)
            .ok_or_else(|| ResolveError::UnknownScope(scope.clone()))?;
        let mut parameters: Vec<_> = names
            .iter()
            .filter(|(_, symbol)| symbol.kind == SymbolKind::Parameter)
            .map(|(name, symbol)| (symbol.location as usize, name.clone()))
            .collect();
        parameters.sort();
        Ok(parameters)
    }
}
