//! Syntax tree handed over by the front end. The generator only reads it.
use std::fmt;

/// Name of the function the machine enters after the function table has run.
pub const MAIN: &str = "main";

#[derive(Debug, Default)]
pub struct Program {
    pub items: Vec<Item>,
}

/// One entry of the top-level sibling list
#[derive(Debug)]
pub enum Item {
    Variable(Variable),
    Function(Function),
    Statement(Statement),
}

impl Item {
    /// Number of global memory cells this item accounts for. Arrays take their declared length,
    /// everything else takes one.
    pub fn footprint(&self) -> usize {
        match self {
            Self::Variable(variable) => variable.slots(),
            Self::Function(_) | Self::Statement(_) => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    /// `Some(n)` for an array of `n` cells
    pub length: Option<usize>,
}

impl Variable {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            length: None,
        }
    }
    pub fn array(name: impl Into<String>, length: usize) -> Self {
        Self {
            name: name.into(),
            length: Some(length),
        }
    }
    pub fn slots(&self) -> usize {
        self.length.unwrap_or(1)
    }
}

#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub parameters: Vec<String>,
    pub locals: Vec<Variable>,
    pub body: Vec<Statement>,
}

#[derive(Debug)]
pub enum Statement {
    If {
        test: Expr,
        then_branch: Vec<Statement>,
        else_branch: Vec<Statement>,
    },
    /// `repeat body until test`: the body runs again while `test` is false
    Repeat {
        body: Vec<Statement>,
        test: Expr,
    },
    Assign {
        target: Place,
        value: Expr,
    },
    Read {
        target: Place,
    },
    Write {
        value: Expr,
    },
    Return(Option<Expr>),
    /// Expression evaluated only for its effect (a call)
    Expression(Expr),
}

impl Statement {
    pub fn assign(target: impl Into<Place>, value: Expr) -> Self {
        Self::Assign {
            target: target.into(),
            value,
        }
    }
    pub fn read(target: impl Into<Place>) -> Self {
        Self::Read {
            target: target.into(),
        }
    }
    pub fn write(value: Expr) -> Self {
        Self::Write { value }
    }
}

/// Something a value can be stored into
#[derive(Debug)]
pub struct Place {
    pub name: String,
    pub index: Option<Expr>,
}

impl Place {
    pub fn element(name: impl Into<String>, index: Expr) -> Self {
        Self {
            name: name.into(),
            index: Some(index),
        }
    }
}

impl From<&str> for Place {
    fn from(name: &str) -> Self {
        Self {
            name: name.to_string(),
            index: None,
        }
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.index {
            Some(_) => write!(f, "{}[..]", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug)]
pub enum Expr {
    Constant(i32),
    Identifier(String),
    Index {
        name: String,
        index: Box<Expr>,
    },
    Binary {
        operator: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        callee: String,
        arguments: Vec<Expr>,
    },
}

impl Expr {
    pub fn id(name: impl Into<String>) -> Self {
        Self::Identifier(name.into())
    }
    pub fn binary(operator: impl Into<BinaryOp>, lhs: Expr, rhs: Expr) -> Self {
        Self::Binary {
            operator: operator.into(),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
    pub fn index(name: impl Into<String>, index: Expr) -> Self {
        Self::Index {
            name: name.into(),
            index: Box::new(index),
        }
    }
    pub fn call(callee: impl Into<String>, arguments: Vec<Expr>) -> Self {
        Self::Call {
            callee: callee.into(),
            arguments,
        }
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Self::Constant(value)
    }
}

/// Includes anything that is related to basic arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    /// `+` operator
    Add,
    /// `-` (binary) operator
    Subtract,
    /// `*` operator
    Multiply,
    /// `/` operator
    Divide,
    /// `%` operator
    Modulo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relational {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equals,
    NotEquals,
}

/// Includes any kind of operator that needs two values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Arithmetic(ArithmeticOp),
    Relational(Relational),
}

impl From<ArithmeticOp> for BinaryOp {
    fn from(op: ArithmeticOp) -> Self {
        Self::Arithmetic(op)
    }
}

impl From<Relational> for BinaryOp {
    fn from(op: Relational) -> Self {
        Self::Relational(op)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Arithmetic(ArithmeticOp::Add) => "+",
            Self::Arithmetic(ArithmeticOp::Subtract) => "-",
            Self::Arithmetic(ArithmeticOp::Multiply) => "*",
            Self::Arithmetic(ArithmeticOp::Divide) => "/",
            Self::Arithmetic(ArithmeticOp::Modulo) => "%",
            Self::Relational(Relational::Less) => "<",
            Self::Relational(Relational::LessEqual) => "<=",
            Self::Relational(Relational::Greater) => ">",
            Self::Relational(Relational::GreaterEqual) => ">=",
            Self::Relational(Relational::Equals) => "==",
            Self::Relational(Relational::NotEquals) => "!=",
        })
    }
}
