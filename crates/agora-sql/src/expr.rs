//! Expressions.

use crate::stmt::SelectStmt;
use crate::{ColumnName, ParamName};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Named parameter, rendered as `$n`
    Param(ParamName),
    Column(ColumnName),
    /// String literal
    String(String),
    Int(i64),
    Bool(bool),
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    /// `expr[index]`, 1-based like Postgres arrays
    Subscript { expr: Box<Expr>, index: i64 },
    /// `expr = ANY(array)`
    Any { expr: Box<Expr>, array: Box<Expr> },
    /// `expr IN (SELECT ...)`
    InSelect {
        expr: Box<Expr>,
        select: Box<SelectStmt>,
    },
    /// Scalar subquery
    Select(Box<SelectStmt>),
    /// `expr::ty`
    Cast { expr: Box<Expr>, ty: String },
    /// `EXCLUDED.column`, the row proposed for insertion in ON CONFLICT
    Excluded(ColumnName),
    Call { name: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    And,
    Or,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Eq => "=",
            BinOp::Ne => "<>",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::And => "AND",
            BinOp::Or => "OR",
        }
    }
}

macro_rules! binary_ops {
    ($($(#[$meta:meta])* $method:ident => $op:ident),* $(,)?) => {
        impl Expr {
            $(
                $(#[$meta])*
                pub fn $method(self, other: Expr) -> Self {
                    Expr::Binary {
                        left: Box::new(self),
                        op: BinOp::$op,
                        right: Box::new(other),
                    }
                }
            )*
        }
    };
}

binary_ops! {
    eq => Eq,
    ne => Ne,
    lt => Lt,
    le => Le,
    gt => Gt,
    ge => Ge,
    add => Add,
    /// Rendered without parentheses; nest an `or` inside an `and` with care.
    and => And,
    or => Or,
}

impl Expr {
    pub fn param(name: ParamName) -> Self {
        Expr::Param(name)
    }

    pub fn column(name: ColumnName) -> Self {
        Expr::Column(name)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::String(s.into())
    }

    pub fn int(n: i64) -> Self {
        Expr::Int(n)
    }

    pub fn bool(b: bool) -> Self {
        Expr::Bool(b)
    }

    pub fn func(name: impl Into<String>, args: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn excluded(column: ColumnName) -> Self {
        Expr::Excluded(column)
    }

    pub fn select(stmt: SelectStmt) -> Self {
        Expr::Select(Box::new(stmt))
    }

    pub fn subscript(self, index: i64) -> Self {
        Expr::Subscript {
            expr: Box::new(self),
            index,
        }
    }

    pub fn any(self, array: Expr) -> Self {
        Expr::Any {
            expr: Box::new(self),
            array: Box::new(array),
        }
    }

    pub fn in_select(self, select: SelectStmt) -> Self {
        Expr::InSelect {
            expr: Box::new(self),
            select: Box::new(select),
        }
    }

    pub fn cast(self, ty: impl Into<String>) -> Self {
        Expr::Cast {
            expr: Box::new(self),
            ty: ty.into(),
        }
    }
}
