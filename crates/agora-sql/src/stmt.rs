//! Statements and their builders.

use crate::expr::Expr;
use crate::{ColumnName, TableName};

/// Join `expr` onto an optional WHERE clause with AND.
fn conjoin(existing: Option<Expr>, expr: Expr) -> Option<Expr> {
    Some(match existing {
        Some(existing) => existing.and(expr),
        None => expr,
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectStmt {
    /// Empty renders as `*`.
    pub columns: Vec<SelectColumn>,
    pub from: Option<FromClause>,
    pub where_: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<Expr>,
    pub for_update: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectColumn {
    pub expr: Expr,
    pub alias: Option<ColumnName>,
}

impl SelectColumn {
    pub fn expr(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: ColumnName) -> Self {
        Self {
            expr,
            alias: Some(alias),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FromClause {
    Table(TableName),
    /// A set-returning function call, which Postgres wants aliased.
    Function { call: Expr, alias: TableName },
}

impl FromClause {
    pub fn table(name: TableName) -> Self {
        FromClause::Table(name)
    }

    pub fn function(call: Expr, alias: TableName) -> Self {
        FromClause::Function { call, alias }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub desc: bool,
}

impl OrderBy {
    pub fn new(expr: Expr, desc: bool) -> Self {
        Self { expr, desc }
    }

    pub fn asc(expr: Expr) -> Self {
        Self::new(expr, false)
    }

    pub fn desc(expr: Expr) -> Self {
        Self::new(expr, true)
    }
}

impl SelectStmt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, column: SelectColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = SelectColumn>) -> Self {
        self.columns.extend(columns);
        self
    }

    pub fn from(mut self, from: FromClause) -> Self {
        self.from = Some(from);
        self
    }

    /// Replace the WHERE clause.
    pub fn where_(mut self, expr: Expr) -> Self {
        self.where_ = Some(expr);
        self
    }

    /// Add a condition to the WHERE clause.
    pub fn and_where(mut self, expr: Expr) -> Self {
        self.where_ = conjoin(self.where_.take(), expr);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, limit: Expr) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Lock the selected rows until the transaction ends.
    pub fn for_update(mut self) -> Self {
        self.for_update = true;
        self
    }
}

/// A single- or multi-row INSERT.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub table: TableName,
    pub columns: Vec<ColumnName>,
    /// One value per column in every row.
    pub rows: Vec<Vec<Expr>>,
    pub on_conflict: Option<OnConflict>,
    pub returning: Vec<ColumnName>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnConflict {
    /// Conflict target. Empty means any unique constraint, which Postgres
    /// only allows with DO NOTHING.
    pub columns: Vec<ColumnName>,
    pub action: ConflictAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictAction {
    DoNothing,
    DoUpdate(Vec<UpdateAssignment>),
}

/// `column = value` in SET lists.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateAssignment {
    pub column: ColumnName,
    pub value: Expr,
}

impl UpdateAssignment {
    pub fn new(column: ColumnName, value: Expr) -> Self {
        Self { column, value }
    }
}

impl InsertStmt {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            columns: Vec::new(),
            rows: Vec::new(),
            on_conflict: None,
            returning: Vec::new(),
        }
    }

    /// Add a column and its value for a single-row insert.
    pub fn column(mut self, name: ColumnName, value: Expr) -> Self {
        self.columns.push(name);
        match self.rows.first_mut() {
            Some(row) => row.push(value),
            None => self.rows.push(vec![value]),
        }
        self
    }

    /// Column list for a multi-row insert; pair with [`InsertStmt::row`].
    pub fn columns(mut self, names: impl IntoIterator<Item = ColumnName>) -> Self {
        self.columns.extend(names);
        self
    }

    pub fn row(mut self, values: impl IntoIterator<Item = Expr>) -> Self {
        self.rows.push(values.into_iter().collect());
        self
    }

    pub fn on_conflict(mut self, on_conflict: OnConflict) -> Self {
        self.on_conflict = Some(on_conflict);
        self
    }

    pub fn returning(mut self, columns: impl IntoIterator<Item = ColumnName>) -> Self {
        self.returning.extend(columns);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    pub table: TableName,
    pub set: Vec<UpdateAssignment>,
    pub where_: Option<Expr>,
    pub returning: Vec<ColumnName>,
}

impl UpdateStmt {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            set: Vec::new(),
            where_: None,
            returning: Vec::new(),
        }
    }

    pub fn set(mut self, column: ColumnName, value: Expr) -> Self {
        self.set.push(UpdateAssignment::new(column, value));
        self
    }

    pub fn where_(mut self, expr: Expr) -> Self {
        self.where_ = Some(expr);
        self
    }

    pub fn and_where(mut self, expr: Expr) -> Self {
        self.where_ = conjoin(self.where_.take(), expr);
        self
    }

    pub fn returning(mut self, columns: impl IntoIterator<Item = ColumnName>) -> Self {
        self.returning.extend(columns);
        self
    }
}
