//! Rendering statements to SQL text.
//!
//! Clauses go on their own line; the first placeholder a name receives is
//! reused on every later occurrence.

use indexmap::IndexMap;

use crate::expr::Expr;
use crate::stmt::*;
use crate::{ColumnName, ParamName, RenderedSql, quote_ident, quote_literal};

/// Accumulates SQL text and the parameter numbering.
#[derive(Debug, Default)]
pub struct Writer {
    sql: String,
    params: IndexMap<ParamName, usize>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    pub fn ident(&mut self, name: &str) {
        let quoted = quote_ident(name);
        self.push(&quoted);
    }

    /// Write the placeholder for `name`, numbering it on first use.
    pub fn param(&mut self, name: &ParamName) {
        let next = self.params.len() + 1;
        let idx = *self.params.entry(name.clone()).or_insert(next);
        self.push(&format!("${idx}"));
    }

    fn list<T>(&mut self, items: &[T], mut each: impl FnMut(&mut Self, &T)) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            each(self, item);
        }
    }

    fn columns(&mut self, columns: &[ColumnName]) {
        self.list(columns, |w, c| w.ident(c.as_str()));
    }

    fn assignments(&mut self, assignments: &[UpdateAssignment]) {
        self.list(assignments, |w, a| {
            w.ident(a.column.as_str());
            w.push(" = ");
            a.value.render(w);
        });
    }

    fn where_clause(&mut self, where_: Option<&Expr>) {
        if let Some(expr) = where_ {
            self.push("\nWHERE ");
            expr.render(self);
        }
    }

    fn returning(&mut self, columns: &[ColumnName]) {
        if !columns.is_empty() {
            self.push("\nRETURNING ");
            self.columns(columns);
        }
    }

    pub fn finish(self) -> RenderedSql {
        RenderedSql {
            sql: self.sql,
            params: self.params.into_keys().collect(),
        }
    }
}

/// Something that writes itself as SQL.
pub trait Render {
    fn render(&self, w: &mut Writer);
}

impl Render for Expr {
    fn render(&self, w: &mut Writer) {
        match self {
            Expr::Param(name) => w.param(name),
            Expr::Column(name) => w.ident(name.as_str()),
            Expr::String(s) => w.push(&quote_literal(s)),
            Expr::Int(n) => w.push(&n.to_string()),
            Expr::Bool(true) => w.push("TRUE"),
            Expr::Bool(false) => w.push("FALSE"),
            Expr::Binary { left, op, right } => {
                left.render(w);
                w.push(&format!(" {} ", op.as_str()));
                right.render(w);
            }
            Expr::Subscript { expr, index } => {
                expr.render(w);
                w.push(&format!("[{index}]"));
            }
            Expr::Any { expr, array } => {
                expr.render(w);
                w.push(" = ANY(");
                array.render(w);
                w.push(")");
            }
            Expr::InSelect { expr, select } => {
                expr.render(w);
                w.push(" IN (");
                select.render(w);
                w.push(")");
            }
            Expr::Select(select) => {
                w.push("(");
                select.render(w);
                w.push(")");
            }
            Expr::Cast { expr, ty } => {
                expr.render(w);
                w.push("::");
                w.push(ty);
            }
            Expr::Excluded(column) => {
                w.push("EXCLUDED.");
                w.ident(column.as_str());
            }
            Expr::Call { name, args } => {
                w.push(name);
                w.push("(");
                w.list(args, |w, arg| arg.render(w));
                w.push(")");
            }
        }
    }
}

impl Render for SelectStmt {
    fn render(&self, w: &mut Writer) {
        w.push("SELECT ");
        if self.columns.is_empty() {
            w.push("*");
        }
        w.list(&self.columns, |w, column| {
            column.expr.render(w);
            if let Some(alias) = &column.alias {
                w.push(" AS ");
                w.ident(alias.as_str());
            }
        });

        match &self.from {
            Some(FromClause::Table(table)) => {
                w.push("\nFROM ");
                w.ident(table.as_str());
            }
            Some(FromClause::Function { call, alias }) => {
                w.push("\nFROM ");
                call.render(w);
                w.push(" ");
                w.ident(alias.as_str());
            }
            None => {}
        }

        w.where_clause(self.where_.as_ref());

        if !self.order_by.is_empty() {
            w.push("\nORDER BY ");
            w.list(&self.order_by, |w, order| {
                order.expr.render(w);
                w.push(if order.desc { " DESC" } else { " ASC" });
            });
        }

        if let Some(limit) = &self.limit {
            w.push("\nLIMIT ");
            limit.render(w);
        }

        if self.for_update {
            w.push("\nFOR UPDATE");
        }
    }
}

impl Render for InsertStmt {
    fn render(&self, w: &mut Writer) {
        w.push("INSERT INTO ");
        w.ident(self.table.as_str());
        w.push(" (");
        w.columns(&self.columns);
        w.push(")\nVALUES ");
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                w.push(",\n       ");
            }
            w.push("(");
            w.list(row, |w, value| value.render(w));
            w.push(")");
        }

        if let Some(conflict) = &self.on_conflict {
            w.push("\nON CONFLICT");
            // No target: any unique constraint counts as a conflict.
            if !conflict.columns.is_empty() {
                w.push(" (");
                w.columns(&conflict.columns);
                w.push(")");
            }
            match &conflict.action {
                ConflictAction::DoNothing => w.push(" DO NOTHING"),
                ConflictAction::DoUpdate(assignments) => {
                    w.push(" DO UPDATE SET ");
                    w.assignments(assignments);
                }
            }
        }

        w.returning(&self.returning);
    }
}

impl Render for UpdateStmt {
    fn render(&self, w: &mut Writer) {
        w.push("UPDATE ");
        w.ident(self.table.as_str());
        w.push("\nSET ");
        w.assignments(&self.set);
        w.where_clause(self.where_.as_ref());
        w.returning(&self.returning);
    }
}

/// Render a statement, numbering its parameters.
pub fn render(stmt: &impl Render) -> RenderedSql {
    let mut w = Writer::new();
    stmt.render(&mut w);
    w.finish()
}
