//! Minimal parameterized statement builder.
//!
//! # Responsibility
//! - Render `SELECT`/`INSERT`/`UPDATE`/`DELETE` with equality conjunctions,
//!   ascending ordering and limit/offset pagination.
//! - Hide placeholder and pagination syntax differences between backends.
//!
//! # Invariants
//! - Every caller-supplied value is bound as a parameter, never inlined.
//! - Column and table names are compile-time constants.

use crate::db::exec::SqlValue;
use crate::db::BackendKind;

/// Rendered SQL plus its bind parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: String,
    params: Vec<SqlValue>,
}

impl Statement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// Hand-written SQL without parameters.
    #[cfg(test)]
    pub(crate) fn raw(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            params: Vec::new(),
        }
    }
}

impl BackendKind {
    fn placeholder(self, position: usize) -> String {
        match self {
            Self::Sqlite => format!("?{position}"),
            Self::Postgres => format!("${position}"),
        }
    }

    fn pagination(self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (self, limit, offset) {
            (_, None, None) => String::new(),
            (_, Some(limit), None) => format!(" LIMIT {limit}"),
            (_, Some(limit), Some(offset)) => format!(" LIMIT {limit} OFFSET {offset}"),
            // SQLite has no bare OFFSET clause.
            (Self::Sqlite, None, Some(offset)) => format!(" LIMIT -1 OFFSET {offset}"),
            (Self::Postgres, None, Some(offset)) => format!(" OFFSET {offset}"),
        }
    }
}

struct Builder {
    kind: BackendKind,
    sql: String,
    params: Vec<SqlValue>,
}

impl Builder {
    fn new(kind: BackendKind, sql: String) -> Self {
        Self {
            kind,
            sql,
            params: Vec::new(),
        }
    }

    fn bind(&mut self, value: &SqlValue) -> String {
        self.params.push(value.clone());
        self.kind.placeholder(self.params.len())
    }

    fn push_where(&mut self, filters: &[(&'static str, SqlValue)]) {
        for (idx, (column, value)) in filters.iter().enumerate() {
            let placeholder = self.bind(value);
            let keyword = if idx == 0 { " WHERE " } else { " AND " };
            self.sql.push_str(keyword);
            self.sql.push_str(&format!("{column} = {placeholder}"));
        }
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Select {
    table: &'static str,
    columns: &'static [&'static str],
    filters: Vec<(&'static str, SqlValue)>,
    order_by: Vec<&'static str>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Select {
    pub fn from_table(table: &'static str, columns: &'static [&'static str]) -> Self {
        Self {
            table,
            columns,
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn where_eq(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.filters.push((column, value.into()));
        self
    }

    pub fn order_by_asc(mut self, column: &'static str) -> Self {
        self.order_by.push(column);
        self
    }

    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: Option<u64>) -> Self {
        self.offset = offset;
        self
    }

    pub fn build(&self, kind: BackendKind) -> Statement {
        let mut builder = Builder::new(
            kind,
            format!("SELECT {} FROM {}", self.columns.join(", "), self.table),
        );
        builder.push_where(&self.filters);
        if !self.order_by.is_empty() {
            let order = self
                .order_by
                .iter()
                .map(|column| format!("{column} ASC"))
                .collect::<Vec<_>>()
                .join(", ");
            builder.sql.push_str(&format!(" ORDER BY {order}"));
        }
        builder
            .sql
            .push_str(&kind.pagination(self.limit, self.offset));
        builder.finish()
    }
}

#[derive(Debug, Clone)]
pub struct Insert {
    table: &'static str,
    values: Vec<(&'static str, SqlValue)>,
}

impl Insert {
    pub fn into_table(table: &'static str) -> Self {
        Self {
            table,
            values: Vec::new(),
        }
    }

    pub fn value(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.values.push((column, value.into()));
        self
    }

    pub fn build(&self, kind: BackendKind) -> Statement {
        let columns = self
            .values
            .iter()
            .map(|(column, _)| *column)
            .collect::<Vec<_>>()
            .join(", ");
        let mut builder = Builder::new(kind, String::new());
        let placeholders = self
            .values
            .iter()
            .map(|(_, value)| builder.bind(value))
            .collect::<Vec<_>>()
            .join(", ");
        builder.sql = format!(
            "INSERT INTO {} ({columns}) VALUES ({placeholders})",
            self.table
        );
        builder.finish()
    }
}

#[derive(Debug, Clone)]
pub struct Update {
    table: &'static str,
    sets: Vec<(&'static str, SqlValue)>,
    filters: Vec<(&'static str, SqlValue)>,
}

impl Update {
    pub fn table(table: &'static str) -> Self {
        Self {
            table,
            sets: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn set(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.sets.push((column, value.into()));
        self
    }

    pub fn where_eq(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.filters.push((column, value.into()));
        self
    }

    pub fn build(&self, kind: BackendKind) -> Statement {
        let mut builder = Builder::new(kind, String::new());
        let assignments = self
            .sets
            .iter()
            .map(|(column, value)| format!("{column} = {}", builder.bind(value)))
            .collect::<Vec<_>>()
            .join(", ");
        builder.sql = format!("UPDATE {} SET {assignments}", self.table);
        builder.push_where(&self.filters);
        builder.finish()
    }
}

#[derive(Debug, Clone)]
pub struct Delete {
    table: &'static str,
    filters: Vec<(&'static str, SqlValue)>,
}

impl Delete {
    pub fn from_table(table: &'static str) -> Self {
        Self {
            table,
            filters: Vec::new(),
        }
    }

    pub fn where_eq(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.filters.push((column, value.into()));
        self
    }

    pub fn build(&self, kind: BackendKind) -> Statement {
        let mut builder = Builder::new(kind, format!("DELETE FROM {}", self.table));
        builder.push_where(&self.filters);
        builder.finish()
    }
}
