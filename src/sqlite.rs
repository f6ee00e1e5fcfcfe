use crate::compile::{compile_base, compile_join, ExprCompiler, Fragment, Placeholder, State};
use crate::convert::Converter;
use crate::error::{OrmError, OrmResult};
use crate::expr::Expr;
use crate::model::Model;
use crate::operator::{DbRow, Dialect, Executor, Operator};
use crate::property::PropertyKind;
use crate::value::Value;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use std::path::Path;

/// SQLite's expression compiler: the base grammar plus SQLite's spelling of
/// the outer join.
#[derive(Debug, Default)]
pub struct SqliteCompiler;

impl ExprCompiler for SqliteCompiler {
    fn compile_expr(&self, expr: &Expr, state: &mut State) -> OrmResult<Fragment> {
        match expr {
            Expr::LeftJoin(join) => {
                let inner = compile_join(self, join, state)?;
                Ok(Fragment::new(format!("LEFT JOIN {}", inner.sql), inner.params))
            }
            other => compile_base(self, other, state),
        }
    }
}

fn sqlite_to_db() -> Converter {
    let mut conv = Converter::new();
    // byte-string attributes travel as blobs
    conv.when(PropertyKind::Bytes, |v| match v {
        Value::Text(s) => Value::Blob(s.into_bytes()),
        other => other,
    });
    conv
}

fn sqlite_from_db() -> Converter {
    let mut conv = Converter::new();
    conv.when(PropertyKind::Bytes, |v| match v {
        Value::Text(s) => Value::Blob(s.into_bytes()),
        other => other,
    });
    // SQLite stores booleans as integers
    conv.when(PropertyKind::Bool, |v| match v {
        Value::Integer(i) => Value::Boolean(i != 0),
        other => other,
    });
    // and dates/datetimes as text
    conv.when(PropertyKind::Date, |v| match v {
        Value::Text(s) => match NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
            Ok(d) => Value::Date(d),
            Err(_) => Value::Text(s),
        },
        other => other,
    });
    conv.when(PropertyKind::DateTime, |v| match v {
        Value::Text(s) => match NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S") {
            Ok(dt) => Value::DateTime(dt),
            Err(_) => Value::Text(s),
        },
        other => other,
    });
    conv
}

/// The SQLite dialect: `?` placeholders, text-encoded dates, rowid-based
/// insert refetch.
pub struct SqliteDialect {
    compiler: SqliteCompiler,
    to_db: Converter,
    from_db: Converter,
}

impl SqliteDialect {
    pub fn new() -> Self {
        Self {
            compiler: SqliteCompiler,
            to_db: sqlite_to_db(),
            from_db: sqlite_from_db(),
        }
    }
}

impl Default for SqliteDialect {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dialect for SqliteDialect {
    fn compiler(&self) -> &dyn ExprCompiler {
        &self.compiler
    }

    fn placeholder(&self) -> Placeholder {
        Placeholder::Question
    }

    fn to_db(&self) -> &Converter {
        &self.to_db
    }

    fn from_db(&self) -> &Converter {
        &self.from_db
    }

    async fn fetch_inserted<M, E>(
        &self,
        cursor: &mut E,
        _obj: &mut M,
        _inserted_columns: &[&'static str],
    ) -> OrmResult<Option<DbRow>>
    where
        M: Model + Send,
        E: Executor,
    {
        let rowid = cursor.last_insert_id().await?;
        let schema = M::schema();
        let columns: Vec<&str> = schema.columns().iter().map(|(name, _)| *name).collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE rowid=?",
            columns.join(","),
            schema.table()
        );
        let rows = cursor.execute(&sql, &[Value::Integer(rowid)]).await?;
        Ok(rows.into_iter().next())
    }
}

/// CRUD operators against SQLite.
pub type SqliteOperator = Operator<SqliteDialect>;

fn db_err(err: rusqlite::Error) -> OrmError {
    OrmError::driver(err.to_string())
}

fn bind_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Integer(i) => rusqlite::types::Value::Integer(*i),
        Value::Real(r) => rusqlite::types::Value::Real(*r),
        Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Blob(b) => rusqlite::types::Value::Blob(b.clone()),
        Value::Boolean(b) => rusqlite::types::Value::Integer(*b as i64),
        Value::Date(d) => rusqlite::types::Value::Text(d.format("%Y-%m-%d").to_string()),
        Value::DateTime(dt) => {
            rusqlite::types::Value::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string())
        }
    }
}

fn read_value(value: rusqlite::types::ValueRef<'_>) -> Value {
    match value {
        rusqlite::types::ValueRef::Null => Value::Null,
        rusqlite::types::ValueRef::Integer(i) => Value::Integer(i),
        rusqlite::types::ValueRef::Real(r) => Value::Real(r),
        rusqlite::types::ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        rusqlite::types::ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

/// A blocking rusqlite connection behind the [`Executor`] interface.
pub struct SqliteExecutor {
    conn: Connection,
}

impl SqliteExecutor {
    pub fn open_in_memory() -> OrmResult<Self> {
        Connection::open_in_memory()
            .map(|conn| Self { conn })
            .map_err(db_err)
    }

    pub fn open(path: impl AsRef<Path>) -> OrmResult<Self> {
        Connection::open(path)
            .map(|conn| Self { conn })
            .map_err(db_err)
    }
}

#[async_trait]
impl Executor for SqliteExecutor {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> OrmResult<Vec<DbRow>> {
        let mut stmt = self.conn.prepare(sql).map_err(db_err)?;
        let columns: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let bound: Vec<rusqlite::types::Value> = params.iter().map(bind_value).collect();

        if stmt.column_count() == 0 {
            stmt.execute(rusqlite::params_from_iter(bound))
                .map_err(db_err)?;
            return Ok(Vec::new());
        }

        let mut rows = stmt
            .query(rusqlite::params_from_iter(bound))
            .map_err(db_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(db_err)? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(read_value(row.get_ref(i).map_err(db_err)?));
            }
            out.push(DbRow::new(columns.clone(), values));
        }
        Ok(out)
    }

    async fn last_insert_id(&mut self) -> OrmResult<i64> {
        Ok(self.conn.last_insert_rowid())
    }
}
