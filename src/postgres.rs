use crate::compile::{
    compile_base, compile_join, substitute_placeholders, ExprCompiler, Fragment, Placeholder,
    State,
};
use crate::convert::Converter;
use crate::error::{OrmError, OrmResult};
use crate::expr::Expr;
use crate::model::Model;
use crate::operator::{refresh_statement, DbRow, Dialect, Executor, Operator};
use crate::value::Value;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::{Column, Row, TypeInfo};

/// PostgreSQL's expression compiler: the base grammar plus the outer-join
/// spelling.
#[derive(Debug, Default)]
pub struct PostgresCompiler;

impl ExprCompiler for PostgresCompiler {
    fn compile_expr(&self, expr: &Expr, state: &mut State) -> OrmResult<Fragment> {
        match expr {
            Expr::LeftJoin(join) => {
                let inner = compile_join(self, join, state)?;
                Ok(Fragment::new(
                    format!("LEFT OUTER JOIN {}", inner.sql),
                    inner.params,
                ))
            }
            other => compile_base(self, other, state),
        }
    }
}

/// The PostgreSQL dialect: `$n` placeholders, native value types, and
/// `lastval()`-or-primary-key insert refetch.
pub struct PostgresDialect {
    compiler: PostgresCompiler,
    to_db: Converter,
    from_db: Converter,
}

impl PostgresDialect {
    pub fn new() -> Self {
        // the driver speaks native booleans, dates, and bytea, so both
        // registries are identity
        Self {
            compiler: PostgresCompiler,
            to_db: Converter::new(),
            from_db: Converter::new(),
        }
    }
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dialect for PostgresDialect {
    fn compiler(&self) -> &dyn ExprCompiler {
        &self.compiler
    }

    fn placeholder(&self) -> Placeholder {
        Placeholder::Numbered
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
        obj: &mut M,
        inserted_columns: &[&'static str],
    ) -> OrmResult<Option<DbRow>>
    where
        M: Model + Send,
        E: Executor,
    {
        let schema = M::schema();
        let primaries = schema.primaries();
        if primaries.is_empty() {
            return Err(OrmError::schema(format!(
                "{} has no primary key to refetch by",
                schema.table()
            )));
        }

        // when the INSERT carried every primary column, the object already
        // knows its key; otherwise the one generated key comes from the
        // sequence
        let all_supplied = primaries
            .iter()
            .all(|p| inserted_columns.contains(&p.column_name()));
        let pk: Vec<(&'static str, Value)> = if all_supplied {
            primaries
                .iter()
                .map(|prop| {
                    let value = prop.to_database(obj.store_mut())?;
                    Ok((
                        prop.column_name(),
                        self.to_db.convert(prop.kind(), value),
                    ))
                })
                .collect::<OrmResult<_>>()?
        } else {
            if primaries.len() != 1 {
                return Err(OrmError::driver(format!(
                    "cannot refetch {}: generated compound primary key",
                    schema.table()
                )));
            }
            let id = cursor.last_insert_id().await?;
            vec![(primaries[0].column_name(), Value::Integer(id))]
        };

        let (sql, params) = refresh_statement(schema, &pk);
        let sql = substitute_placeholders(&sql, Placeholder::Numbered);
        let rows = cursor.execute(&sql, &params).await?;
        Ok(rows.into_iter().next())
    }
}

/// CRUD operators against PostgreSQL.
pub type PostgresOperator = Operator<PostgresDialect>;

fn pg_err(err: sqlx::Error) -> OrmError {
    OrmError::driver(err.to_string())
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    value: &Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Integer(i) => query.bind(*i),
        Value::Real(r) => query.bind(*r),
        Value::Text(s) => query.bind(s.clone()),
        Value::Blob(b) => query.bind(b.clone()),
        Value::Boolean(b) => query.bind(*b),
        Value::Date(d) => query.bind(*d),
        Value::DateTime(dt) => query.bind(*dt),
    }
}

fn read_row(row: &PgRow) -> OrmResult<DbRow> {
    let mut columns = Vec::with_capacity(row.columns().len());
    let mut values = Vec::with_capacity(row.columns().len());
    for (i, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        let type_name = column.type_info().name();
        let value = match type_name {
            "INT2" => row
                .try_get::<Option<i16>, _>(i)
                .map_err(pg_err)?
                .map(|v| Value::Integer(v as i64)),
            "INT4" => row
                .try_get::<Option<i32>, _>(i)
                .map_err(pg_err)?
                .map(|v| Value::Integer(v as i64)),
            "INT8" => row
                .try_get::<Option<i64>, _>(i)
                .map_err(pg_err)?
                .map(Value::Integer),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(i)
                .map_err(pg_err)?
                .map(|v| Value::Real(v as f64)),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(i)
                .map_err(pg_err)?
                .map(Value::Real),
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => row
                .try_get::<Option<String>, _>(i)
                .map_err(pg_err)?
                .map(Value::Text),
            "BYTEA" => row
                .try_get::<Option<Vec<u8>>, _>(i)
                .map_err(pg_err)?
                .map(Value::Blob),
            "BOOL" => row
                .try_get::<Option<bool>, _>(i)
                .map_err(pg_err)?
                .map(Value::Boolean),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(i)
                .map_err(pg_err)?
                .map(Value::Date),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(i)
                .map_err(pg_err)?
                .map(Value::DateTime),
            "TIMESTAMPTZ" => row
                .try_get::<Option<DateTime<Utc>>, _>(i)
                .map_err(pg_err)?
                .map(|v| Value::DateTime(v.naive_utc())),
            other => {
                return Err(OrmError::driver(format!(
                    "unsupported postgres type {} in column {}",
                    other,
                    column.name()
                )))
            }
        };
        values.push(value.unwrap_or(Value::Null));
    }
    Ok(DbRow::new(columns, values))
}

/// A pooled sqlx connection behind the [`Executor`] interface.
pub struct PostgresExecutor {
    pool: PgPool,
}

impl PostgresExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> OrmResult<Self> {
        PgPool::connect(url)
            .await
            .map(|pool| Self { pool })
            .map_err(pg_err)
    }
}

#[async_trait]
impl Executor for PostgresExecutor {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> OrmResult<Vec<DbRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(pg_err)?;
        rows.iter().map(read_row).collect()
    }

    async fn last_insert_id(&mut self) -> OrmResult<i64> {
        let row = sqlx::query("SELECT lastval()")
            .fetch_one(&self.pool)
            .await
            .map_err(pg_err)?;
        row.try_get::<i64, _>(0).map_err(pg_err)
    }
}
