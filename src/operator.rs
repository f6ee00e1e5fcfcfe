use crate::compile::{substitute_placeholders, ExprCompiler, Placeholder};
use crate::convert::Converter;
use crate::error::{OrmError, OrmResult};
use crate::expr::Query;
use crate::model::{object_info, Model, ModelSchema, Selectable};
use crate::value::Value;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One result row: column names plus values, positionally aligned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbRow {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl DbRow {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }
}

/// The runner capability this core executes against: run one parameterized
/// statement and report rows, plus the backend's notion of the identifier
/// generated by the most recent insert. Pooling, transactions, and retries
/// live outside this crate.
#[async_trait]
pub trait Executor: Send {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> OrmResult<Vec<DbRow>>;

    async fn last_insert_id(&mut self) -> OrmResult<i64>;
}

/// Everything that differs per database: the expression compiler, the
/// driver's placeholder syntax, the value conversion registries, and how the
/// row created by an INSERT is fetched back.
#[async_trait]
pub trait Dialect: Send + Sync {
    fn compiler(&self) -> &dyn ExprCompiler;

    fn placeholder(&self) -> Placeholder;

    fn to_db(&self) -> &Converter;

    fn from_db(&self) -> &Converter;

    /// Re-fetch the row created by the INSERT that just ran on `cursor`:
    /// by native rowid, by sequence value, or by the object's own primary
    /// key, whichever the backend supports. `inserted_columns` names the
    /// columns the INSERT supplied.
    async fn fetch_inserted<M, E>(
        &self,
        cursor: &mut E,
        obj: &mut M,
        inserted_columns: &[&'static str],
    ) -> OrmResult<Option<DbRow>>
    where
        M: Model + Send,
        E: Executor;
}

/// The CRUD operators, generic over a dialect. `insert` writes only changed
/// columns and re-populates the object from the stored row; `query` compiles
/// and reconstitutes; `refresh`/`update`/`delete` key on the primary key.
pub struct Operator<D: Dialect> {
    dialect: D,
}

impl<D: Dialect> Operator<D> {
    pub fn new(dialect: D) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    fn finalize(&self, sql: &str) -> String {
        substitute_placeholders(sql, self.dialect.placeholder())
    }

    /// Collect `(column, converted value)` for the given properties of
    /// `obj`, ready for the wire.
    fn column_values<M: Model>(
        &self,
        obj: &mut M,
        props: &[&'static crate::property::Property],
    ) -> OrmResult<Vec<(&'static str, Value)>> {
        props
            .iter()
            .map(|prop| {
                let value = prop.to_database(obj.store_mut())?;
                let value = self.dialect.to_db().convert(prop.kind(), value);
                Ok((prop.column_name(), value))
            })
            .collect()
    }

    fn primary_values<M: Model>(&self, obj: &mut M) -> OrmResult<Vec<(&'static str, Value)>> {
        let primaries = M::schema().primaries();
        if primaries.is_empty() {
            return Err(OrmError::schema(format!(
                "{} has no primary key",
                M::schema().table()
            )));
        }
        self.column_values(obj, &primaries)
    }

    /// Insert `obj`, writing only its changed columns (or `DEFAULT VALUES`
    /// when nothing changed), then re-fetch the stored row and populate every
    /// attribute from it, clearing change tracking.
    pub async fn insert<M, E>(&self, cursor: &mut E, obj: &mut M) -> OrmResult<()>
    where
        M: Model + Send,
        E: Executor,
    {
        let changed = object_info(obj).changed()?;
        let pairs = self.column_values(obj, &changed)?;
        let inserted_columns: Vec<&'static str> = pairs.iter().map(|(name, _)| *name).collect();

        let (sql, params) = insert_statement(M::schema(), &pairs);
        let sql = self.finalize(&sql);
        debug!(sql = %sql, params = params.len(), "insert");
        cursor.execute(&sql, &params).await?;

        let row = self
            .dialect
            .fetch_inserted(cursor, obj, &inserted_columns)
            .await?;
        update_from_row(obj, row, self.dialect.from_db())
    }

    /// Compile and run `query`, reconstituting each row into the projected
    /// object (or tuple of objects).
    pub async fn query<S, E>(&self, cursor: &mut E, query: &Query<S>) -> OrmResult<Vec<S>>
    where
        S: Selectable,
        E: Executor,
    {
        let frag = query.compile(self.dialect.compiler())?;
        let sql = self.finalize(&frag.sql);
        debug!(sql = %sql, params = frag.params.len(), "query");
        let rows = cursor.execute(&sql, &frag.params).await?;

        let props = query.properties();
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            if row.values.len() != props.len() {
                return Err(OrmError::driver(format!(
                    "row has {} values but the query projects {} properties",
                    row.values.len(),
                    props.len()
                )));
            }
            let pairs = props
                .iter()
                .zip(row.values)
                .map(|(prop, value)| (*prop, self.dialect.from_db().convert(prop.kind(), value)))
                .collect();
            results.push(S::reconstitute(pairs)?);
        }
        Ok(results)
    }

    /// Re-read `obj` from storage by primary key, updating its attributes in
    /// place. Fails with `NotFound` when no row matches.
    pub async fn refresh<M, E>(&self, cursor: &mut E, obj: &mut M) -> OrmResult<()>
    where
        M: Model + Send,
        E: Executor,
    {
        let pk = self.primary_values(obj)?;
        let (sql, params) = refresh_statement(M::schema(), &pk);
        let sql = self.finalize(&sql);
        debug!(sql = %sql, "refresh");
        let rows = cursor.execute(&sql, &params).await?;
        update_from_row(obj, rows.into_iter().next(), self.dialect.from_db())
    }

    /// Write `obj`'s changed columns back to its row. A no-op when nothing
    /// has changed.
    pub async fn update<M, E>(&self, cursor: &mut E, obj: &mut M) -> OrmResult<()>
    where
        M: Model + Send,
        E: Executor,
    {
        let changed = object_info(obj).changed()?;
        if changed.is_empty() {
            return Ok(());
        }
        let sets = self.column_values(obj, &changed)?;
        let pk = self.primary_values(obj)?;
        let (sql, params) = update_statement(M::schema(), &sets, &pk);
        let sql = self.finalize(&sql);
        debug!(sql = %sql, params = params.len(), "update");
        cursor.execute(&sql, &params).await?;
        Ok(())
    }

    /// Delete `obj`'s row by primary key.
    pub async fn delete<M, E>(&self, cursor: &mut E, obj: &mut M) -> OrmResult<()>
    where
        M: Model + Send,
        E: Executor,
    {
        let pk = self.primary_values(obj)?;
        let (sql, params) = delete_statement(M::schema(), &pk);
        let sql = self.finalize(&sql);
        debug!(sql = %sql, "delete");
        cursor.execute(&sql, &params).await?;
        Ok(())
    }
}

/// `INSERT INTO t (c1,c2) VALUES (?,?)`, or `INSERT INTO t DEFAULT VALUES`
/// when no columns changed.
pub fn insert_statement(
    schema: &ModelSchema,
    pairs: &[(&'static str, Value)],
) -> (String, Vec<Value>) {
    if pairs.is_empty() {
        return (
            format!("INSERT INTO {} DEFAULT VALUES", schema.table()),
            Vec::new(),
        );
    }
    let columns: Vec<&str> = pairs.iter().map(|(name, _)| *name).collect();
    let placeholders = vec!["?"; pairs.len()];
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        schema.table(),
        columns.join(","),
        placeholders.join(",")
    );
    let params = pairs.iter().map(|(_, value)| value.clone()).collect();
    (sql, params)
}

fn where_by_columns(pairs: &[(&'static str, Value)]) -> (String, Vec<Value>) {
    let parts: Vec<String> = pairs.iter().map(|(name, _)| format!("{}=?", name)).collect();
    let params = pairs.iter().map(|(_, value)| value.clone()).collect();
    (parts.join(" AND "), params)
}

/// `SELECT c1,c2 FROM t WHERE pk=?[ AND pk2=?]`.
pub fn refresh_statement(
    schema: &ModelSchema,
    pk: &[(&'static str, Value)],
) -> (String, Vec<Value>) {
    let columns: Vec<&str> = schema.columns().iter().map(|(name, _)| *name).collect();
    let (where_sql, params) = where_by_columns(pk);
    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        columns.join(","),
        schema.table(),
        where_sql
    );
    (sql, params)
}

/// `UPDATE t SET c=?,.. WHERE pk=?..`; SET parameters precede WHERE ones.
pub fn update_statement(
    schema: &ModelSchema,
    sets: &[(&'static str, Value)],
    pk: &[(&'static str, Value)],
) -> (String, Vec<Value>) {
    let set_parts: Vec<String> = sets.iter().map(|(name, _)| format!("{}=?", name)).collect();
    let (where_sql, where_params) = where_by_columns(pk);
    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        schema.table(),
        set_parts.join(","),
        where_sql
    );
    let mut params: Vec<Value> = sets.iter().map(|(_, value)| value.clone()).collect();
    params.extend(where_params);
    (sql, params)
}

/// `DELETE FROM t WHERE pk=?..`.
pub fn delete_statement(
    schema: &ModelSchema,
    pk: &[(&'static str, Value)],
) -> (String, Vec<Value>) {
    let (where_sql, params) = where_by_columns(pk);
    let sql = format!("DELETE FROM {} WHERE {}", schema.table(), where_sql);
    (sql, params)
}

/// Populate `obj` from a fetched row: every schema column present in the row
/// is converted through `from_db` and stored via the database-load path, so
/// nothing ends up marked changed. `None` means the row was missing, which
/// is `NotFound`.
pub fn update_from_row<M: Model>(
    obj: &mut M,
    row: Option<DbRow>,
    from_db: &Converter,
) -> OrmResult<()> {
    let row = match row {
        Some(row) => row,
        None => return Err(OrmError::not_found(M::schema().table())),
    };
    for (column, props) in M::schema().columns() {
        let raw = match row.get(column) {
            Some(value) => value.clone(),
            None => continue,
        };
        for prop in props {
            let value = from_db.convert(prop.kind(), raw.clone());
            prop.from_database(obj.store_mut(), value);
        }
    }
    Ok(())
}
