use crate::error::{OrmError, OrmResult};
use crate::expr::{CompareOp, Expr, Join, Query};
use crate::model::Selectable;
use crate::property::Property;
use crate::value::Value;
use std::collections::HashMap;

/// A compiled piece of SQL plus its positional parameters, in placeholder
/// order. `?` is the canonical placeholder; dialects rewrite it in a final
/// substitution pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Fragment {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Per-compilation mutable context: table aliases and the set of tables
/// touched, in first-touch order (the FROM clause is derived from it after
/// the rest of the query has compiled). One `State` per compilation; never
/// share one across queries.
#[derive(Debug, Default)]
pub struct State {
    aliases: HashMap<&'static str, String>,
    touched: Vec<&'static str>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias for a table: the first request assigns the next name from the
    /// sequence `a`, `b`, .. `z`, `aa`, `ab`, .. and records the table as
    /// touched; later requests return the same alias.
    pub fn table_alias(&mut self, table: &'static str) -> String {
        if let Some(alias) = self.aliases.get(table) {
            return alias.clone();
        }
        let alias = alias_name(self.aliases.len());
        self.aliases.insert(table, alias.clone());
        self.touched.push(table);
        alias
    }

    /// Tables touched so far, in first-touch order.
    pub fn touched(&self) -> &[&'static str] {
        &self.touched
    }
}

/// The infinite alias sequence: bijective base-26 over `a`..`z`.
pub(crate) fn alias_name(mut n: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'a' + (n % 26) as u8);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// An expression-to-SQL compiler.
///
/// The base compiler is an exhaustive match over [`Expr`]; a dialect
/// compiler overrides the variants whose SQL differs and delegates the rest
/// back through [`compile_base`], which recurses through the dialect so
/// overrides apply at any nesting depth.
pub trait ExprCompiler {
    fn compile_expr(&self, expr: &Expr, state: &mut State) -> OrmResult<Fragment>;

    /// Compile with a fresh state.
    fn compile(&self, expr: &Expr) -> OrmResult<Fragment> {
        let mut state = State::new();
        self.compile_expr(expr, &mut state)
    }
}

/// The dialect-neutral compiler. It has no rule for `LeftJoin`; outer joins
/// are dialect-owned.
#[derive(Debug, Default)]
pub struct BaseCompiler;

impl ExprCompiler for BaseCompiler {
    fn compile_expr(&self, expr: &Expr, state: &mut State) -> OrmResult<Fragment> {
        compile_base(self, expr, state)
    }
}

fn is_null_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::Value(Value::Null))
}

/// Compile one node, recursing through `compiler` so dialect overrides apply
/// to nested nodes.
pub fn compile_base(
    compiler: &dyn ExprCompiler,
    expr: &Expr,
    state: &mut State,
) -> OrmResult<Fragment> {
    match expr {
        Expr::Value(Value::Null) => Ok(Fragment::new("NULL", Vec::new())),
        Expr::Value(v) => Ok(Fragment::new("?", vec![v.clone()])),
        Expr::Column(prop) => {
            let alias = state.table_alias(prop.table());
            Ok(Fragment::new(
                format!("{}.{}", alias, prop.column_name()),
                Vec::new(),
            ))
        }
        Expr::Compare(cmp) => {
            let left = compiler.compile_expr(&cmp.left, state)?;
            let right = compiler.compile_expr(&cmp.right, state)?;
            // SQL null semantics: = and != against a NULL literal become
            // IS / IS NOT
            let null_operand = is_null_literal(&cmp.left) || is_null_literal(&cmp.right);
            let op = match cmp.op {
                CompareOp::Eq if null_operand => "IS",
                CompareOp::Neq if null_operand => "IS NOT",
                other => other.sql(),
            };
            let mut params = left.params;
            params.extend(right.params);
            Ok(Fragment::new(
                format!("{} {} {}", left.sql, op, right.sql),
                params,
            ))
        }
        Expr::And(children) => compile_nary(compiler, children, " AND ", state),
        Expr::Or(children) => compile_nary(compiler, children, " OR ", state),
        Expr::Table(table) => {
            let alias = state.table_alias(table);
            Ok(Fragment::new(format!("{} AS {}", table, alias), Vec::new()))
        }
        Expr::Join(join) => {
            let inner = compile_join(compiler, join, state)?;
            Ok(Fragment::new(format!("JOIN {}", inner.sql), inner.params))
        }
        Expr::LeftJoin(_) => Err(OrmError::compile(
            "LEFT JOIN has no base rule; compile with a dialect compiler",
        )),
    }
}

fn compile_nary(
    compiler: &dyn ExprCompiler,
    children: &[Expr],
    sep: &str,
    state: &mut State,
) -> OrmResult<Fragment> {
    let mut parts = Vec::with_capacity(children.len());
    let mut params = Vec::new();
    for child in children {
        let frag = compiler.compile_expr(child, state)?;
        parts.push(frag.sql);
        params.extend(frag.params);
    }
    Ok(Fragment::new(format!("({})", parts.join(sep)), params))
}

/// The `table AS alias ON condition` tail shared by every join flavor. The
/// alias is assigned before the ON condition compiles.
pub fn compile_join(
    compiler: &dyn ExprCompiler,
    join: &Join,
    state: &mut State,
) -> OrmResult<Fragment> {
    let alias = state.table_alias(join.table);
    let on = compiler.compile_expr(&join.on, state)?;
    Ok(Fragment::new(
        format!("{} AS {} ON {}", join.table, alias, on.sql),
        on.params,
    ))
}

/// Compile a whole query: projection columns first, then the constraint
/// tree, then explicit joins, and finally the FROM clause from the state's
/// first-touched order (skipping tables consumed by an explicit join).
/// Parameters are ordered select, from, where: exactly the left-to-right
/// `?` order of the assembled statement.
pub fn compile_query(
    compiler: &dyn ExprCompiler,
    properties: &[&'static Property],
    constraints: Option<&Expr>,
    joins: &[Expr],
    state: &mut State,
) -> OrmResult<Fragment> {
    let mut columns = Vec::with_capacity(properties.len());
    let mut select_params = Vec::new();
    for prop in properties {
        let frag = compiler.compile_expr(&Expr::Column(*prop), state)?;
        columns.push(frag.sql);
        select_params.extend(frag.params);
    }

    let where_frag = match constraints {
        Some(expr) => Some(compiler.compile_expr(expr, state)?),
        None => None,
    };

    let mut join_parts = Vec::with_capacity(joins.len());
    let mut join_params = Vec::new();
    let mut joined_tables: Vec<&'static str> = Vec::new();
    for join in joins {
        if let Expr::Join(j) | Expr::LeftJoin(j) = join {
            joined_tables.push(j.table);
        }
        let frag = compiler.compile_expr(join, state)?;
        join_parts.push(frag.sql);
        join_params.extend(frag.params);
    }

    let mut tables = Vec::new();
    for table in state.touched().to_vec() {
        if joined_tables.contains(&table) {
            continue;
        }
        let frag = compiler.compile_expr(&Expr::Table(table), state)?;
        tables.push(frag.sql);
    }
    if tables.is_empty() {
        return Err(OrmError::compile("query touches no tables"));
    }

    let mut sql = format!("SELECT {} FROM {}", columns.join(","), tables.join(", "));
    for part in &join_parts {
        sql.push(' ');
        sql.push_str(part);
    }
    let mut params = select_params;
    params.extend(join_params);
    if let Some(frag) = where_frag {
        sql.push_str(" WHERE ");
        sql.push_str(&frag.sql);
        params.extend(frag.params);
    }
    Ok(Fragment::new(sql, params))
}

impl<S: Selectable> Query<S> {
    /// Compile this query against a dialect compiler with a fresh state.
    pub fn compile(&self, compiler: &dyn ExprCompiler) -> OrmResult<Fragment> {
        let mut state = State::new();
        compile_query(
            compiler,
            self.properties(),
            self.constraints(),
            self.joins(),
            &mut state,
        )
    }
}

/// Placeholder syntax of a dialect's driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `?`, as compiled (SQLite).
    Question,
    /// `$1`, `$2`, .. (PostgreSQL).
    Numbered,
}

/// Rewrite the canonical `?` placeholders into the dialect's syntax. Values
/// are always parameterized, so a literal `?` can never appear inside the
/// statement text itself.
pub fn substitute_placeholders(sql: &str, style: Placeholder) -> String {
    match style {
        Placeholder::Question => sql.to_string(),
        Placeholder::Numbered => {
            let mut out = String::with_capacity(sql.len() + 8);
            let mut n = 0;
            for ch in sql.chars() {
                if ch == '?' {
                    n += 1;
                    out.push('$');
                    out.push_str(&n.to_string());
                } else {
                    out.push(ch);
                }
            }
            out
        }
    }
}
