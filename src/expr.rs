use crate::model::{Model, Selectable};
use crate::property::Property;
use crate::value::Value;
use chrono::{NaiveDate, NaiveDateTime};
use std::marker::PhantomData;

/// Comparison operators of the query grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }
}

/// Expression tree nodes. These are plain values; all interpretation lives
/// in the compiler.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A literal, compiled to one positional placeholder (or `NULL`).
    Value(Value),
    /// A column reference, compiled to `alias.column`.
    Column(&'static Property),
    Compare(Comparison),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    /// A table needing an alias, compiled to `table AS alias`.
    Table(&'static str),
    /// An inner join against a table with an ON condition.
    Join(Join),
    /// An outer join; its SQL spelling is dialect-owned.
    LeftJoin(Join),
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub op: CompareOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone)]
pub struct Join {
    pub table: &'static str,
    pub on: Box<Expr>,
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Value(v)
    }
}

impl From<&'static Property> for Expr {
    fn from(p: &'static Property) -> Self {
        Expr::Column(p)
    }
}

macro_rules! literal_into_expr {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for Expr {
                fn from(v: $ty) -> Self {
                    Expr::Value(Value::from(v))
                }
            }
        )+
    };
}

literal_into_expr!(i64, i32, f64, &str, String, bool, Vec<u8>, NaiveDate, NaiveDateTime);

/// Column reference.
pub fn col(prop: &'static Property) -> Expr {
    Expr::Column(prop)
}

/// Literal value.
pub fn val(v: impl Into<Value>) -> Expr {
    Expr::Value(v.into())
}

fn compare(op: CompareOp, left: impl Into<Expr>, right: impl Into<Expr>) -> Expr {
    Expr::Compare(Comparison {
        op,
        left: Box::new(left.into()),
        right: Box::new(right.into()),
    })
}

pub fn eq(left: impl Into<Expr>, right: impl Into<Expr>) -> Expr {
    compare(CompareOp::Eq, left, right)
}

pub fn neq(left: impl Into<Expr>, right: impl Into<Expr>) -> Expr {
    compare(CompareOp::Neq, left, right)
}

pub fn lt(left: impl Into<Expr>, right: impl Into<Expr>) -> Expr {
    compare(CompareOp::Lt, left, right)
}

pub fn lte(left: impl Into<Expr>, right: impl Into<Expr>) -> Expr {
    compare(CompareOp::Lte, left, right)
}

pub fn gt(left: impl Into<Expr>, right: impl Into<Expr>) -> Expr {
    compare(CompareOp::Gt, left, right)
}

pub fn gte(left: impl Into<Expr>, right: impl Into<Expr>) -> Expr {
    compare(CompareOp::Gte, left, right)
}

/// N-ary conjunction, compiled fully parenthesized.
pub fn and(children: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::And(children.into_iter().collect())
}

/// N-ary disjunction, compiled fully parenthesized.
pub fn or(children: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::Or(children.into_iter().collect())
}

/// Table reference for a model.
pub fn table<M: Model>() -> Expr {
    Expr::Table(M::schema().table())
}

/// Inner join against a model's table.
pub fn join<M: Model>(on: Expr) -> Expr {
    Expr::Join(Join {
        table: M::schema().table(),
        on: Box::new(on),
    })
}

/// Left outer join against a model's table.
pub fn left_join<M: Model>(on: Expr) -> Expr {
    Expr::LeftJoin(Join {
        table: M::schema().table(),
        on: Box::new(on),
    })
}

/// A composable query value: a projection (one or more model types), an
/// optional constraint tree, and explicit joins.
///
/// Queries are immutable; every transformation returns a new value. The
/// projected property list is derived at construction in a deterministic
/// order (models in projection order, attributes sorted by name) so result
/// rows can be zipped back onto properties reproducibly.
pub struct Query<S: Selectable> {
    properties: Vec<&'static Property>,
    constraints: Option<Expr>,
    joins: Vec<Expr>,
    _select: PhantomData<fn() -> S>,
}

// hand-written so the projection type is not required to be Clone/Debug
impl<S: Selectable> Clone for Query<S> {
    fn clone(&self) -> Self {
        Self {
            properties: self.properties.clone(),
            constraints: self.constraints.clone(),
            joins: self.joins.clone(),
            _select: PhantomData,
        }
    }
}

impl<S: Selectable> std::fmt::Debug for Query<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("properties", &self.properties)
            .field("constraints", &self.constraints)
            .field("joins", &self.joins)
            .finish()
    }
}

impl<S: Selectable> Query<S> {
    pub fn new() -> Self {
        Self::assemble(None, Vec::new())
    }

    /// Query with an initial constraint.
    pub fn filter(constraints: Expr) -> Self {
        Self::assemble(Some(constraints), Vec::new())
    }

    fn assemble(constraints: Option<Expr>, joins: Vec<Expr>) -> Self {
        let mut properties = Vec::new();
        for schema in S::schemas() {
            properties.extend(schema.sorted_attributes());
        }
        Self {
            properties,
            constraints,
            joins,
            _select: PhantomData,
        }
    }

    /// Narrow the query by AND-ing another constraint onto the tree.
    pub fn with_constraint(self, expr: Expr) -> Self {
        Self {
            properties: self.properties,
            constraints: Some(and_constraint(self.constraints, expr)),
            joins: self.joins,
            _select: PhantomData,
        }
    }

    /// Attach an explicit join.
    pub fn with_join(self, join: Expr) -> Self {
        let mut joins = self.joins;
        joins.push(join);
        Self {
            properties: self.properties,
            constraints: self.constraints,
            joins,
            _select: PhantomData,
        }
    }

    /// Re-project onto `T`, AND-ing `constraints` onto the existing tree and
    /// carrying joins forward.
    pub fn find<T: Selectable>(self, constraints: Expr) -> Query<T> {
        Query::<T>::assemble(
            Some(and_constraint(self.constraints, constraints)),
            self.joins,
        )
    }

    /// The properties this query returns, in SELECT/zipping order.
    pub fn properties(&self) -> &[&'static Property] {
        &self.properties
    }

    pub fn constraints(&self) -> Option<&Expr> {
        self.constraints.as_ref()
    }

    pub fn joins(&self) -> &[Expr] {
        &self.joins
    }
}

impl<S: Selectable> Default for Query<S> {
    fn default() -> Self {
        Self::new()
    }
}

fn and_constraint(existing: Option<Expr>, new: Expr) -> Expr {
    match existing {
        Some(old) => Expr::And(vec![old, new]),
        None => new,
    }
}
