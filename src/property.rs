use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use std::collections::HashMap;

/// The built-in typed attribute kinds.
///
/// Each kind contributes exactly one type-check validator, run after any
/// user-supplied validators. The kind is also the key into a backend's
/// [`Converter`](crate::convert::Converter) registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Int,
    Bool,
    Date,
    DateTime,
    Bytes,
    Text,
}

impl PropertyKind {
    /// The built-in validator for this kind. `Null` is always accepted;
    /// `Bool` coerces integers through truthiness, everything else demands
    /// its exact value variant.
    fn check(&self, prop: &Property, value: Value) -> OrmResult<Value> {
        if value.is_null() {
            return Ok(value);
        }
        match (self, &value) {
            (PropertyKind::Int, Value::Integer(_)) => Ok(value),
            (PropertyKind::Bool, Value::Boolean(_)) => Ok(value),
            (PropertyKind::Bool, Value::Integer(i)) => Ok(Value::Boolean(*i != 0)),
            (PropertyKind::Date, Value::Date(_)) => Ok(value),
            (PropertyKind::DateTime, Value::DateTime(_)) => Ok(value),
            (PropertyKind::Bytes, Value::Blob(_)) => Ok(value),
            (PropertyKind::Text, Value::Text(_)) => Ok(value),
            _ => Err(OrmError::validation(prop.qualified_name(), value)),
        }
    }
}

/// A validation step: receives the property, the object's field store, and
/// the value-so-far; returns the (possibly transformed) accepted value.
pub type Validator = fn(&Property, &FieldStore, Value) -> OrmResult<Value>;

/// A one-way value conversion attached to a single property.
pub type ConvertFn = fn(Value) -> Value;

/// Zero-argument producer for an attribute's default value.
pub type DefaultFn = fn() -> Value;

/// A typed, named descriptor mapping a model attribute to a database column.
///
/// Properties are stateless: per-object values and change tracking live in
/// the object's own [`FieldStore`]. The owning table is bound once, eagerly,
/// when the model's schema is built.
#[derive(Debug, Clone)]
pub struct Property {
    attr_name: &'static str,
    column_name: &'static str,
    kind: PropertyKind,
    primary: bool,
    table: &'static str,
    default_factory: Option<DefaultFn>,
    from_database_fn: Option<ConvertFn>,
    to_database_fn: Option<ConvertFn>,
    validators: Vec<Validator>,
}

impl Property {
    pub fn new(attr_name: &'static str, kind: PropertyKind) -> Self {
        Self {
            attr_name,
            column_name: attr_name,
            kind,
            primary: false,
            table: "",
            default_factory: None,
            from_database_fn: None,
            to_database_fn: None,
            validators: Vec::new(),
        }
    }

    /// Map this attribute to a column named differently than the attribute.
    pub fn column(mut self, column_name: &'static str) -> Self {
        self.column_name = column_name;
        self
    }

    /// Mark this attribute as part of the primary key.
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Attach a default-value producer. Materializing the default counts as
    /// a change, since the value must eventually be persisted.
    pub fn default_factory(mut self, factory: DefaultFn) -> Self {
        self.default_factory = Some(factory);
        self
    }

    /// Conversion applied to raw values on the database-load path.
    pub fn from_database_fn(mut self, f: ConvertFn) -> Self {
        self.from_database_fn = Some(f);
        self
    }

    /// Conversion applied when reading the value out for the database.
    pub fn to_database_fn(mut self, f: ConvertFn) -> Self {
        self.to_database_fn = Some(f);
        self
    }

    /// Append a validator. Validators run in registration order on every
    /// external write, before the kind's own type check.
    pub fn validator(mut self, v: Validator) -> Self {
        self.validators.push(v);
        self
    }

    pub(crate) fn bind_table(&mut self, table: &'static str) {
        self.table = table;
    }

    pub fn attr_name(&self) -> &'static str {
        self.attr_name
    }

    pub fn column_name(&self) -> &'static str {
        self.column_name
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Name of the table this property was bound to at schema build time.
    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn qualified_name(&self) -> String {
        if self.table.is_empty() {
            self.attr_name.to_string()
        } else {
            format!("{}.{}", self.table, self.attr_name)
        }
    }

    /// Current value for the object, materializing the default on first
    /// access. A computed default is recorded as a change; a plain `Null`
    /// fill-in is not.
    pub fn get(&self, store: &mut FieldStore) -> OrmResult<Value> {
        if let Some(v) = store.value(self.attr_name) {
            return Ok(v.clone());
        }
        if let Some(factory) = self.default_factory {
            self.set(store, factory())?;
        } else {
            store.put(self.attr_name, Value::Null);
        }
        Ok(store
            .value(self.attr_name)
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Alias for [`get`](Self::get), matching the reading side of the API.
    pub fn value_for(&self, store: &mut FieldStore) -> OrmResult<Value> {
        self.get(store)
    }

    /// Run the validator chain, store the final value, and mark the
    /// attribute changed.
    pub fn set(&self, store: &mut FieldStore, value: impl Into<Value>) -> OrmResult<()> {
        let mut value = value.into();
        for validate in &self.validators {
            value = validate(self, store, value)?;
        }
        let value = self.kind.check(self, value)?;
        store.put(self.attr_name, value);
        store.mark_changed(self.attr_name);
        Ok(())
    }

    /// The current value converted for the database.
    pub fn to_database(&self, store: &mut FieldStore) -> OrmResult<Value> {
        let value = self.get(store)?;
        Ok(match self.to_database_fn {
            Some(f) => f(value),
            None => value,
        })
    }

    /// Store a value arriving from the database, bypassing validators, and
    /// clear any changed mark: the value is now known-synced with storage.
    pub fn from_database(&self, store: &mut FieldStore, raw: Value) {
        let value = match self.from_database_fn {
            Some(f) => f(raw),
            None => raw,
        };
        store.put(self.attr_name, value);
        store.clear_changed(self.attr_name);
    }
}

/// Per-object attribute storage: the value map plus the insertion-ordered
/// list of changed attributes. Owned by the model instance itself.
#[derive(Debug, Clone, Default)]
pub struct FieldStore {
    values: HashMap<&'static str, Value>,
    changed: Vec<&'static str>,
}

impl FieldStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, attr_name: &str) -> Option<&Value> {
        self.values.get(attr_name)
    }

    pub(crate) fn put(&mut self, attr_name: &'static str, value: Value) {
        self.values.insert(attr_name, value);
    }

    pub(crate) fn mark_changed(&mut self, attr_name: &'static str) {
        if !self.changed.contains(&attr_name) {
            self.changed.push(attr_name);
        }
    }

    pub(crate) fn clear_changed(&mut self, attr_name: &str) {
        self.changed.retain(|name| *name != attr_name);
    }

    /// Names of attributes changed since the last database round-trip, in
    /// the order they were first modified.
    pub fn changed(&self) -> &[&'static str] {
        &self.changed
    }

    pub fn reset_changed(&mut self) {
        self.changed.clear();
    }
}
