use crate::error::{OrmError, OrmResult};
use crate::property::{FieldStore, Property};
use crate::value::Value;
use std::collections::HashMap;

/// Derived metadata for a model type: its table, its properties, and its
/// primary key. Built once per type, eagerly, inside a `Lazy` static; the
/// attribute/column name binding happens here, never on first access.
#[derive(Debug)]
pub struct ModelSchema {
    table: &'static str,
    properties: Vec<Property>,
}

impl ModelSchema {
    pub fn builder(table: &'static str) -> ModelSchemaBuilder {
        ModelSchemaBuilder {
            table,
            properties: Vec::new(),
        }
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    /// Declared properties, in declaration order.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Look up a property by attribute name.
    pub fn attribute(&self, attr_name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.attr_name() == attr_name)
    }

    /// Properties grouped by column name, in declaration order. Several
    /// properties may intentionally share one column.
    pub fn columns(&self) -> Vec<(&'static str, Vec<&Property>)> {
        let mut order: Vec<&'static str> = Vec::new();
        let mut groups: HashMap<&'static str, Vec<&Property>> = HashMap::new();
        for prop in &self.properties {
            let entry = groups.entry(prop.column_name()).or_default();
            if entry.is_empty() {
                order.push(prop.column_name());
            }
            entry.push(prop);
        }
        order
            .into_iter()
            .filter_map(|name| groups.remove(name).map(|props| (name, props)))
            .collect()
    }

    /// The primary-key properties, in declaration order.
    pub fn primaries(&self) -> Vec<&Property> {
        self.properties.iter().filter(|p| p.is_primary()).collect()
    }

    /// Properties sorted lexically by attribute name. This is the
    /// deterministic projection order used to build SELECT column lists and
    /// to zip result rows back into values.
    pub fn sorted_attributes(&self) -> Vec<&Property> {
        let mut props: Vec<&Property> = self.properties.iter().collect();
        props.sort_by_key(|p| p.attr_name());
        props
    }
}

pub struct ModelSchemaBuilder {
    table: &'static str,
    properties: Vec<Property>,
}

impl ModelSchemaBuilder {
    pub fn property(mut self, mut prop: Property) -> Self {
        prop.bind_table(self.table);
        self.properties.push(prop);
        self
    }

    pub fn build(self) -> ModelSchema {
        ModelSchema {
            table: self.table,
            properties: self.properties,
        }
    }
}

/// A type mapped to a database table.
///
/// The instance owns its attribute values in a [`FieldStore`];
/// [`from_store`](Model::from_store) is the reconstitution entry point and
/// must not run any user construction logic.
pub trait Model: Sized + 'static {
    fn schema() -> &'static ModelSchema;

    fn store(&self) -> &FieldStore;

    fn store_mut(&mut self) -> &mut FieldStore;

    /// Allocate an instance around an existing store, bypassing any normal
    /// constructor.
    fn from_store(store: FieldStore) -> Self;

    /// Read an attribute through its property descriptor.
    fn get(&mut self, prop: &Property) -> OrmResult<Value> {
        prop.get(self.store_mut())
    }

    /// Write an attribute through its property descriptor, running its
    /// validator chain.
    fn set(&mut self, prop: &Property, value: impl Into<Value>) -> OrmResult<()> {
        prop.set(self.store_mut(), value)
    }
}

/// ORM-related view of a single object: which properties have changed since
/// the last sync with storage.
pub struct ObjectInfo<'a, M: Model> {
    obj: &'a mut M,
}

pub fn object_info<M: Model>(obj: &mut M) -> ObjectInfo<'_, M> {
    ObjectInfo { obj }
}

impl<'a, M: Model> ObjectInfo<'a, M> {
    /// Changed properties, in the order they were first modified. Every
    /// declared property is materialized first so that default-driven
    /// changes are included.
    pub fn changed(&mut self) -> OrmResult<Vec<&'static Property>> {
        let schema = M::schema();
        for prop in schema.properties() {
            prop.get(self.obj.store_mut())?;
        }
        Ok(self
            .obj
            .store()
            .changed()
            .iter()
            .filter_map(|name| schema.attribute(name))
            .collect())
    }

    /// Clear the changed list so an immediate `changed()` returns nothing.
    pub fn reset_changed(&mut self) {
        self.obj.store_mut().reset_changed();
    }
}

/// A projection target: a single model, or a tuple of models for multi-class
/// join queries.
pub trait Selectable: Sized {
    /// The schemas projected, in projection order.
    fn schemas() -> Vec<&'static ModelSchema>;

    /// Rebuild typed object(s) from `(property, value)` pairs, grouping
    /// strictly by each pair's own property's owning table.
    fn reconstitute(pairs: Vec<(&'static Property, Value)>) -> OrmResult<Self>;
}

/// Partition pairs by owning table, preserving first-seen table order, and
/// load each group into a fresh store through the database path (so nothing
/// ends up marked changed).
pub fn reconstitute_groups(
    pairs: Vec<(&'static Property, Value)>,
) -> Vec<(&'static str, FieldStore)> {
    let mut order: Vec<&'static str> = Vec::new();
    let mut groups: HashMap<&'static str, FieldStore> = HashMap::new();
    for (prop, value) in pairs {
        let table = prop.table();
        let store = groups.entry(table).or_insert_with(|| {
            order.push(table);
            FieldStore::new()
        });
        prop.from_database(store, value);
    }
    order
        .into_iter()
        .filter_map(|table| groups.remove(table).map(|store| (table, store)))
        .collect()
}

pub(crate) fn take_group<M: Model>(
    groups: &mut Vec<(&'static str, FieldStore)>,
) -> OrmResult<FieldStore> {
    let table = M::schema().table();
    match groups.iter().position(|(t, _)| *t == table) {
        Some(i) => Ok(groups.remove(i).1),
        None => Err(OrmError::schema(format!(
            "no columns for table {} in result row",
            table
        ))),
    }
}

/// Reconstitute a single model from its pairs. Shared by the `model!` macro
/// and hand-written `Selectable` impls.
pub fn reconstitute_single<M: Model>(
    pairs: Vec<(&'static Property, Value)>,
) -> OrmResult<M> {
    let mut groups = reconstitute_groups(pairs);
    let store = take_group::<M>(&mut groups)?;
    Ok(M::from_store(store))
}

impl<A: Model, B: Model> Selectable for (A, B) {
    fn schemas() -> Vec<&'static ModelSchema> {
        vec![A::schema(), B::schema()]
    }

    fn reconstitute(pairs: Vec<(&'static Property, Value)>) -> OrmResult<Self> {
        let mut groups = reconstitute_groups(pairs);
        let a = take_group::<A>(&mut groups)?;
        let b = take_group::<B>(&mut groups)?;
        Ok((A::from_store(a), B::from_store(b)))
    }
}

impl<A: Model, B: Model, C: Model> Selectable for (A, B, C) {
    fn schemas() -> Vec<&'static ModelSchema> {
        vec![A::schema(), B::schema(), C::schema()]
    }

    fn reconstitute(pairs: Vec<(&'static Property, Value)>) -> OrmResult<Self> {
        let mut groups = reconstitute_groups(pairs);
        let a = take_group::<A>(&mut groups)?;
        let b = take_group::<B>(&mut groups)?;
        let c = take_group::<C>(&mut groups)?;
        Ok((A::from_store(a), B::from_store(b), C::from_store(c)))
    }
}
