/// Declare a model: a struct owning a [`FieldStore`](crate::FieldStore), an
/// eagerly-built schema, one `&'static Property` accessor per attribute, and
/// the [`Model`](crate::Model)/[`Selectable`](crate::Selectable) impls.
///
/// ```
/// use catena::model;
///
/// model! {
///     pub struct Empty("empty") {
///         id: Int [primary],
///         name: Bytes,
///         uni: Text,
///     }
/// }
///
/// let schema = <Empty as catena::Model>::schema();
/// assert_eq!(schema.table(), "empty");
/// assert!(Empty::id().is_primary());
/// ```
///
/// Attribute kinds are the [`PropertyKind`](crate::PropertyKind) variants;
/// the only flag is `primary`. Models needing column renames, defaults, or
/// validators implement [`Model`](crate::Model) by hand with
/// [`ModelSchema::builder`](crate::ModelSchema::builder).
#[macro_export]
macro_rules! model {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident ($table:literal) {
            $( $attr:ident : $kind:ident $( [ $($flag:ident),+ ] )? ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            fields: $crate::FieldStore,
        }

        impl $name {
            /// Fresh instance with nothing set and nothing marked changed.
            $vis fn new() -> Self {
                Self { fields: $crate::FieldStore::new() }
            }

            $(
                $vis fn $attr() -> &'static $crate::Property {
                    <Self as $crate::Model>::schema()
                        .attribute(stringify!($attr))
                        .expect("declared attribute")
                }
            )+
        }

        impl $crate::Model for $name {
            fn schema() -> &'static $crate::ModelSchema {
                static SCHEMA: $crate::once_cell::sync::Lazy<$crate::ModelSchema> =
                    $crate::once_cell::sync::Lazy::new(|| {
                        $crate::ModelSchema::builder($table)
                            $(
                                .property(
                                    $crate::Property::new(
                                        stringify!($attr),
                                        $crate::PropertyKind::$kind,
                                    )
                                    $($(.$flag())+)?
                                )
                            )+
                            .build()
                    });
                &SCHEMA
            }

            fn store(&self) -> &$crate::FieldStore {
                &self.fields
            }

            fn store_mut(&mut self) -> &mut $crate::FieldStore {
                &mut self.fields
            }

            fn from_store(fields: $crate::FieldStore) -> Self {
                Self { fields }
            }
        }

        impl $crate::Selectable for $name {
            fn schemas() -> ::std::vec::Vec<&'static $crate::ModelSchema> {
                ::std::vec![<Self as $crate::Model>::schema()]
            }

            fn reconstitute(
                pairs: ::std::vec::Vec<(&'static $crate::Property, $crate::Value)>,
            ) -> $crate::OrmResult<Self> {
                $crate::reconstitute_single(pairs)
            }
        }
    };
}
