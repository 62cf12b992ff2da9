//! Structured-schema capability and declared-type hints.
//!
//! A type opts into structured-schema handling by implementing
//! [`SchemaModel`], normally through `#[derive(SchemaModel)]`. Handlers
//! carry a [`TypeHint`] for their input and output types; a hint that
//! reports [`TypeHint::is_structured_schema`] lets handler construction
//! replace the default codec with a [`SchemaSerde`].
//!
//! Hints are produced by [`type_hint!`](crate::type_hint), which picks the
//! schema flavour when the type implements [`SchemaModel`] and the plain
//! flavour otherwise. The choice happens at compile time through autoref
//! specialization, see [`kind`].

use super::serialization::{SchemaSerde, Serde};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A type with a declared structured schema.
///
/// # Example
///
/// ```
/// use praxis::SchemaModel;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize, SchemaModel)]
/// #[schema(validate = Order::check)]
/// struct Order {
///     quantity: u32,
/// }
///
/// impl Order {
///     fn check(&self) -> Result<(), String> {
///         if self.quantity == 0 {
///             return Err("quantity must be positive".into());
///         }
///         Ok(())
///     }
/// }
///
/// assert_eq!(<Order as praxis::core::SchemaModel>::schema_name(), "Order");
/// ```
pub trait SchemaModel: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable name of the model, used in validation errors and discovery.
    fn schema_name() -> &'static str;

    /// Checks model constraints that JSON decoding alone cannot express.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

struct SchemaSupport<T> {
    name: &'static str,
    make_serde: fn() -> Arc<dyn Serde<T>>,
}

impl<T> Clone for SchemaSupport<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            make_serde: self.make_serde,
        }
    }
}

fn schema_serde<T: SchemaModel>() -> Arc<dyn Serde<T>> {
    Arc::new(SchemaSerde::<T>::new())
}

/// The declared type of a handler's input or output.
pub struct TypeHint<T> {
    annotation: Option<&'static str>,
    schema: Option<SchemaSupport<T>>,
}

impl<T> TypeHint<T> {
    /// A hint for a type without a structured schema.
    pub fn plain() -> Self {
        Self {
            annotation: Some(std::any::type_name::<T>()),
            schema: None,
        }
    }

    /// A hint with no declared type at all.
    pub fn unannotated() -> Self {
        Self {
            annotation: None,
            schema: None,
        }
    }

    pub fn annotation(&self) -> Option<&'static str> {
        self.annotation
    }

    pub fn is_structured_schema(&self) -> bool {
        self.schema.is_some()
    }

    pub fn schema_name(&self) -> Option<&'static str> {
        self.schema.as_ref().map(|schema| schema.name)
    }

    /// A fresh structured-schema codec, if the hinted type has one.
    pub fn schema_serde(&self) -> Option<Arc<dyn Serde<T>>> {
        self.schema.as_ref().map(|schema| (schema.make_serde)())
    }
}

impl<T: SchemaModel> TypeHint<T> {
    /// A hint for a structured-schema model.
    pub fn schema() -> Self {
        Self {
            annotation: Some(std::any::type_name::<T>()),
            schema: Some(SchemaSupport {
                name: T::schema_name(),
                make_serde: schema_serde::<T>,
            }),
        }
    }
}

impl<T> Clone for TypeHint<T> {
    fn clone(&self) -> Self {
        Self {
            annotation: self.annotation,
            schema: self.schema.clone(),
        }
    }
}

impl<T> fmt::Debug for TypeHint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeHint")
            .field("annotation", &self.annotation)
            .field("schema", &self.schema_name())
            .finish()
    }
}

/// Autoref specialization checks behind [`type_hint!`](crate::type_hint).
///
/// `SchemaKind` is implemented on `Probe<T>` for schema models and
/// `PlainKind` on `&Probe<T>` for everything. Method resolution on
/// `(&Probe::<T>::new()).type_hint()` tries `&Probe<T>` before `&&Probe<T>`,
/// so the schema impl wins whenever it applies.
pub mod kind {
    use super::{SchemaModel, TypeHint};
    use std::marker::PhantomData;

    pub struct Probe<T>(PhantomData<fn() -> T>);

    impl<T> Probe<T> {
        pub fn new() -> Self {
            Probe(PhantomData)
        }
    }

    impl<T> Default for Probe<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    pub trait SchemaKind {
        type Target;
        fn type_hint(&self) -> TypeHint<Self::Target>;
    }

    impl<T: SchemaModel> SchemaKind for Probe<T> {
        type Target = T;

        fn type_hint(&self) -> TypeHint<T> {
            TypeHint::schema()
        }
    }

    pub trait PlainKind {
        type Target;
        fn type_hint(&self) -> TypeHint<Self::Target>;
    }

    impl<T> PlainKind for &Probe<T> {
        type Target = T;

        fn type_hint(&self) -> TypeHint<T> {
            TypeHint::plain()
        }
    }
}

/// Builds the [`TypeHint`](crate::core::TypeHint) for a type, detecting
/// structured-schema models.
///
/// ```
/// use praxis::type_hint;
///
/// assert!(!type_hint!(i32).is_structured_schema());
/// ```
#[macro_export]
macro_rules! type_hint {
    ($ty:ty) => {{
        #[allow(unused_imports)]
        use $crate::core::kind::{PlainKind as _, SchemaKind as _};
        (&$crate::core::kind::Probe::<$ty>::new()).type_hint()
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CoreError, SerdeKind};
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize)]
    struct Temperature {
        celsius: f64,
    }

    impl SchemaModel for Temperature {
        fn schema_name() -> &'static str {
            "Temperature"
        }

        fn validate(&self) -> Result<(), String> {
            if self.celsius < -273.15 {
                return Err("below absolute zero".to_string());
            }
            Ok(())
        }
    }

    #[test]
    fn test_type_hint_detects_schema_models() {
        let hint = crate::type_hint!(Temperature);
        assert!(hint.is_structured_schema());
        assert_eq!(hint.schema_name(), Some("Temperature"));

        let serde = hint.schema_serde().unwrap();
        assert_eq!(serde.kind(), SerdeKind::Schema);
        let err = serde.deserialize(br#"{"celsius": -300.0}"#).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[test]
    fn test_type_hint_plain_types() {
        let hint = crate::type_hint!(Vec<String>);
        assert!(!hint.is_structured_schema());
        assert!(hint.schema_serde().is_none());
        assert!(hint.annotation().unwrap().contains("Vec"));
    }

    #[test]
    fn test_unannotated_hint() {
        let hint = TypeHint::<i32>::unannotated();
        assert_eq!(hint.annotation(), None);
        assert!(!hint.is_structured_schema());
    }
}
