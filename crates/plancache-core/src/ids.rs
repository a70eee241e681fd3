//! Object identifiers for schema objects the cache references.
//!
//! The zero value is reserved as the invalid sentinel in every identifier
//! space; resolved identifiers must be revalidated before use because the
//! underlying objects can be dropped and their identifiers reused.

use serde::{Deserialize, Serialize};

macro_rules! object_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub u32);

        impl $name {
            pub const INVALID: $name = $name(0);

            pub fn is_valid(self) -> bool {
                self.0 != 0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

object_id!(
    /// Identifier of a relation (table) in the host catalog
    RelationId
);
object_id!(
    /// Identifier of an index in the host catalog
    IndexId
);
object_id!(
    /// Identifier of a function in the host catalog
    FunctionId
);
object_id!(
    /// Identifier of a schema (namespace) in the host catalog
    SchemaId
);
