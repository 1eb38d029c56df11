//! Type system domain model

pub mod types;

pub use types::{TypeData, TypeId, TypeKind, TypeStore};
