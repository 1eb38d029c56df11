//! Type system feature
//!
//! The IR's closed set of type descriptors and the per-build interner.
//! Host type derivation (the recursive, depth-bounded lifting of external
//! type descriptors into these ids) lives in the ssa feature's host
//! bridge; this feature owns only the descriptors themselves.

pub mod domain;

pub use domain::{TypeData, TypeId, TypeKind, TypeStore};
