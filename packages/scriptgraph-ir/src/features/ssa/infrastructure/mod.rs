//! SSA infrastructure
//!
//! The construction algorithms over the domain model: the incremental
//! builder (variable resolution, block sealing), the phi lifecycle
//! (on-demand insertion, trivial-phi elimination), call/closure wiring,
//! and the host value/type bridge.

pub mod builder;
pub mod call;
pub mod host_bridge;
pub mod phi;

pub use builder::{BuilderStats, ProgramBuilder};
pub use call::CallFlags;
pub use host_bridge::MAX_TYPE_LEVEL;
