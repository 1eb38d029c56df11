//! SSA construction feature
//!
//! - domain/         - node graph and containment hierarchy
//! - ports/          - host namespace boundary
//! - application/    - read-only export
//! - infrastructure/ - the incremental builder and host bridge

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use domain::{
    BasicBlock, BinaryOp, BlockId, ConstValue, FuncId, Function, Node, NodeArena, NodeKind,
    Package, PackageId, Program, SwitchLabel, UnaryOp, ValueId,
};
pub use infrastructure::{BuilderStats, CallFlags, ProgramBuilder, MAX_TYPE_LEVEL};
pub use ports::{HostEnv, HostField, HostFunction, HostInterface, HostStruct, HostType, HostValue};
