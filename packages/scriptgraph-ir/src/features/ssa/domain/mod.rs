//! SSA domain model: the node graph and the containment hierarchy

pub mod node;
pub mod program;

pub use node::{
    BinaryOp, ConstValue, Node, NodeArena, NodeKind, SwitchLabel, UnaryOp, ValueId,
};
pub use program::{BasicBlock, BlockId, FuncId, Function, Package, PackageId, Program};
