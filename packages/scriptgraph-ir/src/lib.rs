/*
 * scriptgraph-ir - Incremental SSA engine for script analysis
 *
 * Feature-First Hexagonal Architecture:
 * - shared/      : Common models (Span, Diagnostic)
 * - features/    : Vertical slices (type_system, ssa)
 *
 * The engine converts a stream of source-level statements, scoped by
 * functions and basic blocks, directly into SSA form while the control
 * flow graph is still being assembled: no dominator tree, phis inserted
 * on demand at block seal time and minimized in place. Host-exposed
 * values and types (including recursive type graphs) are lifted into the
 * IR through a per-build bridge. The finished Program is handed to
 * downstream static-analysis consumers as a read-only graph.
 */

#![allow(clippy::upper_case_acronyms)] // SSA naming
#![allow(clippy::new_without_default)]

pub mod errors;
pub mod features;
pub mod shared;

pub use errors::{Result, ScriptGraphError};
pub use features::ssa::{
    application::{export_json, summarize, ProgramSummary},
    BasicBlock, BinaryOp, BlockId, BuilderStats, CallFlags, ConstValue, FuncId, Function, HostEnv,
    HostField, HostFunction, HostInterface, HostStruct, HostType, HostValue, Node, NodeArena,
    NodeKind, Package, PackageId, Program, ProgramBuilder, SwitchLabel, UnaryOp, ValueId,
    MAX_TYPE_LEVEL,
};
pub use features::type_system::{TypeData, TypeId, TypeKind, TypeStore};
pub use shared::models::{Diagnostic, DiagnosticKind, DiagnosticTag, Location, Span};
