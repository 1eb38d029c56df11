//! SSA application layer

pub mod build_program;

pub use build_program::{export_json, summarize, FunctionSummary, PackageSummary, ProgramSummary};
