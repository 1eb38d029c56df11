//! Read-only program export for downstream consumers
//!
//! The finished graph is queried in-process through node traversal; this
//! module additionally provides a serialized summary (counts and
//! diagnostics per function) for reports and tooling.

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::features::ssa::domain::Program;
use crate::shared::models::Diagnostic;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSummary {
    pub name: String,
    pub blocks: usize,
    pub instructions: usize,
    pub phis: usize,
    pub free_values: usize,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSummary {
    pub name: String,
    pub functions: Vec<FunctionSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramSummary {
    pub packages: Vec<PackageSummary>,
}

/// Collect per-function counts and aggregate diagnostics
pub fn summarize(program: &Program) -> ProgramSummary {
    let packages = program
        .packages
        .iter()
        .map(|pkg| PackageSummary {
            name: pkg.name.clone(),
            functions: pkg
                .funcs
                .iter()
                .map(|&func_id| {
                    let func = program.func(func_id);
                    let mut instructions = 0;
                    let mut phis = 0;
                    for &block in &func.blocks {
                        let block = program.block(block);
                        instructions += block.insts.len();
                        phis += block.phis.len();
                    }
                    FunctionSummary {
                        name: func.name.clone(),
                        blocks: func.blocks.len(),
                        instructions,
                        phis,
                        free_values: func.free_values.len(),
                        diagnostics: program.function_diagnostics(func_id),
                    }
                })
                .collect(),
        })
        .collect();
    ProgramSummary { packages }
}

/// Serialize the summary as JSON
pub fn export_json(program: &Program) -> Result<String> {
    Ok(serde_json::to_string_pretty(&summarize(program))?)
}
