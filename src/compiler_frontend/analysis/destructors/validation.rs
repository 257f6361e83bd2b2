//! Re-checks a lowered body. Every explicit drop must hit initialized storage
//! and nothing may be left for the checker to destroy, otherwise the lowering
//! is wrong and the result is an internal compiler error.

use crate::compiler_frontend::analysis::ownership_checker::{AnalysisInputs, analyze_function};
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::ir::ir_nodes::{FunctionBody, FunctionDecl};
use crate::{drop_log, return_compiler_error};

pub(crate) fn validate_lowering(
    inputs: &AnalysisInputs<'_>,
    function: &FunctionDecl,
    lowered: &FunctionBody,
) -> Result<(), CompilerError> {
    let analysis = analyze_function(inputs, function, Some(lowered))?;
    let name = &analysis.report.name;

    if let Some(error) = analysis.diagnostics.into_iter().next() {
        return_compiler_error!(
            "Drop lowering of '{}' produced a body that no longer checks: {}",
            name,
            error.msg;
            {
                CompilationStage => "Drop Validation",
                FunctionName => name.as_str(),
            }
        );
    }

    // Trivial drops were left out on purpose when eliding them
    let missing = analysis
        .report
        .drops
        .iter()
        .filter(|drop| !(inputs.config.elide_trivial_drops && drop.trivial))
        .collect::<Vec<_>>();

    if let Some(first) = missing.first() {
        return_compiler_error!(
            "Drop lowering of '{}' left {} values undestroyed, first {:?} at {:?}",
            name,
            missing.len(),
            first.subject,
            first.placement;
            {
                CompilationStage => "Drop Validation",
                FunctionName => name.as_str(),
            }
        );
    }

    drop_log!(format!("[Drops] lowered body of '{}' validated", name));
    Ok(())
}
