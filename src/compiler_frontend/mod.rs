pub mod analysis;
pub mod ir;

pub(crate) mod compiler_messages {
    pub(crate) mod compiler_dev_logging;
    pub mod compiler_errors;
    pub mod display_messages;
}
pub use compiler_messages::compiler_errors;
pub use compiler_messages::display_messages;
pub mod string_interning;

use crate::compiler_frontend::analysis::classifier::validate_type_capabilities;
use crate::compiler_frontend::analysis::conventions::{ResolvedSignature, resolve_signature};
use crate::compiler_frontend::analysis::destructors::{
    StatementIds, build_destructor_plans, lower_drops, validate_lowering,
};
use crate::compiler_frontend::analysis::ownership_checker::{
    AnalysisInputs, FunctionAnalysis, OwnershipReport, OwnershipStats, analyze_function,
};
use crate::compiler_frontend::compiler_errors::{CompilerError, CompilerMessages, CompilerWarning};
use crate::compiler_frontend::ir::ir_nodes::{FunctionId, IrModule};
use crate::settings::CheckerConfig;
use crate::{borrow_log, drop_log, return_compiler_error, timer_log};
use rayon::prelude::*;
use std::time::Instant;

/// Diagnostics found before the analysis finished, tagged with the function
/// they belong to. Module level problems have no function.
pub(crate) type TaggedErrors = Vec<(Option<FunctionId>, CompilerError)>;

pub struct OwnershipFrontend<'a> {
    module: &'a IrModule,
    config: &'a CheckerConfig,
}

impl<'a> OwnershipFrontend<'a> {
    pub fn new(module: &'a IrModule, config: &'a CheckerConfig) -> Self {
        Self { module, config }
    }

    /// Run every phase. The module is either accepted with a full report, or
    /// rejected with every diagnostic found in it.
    pub fn check(&self) -> Result<OwnershipReport, CompilerMessages> {
        let mut errors = TaggedErrors::new();

        let time = Instant::now();
        errors.extend(self.validate_types().into_iter().map(|error| (None, error)));
        let signatures = self
            .resolve_signatures(&mut errors)
            .map_err(CompilerMessages::from_error)?;
        timer_log!(time, "Signatures resolved in: ");

        let time = Instant::now();
        let analyses = self
            .check_functions(&signatures)
            .map_err(CompilerMessages::from_error)?;
        timer_log!(time, "Ownership checked in: ");

        let mut warnings: Vec<CompilerWarning> = Vec::new();
        let mut reports = Vec::with_capacity(analyses.len());
        for analysis in analyses {
            let function = analysis.report.function;
            errors.extend(analysis.diagnostics.into_iter().map(|error| (Some(function), error)));
            warnings.extend(analysis.report.warnings.iter().cloned());
            reports.push(analysis.report);
        }

        if !errors.is_empty() {
            return Err(CompilerMessages {
                errors: sorted_errors(errors),
                warnings,
            });
        }

        let time = Instant::now();
        let mut report = OwnershipReport {
            functions: reports,
            destructor_plans: build_destructor_plans(
                &self.module.types,
                &self.module.string_table,
                self.config.destructor_order,
            ),
            stats: OwnershipStats::default(),
        };
        self.lower_drops(&signatures, &mut report)
            .map_err(CompilerMessages::from_error)?;
        timer_log!(time, "Drops lowered in: ");

        self.collect_stats(&mut report);
        Ok(report)
    }

    // ------------------------------
    //  TYPE CAPABILITY VALIDATION
    // ------------------------------
    // Capabilities are declared by the frontend. Combinations the analysis
    // cannot honour are rejected before any function is looked at.
    pub(crate) fn validate_types(&self) -> Vec<CompilerError> {
        validate_type_capabilities(&self.module.types, &self.module.string_table)
    }

    // ------------------------------
    //     SIGNATURE RESOLUTION
    // ------------------------------
    // Every function gets explicit conventions and origin labels first, so call
    // sites can be checked against any callee regardless of analysis order.
    // Problems with a signature are reported but still produce a best effort
    // signature.
    pub(crate) fn resolve_signatures(
        &self,
        errors: &mut TaggedErrors,
    ) -> Result<Vec<ResolvedSignature>, CompilerError> {
        let mut signatures = Vec::with_capacity(self.module.functions.len());

        for (index, function) in self.module.functions.iter().enumerate() {
            if function.id.0 as usize != index {
                return_compiler_error!(
                    "Function '{}' is stored at index {}, functions must be stored in id order",
                    function.id,
                    index
                );
            }

            let resolution = resolve_signature(self.module, function)?;
            errors.extend(
                resolution
                    .diagnostics
                    .into_iter()
                    .map(|error| (Some(function.id), error)),
            );
            signatures.push(resolution.signature);
        }

        Ok(signatures)
    }

    // ------------------------------
    //  OWNERSHIP AND ORIGIN CHECKING
    // ------------------------------
    // Functions only see each other through their resolved signatures,
    // so they are analyzed independently and in parallel when enabled.
    pub(crate) fn check_functions(
        &self,
        signatures: &[ResolvedSignature],
    ) -> Result<Vec<FunctionAnalysis>, CompilerError> {
        let inputs = AnalysisInputs {
            module: self.module,
            signatures,
            config: self.config,
        };

        let functions = &self.module.functions;
        let mut analyses = if self.config.parallel {
            functions
                .par_iter()
                .map(|function| analyze_function(&inputs, function, function.body.as_ref()))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            functions
                .iter()
                .map(|function| analyze_function(&inputs, function, function.body.as_ref()))
                .collect::<Result<Vec<_>, _>>()?
        };

        analyses.sort_by_key(|analysis| analysis.report.function);
        Ok(analyses)
    }

    // ------------------------------
    //         DROP LOWERING
    // ------------------------------
    // Accepted bodies are rewritten with explicit drop statements. Each lowered
    // body is checked again and must come out with nothing left to drop.
    // Runs in function order so the new statement ids are deterministic.
    pub(crate) fn lower_drops(
        &self,
        signatures: &[ResolvedSignature],
        report: &mut OwnershipReport,
    ) -> Result<(), CompilerError> {
        let inputs = AnalysisInputs {
            module: self.module,
            signatures,
            config: self.config,
        };

        let mut ids = StatementIds::after(
            self.module
                .functions
                .iter()
                .filter_map(|function| function.body.as_ref()),
        );

        for function_report in &mut report.functions {
            let Some(function) = self.module.function(function_report.function) else {
                return_compiler_error!("Report for unknown function '{}'", function_report.function);
            };
            let Some(body) = &function.body else {
                continue;
            };

            let lowered = lower_drops(
                &self.module.types,
                &function_report.signature,
                body,
                &function_report.drops,
                &function_report.call_resolutions,
                self.config,
                &mut ids,
            )?;

            validate_lowering(&inputs, function, &lowered)?;
            drop_log!(ir::ir_display::display_body(self.module, function, &lowered));
            function_report.lowered_body = Some(lowered);
        }

        Ok(())
    }

    fn collect_stats(&self, report: &mut OwnershipReport) {
        let mut stats = OwnershipStats::default();

        for function_report in &report.functions {
            match self.module.function(function_report.function) {
                Some(function) if function.body.is_some() => {
                    stats.add_function(&function_report.stats, function_report.drops.len());
                }
                _ => stats.external_functions += 1,
            }
        }

        borrow_log!(format!("[Ownership] module accepted: {:?}", stats));
        report.stats = stats;
    }
}

/// Check a module with the given configuration.
pub fn check_module(
    module: &IrModule,
    config: &CheckerConfig,
) -> Result<OwnershipReport, CompilerMessages> {
    OwnershipFrontend::new(module, config).check()
}

/// Module level errors first, then per function in function order, then by location.
fn sorted_errors(mut errors: TaggedErrors) -> Vec<CompilerError> {
    errors.sort_by(|(left_function, left), (right_function, right)| {
        left_function
            .cmp(right_function)
            .then_with(|| left.sort_key().cmp(&right.sort_key()))
    });

    errors.into_iter().map(|(_, error)| error).collect()
}
