//! Per-function ownership analysis.
//!
//! One forward worklist dataflow over the blocks of a body tracks
//! initialization per leaf and the origin of every reference-holding local.
//! Once the block states settle, a single walk in reverse postorder reports
//! diagnostics and collects drop insertions and facts.

mod diagnostics;
mod layout;
mod state;
mod transfer;
mod types;

#[cfg(test)]
mod tests;

pub use types::{
    CallResolution, FunctionOwnershipReport, FunctionStats, MoveRecord, OwnershipReport,
    OwnershipStats, ReferenceOriginFact, Site, ValueUseFact,
};

use crate::compiler_frontend::analysis::cfg::{ControlFlow, block_or_error};
use crate::compiler_frontend::analysis::conventions::ResolvedSignature;
use crate::compiler_frontend::analysis::destructors::Liveness;
use crate::compiler_frontend::analysis::ownership_checker::diagnostics::OwnershipDiagnostics;
use crate::compiler_frontend::analysis::ownership_checker::layout::{FunctionLayout, Storage};
use crate::compiler_frontend::analysis::ownership_checker::state::FlowState;
use crate::compiler_frontend::analysis::ownership_checker::transfer::{
    BlockRecord, TransferContext, transfer_block, transfer_edge,
};
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::ir::ir_nodes::{BlockId, FunctionBody, FunctionDecl, IrModule};
use crate::settings::CheckerConfig;
use crate::{borrow_log, return_compiler_error};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

/// Read-only data every function analysis shares.
#[derive(Clone, Copy)]
pub(crate) struct AnalysisInputs<'a> {
    pub module: &'a IrModule,

    /// Indexed by function id
    pub signatures: &'a [ResolvedSignature],
    pub config: &'a CheckerConfig,
}

pub(crate) struct FunctionAnalysis {
    pub report: FunctionOwnershipReport,
    pub diagnostics: Vec<CompilerError>,
}

/// Analyze `body` as the body of `function`. The body is passed separately so a
/// lowered body can be checked against the same signature.
pub(crate) fn analyze_function(
    inputs: &AnalysisInputs<'_>,
    function: &FunctionDecl,
    body: Option<&FunctionBody>,
) -> Result<FunctionAnalysis, CompilerError> {
    let module = inputs.module;

    let Some(signature) = inputs.signatures.get(function.id.0 as usize) else {
        return_compiler_error!("No resolved signature for function '{}'", function.id);
    };
    let name = module.name(function.name).to_owned();

    let Some(body) = body else {
        return Ok(FunctionAnalysis {
            report: FunctionOwnershipReport::external(function.id, name, signature.clone()),
            diagnostics: Vec::new(),
        });
    };

    let flow = ControlFlow::build(body)?;
    let layout = FunctionLayout::build(
        &module.types,
        function,
        signature,
        body,
        inputs.config.field_sensitive,
    )?;

    let outputs = layout
        .locals
        .iter()
        .filter(|local| local.storage == Storage::Output)
        .map(|local| local.id)
        .collect::<Vec<_>>();
    let liveness = Liveness::compute(body, &flow, &outputs)?;

    let context = TransferContext {
        module,
        types: &module.types,
        signatures: inputs.signatures,
        config: inputs.config,
        signature,
        body,
        layout,
        liveness,
        flow,
        diagnostics: OwnershipDiagnostics::new(body, &module.types, &module.string_table),
    };

    borrow_log!(format!(
        "[Ownership] Analyzing function '{}' (entry={} blocks={})",
        name,
        body.entry,
        context.flow.reachable.len()
    ));

    let mut stats = FunctionStats {
        reachable_blocks: context.flow.reachable.len(),
        ..FunctionStats::default()
    };

    let in_states = solve_block_states(&context, &mut stats)?;
    let record = collect_block_records(&context, &in_states)?;

    stats.statements_analyzed = record.statements_analyzed;
    stats.conflicts_checked = record.conflicts_checked;

    let mut drop_flags = record.drop_flags;
    drop_flags.sort();
    drop_flags.dedup();

    let return_origin = record
        .return_origin
        .as_ref()
        .map(|targets| context.layout.targets.targets(targets));

    let report = FunctionOwnershipReport {
        function: function.id,
        name,
        signature: signature.clone(),
        drops: record.drops,
        drop_flags,
        moves: record.moves,
        value_uses: record.value_uses,
        reference_origins: record.reference_origins,
        return_origin,
        call_resolutions: record.call_resolutions,
        lowered_body: None,
        warnings: record.warnings,
        stats,
    };

    Ok(FunctionAnalysis {
        report,
        diagnostics: record.diagnostics,
    })
}

/// Run the transfer functions to a fixpoint and return the settled block entry states.
/// Facts produced along the way are discarded, the states are not final yet.
fn solve_block_states(
    context: &TransferContext<'_>,
    stats: &mut FunctionStats,
) -> Result<FxHashMap<BlockId, FlowState>, CompilerError> {
    let body = context.body;

    let mut in_states: FxHashMap<BlockId, FlowState> = FxHashMap::default();
    let mut out_states: FxHashMap<BlockId, FlowState> = FxHashMap::default();

    in_states.insert(
        body.entry,
        FlowState::entry(&context.layout, context.types, context.signature),
    );

    let mut worklist = VecDeque::new();
    let mut queued = FxHashSet::default();
    worklist.push_back(body.entry);
    queued.insert(body.entry);

    while let Some(block_id) = worklist.pop_front() {
        queued.remove(&block_id);
        stats.worklist_iterations += 1;

        let Some(input_state) = in_states.get(&block_id).cloned() else {
            continue;
        };

        let block = block_or_error(body, block_id)?;
        let mut output_state = input_state;
        transfer_block(context, block, &mut output_state)?;

        let changed_out = out_states.get(&block_id) != Some(&output_state);
        if !changed_out {
            continue;
        }

        for successor in block.terminator.kind.successors() {
            let mut incoming = output_state.clone();
            transfer_edge(context, block, successor, &mut incoming)?;

            let next = match in_states.get(&successor) {
                Some(existing) => existing.join(&incoming),
                None => incoming,
            };

            if in_states.get(&successor) == Some(&next) {
                continue;
            }

            in_states.insert(successor, next);
            if queued.insert(successor) {
                worklist.push_back(successor);
            }
        }

        out_states.insert(block_id, output_state);
    }

    Ok(in_states)
}

/// Transfer every reachable block once more from its settled state, keeping the facts
fn collect_block_records(
    context: &TransferContext<'_>,
    in_states: &FxHashMap<BlockId, FlowState>,
) -> Result<BlockRecord, CompilerError> {
    let mut record = BlockRecord::default();

    for block_id in &context.flow.reverse_postorder {
        let Some(input_state) = in_states.get(block_id) else {
            continue;
        };

        let block = block_or_error(context.body, *block_id)?;
        let mut state = input_state.clone();
        record.merge(transfer_block(context, block, &mut state)?);

        for successor in block.terminator.kind.successors() {
            let mut incoming = state.clone();
            record.merge(transfer_edge(context, block, successor, &mut incoming)?);
        }
    }

    Ok(record)
}
