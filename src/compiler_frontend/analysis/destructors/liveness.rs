//! Backward liveness over locals.
//!
//! A local is live at a point when some path from there reads it, moves it,
//! borrows it or writes part of it before redefining it as a whole. Drop
//! statements of lowered bodies count as uses, so re-checking a lowered body
//! sees the value alive until its explicit drop.

use crate::compiler_frontend::analysis::bit_set::BitSet;
use crate::compiler_frontend::analysis::cfg::{ControlFlow, block_or_error};
use crate::compiler_frontend::analysis::origins::TargetSet;
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::ir::ir_nodes::{
    BlockId, DropSubject, FunctionBody, LocalId, Operand, Place, Rvalue, Statement,
    StatementKind, TerminatorKind,
};

#[derive(Debug, Clone)]
pub(crate) struct Liveness {
    live_in: Vec<BitSet>,
    statement_before: Vec<Vec<BitSet>>,
    statement_after: Vec<Vec<BitSet>>,
    terminator_before: Vec<BitSet>,
    local_count: usize,
}

impl Liveness {
    /// `outputs` are the locals every normal return reads: the result storage and
    /// uninitialized-output parameters.
    pub(crate) fn compute(
        body: &FunctionBody,
        flow: &ControlFlow,
        outputs: &[LocalId],
    ) -> Result<Self, CompilerError> {
        let local_count = body.locals.len();
        let block_count = body.blocks.len();

        let mut return_uses = BitSet::empty(local_count);
        for output in outputs {
            return_uses.insert(output.0 as usize);
        }

        let mut liveness = Liveness {
            live_in: vec![BitSet::empty(local_count); block_count],
            statement_before: body
                .blocks
                .iter()
                .map(|block| vec![BitSet::empty(local_count); block.statements.len()])
                .collect(),
            statement_after: body
                .blocks
                .iter()
                .map(|block| vec![BitSet::empty(local_count); block.statements.len()])
                .collect(),
            terminator_before: vec![BitSet::empty(local_count); block_count],
            local_count,
        };

        let mut changed = true;
        while changed {
            changed = false;

            for block_id in flow.reverse_postorder.iter().rev() {
                let index = block_id.0 as usize;
                let block = block_or_error(body, *block_id)?;

                let mut live = BitSet::empty(local_count);
                for successor in block.terminator.kind.successors() {
                    if let Some(successor_live) = liveness.live_in.get(successor.0 as usize) {
                        live.union_with(successor_live);
                    }
                }

                terminator_uses(&block.terminator.kind, &return_uses, &mut live);
                liveness.terminator_before[index] = live.clone();

                for (statement_index, statement) in block.statements.iter().enumerate().rev() {
                    liveness.statement_after[index][statement_index] = live.clone();
                    apply_statement(statement, &mut live);
                    liveness.statement_before[index][statement_index] = live.clone();
                }

                if liveness.live_in[index] != live {
                    liveness.live_in[index] = live;
                    changed = true;
                }
            }
        }

        Ok(liveness)
    }

    pub(crate) fn live_in(&self, block: BlockId) -> &BitSet {
        &self.live_in[block.0 as usize]
    }

    pub(crate) fn before_statement(&self, block: BlockId, index: usize) -> &BitSet {
        &self.statement_before[block.0 as usize][index]
    }

    pub(crate) fn after_statement(&self, block: BlockId, index: usize) -> &BitSet {
        &self.statement_after[block.0 as usize][index]
    }

    pub(crate) fn before_terminator(&self, block: BlockId) -> &BitSet {
        &self.terminator_before[block.0 as usize]
    }

    pub(crate) fn local_count(&self) -> usize {
        self.local_count
    }
}

/// Add every local a live local may point into, transitively.
/// A borrowed value stays alive for as long as a reference to it does.
pub(crate) fn extend_with_origins(live: &BitSet, origins: &[TargetSet]) -> BitSet {
    let mut extended = live.clone();
    let mut pending = live.iter_ones().collect::<Vec<_>>();

    while let Some(local_index) = pending.pop() {
        let Some(targets) = origins.get(local_index) else {
            continue;
        };

        for target in targets.indices() {
            if target >= origins.len() || extended.contains(target) {
                continue;
            }

            extended.insert(target);
            pending.push(target);
        }
    }

    extended
}

fn terminator_uses(terminator: &TerminatorKind, return_uses: &BitSet, live: &mut BitSet) {
    match terminator {
        TerminatorKind::Goto(_) | TerminatorKind::Unreachable => {}
        TerminatorKind::Branch { condition, .. } => operand_uses(condition, live),
        TerminatorKind::Return(value) => {
            if let Some(value) = value {
                operand_uses(value, live);
            }
            live.union_with(return_uses);
        }
        TerminatorKind::Raise(value) => {
            if let Some(value) = value {
                operand_uses(value, live);
            }
        }
    }
}

fn apply_statement(statement: &Statement, live: &mut BitSet) {
    match &statement.kind {
        StatementKind::Let { local, value } => {
            live.remove(local.0 as usize);
            if let Some(value) = value {
                rvalue_uses(value, live);
            }
        }

        StatementKind::Assign { target, value } => {
            write_target(target, live);
            rvalue_uses(value, live);
        }

        StatementKind::Call {
            args, destination, ..
        } => {
            if let Some(destination) = destination {
                write_target(destination, live);
            }
            for arg in args {
                operand_uses(arg, live);
            }
        }

        StatementKind::Expr(value) => rvalue_uses(value, live),

        StatementKind::Drop(drop) => match &drop.subject {
            DropSubject::Binding { local, .. } => live.insert(local.0 as usize),
            DropSubject::Referent(place) => place_use(place, live),
            DropSubject::Temporary { .. } => {}
        },
    }
}

/// Whole-local writes define the local, partial writes keep the rest of it alive
fn write_target(target: &Place, live: &mut BitSet) {
    if target.is_whole_local() {
        live.remove(target.local.0 as usize);
    } else {
        place_use(target, live);
    }
}

fn rvalue_uses(value: &Rvalue, live: &mut BitSet) {
    match value {
        Rvalue::Use(operand) => operand_uses(operand, live),
        Rvalue::Ref { place, .. } | Rvalue::Take(place) => place_use(place, live),
        Rvalue::Select {
            condition,
            then_place,
            else_place,
            ..
        } => {
            operand_uses(condition, live);
            place_use(then_place, live);
            place_use(else_place, live);
        }
        Rvalue::Construct { fields, .. } => {
            for field in fields {
                operand_uses(field, live);
            }
        }
        Rvalue::BinaryOp { left, right, .. } => {
            operand_uses(left, live);
            operand_uses(right, live);
        }
    }
}

fn operand_uses(operand: &Operand, live: &mut BitSet) {
    if let Some(place) = operand.place() {
        place_use(place, live);
    }
}

fn place_use(place: &Place, live: &mut BitSet) {
    live.insert(place.local.0 as usize);
}
