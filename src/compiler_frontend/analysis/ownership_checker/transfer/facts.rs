//! Facts collected while transferring one block.
//!
//! The fixpoint throws these away; only the final walk over the converged
//! states keeps them.

use crate::compiler_frontend::analysis::destructors::{DropFlag, DropInsertion};
use crate::compiler_frontend::analysis::origins::TargetSet;
use crate::compiler_frontend::analysis::ownership_checker::types::{
    CallResolution, MoveRecord, ReferenceOriginFact, ValueUseFact,
};
use crate::compiler_frontend::compiler_errors::{CompilerError, CompilerWarning};

#[derive(Debug, Default)]
pub(crate) struct BlockRecord {
    pub diagnostics: Vec<CompilerError>,
    pub warnings: Vec<CompilerWarning>,
    pub drops: Vec<DropInsertion>,
    pub drop_flags: Vec<DropFlag>,
    pub moves: Vec<MoveRecord>,
    pub value_uses: Vec<ValueUseFact>,
    pub reference_origins: Vec<ReferenceOriginFact>,
    pub call_resolutions: Vec<CallResolution>,
    pub return_origin: Option<TargetSet>,
    pub conflicts_checked: usize,
    pub statements_analyzed: usize,
}

impl BlockRecord {
    pub(crate) fn merge(&mut self, other: BlockRecord) {
        self.diagnostics.extend(other.diagnostics);
        self.warnings.extend(other.warnings);
        self.drops.extend(other.drops);
        self.drop_flags.extend(other.drop_flags);
        self.moves.extend(other.moves);
        self.value_uses.extend(other.value_uses);
        self.reference_origins.extend(other.reference_origins);
        self.call_resolutions.extend(other.call_resolutions);
        self.conflicts_checked += other.conflicts_checked;
        self.statements_analyzed += other.statements_analyzed;

        if let Some(targets) = other.return_origin {
            self.record_return_origin(&targets);
        }
    }

    pub(crate) fn record_return_origin(&mut self, targets: &TargetSet) {
        match &mut self.return_origin {
            Some(existing) => {
                existing.union_with(targets);
            }
            None => self.return_origin = Some(targets.clone()),
        }
    }

    pub(crate) fn push_drop(&mut self, drop: DropInsertion, flag: Option<DropFlag>) {
        if let Some(flag) = flag {
            self.drop_flags.push(flag);
        }
        self.drops.push(drop);
    }
}
