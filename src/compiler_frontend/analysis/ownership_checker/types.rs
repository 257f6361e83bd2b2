use crate::compiler_frontend::analysis::classifier::{PassingMode, ValueUseKind};
use crate::compiler_frontend::analysis::conventions::ResolvedSignature;
use crate::compiler_frontend::analysis::destructors::{DestructorPlan, DropFlag, DropInsertion};
use crate::compiler_frontend::analysis::origins::OriginTarget;
use crate::compiler_frontend::compiler_errors::{CompilerError, CompilerWarning};
use crate::compiler_frontend::ir::ir_nodes::{
    BlockId, FieldId, FunctionBody, FunctionId, LocalId, Place, StmtId,
};
use crate::compiler_frontend::ir::text_location::TextLocation;
use crate::return_compiler_error;
use serde::Serialize;

/// Everything the checker decided about an accepted module.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OwnershipReport {
    /// One entry per function, in function id order
    pub functions: Vec<FunctionOwnershipReport>,
    pub destructor_plans: Vec<DestructorPlan>,
    pub stats: OwnershipStats,
}

impl OwnershipReport {
    pub fn function(&self, id: FunctionId) -> Option<&FunctionOwnershipReport> {
        self.functions.iter().find(|report| report.function == id)
    }

    pub fn function_named(&self, name: &str) -> Option<&FunctionOwnershipReport> {
        self.functions.iter().find(|report| report.name == name)
    }

    pub fn to_json(&self) -> Result<String, CompilerError> {
        match serde_json::to_string_pretty(self) {
            Ok(json) => Ok(json),
            Err(error) => {
                return_compiler_error!("Could not serialize the ownership report: {}", error);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionOwnershipReport {
    pub function: FunctionId,
    pub name: String,
    pub signature: ResolvedSignature,
    pub drops: Vec<DropInsertion>,
    pub drop_flags: Vec<DropFlag>,
    pub moves: Vec<MoveRecord>,
    pub value_uses: Vec<ValueUseFact>,
    pub reference_origins: Vec<ReferenceOriginFact>,

    /// Union of what every returned reference or value may point into
    pub return_origin: Option<Vec<OriginTarget>>,
    pub call_resolutions: Vec<CallResolution>,

    /// The body with explicit drop statements, absent for external declarations
    pub lowered_body: Option<FunctionBody>,
    pub warnings: Vec<CompilerWarning>,
    pub stats: FunctionStats,
}

impl FunctionOwnershipReport {
    pub(crate) fn external(function: FunctionId, name: String, signature: ResolvedSignature) -> Self {
        Self {
            function,
            name,
            signature,
            drops: Vec::new(),
            drop_flags: Vec::new(),
            moves: Vec::new(),
            value_uses: Vec::new(),
            reference_origins: Vec::new(),
            return_origin: None,
            call_resolutions: Vec::new(),
            lowered_body: None,
            warnings: Vec::new(),
            stats: FunctionStats::default(),
        }
    }

    pub fn moves_of(&self, local: LocalId) -> impl Iterator<Item = &MoveRecord> + '_ {
        self.moves.iter().filter(move |record| record.local == local)
    }

    pub fn drops_of(&self, local: LocalId) -> impl Iterator<Item = &DropInsertion> + '_ {
        self.drops.iter().filter(move |drop| drop.subject_local() == Some(local))
    }
}

/// Where in a body a fact was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Site {
    Statement(StmtId),
    Terminator(BlockId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveRecord {
    pub local: LocalId,
    pub field_path: Vec<FieldId>,
    pub site: Site,
    pub location: TextLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueUseFact {
    pub site: Site,
    pub place: Place,
    pub kind: ValueUseKind,
}

/// What a reference-holding local may point into after a whole-value write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceOriginFact {
    pub site: Site,
    pub local: LocalId,
    pub targets: Vec<OriginTarget>,
    pub mutable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallResolution {
    pub statement: StmtId,
    pub callee: FunctionId,
    pub argument_uses: Vec<ValueUseKind>,
    pub passing: Vec<PassingMode>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FunctionStats {
    pub reachable_blocks: usize,
    pub worklist_iterations: usize,
    pub statements_analyzed: usize,
    pub conflicts_checked: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OwnershipStats {
    pub functions_analyzed: usize,
    pub external_functions: usize,
    pub blocks_analyzed: usize,
    pub worklist_iterations: usize,
    pub statements_analyzed: usize,
    pub conflicts_checked: usize,
    pub drops_inserted: usize,
}

impl OwnershipStats {
    pub(crate) fn add_function(&mut self, stats: &FunctionStats, drops: usize) {
        self.functions_analyzed += 1;
        self.blocks_analyzed += stats.reachable_blocks;
        self.worklist_iterations += stats.worklist_iterations;
        self.statements_analyzed += stats.statements_analyzed;
        self.conflicts_checked += stats.conflicts_checked;
        self.drops_inserted += drops;
    }
}
