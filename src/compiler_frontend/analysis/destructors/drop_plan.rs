//! Drop insertion records and synthesized destructor plans.

use crate::compiler_frontend::ir::ir_nodes::{BlockId, DropSubject, FieldId, FunctionId, LocalId, StmtId, TypeId};
use crate::compiler_frontend::ir::ir_types::{TypeKind, TypeTable};
use crate::compiler_frontend::ir::text_location::TextLocation;
use crate::compiler_frontend::string_interning::StringTable;
use crate::settings::DestructorOrder;
use serde::Serialize;

/// A single destructor call the checker decided on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DropInsertion {
    pub subject: DropSubject,
    pub placement: DropPlacement,
    pub reason: DropReason,

    /// Guarded by the subject's runtime drop flag
    pub conditional: bool,

    /// Destroying the value runs no code
    pub trivial: bool,
    pub location: TextLocation,
}

impl DropInsertion {
    /// The binding being destroyed, None for referents and temporaries
    pub fn subject_local(&self) -> Option<LocalId> {
        match &self.subject {
            DropSubject::Binding { local, .. } => Some(*local),
            DropSubject::Referent(_) | DropSubject::Temporary { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DropPlacement {
    AfterStatement(StmtId),
    BeforeStatement(StmtId),

    /// Between evaluating the statement's value and storing it.
    /// Lowering evaluates into a temporary first.
    BeforeWrite(StmtId),
    BlockEntry(BlockId),
    Edge { from: BlockId, to: BlockId },

    /// After the terminator operand is evaluated, before control leaves
    TerminatorExit(BlockId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DropReason {
    /// Last use of a value
    LastUse,
    /// The old value is replaced
    Overwrite,
    /// An unnamed value nothing else owns
    Temporary,
    FunctionExit,
    ErrorExit,
}

/// A runtime flag tracking whether a maybe-initialized leaf still needs destroying.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DropFlag {
    pub local: LocalId,
    pub field_path: Vec<FieldId>,
}

/// How a value of a struct type is destroyed: the user destructor first, then
/// every remaining field that needs dropping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestructorPlan {
    pub ty: TypeId,
    pub name: String,
    pub user_destructor: Option<FunctionId>,
    pub field_order: Vec<FieldId>,
}

pub fn build_destructor_plans(
    types: &TypeTable,
    string_table: &StringTable,
    order: DestructorOrder,
) -> Vec<DestructorPlan> {
    let mut plans = Vec::new();

    for decl in types.iter() {
        let TypeKind::Struct(struct_decl) = &decl.kind else {
            continue;
        };

        if !types.needs_drop(decl.id) {
            continue;
        }

        let fields = struct_decl
            .fields
            .iter()
            .enumerate()
            .filter(|(_, field)| types.needs_drop(field.ty))
            .map(|(index, _)| FieldId(index as u32))
            .collect::<Vec<_>>();

        plans.push(DestructorPlan {
            ty: decl.id,
            name: string_table.resolve(decl.name).to_owned(),
            user_destructor: types.user_destructor(decl.id),
            field_order: in_destruction_order(fields, order),
        });
    }

    plans
}

/// Reorder items listed in declaration order into destruction order.
pub(crate) fn in_destruction_order<T>(mut items: Vec<T>, order: DestructorOrder) -> Vec<T> {
    if order == DestructorOrder::Reverse {
        items.reverse();
    }
    items
}
