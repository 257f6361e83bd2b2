mod calls;
mod drops;
mod facts;
mod places;

pub(crate) use facts::BlockRecord;

use crate::compiler_frontend::analysis::bit_set::BitSet;
use crate::compiler_frontend::analysis::cfg::ControlFlow;
use crate::compiler_frontend::analysis::classifier::{
    UseSite, ValueUseKind, classify_value_use, take_supported,
};
use crate::compiler_frontend::analysis::conventions::{
    OriginLabel, ResolvedSignature, ResultConvention,
};
use crate::compiler_frontend::analysis::destructors::{DropPlacement, DropReason, Liveness};
use crate::compiler_frontend::analysis::exclusivity::{AccessKind, ExclusivityScope, Holder};
use crate::compiler_frontend::analysis::origins::{EscapeCheck, TargetSet, check_escape};
use crate::compiler_frontend::analysis::ownership_checker::diagnostics::OwnershipDiagnostics;
use crate::compiler_frontend::analysis::ownership_checker::layout::{FunctionLayout, PlaceInfo, Storage};
use crate::compiler_frontend::analysis::ownership_checker::state::{FlowState, LocalMode};
use crate::compiler_frontend::analysis::ownership_checker::types::{Site, ValueUseFact};
use crate::compiler_frontend::compiler_errors::{
    CompilerError, CompilerWarning, DiagnosticKind, ErrorMetaDataKey, WarningKind,
};
use crate::compiler_frontend::ir::ir_nodes::{
    BasicBlock, BlockId, DropSubject, FunctionBody, IrModule, LocalId, LocalKind, Operand,
    Place, Rvalue, Statement, StatementKind, StmtId, TerminatorKind, TypeId,
};
use crate::compiler_frontend::ir::ir_types::TypeTable;
use crate::compiler_frontend::ir::text_location::TextLocation;
use crate::settings::{CheckerConfig, DropStrategy};
use crate::{ownership_error, return_compiler_error};
use places::WriteKind;

/// Read-only inputs shared by every block of one function.
pub(super) struct TransferContext<'a> {
    pub module: &'a IrModule,
    pub types: &'a TypeTable,
    pub signatures: &'a [ResolvedSignature],
    pub config: &'a CheckerConfig,
    pub signature: &'a ResolvedSignature,
    pub body: &'a FunctionBody,
    pub layout: FunctionLayout,
    pub liveness: Liveness,
    pub flow: ControlFlow,
    pub diagnostics: OwnershipDiagnostics<'a>,
}

/// What a value points into, and whether it may be used to mutate it.
#[derive(Debug, Clone)]
pub(super) struct ValueOrigin {
    pub targets: TargetSet,
    pub mutable: bool,
}

impl ValueOrigin {
    fn none(context: &TransferContext<'_>) -> Self {
        Self {
            targets: context.layout.targets.empty(),
            mutable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Entry,
    Statement(usize),
    Terminator,
    Edge,
}

struct BlockTransfer<'c, 'a> {
    context: &'c TransferContext<'a>,
    block: &'a BasicBlock,
    state: &'c mut FlowState,
    record: BlockRecord,
    position: Position,
    location: TextLocation,
    scope: ExclusivityScope,
}

pub(super) fn transfer_block<'a>(
    context: &TransferContext<'a>,
    block: &'a BasicBlock,
    state: &mut FlowState,
) -> Result<BlockRecord, CompilerError> {
    let mut transfer = BlockTransfer::new(context, block, state, Position::Entry);

    // Whatever died on the way in is destroyed before the first statement
    let live_in = context.liveness.live_in(block.id);
    transfer.drop_dead_locals(live_in, DropPlacement::BlockEntry(block.id), DropReason::LastUse)?;

    for (index, statement) in block.statements.iter().enumerate() {
        transfer.statement(index, statement)?;
    }

    transfer.terminator()?;
    Ok(transfer.record)
}

/// Apply the edge from `block` to `successor` to `state`. With edge placement,
/// values that die on a merge edge are destroyed on that edge.
pub(super) fn transfer_edge<'a>(
    context: &TransferContext<'a>,
    block: &'a BasicBlock,
    successor: BlockId,
    state: &mut FlowState,
) -> Result<BlockRecord, CompilerError> {
    let mut transfer = BlockTransfer::new(context, block, state, Position::Edge);

    let merges = !context
        .flow
        .has_single_predecessor(successor, context.body.entry);

    if merges && context.config.drop_strategy == DropStrategy::Edge {
        let live_in = context.liveness.live_in(successor);
        transfer.drop_dead_locals(
            live_in,
            DropPlacement::Edge {
                from: block.id,
                to: successor,
            },
            DropReason::LastUse,
        )?;
    }

    Ok(transfer.record)
}

impl<'c, 'a> BlockTransfer<'c, 'a> {
    fn new(
        context: &'c TransferContext<'a>,
        block: &'a BasicBlock,
        state: &'c mut FlowState,
        position: Position,
    ) -> Self {
        let location = match (position, block.statements.first()) {
            (Position::Entry, Some(statement)) => statement.location,
            _ => block.terminator.location,
        };

        Self {
            context,
            block,
            state,
            record: BlockRecord::default(),
            position,
            location,
            scope: ExclusivityScope::new(context.layout.targets.len(), Vec::new(), None),
        }
    }

    fn site(&self) -> Site {
        match self.position {
            Position::Statement(index) => match self.block.statements.get(index) {
                Some(statement) => Site::Statement(statement.id),
                None => Site::Terminator(self.block.id),
            },
            Position::Entry | Position::Terminator | Position::Edge => {
                Site::Terminator(self.block.id)
            }
        }
    }

    fn statement_id(&self) -> Result<StmtId, CompilerError> {
        match self.site() {
            Site::Statement(id) => Ok(id),
            Site::Terminator(block) => {
                return_compiler_error!(
                    "Block '{}' writes a place outside of any statement",
                    block
                );
            }
        }
    }

    /// Reference-holding locals that are live here, with the borrows they keep open
    fn holders(&self, live: &BitSet) -> Vec<Holder> {
        let context = self.context;

        context
            .layout
            .locals
            .iter()
            .filter(|local| {
                local.carries_origins
                    && matches!(local.storage, Storage::Owned | Storage::Output)
                    && live.contains(local.id.0 as usize)
            })
            .filter(|local| {
                self.state
                    .modes(local.leaves())
                    .is_some_and(LocalMode::may_be_init)
            })
            .filter_map(|local| {
                let targets = self.state.origin(local.id)?;
                if targets.is_empty() {
                    return None;
                }

                Some(Holder {
                    local: local.id,
                    name: context.diagnostics.local_name(local.id),
                    targets: targets.clone(),
                    mutable: self.state.holds_mutable_reference(local.id),
                    sites: self.state.def_sites(local.id).to_vec(),
                })
            })
            .collect()
    }

    fn begin_scope(&mut self, live: &BitSet, defined: Option<LocalId>) {
        let holders = self.holders(live);
        self.scope = ExclusivityScope::new(self.context.layout.targets.len(), holders, defined);
    }

    fn end_scope(&mut self) {
        self.record.conflicts_checked += self.scope.conflicts_checked;
    }

    fn statement(&mut self, index: usize, statement: &'a Statement) -> Result<(), CompilerError> {
        let context = self.context;
        self.position = Position::Statement(index);
        self.location = statement.location;

        let defined = match &statement.kind {
            StatementKind::Let { local, .. } => Some(*local),
            _ => None,
        };
        self.begin_scope(context.liveness.before_statement(self.block.id, index), defined);

        match &statement.kind {
            StatementKind::Let { local, value } => {
                let place = Place::local(*local);
                match value {
                    Some(rvalue) => {
                        let value = self.eval_rvalue(rvalue, UseSite::Initializer)?;
                        self.write_place(&place, WriteKind::Let, &value)?;
                        self.warn_if_unused(index, *local)?;
                    }
                    None => {
                        let value = ValueOrigin::none(context);
                        self.write_place(&place, WriteKind::Declare, &value)?;
                    }
                }
            }

            StatementKind::Assign { target, value } => {
                let value = self.eval_rvalue(value, UseSite::Value)?;
                self.write_place(target, WriteKind::Assign, &value)?;
            }

            StatementKind::Call {
                target,
                args,
                destination,
            } => {
                self.transfer_call(statement.id, target, args, destination.as_ref())?;
            }

            StatementKind::Expr(rvalue) => {
                self.eval_rvalue(rvalue, UseSite::Borrow)?;

                if let Some(ty) = self.discarded_value_type(rvalue)? {
                    self.emit_drop(
                        DropSubject::Temporary { ty },
                        ty,
                        false,
                        DropPlacement::AfterStatement(statement.id),
                        DropReason::Temporary,
                    );
                }
            }

            StatementKind::Drop(drop) => self.apply_lowered_drop(drop)?,
        }

        self.end_scope();
        self.record.statements_analyzed += 1;

        let live_after = context.liveness.after_statement(self.block.id, index);
        self.drop_dead_locals(
            live_after,
            DropPlacement::AfterStatement(statement.id),
            DropReason::LastUse,
        )
    }

    fn terminator(&mut self) -> Result<(), CompilerError> {
        let context = self.context;
        let block = self.block;
        self.position = Position::Terminator;
        self.location = block.terminator.location;
        self.begin_scope(context.liveness.before_terminator(block.id), None);

        match &block.terminator.kind {
            TerminatorKind::Goto(_) | TerminatorKind::Unreachable => {}

            TerminatorKind::Branch { condition, .. } => {
                self.eval_operand(condition, UseSite::Borrow)?;
            }

            TerminatorKind::Return(value) => {
                self.transfer_return(value.as_ref())?;
                self.end_scope();
                return self.drop_at_exit(
                    false,
                    DropPlacement::TerminatorExit(block.id),
                    DropReason::FunctionExit,
                );
            }

            TerminatorKind::Raise(value) => {
                if let Some(value) = value {
                    self.eval_operand(value, UseSite::Initializer)?;
                }
                self.end_scope();

                // Outputs are destroyed too, the caller sees them uninitialized after an error
                return self.drop_at_exit(
                    true,
                    DropPlacement::TerminatorExit(block.id),
                    DropReason::ErrorExit,
                );
            }
        }

        self.end_scope();
        Ok(())
    }

    fn warn_if_unused(&mut self, index: usize, local: LocalId) -> Result<(), CompilerError> {
        let context = self.context;
        let info = context.layout.local(local)?;
        if info.kind != LocalKind::Var {
            return Ok(());
        }

        if context
            .liveness
            .after_statement(self.block.id, index)
            .contains(local.0 as usize)
        {
            return Ok(());
        }

        self.record.warnings.push(CompilerWarning::new(
            format!(
                "Value assigned to '{}' is never used",
                context.diagnostics.local_name(local)
            ),
            self.location,
            WarningKind::UnusedValue,
        ));

        Ok(())
    }

    /// Owned values produced by an expression statement that nothing keeps
    fn discarded_value_type(&self, rvalue: &Rvalue) -> Result<Option<TypeId>, CompilerError> {
        let context = self.context;
        let ty = match rvalue {
            Rvalue::Construct { ty, .. } => *ty,
            Rvalue::Take(place) | Rvalue::Use(Operand::Transfer(place)) => self.resolve(place)?.ty,
            Rvalue::Use(_) | Rvalue::Ref { .. } | Rvalue::Select { .. } | Rvalue::BinaryOp { .. } => {
                return Ok(None);
            }
        };

        if context.types.is_reference(ty) {
            return Ok(None);
        }

        Ok(Some(ty))
    }

    fn eval_operand(
        &mut self,
        operand: &Operand,
        site: UseSite,
    ) -> Result<(ValueOrigin, Option<ValueUseKind>), CompilerError> {
        let context = self.context;

        let (place, site) = match operand {
            Operand::Constant(_) => return Ok((ValueOrigin::none(context), None)),
            Operand::Use(place) => (place, site),
            Operand::Transfer(place) => (place, UseSite::Transfer),
        };

        let info = self.resolve(place)?;
        let value = self.value_origin(&info);

        let kind = match classify_value_use(context.types, info.ty, site) {
            Ok(kind) => kind,
            Err(diagnostic) => {
                let error = self.classification_error(diagnostic, place, info.ty);
                self.record.diagnostics.push(error);
                ValueUseKind::Copy
            }
        };

        match kind {
            ValueUseKind::Move => self.move_place(place, &info)?,
            ValueUseKind::Copy => self.read_place(&info, "copy")?,
            ValueUseKind::Borrow => self.read_place(&info, "read")?,
        }

        // Copying or moving a reference hands out another alias of its targets
        if kind != ValueUseKind::Borrow && !value.targets.is_empty() {
            let access = if value.mutable {
                AccessKind::Mutable
            } else {
                AccessKind::Shared
            };
            self.access(&value.targets, access, Some(info.local), true);
        }

        self.record.value_uses.push(ValueUseFact {
            site: self.site(),
            place: place.clone(),
            kind,
        });

        Ok((value, Some(kind)))
    }

    fn classification_error(&self, kind: DiagnosticKind, place: &Place, ty: TypeId) -> CompilerError {
        let context = self.context;
        let name = context.diagnostics.place_name(place);
        let type_name = context.diagnostics.type_name(ty);

        let (msg, suggestion) = match kind {
            DiagnosticKind::MissingTransferIntent => (
                format!(
                    "Passing '{}' gives up ownership, but values of type '{}' cannot be copied",
                    name, type_name
                ),
                format!("Transfer it explicitly with '{}^'", name),
            ),
            _ => (
                format!(
                    "'{}' has type '{}', which cannot be copied",
                    name, type_name
                ),
                format!("Transfer it with '{}^' instead of copying it", name),
            ),
        };

        CompilerError::new_ownership_error(kind, msg, self.location)
            .with_metadata(ErrorMetaDataKey::VariableName, name)
            .with_metadata(ErrorMetaDataKey::FoundType, type_name)
            .with_metadata(ErrorMetaDataKey::SuggestedInsertion, "^")
            .with_metadata(ErrorMetaDataKey::PrimarySuggestion, suggestion)
    }

    fn eval_rvalue(&mut self, rvalue: &Rvalue, site: UseSite) -> Result<ValueOrigin, CompilerError> {
        let context = self.context;

        match rvalue {
            Rvalue::Use(operand) => Ok(self.eval_operand(operand, site)?.0),

            Rvalue::Ref { place, mutability } => {
                self.borrow_place(place, mutability.is_mutable(), true)
            }

            Rvalue::Select {
                condition,
                then_place,
                else_place,
                mutability,
            } => {
                self.eval_operand(condition, UseSite::Borrow)?;

                // Only one side is evaluated at runtime, they never overlap with each other
                let mut value = self.borrow_place(then_place, mutability.is_mutable(), false)?;
                let other = self.borrow_place(else_place, mutability.is_mutable(), false)?;
                value.targets.union_with(&other.targets);
                Ok(value)
            }

            Rvalue::Construct { ty, fields } => self.eval_construct(*ty, fields),

            Rvalue::BinaryOp { left, right, .. } => {
                self.eval_operand(left, UseSite::Borrow)?;
                self.eval_operand(right, UseSite::Borrow)?;
                Ok(ValueOrigin::none(context))
            }

            Rvalue::Take(place) => self.take_place(place),
        }
    }

    fn eval_construct(&mut self, ty: TypeId, fields: &[Operand]) -> Result<ValueOrigin, CompilerError> {
        let context = self.context;

        let Some(decl) = context.types.struct_decl(ty) else {
            return_compiler_error!(
                "Construct of '{}', which is not a struct type",
                context.diagnostics.type_name(ty)
            );
        };

        if decl.fields.len() != fields.len() {
            return_compiler_error!(
                "Construct of '{}' passes {} fields but the struct declares {}",
                context.diagnostics.type_name(ty),
                fields.len(),
                decl.fields.len()
            );
        }

        let mut origin = ValueOrigin::none(context);

        for (field, operand) in decl.fields.iter().zip(fields) {
            let (value, _) = self.eval_operand(operand, UseSite::Consume)?;

            let expected = field
                .origin
                .and_then(|index| decl.origin_params.get(index));

            if let Some(param) = expected {
                let checked = context.types.is_reference(field.ty) && operand.place().is_some();

                if checked && value.mutable != param.mutability.is_mutable() {
                    let strings = context.diagnostics.string_table();
                    let field_name = strings.resolve(field.name);
                    let origin_name = strings.resolve(param.name);
                    let (expected_kind, found_kind) = if param.mutability.is_mutable() {
                        ("mutable", "immutable")
                    } else {
                        ("immutable", "mutable")
                    };

                    self.record.diagnostics.push(ownership_error!(
                        OriginMismatch,
                        format!(
                            "Field '{}' of '{}' holds a {} reference with origin '{}', but is given a {} one",
                            field_name,
                            context.diagnostics.type_name(ty),
                            expected_kind,
                            origin_name,
                            found_kind
                        ),
                        self.location,
                        {
                            ExpectedType => context.diagnostics.type_name(ty),
                            OriginLabel => origin_name,
                            BorrowKind => found_kind,
                            PrimarySuggestion => "Origin mutability must match exactly, pass a reference of the declared kind",
                        }
                    ));
                }
            }

            origin.targets.union_with(&value.targets);
            origin.mutable |= value.mutable;
        }

        Ok(origin)
    }

    fn take_place(&mut self, place: &Place) -> Result<ValueOrigin, CompilerError> {
        let context = self.context;
        let info = self.resolve(place)?;
        let name = context.diagnostics.place_name(place);

        if !take_supported(context.types, info.ty) {
            let type_name = context.diagnostics.type_name(info.ty);
            self.record.diagnostics.push(ownership_error!(
                TakeNotSupported,
                format!(
                    "Cannot take from '{}', type '{}' has no take operation",
                    name, type_name
                ),
                self.location,
                {
                    VariableName => name.as_str(),
                    FoundType => type_name,
                    PrimarySuggestion => "Transfer the value with '^' instead",
                }
            ));
        }

        self.check_initialized(info.local, &info.direct_path, "take from")?;

        if !self.place_is_mutable(&info)? {
            self.record.diagnostics.push(ownership_error!(
                MutabilityViolation,
                format!("Cannot take from '{}', it is not mutable", name),
                self.location,
                {
                    VariableName => name.as_str(),
                    PrimarySuggestion => "Declare the binding as mutable",
                }
            ));
        }

        let targets = self.address_targets(&info)?;
        self.access(&targets, AccessKind::Mutable, via(&info), true);

        self.record.value_uses.push(ValueUseFact {
            site: self.site(),
            place: place.clone(),
            kind: ValueUseKind::Move,
        });

        Ok(self.value_origin(&info))
    }

    fn transfer_return(&mut self, value: Option<&Operand>) -> Result<(), CompilerError> {
        let context = self.context;
        let result = context.signature.result.as_ref();

        match (value, result.map(|result| result.convention)) {
            (Some(operand), Some(ResultConvention::Reference { origin })) => {
                let targets = match operand.place() {
                    Some(place) => {
                        let info = self.resolve(place)?;
                        if context.types.carries_origins(info.ty) {
                            self.eval_operand(operand, UseSite::Initializer)?.0.targets
                        } else {
                            // Returning a place as a reference borrows it for the caller
                            self.borrow_place(place, false, true)?.targets
                        }
                    }
                    None => context.layout.targets.empty(),
                };

                self.escape(&targets, Some(origin), "returned reference");
                self.record.record_return_origin(&targets);
            }

            (Some(operand), _) => {
                let (value, _) = self.eval_operand(operand, UseSite::Initializer)?;

                if let Some(result) = result {
                    if context.types.carries_origins(result.ty) {
                        self.escape(&value.targets, result.origin(), "returned value");
                        self.record.record_return_origin(&value.targets);
                    }
                }
            }

            (None, _) => {}
        }

        self.check_outputs()
    }

    /// Outputs must be fully initialized on every normal return and may not point into locals
    fn check_outputs(&mut self) -> Result<(), CompilerError> {
        let context = self.context;

        for local in context
            .layout
            .locals
            .iter()
            .filter(|local| local.storage == Storage::Output)
        {
            let uninitialized = local
                .leaves()
                .find(|leaf| self.state.mode(*leaf) != LocalMode::INIT);

            if let Some(leaf_index) = uninitialized {
                let path = &context.layout.leaves[leaf_index].path;
                let name = context.diagnostics.path_name(local.id, path);
                let mut error = ownership_error!(
                    UseOfUninitializedValue,
                    format!(
                        "Output '{}' must be initialized on every path before returning",
                        name
                    ),
                    self.location,
                    {
                        VariableName => context.diagnostics.local_name(local.id),
                        PrimarySuggestion => "Assign the output before this return",
                    }
                );
                if !path.is_empty() {
                    error.new_metadata_entry(
                        ErrorMetaDataKey::FieldPath,
                        context.diagnostics.field_path(local.id, path),
                    );
                }
                self.record.diagnostics.push(error);
                continue;
            }

            if !local.carries_origins {
                continue;
            }

            let Some(origin) = self.state.origin(local.id) else {
                continue;
            };

            // Outputs live on in caller storage, so they may not point into this frame
            let space = &context.layout.targets;
            let mut locals_only = space.empty();
            for target in origin.locals(space) {
                locals_only.union_with(&space.local(target));
            }

            let what = format!("value stored in output '{}'", context.diagnostics.local_name(local.id));
            self.escape(&locals_only, None, &what);
        }

        Ok(())
    }

    fn escape(&mut self, targets: &TargetSet, allowed: Option<OriginLabel>, what: &str) {
        let context = self.context;
        let check = EscapeCheck {
            allowed,
            what,
            location: self.location,
        };
        let local_name = |local| context.diagnostics.local_name(local);

        self.record.diagnostics.extend(check_escape(
            &check,
            targets,
            &context.layout.targets,
            &local_name,
            context.diagnostics.string_table(),
        ));
    }
}

/// Accesses through a reference are made on behalf of the reference itself
fn via(info: &PlaceInfo) -> Option<LocalId> {
    if info.through_reference {
        Some(info.local)
    } else {
        None
    }
}
