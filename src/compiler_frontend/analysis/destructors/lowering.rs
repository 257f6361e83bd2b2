//! Rewrites a checked body so every destructor call is an explicit statement.
//!
//! Drops placed between evaluating a value and storing it need the value in a
//! temporary first, and drops on a merge edge get a block of their own.

use crate::compiler_frontend::analysis::conventions::{ResolvedSignature, ResultConvention};
use crate::compiler_frontend::analysis::destructors::{DropInsertion, DropPlacement, DropReason};
use crate::compiler_frontend::analysis::ownership_checker::CallResolution;
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::ir::ir_nodes::{
    BasicBlock, BlockId, CallTarget, DropStatement, FunctionBody, FunctionId, LocalDecl, LocalId,
    LocalKind, Operand, Place, Rvalue, Statement, StatementKind, StmtId, Terminator,
    TerminatorKind, TypeId,
};
use crate::compiler_frontend::ir::ir_types::TypeTable;
use crate::compiler_frontend::ir::text_location::TextLocation;
use crate::settings::{CheckerConfig, DROPS_PER_BLOCK_CAPACITY};
use crate::{drop_log, return_compiler_error};
use rustc_hash::FxHashMap;

/// Ids for statements the lowering creates, shared by every function of a module
#[derive(Debug)]
pub(crate) struct StatementIds {
    next: u32,
}

impl StatementIds {
    /// Continue after the largest id already used by `bodies`
    pub(crate) fn after<'a>(bodies: impl IntoIterator<Item = &'a FunctionBody>) -> Self {
        let next = bodies
            .into_iter()
            .flat_map(|body| body.blocks.iter())
            .flat_map(|block| block.statements.iter())
            .map(|statement| statement.id.0 + 1)
            .max()
            .unwrap_or(0);

        Self { next }
    }

    fn fresh(&mut self) -> StmtId {
        let id = StmtId(self.next);
        self.next += 1;
        id
    }
}

pub(crate) fn lower_drops(
    types: &TypeTable,
    signature: &ResolvedSignature,
    body: &FunctionBody,
    drops: &[DropInsertion],
    call_resolutions: &[CallResolution],
    config: &CheckerConfig,
    ids: &mut StatementIds,
) -> Result<FunctionBody, CompilerError> {
    let mut by_placement: FxHashMap<DropPlacement, Vec<&DropInsertion>> = FxHashMap::default();
    let mut edges: Vec<(BlockId, BlockId)> = Vec::new();

    for drop in drops {
        if config.elide_trivial_drops && drop.trivial {
            continue;
        }

        if let DropPlacement::Edge { from, to } = drop.placement {
            if !edges.contains(&(from, to)) {
                edges.push((from, to));
            }
        }

        by_placement.entry(drop.placement).or_default().push(drop);
    }

    let resolved_calls = call_resolutions
        .iter()
        .map(|resolution| (resolution.statement, resolution.callee))
        .collect::<FxHashMap<_, _>>();

    let mut lowering = DropLowering {
        types,
        signature,
        body: body.clone(),
        by_placement,
        resolved_calls,
        ids,
    };

    for index in 0..lowering.body.blocks.len() {
        lowering.lower_block(index)?;
    }

    for (from, to) in edges {
        lowering.split_edge(from, to)?;
    }

    Ok(lowering.body)
}

enum WriteBack {
    Let(LocalId),
    Assign(Place),
}

struct DropLowering<'a> {
    types: &'a TypeTable,
    signature: &'a ResolvedSignature,
    body: FunctionBody,
    by_placement: FxHashMap<DropPlacement, Vec<&'a DropInsertion>>,
    resolved_calls: FxHashMap<StmtId, FunctionId>,
    ids: &'a mut StatementIds,
}

impl DropLowering<'_> {
    fn lower_block(&mut self, index: usize) -> Result<(), CompilerError> {
        let block_id = self.body.blocks[index].id;
        let original = std::mem::take(&mut self.body.blocks[index].statements);
        let mut statements = Vec::with_capacity(original.len() + DROPS_PER_BLOCK_CAPACITY);

        self.push_drops(&mut statements, DropPlacement::BlockEntry(block_id), |_| true);

        for mut statement in original {
            let id = statement.id;

            if let StatementKind::Call { target, .. } = &mut statement.kind {
                if let Some(callee) = self.resolved_calls.get(&id) {
                    *target = CallTarget::Function(*callee);
                }
            }

            self.push_drops(&mut statements, DropPlacement::BeforeStatement(id), |_| true);

            if self.by_placement.contains_key(&DropPlacement::BeforeWrite(id)) {
                self.lower_write(&mut statements, statement)?;
            } else {
                statements.push(statement);
            }

            self.push_drops(&mut statements, DropPlacement::AfterStatement(id), |_| true);
        }

        let exit = DropPlacement::TerminatorExit(block_id);
        if self.by_placement.contains_key(&exit) {
            let terminator = self.body.blocks[index].terminator.clone();
            let terminator = self.hoist_exit_operand(&mut statements, terminator)?;
            self.push_drops(&mut statements, exit, |_| true);
            self.body.blocks[index].terminator = terminator;
        }

        self.body.blocks[index].statements = statements;
        Ok(())
    }

    /// `target = value` becomes `tmp = value; drops; target = tmp^`
    fn lower_write(&mut self, statements: &mut Vec<Statement>, statement: Statement) -> Result<(), CompilerError> {
        let id = statement.id;
        let location = statement.location;

        let (store, staged) = match statement.kind {
            StatementKind::Let {
                local,
                value: Some(value),
            } => {
                let temp = self.temp_for(&Place::local(local), location)?;
                let staged = StatementKind::Let {
                    local: temp,
                    value: Some(value),
                };
                (WriteBack::Let(local), (temp, staged))
            }

            StatementKind::Assign { target, value } => {
                let temp = self.temp_for(&target, location)?;
                let staged = StatementKind::Let {
                    local: temp,
                    value: Some(value),
                };
                (WriteBack::Assign(target), (temp, staged))
            }

            StatementKind::Call {
                target: call_target,
                args,
                destination: Some(destination),
            } => {
                let temp = self.temp_for(&destination, location)?;
                let staged = StatementKind::Call {
                    target: call_target,
                    args,
                    destination: Some(Place::local(temp)),
                };
                (WriteBack::Assign(destination), (temp, staged))
            }

            kind => {
                return_compiler_error!(
                    "Statement {} has drops before its write but writes nothing: {:?}",
                    id,
                    kind
                );
            }
        };

        let (temp, staged) = staged;
        let is_call = matches!(staged, StatementKind::Call { .. });
        statements.push(Statement {
            id: self.ids.fresh(),
            kind: staged,
            location,
        });

        // Temporaries of the call die with the call, before the old value goes
        if is_call {
            self.push_drops(statements, DropPlacement::AfterStatement(id), |drop| {
                drop.reason == DropReason::Temporary
            });
        }

        self.push_drops(statements, DropPlacement::BeforeWrite(id), |_| true);

        let value = Rvalue::Use(Operand::Transfer(Place::local(temp)));
        let kind = match store {
            WriteBack::Let(local) => StatementKind::Let {
                local,
                value: Some(value),
            },
            WriteBack::Assign(target) => StatementKind::Assign { target, value },
        };

        // The store keeps the original id so drops placed after it still follow it
        statements.push(Statement { id, kind, location });

        Ok(())
    }

    /// Exit drops run after the terminator operand is evaluated, so a place
    /// operand is evaluated into a temporary first
    fn hoist_exit_operand(
        &mut self,
        statements: &mut Vec<Statement>,
        mut terminator: Terminator,
    ) -> Result<Terminator, CompilerError> {
        let location = terminator.location;
        let is_return = matches!(terminator.kind, TerminatorKind::Return(_));

        let operand = match &mut terminator.kind {
            TerminatorKind::Return(Some(operand)) | TerminatorKind::Raise(Some(operand)) => operand,
            _ => return Ok(terminator),
        };

        let Some(place) = operand.place().cloned() else {
            return Ok(terminator);
        };

        let ty = place_type(self.types, &self.body, &place)?;

        // A place returned by reference is borrowed, not evaluated. It cannot be an owned local.
        let returns_reference = matches!(
            self.signature.result.as_ref().map(|result| result.convention),
            Some(ResultConvention::Reference { .. })
        );
        if is_return && returns_reference && !self.types.carries_origins(ty) {
            return Ok(terminator);
        }

        let temp = self.new_temp(place.local, ty, location)?;
        statements.push(Statement {
            id: self.ids.fresh(),
            kind: StatementKind::Let {
                local: temp,
                value: Some(Rvalue::Use(operand.clone())),
            },
            location,
        });
        *operand = Operand::Transfer(Place::local(temp));

        Ok(terminator)
    }

    fn split_edge(&mut self, from: BlockId, to: BlockId) -> Result<(), CompilerError> {
        let Some(from_index) = self.body.blocks.iter().position(|block| block.id == from) else {
            return_compiler_error!("Edge drops leave unknown block '{}'", from);
        };

        let id = BlockId(self.body.blocks.len() as u32);
        let location = self.body.blocks[from_index].terminator.location;

        let mut statements = Vec::with_capacity(DROPS_PER_BLOCK_CAPACITY);
        self.push_drops(&mut statements, DropPlacement::Edge { from, to }, |_| true);

        drop_log!(format!(
            "[Drops] split edge {} -> {} with block {} ({} drops)",
            from,
            to,
            id,
            statements.len()
        ));

        self.body.blocks[from_index].terminator.kind.retarget(to, id);
        self.body.blocks.push(BasicBlock {
            id,
            statements,
            terminator: Terminator {
                kind: TerminatorKind::Goto(to),
                location,
            },
        });

        Ok(())
    }

    fn push_drops(
        &mut self,
        statements: &mut Vec<Statement>,
        placement: DropPlacement,
        select: impl Fn(&DropInsertion) -> bool,
    ) {
        let Some(pending) = self.by_placement.remove(&placement) else {
            return;
        };

        let (selected, kept): (Vec<_>, Vec<_>) = pending.into_iter().partition(|drop| select(drop));

        for drop in selected {
            statements.push(Statement {
                id: self.ids.fresh(),
                kind: StatementKind::Drop(DropStatement {
                    subject: drop.subject.clone(),
                    conditional: drop.conditional,
                }),
                location: drop.location,
            });
        }

        if !kept.is_empty() {
            self.by_placement.insert(placement, kept);
        }
    }

    fn temp_for(&mut self, target: &Place, location: TextLocation) -> Result<LocalId, CompilerError> {
        let ty = place_type(self.types, &self.body, target)?;
        self.new_temp(target.local, ty, location)
    }

    fn new_temp(&mut self, named_after: LocalId, ty: TypeId, location: TextLocation) -> Result<LocalId, CompilerError> {
        let id = LocalId(self.body.locals.len() as u32);
        let Some(name) = self.body.local(named_after).map(|local| local.name) else {
            return_compiler_error!("Temporary named after unknown local '{}'", named_after);
        };

        self.body.locals.push(LocalDecl {
            id,
            name,
            ty,
            mutable: false,
            kind: LocalKind::Temp,
            location,
        });

        Ok(id)
    }
}

/// Type of a place, dereferencing through references like place resolution does
fn place_type(types: &TypeTable, body: &FunctionBody, place: &Place) -> Result<TypeId, CompilerError> {
    let Some(local) = body.local(place.local) else {
        return_compiler_error!("Place names unknown local '{}'", place.local);
    };

    let mut ty = local.ty;
    for field in &place.projection {
        if let Some((pointee, _)) = types.reference_info(ty) {
            ty = pointee;
        }

        let Some(decl) = types.field(ty, *field) else {
            return_compiler_error!(
                "Place on local '{}' projects field {} of a type without it",
                place.local,
                field.0
            );
        };
        ty = decl.ty;
    }

    Ok(ty)
}
