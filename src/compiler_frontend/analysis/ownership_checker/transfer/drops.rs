//! ASAP destruction: values are destroyed right after their last use,
//! before they are overwritten, and on every exit that still owns them.

use super::{BlockTransfer, Position};
use crate::compiler_frontend::analysis::bit_set::BitSet;
use crate::compiler_frontend::analysis::destructors::{
    DropFlag, DropInsertion, DropPlacement, DropReason, extend_with_origins, in_destruction_order,
};
use crate::compiler_frontend::analysis::ownership_checker::layout::{LocalInfo, Storage};
use crate::compiler_frontend::analysis::ownership_checker::state::LocalMode;
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::ir::ir_nodes::{DropSubject, FieldId, LocalId, StatementKind, TypeId};
use crate::drop_log;
use std::ops::Range;

impl BlockTransfer<'_, '_> {
    /// Destroy every owned value that is no longer live.
    /// A reference keeps whatever it points into alive.
    pub(super) fn drop_dead_locals(
        &mut self,
        live: &BitSet,
        placement: DropPlacement,
        reason: DropReason,
    ) -> Result<(), CompilerError> {
        let context = self.context;
        let live = extend_with_origins(live, self.state.origins());

        for local in context.layout.locals.iter().rev() {
            if !local.is_droppable() || live.contains(local.id.0 as usize) {
                continue;
            }

            self.drop_local(local, placement, reason)?;
        }

        Ok(())
    }

    /// Destroy what the function still owns as control leaves it
    pub(super) fn drop_at_exit(
        &mut self,
        include_outputs: bool,
        placement: DropPlacement,
        reason: DropReason,
    ) -> Result<(), CompilerError> {
        let context = self.context;

        for local in context.layout.locals.iter().rev() {
            let owned = match local.storage {
                Storage::Owned => true,
                Storage::Output => include_outputs,
                Storage::Borrowed { .. } | Storage::Static => false,
            };

            if owned && !local.is_reference {
                self.drop_local(local, placement, reason)?;
            }
        }

        Ok(())
    }

    fn drop_local(
        &mut self,
        local: &LocalInfo,
        placement: DropPlacement,
        reason: DropReason,
    ) -> Result<(), CompilerError> {
        let holds_value = self
            .state
            .modes(local.leaves())
            .is_some_and(LocalMode::may_be_init);

        if !holds_value {
            return Ok(());
        }

        self.drop_binding_leaves(local.id, &[], local.leaves(), local.ty, placement, reason)
    }

    /// Destroy the leaves of `local` under `prefix` that may hold a value.
    ///
    /// When every leaf agrees, the prefix is destroyed as one value through its
    /// type's destructor. Otherwise the leaves still holding values are
    /// destroyed one by one and the moved ones are skipped.
    pub(super) fn drop_binding_leaves(
        &mut self,
        local: LocalId,
        prefix: &[FieldId],
        range: Range<usize>,
        ty: TypeId,
        placement: DropPlacement,
        reason: DropReason,
    ) -> Result<(), CompilerError> {
        let context = self.context;
        let info = context.layout.local(local)?;
        let leaves = &context.layout.leaves;

        let owning = range
            .clone()
            .filter(|index| !leaves[*index].is_reference)
            .collect::<Vec<_>>();

        let uniform = owning.first().map(|first| self.state.mode(*first)).filter(|mode| {
            owning
                .iter()
                .all(|index| self.state.mode(*index) == *mode)
        });

        // The receiver of a destructor is always taken apart field by field
        let whole = !prefix.is_empty() || !info.field_wise;

        match uniform {
            Some(mode) if mode.may_be_init() && whole => {
                self.emit_drop(
                    DropSubject::Binding {
                        local,
                        field_path: prefix.to_vec(),
                    },
                    ty,
                    mode != LocalMode::INIT,
                    placement,
                    reason,
                );
            }
            _ => {
                for index in in_destruction_order(owning, context.config.destructor_order) {
                    let mode = self.state.mode(index);
                    if !mode.may_be_init() {
                        continue;
                    }

                    let leaf = &leaves[index];
                    self.emit_drop(
                        DropSubject::Binding {
                            local,
                            field_path: leaf.path.clone(),
                        },
                        leaf.ty,
                        mode != LocalMode::INIT,
                        placement,
                        reason,
                    );
                }
            }
        }

        self.state.set_modes(range, LocalMode::UNINIT);
        if prefix.is_empty() && info.carries_origins {
            self.state.clear_origin(local, context.layout.targets.empty());
        }

        Ok(())
    }

    pub(super) fn emit_drop(
        &mut self,
        subject: DropSubject,
        ty: TypeId,
        conditional: bool,
        placement: DropPlacement,
        reason: DropReason,
    ) {
        let context = self.context;

        if self.already_lowered(&subject, placement) {
            return;
        }

        let trivial = !context.types.needs_drop(ty);
        let flag = match &subject {
            DropSubject::Binding { local, field_path } if conditional && !trivial => Some(DropFlag {
                local: *local,
                field_path: field_path.clone(),
            }),
            _ => None,
        };

        drop_log!(format!(
            "drop {:?} of type '{}' at {:?} ({:?}{})",
            subject,
            context.diagnostics.type_name(ty),
            placement,
            reason,
            if conditional { ", conditional" } else { "" }
        ));

        self.record.push_drop(
            DropInsertion {
                subject,
                placement,
                reason,
                conditional,
                trivial,
                location: self.location,
            },
            flag,
        );
    }

    /// A body that was already lowered carries its drops as statements next
    /// to the statement that caused them. Those are not inserted twice.
    fn already_lowered(&self, subject: &DropSubject, placement: DropPlacement) -> bool {
        let Position::Statement(index) = self.position else {
            return false;
        };
        let statements = &self.block.statements;

        let neighbours: Box<dyn Iterator<Item = _>> = match placement {
            DropPlacement::AfterStatement(_) => Box::new(statements.iter().skip(index + 1)),
            DropPlacement::BeforeStatement(_) | DropPlacement::BeforeWrite(_) => {
                Box::new(statements[..index].iter().rev())
            }
            DropPlacement::BlockEntry(_)
            | DropPlacement::Edge { .. }
            | DropPlacement::TerminatorExit(_) => return false,
        };

        neighbours
            .map_while(|statement| match &statement.kind {
                StatementKind::Drop(drop) => Some(&drop.subject),
                _ => None,
            })
            .any(|lowered| lowered == subject)
    }
}
