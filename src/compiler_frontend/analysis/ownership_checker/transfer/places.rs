//! Reads, moves, borrows and writes of places, with the initialization,
//! mutability and exclusivity checks each one implies.

use super::{BlockTransfer, ValueOrigin, via};
use crate::compiler_frontend::analysis::classifier::ValueUseKind;
use crate::compiler_frontend::analysis::destructors::{DropPlacement, DropReason};
use crate::compiler_frontend::analysis::exclusivity::{Access, AccessKind};
use crate::compiler_frontend::analysis::origins::TargetSet;
use crate::compiler_frontend::analysis::ownership_checker::layout::{LeafCover, PlaceInfo, Storage};
use crate::compiler_frontend::analysis::ownership_checker::state::LocalMode;
use crate::compiler_frontend::analysis::ownership_checker::types::{
    MoveRecord, ReferenceOriginFact, ValueUseFact,
};
use crate::compiler_frontend::compiler_errors::{CompilerError, DiagnosticKind, ErrorMetaDataKey};
use crate::compiler_frontend::ir::ir_nodes::{
    DropStatement, DropSubject, FieldId, LocalId, Place, TypeId,
};
use crate::compiler_frontend::ir::ir_types::ReferenceMutability;
use crate::{origin_log, ownership_error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum WriteKind {
    /// `var x = value`
    Let,
    /// `var x` with no value
    Declare,
    Assign,
    /// Result of a call
    Destination,
    /// Argument to an `out` parameter
    OutArgument,
}

impl BlockTransfer<'_, '_> {
    pub(super) fn resolve(&self, place: &Place) -> Result<PlaceInfo, CompilerError> {
        self.context.layout.resolve_place(self.context.types, place)
    }

    /// Report the place when every leaf under `path` fails the same way,
    /// otherwise the first leaf that is not definitely initialized.
    /// Returns whether the place could be used.
    pub(super) fn check_initialized(
        &mut self,
        local: LocalId,
        path: &[FieldId],
        action: &str,
    ) -> Result<bool, CompilerError> {
        let context = self.context;
        let cover = context.layout.cover(local, path)?;

        let failures = cover
            .indices()
            .filter_map(|leaf_index| {
                let kind = self.state.mode(leaf_index).read_check().err()?;
                Some((leaf_index, kind))
            })
            .collect::<Vec<_>>();

        let Some(&(first_leaf, kind)) = failures.first() else {
            return Ok(true);
        };

        let whole_place = failures.len() == cover.indices().len()
            && failures.iter().all(|(_, other)| *other == kind);

        let failing_path = match cover {
            LeafCover::Leaves(_) if !whole_place => context.layout.leaves[first_leaf].path.as_slice(),
            _ => path,
        };

        let error = self.initialization_error(kind, local, failing_path, action);
        self.record.diagnostics.push(error);
        Ok(false)
    }

    fn initialization_error(
        &self,
        kind: DiagnosticKind,
        local: LocalId,
        path: &[FieldId],
        action: &str,
    ) -> CompilerError {
        let diagnostics = &self.context.diagnostics;
        let name = diagnostics.path_name(local, path);

        let (msg, suggestion) = match kind {
            DiagnosticKind::UseAfterMove => (
                format!("Cannot {} '{}', it was moved", action, name),
                "Copy the value before moving it, or assign a new value before this use",
            ),
            DiagnosticKind::PossibleUseAfterMove => (
                format!(
                    "Cannot {} '{}', it may have been moved on some paths",
                    action, name
                ),
                "Move the value on every path or on none, or assign it again before this use",
            ),
            _ => (
                format!(
                    "Cannot {} '{}', it is not initialized on every path",
                    action, name
                ),
                "Initialize the value on every path before this use",
            ),
        };

        let mut error = CompilerError::new_ownership_error(kind, msg, self.location)
            .with_metadata(ErrorMetaDataKey::VariableName, diagnostics.local_name(local))
            .with_metadata(ErrorMetaDataKey::PrimarySuggestion, suggestion);

        if matches!(kind, DiagnosticKind::UseAfterMove | DiagnosticKind::PossibleUseAfterMove) {
            error.new_metadata_entry(ErrorMetaDataKey::MovedVariable, name.as_str());
        }
        if !path.is_empty() {
            error.new_metadata_entry(ErrorMetaDataKey::FieldPath, diagnostics.field_path(local, path));
        }

        error
    }

    /// What the value stored at this place points into
    pub(super) fn value_origin(&self, info: &PlaceInfo) -> ValueOrigin {
        let context = self.context;
        if !context.types.carries_origins(info.ty) {
            return ValueOrigin::none(context);
        }

        ValueOrigin {
            targets: self
                .state
                .origin(info.local)
                .cloned()
                .unwrap_or_else(|| context.layout.targets.empty()),
            mutable: self.state.holds_mutable_reference(info.local),
        }
    }

    /// The storage a place lives in, as origin targets
    pub(super) fn address_targets(&self, info: &PlaceInfo) -> Result<TargetSet, CompilerError> {
        let context = self.context;
        let space = &context.layout.targets;

        if info.through_reference {
            return Ok(self
                .state
                .origin(info.local)
                .cloned()
                .unwrap_or_else(|| space.empty()));
        }

        let local = context.layout.local(info.local)?;
        Ok(match local.storage {
            Storage::Owned | Storage::Output => space.local(info.local),
            Storage::Borrowed { label, .. } => space.label(label),
            Storage::Static => space.static_storage(),
        })
    }

    pub(super) fn place_is_mutable(&self, info: &PlaceInfo) -> Result<bool, CompilerError> {
        if info.through_reference {
            return Ok(self.state.holds_mutable_reference(info.local));
        }

        let local = self.context.layout.local(info.local)?;
        Ok(match local.storage {
            Storage::Owned | Storage::Output | Storage::Static => local.mutable,
            Storage::Borrowed { mutable, .. } => mutable,
        })
    }

    pub(super) fn access(
        &mut self,
        targets: &TargetSet,
        kind: AccessKind,
        via: Option<LocalId>,
        in_statement: bool,
    ) {
        let context = self.context;
        let access = Access {
            targets,
            kind,
            via,
            location: self.location,
            in_statement,
        };
        let target_name = |index| context.diagnostics.target_name(&context.layout.targets, index);

        if let Some(error) = self.scope.check(&access, &target_name) {
            self.record.diagnostics.push(error);
        }
    }

    pub(super) fn read_place(&mut self, info: &PlaceInfo, action: &str) -> Result<(), CompilerError> {
        self.check_initialized(info.local, &info.direct_path, action)?;

        let targets = self.address_targets(info)?;
        self.access(&targets, AccessKind::Shared, via(info), true);
        Ok(())
    }

    pub(super) fn move_place(&mut self, place: &Place, info: &PlaceInfo) -> Result<(), CompilerError> {
        let context = self.context;
        let local = context.layout.local(info.local)?;
        let name = context.diagnostics.place_name(place);

        if info.through_reference || matches!(local.storage, Storage::Borrowed { .. } | Storage::Static) {
            self.record.diagnostics.push(ownership_error!(
                MoveOutOfBorrow,
                format!("Cannot move '{}' out of storage this function does not own", name),
                self.location,
                {
                    MovedVariable => name.as_str(),
                    PrimarySuggestion => "Copy the value, or declare the parameter 'owned' to take ownership",
                }
            ));
            return Ok(());
        }

        if !self.check_initialized(info.local, &info.direct_path, "move")? {
            return Ok(());
        }

        let range = match context.layout.cover(info.local, &info.direct_path)? {
            LeafCover::Leaves(range) => range,
            LeafCover::Inside(_) => {
                let root = context.diagnostics.local_name(info.local);
                let reason = if context.config.field_sensitive {
                    "its type has a destructor"
                } else {
                    "field tracking is disabled"
                };

                self.record.diagnostics.push(ownership_error!(
                    InvalidPartialMove,
                    format!("Cannot move '{}' out of '{}', {}", name, root, reason),
                    self.location,
                    {
                        MovedVariable => name.as_str(),
                        VariableName => root,
                        FieldPath => context.diagnostics.field_path(info.local, &info.direct_path),
                        PrimarySuggestion => "Move the whole value, or take the field instead",
                    }
                ));
                return Ok(());
            }
        };

        let targets = context.layout.targets.local(info.local);
        self.access(&targets, AccessKind::Mutable, None, true);

        self.state.set_modes(range, LocalMode::MOVED);
        self.record.moves.push(MoveRecord {
            local: info.local,
            field_path: info.direct_path.clone(),
            site: self.site(),
            location: self.location,
        });

        Ok(())
    }

    /// Create a reference to `place`. The result points into the place's storage.
    pub(super) fn borrow_place(
        &mut self,
        place: &Place,
        mutable: bool,
        in_statement: bool,
    ) -> Result<ValueOrigin, CompilerError> {
        let context = self.context;
        let info = self.resolve(place)?;

        self.check_initialized(info.local, &info.direct_path, "borrow")?;

        if mutable && !self.place_is_mutable(&info)? {
            let name = context.diagnostics.place_name(place);
            self.record.diagnostics.push(ownership_error!(
                MutabilityViolation,
                format!("Cannot take a mutable reference to '{}', it is not mutable", name),
                self.location,
                {
                    BorrowedVariable => name.as_str(),
                    BorrowKind => "Mutable",
                    PrimarySuggestion => "Declare the binding as mutable, or take an immutable reference",
                }
            ));
        }

        let targets = self.address_targets(&info)?;
        let kind = if mutable {
            AccessKind::Mutable
        } else {
            AccessKind::Shared
        };
        self.access(&targets, kind, via(&info), in_statement);

        self.record.value_uses.push(ValueUseFact {
            site: self.site(),
            place: place.clone(),
            kind: ValueUseKind::Borrow,
        });

        Ok(ValueOrigin { targets, mutable })
    }

    pub(super) fn write_place(
        &mut self,
        place: &Place,
        kind: WriteKind,
        value: &ValueOrigin,
    ) -> Result<(), CompilerError> {
        let context = self.context;
        let info = self.resolve(place)?;
        let local = context.layout.local(info.local)?;
        let statement = self.statement_id()?;
        let name = context.diagnostics.place_name(place);

        let placement = match kind {
            WriteKind::Let | WriteKind::Assign | WriteKind::Destination => {
                DropPlacement::BeforeWrite(statement)
            }
            WriteKind::Declare | WriteKind::OutArgument => DropPlacement::BeforeStatement(statement),
        };

        // An out argument is written while the other arguments are still borrowed
        let in_statement = kind == WriteKind::OutArgument;

        if info.through_reference {
            if !self.check_initialized(info.local, &info.direct_path, "assign through")? {
                return Ok(());
            }

            if !self.state.holds_mutable_reference(info.local) {
                self.push_immutable_write(&name, info.local, "it is reached through an immutable reference");
            }

            let targets = self.address_targets(&info)?;
            self.access(&targets, AccessKind::Mutable, Some(info.local), in_statement);
            self.drop_referent(place, info.ty, placement);
            return Ok(());
        }

        match local.storage {
            Storage::Borrowed { mutable, label } => {
                if !mutable {
                    self.push_immutable_write(&name, info.local, "it is a read-only argument");
                    return Ok(());
                }

                let targets = context.layout.targets.label(label);
                self.access(&targets, AccessKind::Mutable, None, in_statement);
                self.drop_referent(place, info.ty, placement);

                // The caller keeps this value, so it may only point into the argument's own origin
                if context.types.carries_origins(info.ty) {
                    let what = format!("value stored in '{}'", name);
                    self.escape(&value.targets, Some(label), &what);
                }
                return Ok(());
            }

            Storage::Static => {
                if !local.mutable {
                    self.push_immutable_write(&name, info.local, "it is an immutable global");
                    return Ok(());
                }
                self.drop_referent(place, info.ty, placement);
                return Ok(());
            }

            Storage::Owned | Storage::Output => {}
        }

        let cover = context.layout.cover(info.local, &info.direct_path)?;

        // Drops and moves end a value but never make an immutable binding writable again
        let written_before = self.state.any_assigned(cover.indices());
        let initializes = matches!(kind, WriteKind::Let | WriteKind::Declare);

        if !local.mutable && !initializes && written_before {
            self.push_immutable_write(&name, info.local, "it is not mutable and was already given a value");
        }

        let targets = context.layout.targets.local(info.local);
        self.access(&targets, AccessKind::Mutable, None, in_statement);

        match cover {
            LeafCover::Leaves(range) => {
                self.drop_binding_leaves(
                    info.local,
                    &info.direct_path,
                    range.clone(),
                    info.ty,
                    placement,
                    DropReason::Overwrite,
                )?;

                if kind == WriteKind::Declare {
                    self.state.clear_assigned(range.clone());
                    self.state.set_modes(range, LocalMode::UNINIT);
                } else {
                    self.state.mark_assigned(range.clone());
                    self.state.set_modes(range, LocalMode::INIT);
                }
            }

            LeafCover::Inside(_) => {
                // Part of a value that is tracked as a whole, the rest must already be there
                if !self.check_initialized(info.local, &info.direct_path, "assign to")? {
                    return Ok(());
                }

                if context.types.needs_drop(info.ty) {
                    self.emit_drop(
                        DropSubject::Binding {
                            local: info.local,
                            field_path: info.direct_path.clone(),
                        },
                        info.ty,
                        false,
                        placement,
                        DropReason::Overwrite,
                    );
                }
            }
        }

        if kind != WriteKind::Declare && local.carries_origins {
            self.store_origin(&info, value)?;
        }

        Ok(())
    }

    fn store_origin(&mut self, info: &PlaceInfo, value: &ValueOrigin) -> Result<(), CompilerError> {
        let context = self.context;
        let local = context.layout.local(info.local)?;

        let mutable = match context.types.reference_info(local.ty) {
            Some((_, ReferenceMutability::Immutable)) => false,
            Some((_, ReferenceMutability::Mutable)) => {
                if !value.mutable && !value.targets.is_empty() && info.direct_path.is_empty() {
                    let name = context.diagnostics.local_name(info.local);
                    self.record.diagnostics.push(ownership_error!(
                        MutabilityViolation,
                        format!(
                            "'{}' holds a mutable reference but is given an immutable one",
                            name
                        ),
                        self.location,
                        {
                            VariableName => name.as_str(),
                            BorrowKind => "Shared",
                            PrimarySuggestion => "Create the reference with 'mut'",
                        }
                    ));
                }
                true
            }
            Some((_, ReferenceMutability::Parametric)) => value.mutable,
            None => value.mutable || context.types.holds_mutable_references(local.ty) == Some(true),
        };

        if info.direct_path.is_empty() {
            self.state
                .set_origin(info.local, value.targets.clone(), mutable, self.location);

            origin_log!(format!(
                "{} now points into {:?}",
                context.diagnostics.local_name(info.local),
                context.layout.targets.targets(&value.targets)
            ));

            self.record.reference_origins.push(ReferenceOriginFact {
                site: self.site(),
                local: info.local,
                targets: context.layout.targets.targets(&value.targets),
                mutable,
            });
        } else {
            // A field write only adds to what the rest of the value already points into
            self.state
                .extend_origin(info.local, &value.targets, mutable, self.location);
        }

        Ok(())
    }

    fn drop_referent(&mut self, place: &Place, ty: TypeId, placement: DropPlacement) {
        if !self.context.types.needs_drop(ty) {
            return;
        }

        self.emit_drop(
            DropSubject::Referent(place.clone()),
            ty,
            false,
            placement,
            DropReason::Overwrite,
        );
    }

    fn push_immutable_write(&mut self, name: &str, local: LocalId, reason: &str) {
        let root = self.context.diagnostics.local_name(local);
        self.record.diagnostics.push(ownership_error!(
            MutabilityViolation,
            format!("Cannot assign to '{}', {}", name, reason),
            self.location,
            {
                VariableName => root,
                BorrowKind => "Mutable",
                PrimarySuggestion => "Declare the binding or parameter as mutable",
            }
        ));
    }

    /// Update the state for a drop statement that lowering already placed.
    /// An unconditional drop must hit storage that is initialized on every path.
    pub(super) fn apply_lowered_drop(&mut self, drop: &DropStatement) -> Result<(), CompilerError> {
        let context = self.context;

        let DropSubject::Binding { local, field_path } = &drop.subject else {
            return Ok(());
        };

        let cover = context.layout.cover(*local, field_path)?;
        let owning = cover
            .indices()
            .filter(|index| !context.layout.leaves[*index].is_reference)
            .map(|index| self.state.mode(index))
            .collect::<Vec<_>>();

        let misplaced = if drop.conditional {
            !owning.iter().any(|mode| mode.may_be_init())
        } else {
            owning.iter().any(|mode| *mode != LocalMode::INIT)
        };

        if misplaced {
            let name = context.diagnostics.path_name(*local, field_path);
            self.record.diagnostics.push(
                CompilerError::compiler_error(format!(
                    "Drop of '{}' in block {} does not hit initialized storage",
                    name, self.block.id
                ))
                .with_location(self.location)
                .with_metadata(ErrorMetaDataKey::CompilationStage, "Drop Validation"),
            );
        }

        if let LeafCover::Leaves(range) = cover {
            self.state.set_modes(range, LocalMode::UNINIT);

            if field_path.is_empty() && context.layout.local(*local)?.carries_origins {
                self.state.clear_origin(*local, context.layout.targets.empty());
            }
        }

        Ok(())
    }
}
