//! Call sites: overload resolution, argument conventions and origin binding.

use super::places::WriteKind;
use super::{BlockTransfer, ValueOrigin, via};
use crate::compiler_frontend::analysis::classifier::{UseSite, ValueUseKind};
use crate::compiler_frontend::analysis::conventions::{
    ArgumentShape, Convention, OriginLabel, ResolvedParam, ResolvedSignature, ResultConvention,
    resolve_overload,
};
use crate::compiler_frontend::analysis::destructors::{DropPlacement, DropReason};
use crate::compiler_frontend::analysis::exclusivity::AccessKind;
use crate::compiler_frontend::analysis::origins::{
    ArgumentOrigin, CallOrigins, check_unique_labels, instantiate_call_labels,
};
use crate::compiler_frontend::analysis::ownership_checker::layout::Storage;
use crate::compiler_frontend::analysis::ownership_checker::types::{CallResolution, ValueUseFact};
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::ir::ir_nodes::{
    CallTarget, Constant, DropSubject, FunctionId, Operand, Place, StmtId,
};
use crate::compiler_frontend::ir::ir_types::{BOOL_TYPE, INT_TYPE, STR_TYPE};
use crate::{borrow_log, ownership_error, return_compiler_error};

impl BlockTransfer<'_, '_> {
    pub(super) fn transfer_call(
        &mut self,
        statement: StmtId,
        target: &CallTarget,
        args: &[Operand],
        destination: Option<&Place>,
    ) -> Result<(), CompilerError> {
        let context = self.context;

        let callee = match *target {
            CallTarget::Function(id) => id,
            CallTarget::Overloaded(name) => {
                let shapes = args
                    .iter()
                    .map(|arg| self.argument_shape(arg))
                    .collect::<Result<Vec<_>, _>>()?;

                match resolve_overload(context.module, context.signatures, name, &shapes, self.location) {
                    Ok(id) => id,
                    Err(error) => {
                        self.record.diagnostics.push(error);
                        return self.unresolved_call(args, destination);
                    }
                }
            }
        };

        let Some(signature) = context.signatures.get(callee.0 as usize) else {
            return_compiler_error!("Call to unknown function '{}'", callee);
        };
        let callee_name = self.function_name(callee);

        if signature.params.len() != args.len() {
            return_compiler_error!(
                "Call to '{}' passes {} arguments but it takes {}",
                callee_name,
                args.len(),
                signature.params.len()
            );
        }

        borrow_log!(format!("call to '{}' in block {}", callee_name, self.block.id));

        let call = self.bind_call_labels(signature, args, &callee_name)?;

        let mut argument_uses = Vec::with_capacity(args.len());
        for (param, arg) in signature.params.iter().zip(args) {
            let kind = match param.convention {
                Convention::Borrow(label) | Convention::MutableBorrow(label) => {
                    self.borrow_argument(param, label, arg, &call, statement, &callee_name)?
                }
                Convention::Consume => self
                    .eval_operand(arg, UseSite::Consume)?
                    .1
                    .unwrap_or(ValueUseKind::Copy),
                Convention::UninitializedOutput => {
                    self.out_argument(arg, &callee_name)?;
                    ValueUseKind::Borrow
                }
            };
            argument_uses.push(kind);
        }

        self.store_through_mutable_arguments(signature, args)?;

        match destination {
            Some(destination) => {
                let value = match signature.result_label() {
                    Some(label) => ValueOrigin {
                        targets: call
                            .targets(label)
                            .cloned()
                            .unwrap_or_else(|| context.layout.targets.empty()),
                        mutable: call.is_mutable(label),
                    },
                    None => ValueOrigin::none(context),
                };
                self.write_place(destination, WriteKind::Destination, &value)?;
            }
            None => {
                // An owned result nobody binds is destroyed right after the call
                if let Some(result) = &signature.result {
                    let owned = matches!(
                        result.convention,
                        ResultConvention::Owned { .. } | ResultConvention::Output
                    );
                    if owned && !context.types.is_reference(result.ty) {
                        self.emit_drop(
                            DropSubject::Temporary { ty: result.ty },
                            result.ty,
                            false,
                            DropPlacement::AfterStatement(statement),
                            DropReason::Temporary,
                        );
                    }
                }
            }
        }

        self.record.call_resolutions.push(CallResolution {
            statement,
            callee,
            argument_uses,
            passing: signature.params.iter().map(|param| param.passing).collect(),
        });

        Ok(())
    }

    fn function_name(&self, function: FunctionId) -> String {
        let module = self.context.module;
        match module.function(function) {
            Some(decl) => module.name(decl.name).to_owned(),
            None => format!("{}", function),
        }
    }

    fn argument_shape(&self, arg: &Operand) -> Result<ArgumentShape, CompilerError> {
        Ok(match arg {
            Operand::Constant(constant) => ArgumentShape {
                ty: match constant {
                    Constant::Int(_) => INT_TYPE,
                    Constant::Bool(_) => BOOL_TYPE,
                    Constant::Str(_) => STR_TYPE,
                },
                transfer: false,
                constant: true,
            },
            Operand::Use(place) => ArgumentShape {
                ty: self.resolve(place)?.ty,
                transfer: false,
                constant: false,
            },
            Operand::Transfer(place) => ArgumentShape {
                ty: self.resolve(place)?.ty,
                transfer: true,
                constant: false,
            },
        })
    }

    /// Keep checking the arguments of a call that could not be resolved
    fn unresolved_call(&mut self, args: &[Operand], destination: Option<&Place>) -> Result<(), CompilerError> {
        for arg in args {
            self.eval_operand(arg, UseSite::Borrow)?;
        }

        if let Some(destination) = destination {
            let value = ValueOrigin::none(self.context);
            self.write_place(destination, WriteKind::Destination, &value)?;
        }

        Ok(())
    }

    /// Bind each signature label to what the arguments tied to it may point into
    fn bind_call_labels(
        &mut self,
        signature: &ResolvedSignature,
        args: &[Operand],
        callee_name: &str,
    ) -> Result<CallOrigins, CompilerError> {
        let context = self.context;
        let space = &context.layout.targets;

        let mut arguments = Vec::with_capacity(args.len());
        for (param, arg) in signature.params.iter().zip(args) {
            let Some(place) = arg.place() else {
                continue;
            };

            let info = self.resolve(place)?;
            let value = self.value_origin(&info);

            let targets = match param.convention {
                Convention::Borrow(_) | Convention::MutableBorrow(_) => {
                    let mut targets = self.address_targets(&info)?;
                    targets.union_with(&value.targets);
                    targets
                }
                Convention::Consume => value.targets,
                Convention::UninitializedOutput => self.address_targets(&info)?,
            };

            let place_mutable =
                matches!(arg, Operand::Transfer(_)) || self.place_is_mutable(&info)?;

            arguments.push(ArgumentOrigin {
                label: param.label,
                targets,
                place_mutable,
            });
        }

        let call = instantiate_call_labels(signature, &arguments, space);

        let local_name = |local| context.diagnostics.local_name(local);
        self.record.diagnostics.extend(check_unique_labels(
            signature,
            &call,
            space,
            &local_name,
            context.diagnostics.string_table(),
            callee_name,
            self.location,
        ));

        Ok(call)
    }

    fn borrow_argument(
        &mut self,
        param: &ResolvedParam,
        label: OriginLabel,
        arg: &Operand,
        call: &CallOrigins,
        statement: StmtId,
        callee_name: &str,
    ) -> Result<ValueUseKind, CompilerError> {
        let context = self.context;

        let place = match arg {
            Operand::Constant(_) => return Ok(ValueUseKind::Borrow),

            // The value moves into a temporary that lives until the call returns
            Operand::Transfer(place) => {
                let info = self.resolve(place)?;
                let (_, kind) = self.eval_operand(arg, UseSite::Transfer)?;

                if !context.types.is_reference(info.ty) {
                    self.emit_drop(
                        DropSubject::Temporary { ty: info.ty },
                        info.ty,
                        false,
                        DropPlacement::AfterStatement(statement),
                        DropReason::Temporary,
                    );
                }
                return Ok(kind.unwrap_or(ValueUseKind::Move));
            }

            Operand::Use(place) => place,
        };

        let info = self.resolve(place)?;
        let requires_mutable = matches!(param.convention, Convention::MutableBorrow(_));
        let mutable = requires_mutable || call.is_mutable(label);

        if requires_mutable && !self.place_is_mutable(&info)? {
            let name = context.diagnostics.place_name(place);
            self.record.diagnostics.push(ownership_error!(
                MutabilityViolation,
                format!(
                    "Cannot pass '{}' to a 'mut' parameter of '{}', it is not mutable",
                    name, callee_name
                ),
                self.location,
                {
                    BorrowedVariable => name.as_str(),
                    FunctionName => callee_name,
                    Convention => param.convention.name(),
                    PrimarySuggestion => "Declare the binding as mutable",
                }
            ));
        }

        self.check_initialized(info.local, &info.direct_path, "pass")?;

        let kind = if mutable {
            AccessKind::Mutable
        } else {
            AccessKind::Shared
        };
        let targets = self.address_targets(&info)?;
        self.access(&targets, kind, via(&info), true);

        // Whatever the argument itself points into is reachable by the callee too
        let value = self.value_origin(&info);
        if !value.targets.is_empty() {
            let through = if mutable && value.mutable {
                AccessKind::Mutable
            } else {
                AccessKind::Shared
            };
            self.access(&value.targets, through, Some(info.local), true);
        }

        self.record.value_uses.push(ValueUseFact {
            site: self.site(),
            place: place.clone(),
            kind: ValueUseKind::Borrow,
        });

        Ok(ValueUseKind::Borrow)
    }

    fn out_argument(&mut self, arg: &Operand, callee_name: &str) -> Result<(), CompilerError> {
        let Some(place) = arg.place() else {
            return_compiler_error!(
                "Constant passed to an 'out' parameter of '{}'",
                callee_name
            );
        };

        let value = ValueOrigin {
            targets: self.context.layout.targets.static_storage(),
            mutable: false,
        };
        self.write_place(place, WriteKind::OutArgument, &value)
    }

    /// A `mut` argument may keep references to the other arguments bound to
    /// the same label after the call returns.
    fn store_through_mutable_arguments(
        &mut self,
        signature: &ResolvedSignature,
        args: &[Operand],
    ) -> Result<(), CompilerError> {
        let context = self.context;

        for (index, (param, arg)) in signature.params.iter().zip(args).enumerate() {
            let Convention::MutableBorrow(label) = param.convention else {
                continue;
            };
            let Operand::Use(place) = arg else {
                continue;
            };

            let info = self.resolve(place)?;
            let local = context.layout.local(info.local)?;
            if !local.carries_origins || info.through_reference {
                continue;
            }

            let mut incoming = context.layout.targets.empty();
            for (other_index, (other_param, other_arg)) in
                signature.params.iter().zip(args).enumerate()
            {
                if other_index == index || other_param.label != label {
                    continue;
                }
                let Some(other_place) = other_arg.place() else {
                    continue;
                };

                let other = self.resolve(other_place)?;
                incoming.union_with(&self.value_origin(&other).targets);
                if other_param.convention.is_borrow() {
                    incoming.union_with(&self.address_targets(&other)?);
                }
            }

            if incoming.is_empty() {
                continue;
            }

            match local.storage {
                Storage::Owned | Storage::Output => {
                    self.state
                        .extend_origin(info.local, &incoming, false, self.location);
                }
                Storage::Borrowed { mutable: true, label: own } => {
                    let what = format!(
                        "value stored into '{}'",
                        context.diagnostics.place_name(place)
                    );
                    self.escape(&incoming, Some(own), &what);
                }
                Storage::Borrowed { .. } | Storage::Static => {}
            }
        }

        Ok(())
    }
}
