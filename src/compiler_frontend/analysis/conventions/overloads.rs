use crate::compiler_frontend::analysis::conventions::{Convention, ResolvedSignature};
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::ir::ir_nodes::{FunctionId, IrModule, TypeId};
use crate::compiler_frontend::ir::text_location::TextLocation;
use crate::compiler_frontend::string_interning::StringId;
use crate::{convention_log, ownership_error};

/// What the resolver needs to know about one call argument.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ArgumentShape {
    pub ty: TypeId,
    pub transfer: bool,
    pub constant: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct CandidateCost {
    implicit_copies: usize,
    generic_params: usize,
}

enum CandidateFit {
    Viable(CandidateCost),
    /// Would match if the caller marked these non-copyable arguments for transfer
    NeedsTransfer,
    Rejected,
}

/// Pick the overload of `name` that fits the arguments best.
/// Fewer implicit copies win, then fewer generic parameters. Ties fail closed.
pub(crate) fn resolve_overload(
    module: &IrModule,
    signatures: &[ResolvedSignature],
    name: StringId,
    arguments: &[ArgumentShape],
    location: TextLocation,
) -> Result<FunctionId, CompilerError> {
    let mut best: Vec<(CandidateCost, FunctionId)> = Vec::new();
    let mut needs_transfer = false;
    let mut candidate_count = 0usize;

    for function in module.functions_named(name) {
        candidate_count += 1;

        let Some(signature) = signatures.get(function.id.0 as usize) else {
            continue;
        };

        match fit_candidate(module, signature, arguments) {
            CandidateFit::Viable(cost) => {
                let keep = best.first().map(|(best_cost, _)| cost.cmp(best_cost));
                match keep {
                    None | Some(std::cmp::Ordering::Equal) => best.push((cost, function.id)),
                    Some(std::cmp::Ordering::Less) => {
                        best.clear();
                        best.push((cost, function.id));
                    }
                    Some(std::cmp::Ordering::Greater) => {}
                }
            }
            CandidateFit::NeedsTransfer => needs_transfer = true,
            CandidateFit::Rejected => {}
        }
    }

    let function_name = module.name(name);

    match best.as_slice() {
        [(_cost, chosen)] => {
            convention_log!(format!(
                "[Overloads] '{}' resolved to {} (copies={} generics={})",
                function_name, chosen, _cost.implicit_copies, _cost.generic_params
            ));
            Ok(*chosen)
        }

        [] if needs_transfer => Err(ownership_error!(
            MissingTransferIntent,
            format!(
                "Call to '{}' needs ownership of an argument that cannot be copied",
                function_name
            ),
            location,
            {
                FunctionName => function_name,
                PrimarySuggestion => "Mark the argument with '^' to transfer it",
            }
        )),

        [] => Err(ownership_error!(
            NoMatchingOverload,
            format!(
                "None of the {} overloads of '{}' accept these arguments",
                candidate_count, function_name
            ),
            location,
            {
                FunctionName => function_name,
            }
        )),

        tied => {
            let mut error = ownership_error!(
                AmbiguousOverload,
                format!(
                    "Call to '{}' is ambiguous between {} overloads",
                    function_name,
                    tied.len()
                ),
                location,
                {
                    FunctionName => function_name,
                    PrimarySuggestion => "Make the argument types more specific or rename one overload",
                }
            );

            for (_, candidate) in tied {
                if let Some(decl) = module.function(*candidate) {
                    error = error.with_related(decl.location, "candidate declared here");
                }
            }

            Err(error)
        }
    }
}

fn fit_candidate(
    module: &IrModule,
    signature: &ResolvedSignature,
    arguments: &[ArgumentShape],
) -> CandidateFit {
    if signature.params.len() != arguments.len() {
        return CandidateFit::Rejected;
    }

    let mut cost = CandidateCost {
        implicit_copies: 0,
        generic_params: 0,
    };
    let mut needs_transfer = false;

    for (param, argument) in signature.params.iter().zip(arguments) {
        if module.types.is_generic(param.ty) {
            cost.generic_params += 1;
        } else if !argument_type_matches(module, param.ty, argument.ty) {
            return CandidateFit::Rejected;
        }

        match param.convention {
            Convention::Consume => {
                if argument.transfer || argument.constant {
                    continue;
                }

                if module.types.is_copyable(argument.ty) {
                    cost.implicit_copies += 1;
                } else {
                    needs_transfer = true;
                }
            }

            Convention::UninitializedOutput => {
                if argument.transfer || argument.constant {
                    return CandidateFit::Rejected;
                }
            }

            Convention::Borrow(_) | Convention::MutableBorrow(_) => {}
        }
    }

    if needs_transfer {
        return CandidateFit::NeedsTransfer;
    }

    CandidateFit::Viable(cost)
}

/// Exact match, or a reference argument whose pointee is the parameter type
fn argument_type_matches(module: &IrModule, param_ty: TypeId, argument_ty: TypeId) -> bool {
    if param_ty == argument_ty {
        return true;
    }

    matches!(
        module.types.reference_info(argument_ty),
        Some((pointee, _)) if pointee == param_ty
    )
}
