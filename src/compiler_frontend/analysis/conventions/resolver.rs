use crate::compiler_frontend::analysis::classifier::{PassingMode, passing_mode};
use crate::compiler_frontend::analysis::conventions::{
    Convention, LabelInfo, OriginLabel, ResolvedParam, ResolvedResult, ResolvedSignature,
    ResultConvention,
};
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::ir::ir_nodes::{
    FunctionDecl, FunctionRole, IrModule, OriginMutability, ParamKeyword, Parameter, ResultDecl,
    ResultKeyword, ResultOrigin,
};
use crate::compiler_frontend::ir::ir_types::ReferenceMutability;
use crate::{convention_log, ownership_error, return_compiler_error};

/// Conventions for one function plus the diagnostics found while resolving them.
/// Resolution is best effort so call sites can still be checked against a
/// signature that has problems of its own.
#[derive(Debug, Clone)]
pub struct SignatureResolution {
    pub signature: ResolvedSignature,
    pub diagnostics: Vec<CompilerError>,
}

pub fn resolve_signature(
    module: &IrModule,
    function: &FunctionDecl,
) -> Result<SignatureResolution, CompilerError> {
    let mut diagnostics = Vec::new();
    let mut labels: Vec<LabelInfo> = Vec::new();
    let mut params = Vec::with_capacity(function.signature.params.len());

    for (index, param) in function.signature.params.iter().enumerate() {
        let keyword = effective_keyword(module, function, index, param)?;
        let resolved = resolve_param(module, function, index as u32, param, keyword, &mut diagnostics)?;

        if !labels.iter().any(|info| info.label == resolved.label) {
            let unique = match resolved.label {
                OriginLabel::Named(name) => function
                    .signature
                    .origin_param(name)
                    .map(|origin| origin.unique)
                    .unwrap_or(false),
                _ => false,
            };

            labels.push(LabelInfo {
                label: resolved.label,
                mutability: label_mutability(function, resolved.label, resolved.mutability),
                unique,
            });
        }

        params.push(resolved);
    }

    let result = match &function.signature.result {
        Some(result) => Some(resolve_result(module, function, result, &mut diagnostics)?),
        None => None,
    };

    if let FunctionRole::Destructor(_) = function.role {
        if function.signature.params.len() != 1 || function.signature.result.is_some() {
            return_compiler_error!(
                "Destructor '{}' must take exactly its receiver and return nothing",
                module.name(function.name)
            );
        }
    }

    convention_log!(format!(
        "[Conventions] {} ({}) -> {:?}",
        module.name(function.name),
        params
            .iter()
            .map(|param| param.convention.name())
            .collect::<Vec<_>>()
            .join(", "),
        result.as_ref().map(|result| result.convention)
    ));

    Ok(SignatureResolution {
        signature: ResolvedSignature {
            function: function.id,
            params,
            result,
            labels,
        },
        diagnostics,
    })
}

fn effective_keyword(
    module: &IrModule,
    function: &FunctionDecl,
    index: usize,
    param: &Parameter,
) -> Result<ParamKeyword, CompilerError> {
    if index != 0 {
        return Ok(param.keyword);
    }

    match function.role {
        FunctionRole::Plain => Ok(param.keyword),
        FunctionRole::Constructor(receiver) | FunctionRole::Destructor(receiver) => {
            if param.ty != receiver {
                return_compiler_error!(
                    "Receiver of '{}' must have type '{}'",
                    module.name(function.name),
                    module.types.display_name(receiver, &module.string_table)
                );
            }

            if matches!(function.role, FunctionRole::Constructor(_)) {
                Ok(ParamKeyword::Out)
            } else {
                Ok(ParamKeyword::Owned)
            }
        }
    }
}

fn resolve_param(
    module: &IrModule,
    function: &FunctionDecl,
    index: u32,
    param: &Parameter,
    keyword: ParamKeyword,
    diagnostics: &mut Vec<CompilerError>,
) -> Result<ResolvedParam, CompilerError> {
    let param_name = module.name(param.name);

    let (label, declared_mutability) = match param.origin {
        Some(origin_name) => {
            let Some(origin) = function.signature.origin_param(origin_name) else {
                return_compiler_error!(
                    "Parameter '{}' of '{}' names undeclared origin '{}'",
                    param_name,
                    module.name(function.name),
                    module.name(origin_name)
                );
            };
            (OriginLabel::Named(origin_name), Some(origin.mutability))
        }
        None => (OriginLabel::Anonymous(index), None),
    };

    let mismatch = |expected: &str| {
        ownership_error!(
            OriginMismatch,
            format!(
                "Parameter '{}' is declared '{}' but its origin is {}",
                param_name,
                keyword_name(keyword),
                expected
            ),
            param.location,
            {
                VariableName => param_name,
                Convention => keyword_name(keyword),
                PrimarySuggestion => "Origin mutability must match the parameter convention exactly",
            }
        )
    };

    let (convention, mutability) = match keyword {
        ParamKeyword::Read => {
            if declared_mutability == Some(OriginMutability::Mutable) {
                diagnostics.push(mismatch("mutable"));
            }
            (Convention::Borrow(label), OriginMutability::Immutable)
        }

        ParamKeyword::Mut => {
            if declared_mutability == Some(OriginMutability::Immutable) {
                diagnostics.push(mismatch("immutable"));
            }
            (Convention::MutableBorrow(label), OriginMutability::Mutable)
        }

        ParamKeyword::Owned => (
            Convention::Consume,
            declared_mutability.unwrap_or(OriginMutability::Immutable),
        ),

        ParamKeyword::Out => (Convention::UninitializedOutput, OriginMutability::Mutable),

        ParamKeyword::Ref => match declared_mutability {
            Some(OriginMutability::Mutable) => {
                (Convention::MutableBorrow(label), OriginMutability::Mutable)
            }
            Some(OriginMutability::Parametric) => {
                (Convention::Borrow(label), OriginMutability::Parametric)
            }
            Some(OriginMutability::Immutable) => {
                (Convention::Borrow(label), OriginMutability::Immutable)
            }
            None => {
                diagnostics.push(ownership_error!(
                    OriginMismatch,
                    format!("Parameter '{}' is declared 'ref' without naming an origin", param_name),
                    param.location,
                    {
                        VariableName => param_name,
                        PrimarySuggestion => "Bind the parameter to an origin parameter, or use 'read' or 'mut'",
                    }
                ));
                (Convention::Borrow(label), OriginMutability::Immutable)
            }
        },
    };

    Ok(ResolvedParam {
        passing: passing_mode(&module.types, param.ty, &convention),
        convention,
        ty: param.ty,
        label,
        mutability,
        location: param.location,
    })
}

fn label_mutability(
    function: &FunctionDecl,
    label: OriginLabel,
    param_mutability: OriginMutability,
) -> OriginMutability {
    match label {
        OriginLabel::Named(name) => function
            .signature
            .origin_param(name)
            .map(|origin| origin.mutability)
            .unwrap_or(param_mutability),
        OriginLabel::Anonymous(_) => param_mutability,
        OriginLabel::Static => OriginMutability::Immutable,
    }
}

fn resolve_result(
    module: &IrModule,
    function: &FunctionDecl,
    result: &ResultDecl,
    diagnostics: &mut Vec<CompilerError>,
) -> Result<ResolvedResult, CompilerError> {
    let function_name = module.name(function.name);

    let origin = match result.origin {
        Some(ResultOrigin::Static) => Some(OriginLabel::Static),
        Some(ResultOrigin::Named(name)) => {
            if function.signature.origin_param(name).is_none() {
                return_compiler_error!(
                    "Result of '{}' names undeclared origin '{}'",
                    function_name,
                    module.name(name)
                );
            }

            let bound = function
                .signature
                .params
                .iter()
                .any(|param| param.origin == Some(name));

            if !bound {
                diagnostics.push(ownership_error!(
                    DanglingOriginError,
                    format!(
                        "Result of '{}' carries origin '{}' which no parameter provides",
                        function_name,
                        module.name(name)
                    ),
                    result.location,
                    {
                        FunctionName => function_name,
                        OriginLabel => module.name(name),
                        PrimarySuggestion => "Returned references must derive from an input origin or static storage",
                    }
                ));
            }

            Some(OriginLabel::Named(name))
        }
        None => None,
    };

    let convention = match result.keyword {
        ResultKeyword::Owned => {
            if module.types.carries_origins(result.ty) && origin.is_none() {
                diagnostics.push(dangling_result(function_name, result));
            }
            ResultConvention::Owned { origin }
        }

        ResultKeyword::Ref => {
            let Some(origin) = origin else {
                diagnostics.push(dangling_result(function_name, result));
                return Ok(ResolvedResult {
                    convention: ResultConvention::Reference {
                        origin: OriginLabel::Static,
                    },
                    ty: result.ty,
                    passing: PassingMode::Memory,
                    location: result.location,
                });
            };

            if let (OriginLabel::Named(name), Some((_, reference_mutability))) =
                (origin, module.types.reference_info(result.ty))
            {
                let origin_mutability = function
                    .signature
                    .origin_param(name)
                    .map(|origin| origin.mutability);

                let matches = matches!(
                    (reference_mutability, origin_mutability),
                    (ReferenceMutability::Immutable, Some(OriginMutability::Immutable))
                        | (ReferenceMutability::Mutable, Some(OriginMutability::Mutable))
                        | (ReferenceMutability::Parametric, Some(OriginMutability::Parametric))
                );

                if !matches {
                    diagnostics.push(ownership_error!(
                        OriginMismatch,
                        format!(
                            "Result of '{}' has mutability that differs from origin '{}'",
                            function_name,
                            module.name(name)
                        ),
                        result.location,
                        {
                            FunctionName => function_name,
                            OriginLabel => module.name(name),
                        }
                    ));
                }
            }

            ResultConvention::Reference { origin }
        }

        ResultKeyword::Out => ResultConvention::Output,
    };

    let passing = match convention {
        ResultConvention::Owned { .. } => {
            passing_mode(&module.types, result.ty, &Convention::Consume)
        }
        _ => PassingMode::Memory,
    };

    Ok(ResolvedResult {
        convention,
        ty: result.ty,
        passing,
        location: result.location,
    })
}

fn dangling_result(function_name: &str, result: &ResultDecl) -> CompilerError {
    ownership_error!(
        DanglingOriginError,
        format!(
            "Result of '{}' returns a reference without an origin derived from its inputs",
            function_name
        ),
        result.location,
        {
            FunctionName => function_name,
            PrimarySuggestion => "Name an origin parameter bound by one of the arguments, or 'static'",
        }
    )
}

fn keyword_name(keyword: ParamKeyword) -> &'static str {
    match keyword {
        ParamKeyword::Read => "read",
        ParamKeyword::Mut => "mut",
        ParamKeyword::Owned => "owned",
        ParamKeyword::Out => "out",
        ParamKeyword::Ref => "ref",
    }
}
