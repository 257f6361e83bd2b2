use crate::compiler_frontend::analysis::conventions::{OriginLabel, ResolvedSignature};
use crate::compiler_frontend::analysis::origins::{OriginTarget, TargetSet, TargetSpace};
use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::compiler_frontend::ir::ir_nodes::{LocalId, OriginMutability};
use crate::compiler_frontend::ir::text_location::TextLocation;
use crate::compiler_frontend::string_interning::StringTable;
use crate::{origin_log, ownership_error};

/// Caller side view of one argument, as seen by the label it is bound to.
#[derive(Debug, Clone)]
pub(crate) struct ArgumentOrigin {
    pub label: OriginLabel,
    pub targets: TargetSet,

    /// Whether the caller could hand out a mutable reference to the argument place
    pub place_mutable: bool,
}

/// Signature labels instantiated at one call site.
#[derive(Debug, Clone)]
pub(crate) struct CallOrigins {
    labels: Vec<(OriginLabel, TargetSet, bool)>,
}

impl CallOrigins {
    pub(crate) fn targets(&self, label: OriginLabel) -> Option<&TargetSet> {
        self.labels
            .iter()
            .find(|(known, _, _)| *known == label)
            .map(|(_, targets, _)| targets)
    }

    pub(crate) fn is_mutable(&self, label: OriginLabel) -> bool {
        self.labels
            .iter()
            .find(|(known, _, _)| *known == label)
            .map(|(_, _, mutable)| *mutable)
            .unwrap_or(false)
    }
}

/// Bind every signature label to the union of the origins of the arguments tied to it.
/// Parametric labels are mutable only when every bound argument place is mutable.
pub(crate) fn instantiate_call_labels(
    signature: &ResolvedSignature,
    arguments: &[ArgumentOrigin],
    space: &TargetSpace,
) -> CallOrigins {
    let mut labels = Vec::with_capacity(signature.labels.len() + 1);

    for info in &signature.labels {
        let mut targets = space.empty();
        let mut all_mutable = true;
        let mut bound = false;

        for argument in arguments.iter().filter(|argument| argument.label == info.label) {
            targets.union_with(&argument.targets);
            all_mutable &= argument.place_mutable;
            bound = true;
        }

        let mutable = match info.mutability {
            OriginMutability::Immutable => false,
            OriginMutability::Mutable => true,
            OriginMutability::Parametric => bound && all_mutable,
        };

        labels.push((info.label, targets, mutable));
    }

    if !labels.iter().any(|(label, _, _)| *label == OriginLabel::Static) {
        labels.push((OriginLabel::Static, space.static_storage(), false));
    }

    origin_log!(format!(
        "[Origins] instantiated {} labels for call to {}",
        labels.len(),
        signature.function
    ));

    CallOrigins { labels }
}

/// Labels declared unique must be bound to a single target at every call site.
pub(crate) fn check_unique_labels(
    signature: &ResolvedSignature,
    call: &CallOrigins,
    space: &TargetSpace,
    local_name: &dyn Fn(LocalId) -> String,
    string_table: &StringTable,
    function_name: &str,
    location: TextLocation,
) -> Vec<CompilerError> {
    let mut errors = Vec::new();

    for info in signature.labels.iter().filter(|info| info.unique) {
        let Some(targets) = call.targets(info.label) else {
            continue;
        };

        if targets.count() <= 1 {
            continue;
        }

        let names = space
            .targets(targets)
            .iter()
            .map(|target| target.display(local_name, string_table))
            .collect::<Vec<_>>()
            .join(", ");

        errors.push(ownership_error!(
            AmbiguousOrigin,
            format!(
                "Origin '{}' of '{}' must name a single binding but this call binds it to {{{}}}",
                info.label.display(string_table),
                function_name,
                names
            ),
            location,
            {
                FunctionName => function_name,
                OriginLabel => info.label.display(string_table),
                FoundOrigin => names,
                PrimarySuggestion => "Pass arguments that all borrow from the same binding",
            }
        ));
    }

    errors
}

/// Where a value leaves the function, and which input label it may carry.
pub(crate) struct EscapeCheck<'a> {
    pub allowed: Option<OriginLabel>,
    pub what: &'a str,
    pub location: TextLocation,
}

/// Values leaving the function may only point into the allowed label or static storage.
pub(crate) fn check_escape(
    check: &EscapeCheck<'_>,
    targets: &TargetSet,
    space: &TargetSpace,
    local_name: &dyn Fn(LocalId) -> String,
    string_table: &StringTable,
) -> Vec<CompilerError> {
    let mut errors = Vec::new();

    for target in space.targets(targets) {
        match target {
            OriginTarget::Static => {}

            OriginTarget::Label(label) if Some(label) == check.allowed => {}

            OriginTarget::Local(local) => {
                let name = local_name(local);
                errors.push(ownership_error!(
                    DanglingOriginError,
                    format!(
                        "The {} refers to local '{}', which is destroyed when the function returns",
                        check.what, name
                    ),
                    check.location,
                    {
                        VariableName => name.clone(),
                        FoundOrigin => name,
                        PrimarySuggestion => "Return an owned value, or a reference derived from a parameter",
                    }
                ));
            }

            OriginTarget::Label(label) => {
                let expected = check
                    .allowed
                    .map(|allowed| allowed.display(string_table))
                    .unwrap_or_else(|| "no origin".to_owned());

                errors.push(ownership_error!(
                    OriginMismatch,
                    format!(
                        "The {} carries origin '{}' but only '{}' may escape here",
                        check.what,
                        label.display(string_table),
                        expected
                    ),
                    check.location,
                    {
                        OriginLabel => expected,
                        FoundOrigin => label.display(string_table),
                        PrimarySuggestion => "Tie both parameters to the same origin parameter",
                    }
                ));
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler_frontend::analysis::classifier::PassingMode;
    use crate::compiler_frontend::analysis::conventions::{
        Convention, LabelInfo, ResolvedParam,
    };
    use crate::compiler_frontend::compiler_errors::DiagnosticKind;
    use crate::compiler_frontend::ir::ir_nodes::FunctionId;
    use crate::compiler_frontend::ir::ir_types::STR_TYPE;

    fn signature_with_label(label: OriginLabel, mutability: OriginMutability, unique: bool) -> ResolvedSignature {
        let param = ResolvedParam {
            convention: Convention::Borrow(label),
            ty: STR_TYPE,
            label,
            mutability,
            passing: PassingMode::Memory,
            location: TextLocation::default(),
        };

        ResolvedSignature {
            function: FunctionId(0),
            params: vec![param.clone(), param],
            result: None,
            labels: vec![LabelInfo {
                label,
                mutability,
                unique,
            }],
        }
    }

    #[test]
    fn shared_label_is_the_union_of_its_arguments() {
        let label = OriginLabel::Anonymous(0);
        let signature = signature_with_label(label, OriginMutability::Immutable, false);
        let space = TargetSpace::new(3, vec![]);

        let call = instantiate_call_labels(
            &signature,
            &[
                ArgumentOrigin {
                    label,
                    targets: space.local(LocalId(0)),
                    place_mutable: true,
                },
                ArgumentOrigin {
                    label,
                    targets: space.local(LocalId(2)),
                    place_mutable: false,
                },
            ],
            &space,
        );

        let targets = call.targets(label).expect("label should be instantiated");
        assert_eq!(targets.locals(&space), vec![LocalId(0), LocalId(2)]);
        assert!(!call.is_mutable(label));
    }

    #[test]
    fn parametric_labels_follow_argument_mutability() {
        let label = OriginLabel::Anonymous(0);
        let signature = signature_with_label(label, OriginMutability::Parametric, false);
        let space = TargetSpace::new(2, vec![]);

        let arguments = |second_mutable| {
            vec![
                ArgumentOrigin {
                    label,
                    targets: space.local(LocalId(0)),
                    place_mutable: true,
                },
                ArgumentOrigin {
                    label,
                    targets: space.local(LocalId(1)),
                    place_mutable: second_mutable,
                },
            ]
        };

        assert!(instantiate_call_labels(&signature, &arguments(true), &space).is_mutable(label));
        assert!(!instantiate_call_labels(&signature, &arguments(false), &space).is_mutable(label));
    }

    #[test]
    fn unique_labels_reject_unions() {
        let label = OriginLabel::Anonymous(0);
        let signature = signature_with_label(label, OriginMutability::Immutable, true);
        let space = TargetSpace::new(2, vec![]);
        let strings = StringTable::new();

        let call = instantiate_call_labels(
            &signature,
            &[
                ArgumentOrigin {
                    label,
                    targets: space.local(LocalId(0)),
                    place_mutable: false,
                },
                ArgumentOrigin {
                    label,
                    targets: space.local(LocalId(1)),
                    place_mutable: false,
                },
            ],
            &space,
        );

        let errors = check_unique_labels(
            &signature,
            &call,
            &space,
            &|local| local.to_string(),
            &strings,
            "pick",
            TextLocation::default(),
        );

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, Some(DiagnosticKind::AmbiguousOrigin));
    }

    #[test]
    fn escaping_locals_dangle_and_foreign_labels_mismatch() {
        let allowed = OriginLabel::Anonymous(0);
        let other = OriginLabel::Anonymous(1);
        let space = TargetSpace::new(2, vec![allowed, other]);
        let strings = StringTable::new();

        let mut targets = space.label(allowed);
        targets.union_with(&space.static_storage());
        let check = EscapeCheck {
            allowed: Some(allowed),
            what: "returned reference",
            location: TextLocation::default(),
        };
        assert!(check_escape(&check, &targets, &space, &|local| local.to_string(), &strings).is_empty());

        targets.union_with(&space.local(LocalId(1)));
        targets.union_with(&space.label(other));
        let kinds = check_escape(&check, &targets, &space, &|local| local.to_string(), &strings)
            .into_iter()
            .filter_map(|error| error.kind)
            .collect::<Vec<_>>();

        assert_eq!(
            kinds,
            vec![DiagnosticKind::DanglingOriginError, DiagnosticKind::OriginMismatch]
        );
    }
}
