//! Move / copy / borrow classification and type capability checks.

use crate::compiler_frontend::analysis::conventions::Convention;
use crate::compiler_frontend::compiler_errors::{CompilerError, DiagnosticKind};
use crate::compiler_frontend::ir::ir_nodes::TypeId;
use crate::compiler_frontend::ir::ir_types::{Destructor, TypeKind, TypeTable};
use crate::compiler_frontend::string_interning::StringTable;
use crate::ownership_error;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueUseKind {
    Move,
    Copy,
    Borrow,
}

/// Where a value is used. The same place can move, copy or fail depending on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseSite {
    /// `x^`
    Transfer,
    /// `var b = a`, the declaration takes ownership unless the type copies
    Initializer,
    /// Plain value position such as assignment, copies or fails
    Value,
    /// Owned parameter or constructor field without a transfer marker
    Consume,
    /// Borrowed parameter, reference creation or a read for effect
    Borrow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PassingMode {
    Register,
    Memory,
}

/// Decide what using a value of `ty` at `site` does.
/// Errors carry the diagnostic kind for the caller to report with a location.
pub fn classify_value_use(
    types: &TypeTable,
    ty: TypeId,
    site: UseSite,
) -> Result<ValueUseKind, DiagnosticKind> {
    let copyable = types.is_copyable(ty);

    match site {
        UseSite::Transfer => Ok(ValueUseKind::Move),
        UseSite::Borrow => Ok(ValueUseKind::Borrow),
        UseSite::Initializer => {
            if copyable {
                Ok(ValueUseKind::Copy)
            } else {
                Ok(ValueUseKind::Move)
            }
        }
        UseSite::Value => {
            if copyable {
                Ok(ValueUseKind::Copy)
            } else {
                Err(DiagnosticKind::TypeNotCopyable)
            }
        }
        UseSite::Consume => {
            if copyable {
                Ok(ValueUseKind::Copy)
            } else {
                Err(DiagnosticKind::MissingTransferIntent)
            }
        }
    }
}

/// Register passing only changes how values travel, never what they mean.
pub fn passing_mode(types: &TypeTable, ty: TypeId, convention: &Convention) -> PassingMode {
    let capabilities = types.capabilities(ty);
    let trivial = capabilities.register_passable
        && capabilities.copy_op
        && capabilities.destructor == Destructor::Trivial;

    match convention {
        Convention::Consume if capabilities.register_passable => PassingMode::Register,
        Convention::Borrow(_) if trivial => PassingMode::Register,
        _ => PassingMode::Memory,
    }
}

pub fn take_supported(types: &TypeTable, ty: TypeId) -> bool {
    types.capabilities(ty).take_op
}

/// Reject capability combinations that make no sense, such as a register
/// passable type that cannot be copied.
pub fn validate_type_capabilities(
    types: &TypeTable,
    string_table: &StringTable,
) -> Vec<CompilerError> {
    let mut errors = Vec::new();

    for decl in types.iter() {
        if matches!(decl.kind, TypeKind::Generic) {
            continue;
        }

        let name = string_table.resolve(decl.name);
        let capabilities = decl.capabilities;

        if capabilities.register_passable && !capabilities.copy_op {
            errors.push(ownership_error!(
                InvalidTypeCapability,
                format!("Type '{}' is register passable but has no copy operation", name),
                decl.location,
                {
                    ExpectedType => name,
                    PrimarySuggestion => "Register passable types must be copyable, add a copy operation or drop the register passable marker",
                }
            ));
        }

        if capabilities.register_passable && capabilities.destructor != Destructor::Trivial {
            errors.push(ownership_error!(
                InvalidTypeCapability,
                format!("Type '{}' is register passable but has a destructor", name),
                decl.location,
                {
                    ExpectedType => name,
                    PrimarySuggestion => "Trivial register passable types cannot run code when destroyed",
                }
            ));
        }

        if capabilities.register_passable && types.needs_drop(decl.id) {
            // A trivial shell around fields that own resources
            if capabilities.destructor == Destructor::Trivial {
                errors.push(ownership_error!(
                    InvalidTypeCapability,
                    format!("Type '{}' is register passable but has fields that need destruction", name),
                    decl.location,
                    {
                        ExpectedType => name,
                    }
                ));
            }
        }
    }

    errors
}
