//! Argument and result conventions.
//!
//! Every parameter resolves to one of four conventions and every borrow carries
//! an origin label. Call sites are checked against these in the ownership checker.

mod overloads;
mod resolver;

pub(crate) use overloads::{ArgumentShape, resolve_overload};
pub use resolver::{SignatureResolution, resolve_signature};

use crate::compiler_frontend::analysis::classifier::PassingMode;
use crate::compiler_frontend::ir::ir_nodes::{FunctionId, OriginMutability, TypeId};
use crate::compiler_frontend::ir::text_location::TextLocation;
use crate::compiler_frontend::string_interning::{StringId, StringTable};
use serde::Serialize;

/// Compile-time provenance label used in signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum OriginLabel {
    /// A declared origin parameter
    Named(StringId),
    /// The fresh label of an unbound parameter, by parameter index
    Anonymous(u32),
    Static,
}

impl OriginLabel {
    pub fn display(&self, string_table: &StringTable) -> String {
        match self {
            OriginLabel::Named(name) => string_table.resolve(*name).to_owned(),
            OriginLabel::Anonymous(index) => format!("<param {}>", index),
            OriginLabel::Static => "static".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Convention {
    Borrow(OriginLabel),
    MutableBorrow(OriginLabel),
    Consume,
    UninitializedOutput,
}

impl Convention {
    pub fn is_borrow(&self) -> bool {
        matches!(self, Convention::Borrow(_) | Convention::MutableBorrow(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Convention::Borrow(_) => "read",
            Convention::MutableBorrow(_) => "mut",
            Convention::Consume => "owned",
            Convention::UninitializedOutput => "out",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedParam {
    pub convention: Convention,
    pub ty: TypeId,

    /// Label for everything reachable through this argument
    pub label: OriginLabel,

    /// Mutability of the access, parametric ones are decided per call site
    pub mutability: OriginMutability,
    pub passing: PassingMode,
    pub location: TextLocation,
}

impl ResolvedParam {
    pub fn is_parametric(&self) -> bool {
        self.mutability == OriginMutability::Parametric
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResultConvention {
    /// Owned value, `origin` is set when the type holds references
    Owned { origin: Option<OriginLabel> },
    Reference { origin: OriginLabel },
    Output,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedResult {
    pub convention: ResultConvention,
    pub ty: TypeId,
    pub passing: PassingMode,
    pub location: TextLocation,
}

impl ResolvedResult {
    pub fn origin(&self) -> Option<OriginLabel> {
        match self.convention {
            ResultConvention::Owned { origin } => origin,
            ResultConvention::Reference { origin } => Some(origin),
            ResultConvention::Output => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LabelInfo {
    pub label: OriginLabel,
    pub mutability: OriginMutability,
    pub unique: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedSignature {
    pub function: FunctionId,
    pub params: Vec<ResolvedParam>,
    pub result: Option<ResolvedResult>,

    /// Every label a parameter is bound to, in first-use order
    pub labels: Vec<LabelInfo>,
}

impl ResolvedSignature {
    pub fn label_info(&self, label: OriginLabel) -> Option<&LabelInfo> {
        self.labels.iter().find(|info| info.label == label)
    }

    pub fn result_label(&self) -> Option<OriginLabel> {
        self.result.as_ref().and_then(ResolvedResult::origin)
    }

    pub fn has_output_result(&self) -> bool {
        matches!(
            self.result.as_ref().map(|result| result.convention),
            Some(ResultConvention::Output)
        )
    }
}
