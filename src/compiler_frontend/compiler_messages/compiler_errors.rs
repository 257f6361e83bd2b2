use crate::compiler_frontend::ir::text_location::TextLocation;
use crate::compiler_frontend::string_interning::StringTable;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

/// The final set of errors and warnings emitted by the checker
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompilerMessages {
    pub errors: Vec<CompilerError>,
    pub warnings: Vec<CompilerWarning>,
}

impl CompilerMessages {
    pub fn new() -> Self {
        CompilerMessages::default()
    }

    pub fn from_error(error: CompilerError) -> Self {
        CompilerMessages {
            errors: vec![error],
            warnings: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Kinds of every ownership diagnostic in emission order. Handy for tooling and tests.
    pub fn kinds(&self) -> Vec<DiagnosticKind> {
        self.errors.iter().filter_map(|error| error.kind).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ErrorMetaDataKey {
    VariableName,
    FieldPath,
    FunctionName,
    CompilationStage,

    // Optional suggestions
    PrimarySuggestion,     // One-line fix or top-level idea
    AlternativeSuggestion, // Secondary alternative
    SuggestedInsertion,    // Text that could be inserted

    // Ownership information
    ExpectedType,
    FoundType,
    BorrowKind,          // "Shared" or "Mutable"
    OriginLabel,         // Origin a reference was expected to carry
    FoundOrigin,         // Origin a reference actually carried
    MovedVariable,       // Variable name that was moved
    BorrowedVariable,    // Variable name that was borrowed
    ConflictingVariable, // Variable causing a borrow conflict
    Convention,
}

/// Stable tags for every ownership failure mode.
/// The tag text never changes so tools can match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DiagnosticKind {
    UseOfUninitializedValue,
    UseAfterMove,
    PossibleUseAfterMove,
    MissingTransferIntent,
    TypeNotCopyable,
    DanglingOriginError,
    AmbiguousOverload,
    ExclusivityViolation,
    MutabilityViolation,
    OriginMismatch,
    AmbiguousOrigin,
    MoveOutOfBorrow,
    InvalidPartialMove,
    NoMatchingOverload,
    TakeNotSupported,
    InvalidTypeCapability,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::UseOfUninitializedValue => "UseOfUninitializedValue",
            DiagnosticKind::UseAfterMove => "UseAfterMove",
            DiagnosticKind::PossibleUseAfterMove => "PossibleUseAfterMove",
            DiagnosticKind::MissingTransferIntent => "MissingTransferIntent",
            DiagnosticKind::TypeNotCopyable => "TypeNotCopyable",
            DiagnosticKind::DanglingOriginError => "DanglingOriginError",
            DiagnosticKind::AmbiguousOverload => "AmbiguousOverload",
            DiagnosticKind::ExclusivityViolation => "ExclusivityViolation",
            DiagnosticKind::MutabilityViolation => "MutabilityViolation",
            DiagnosticKind::OriginMismatch => "OriginMismatch",
            DiagnosticKind::AmbiguousOrigin => "AmbiguousOrigin",
            DiagnosticKind::MoveOutOfBorrow => "MoveOutOfBorrow",
            DiagnosticKind::InvalidPartialMove => "InvalidPartialMove",
            DiagnosticKind::NoMatchingOverload => "NoMatchingOverload",
            DiagnosticKind::TakeNotSupported => "TakeNotSupported",
            DiagnosticKind::InvalidTypeCapability => "InvalidTypeCapability",
        }
    }

    pub fn error_type(self) -> ErrorType {
        match self {
            DiagnosticKind::MissingTransferIntent
            | DiagnosticKind::TypeNotCopyable
            | DiagnosticKind::AmbiguousOverload
            | DiagnosticKind::NoMatchingOverload
            | DiagnosticKind::TakeNotSupported
            | DiagnosticKind::InvalidTypeCapability => ErrorType::Type,

            DiagnosticKind::MutabilityViolation => ErrorType::Rule,

            _ => ErrorType::Ownership,
        }
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A second source position that explains an error, such as the conflicting borrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedLocation {
    pub location: TextLocation,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompilerError {
    pub msg: String,
    pub location: TextLocation,
    pub error_type: ErrorType,

    // Set for every ownership diagnostic, None for config and internal errors
    pub kind: Option<DiagnosticKind>,
    pub related: Vec<RelatedLocation>,

    // Structured extras so tools can tell exactly what went wrong
    pub metadata: FxHashMap<ErrorMetaDataKey, String>,
}

impl CompilerError {
    pub fn new(msg: impl Into<String>, location: TextLocation, error_type: ErrorType) -> Self {
        CompilerError {
            msg: msg.into(),
            location,
            error_type,
            kind: None,
            related: Vec::new(),
            metadata: FxHashMap::default(),
        }
    }

    /// Create an ownership diagnostic tagged with its stable kind
    pub fn new_ownership_error(
        kind: DiagnosticKind,
        msg: impl Into<String>,
        location: TextLocation,
    ) -> Self {
        CompilerError {
            msg: msg.into(),
            location,
            error_type: kind.error_type(),
            kind: Some(kind),
            related: Vec::new(),
            metadata: FxHashMap::default(),
        }
    }

    /// Create a compiler error (internal bug or malformed IR, not the user's fault)
    pub fn compiler_error(msg: impl Into<String>) -> Self {
        CompilerError::new(msg, TextLocation::default(), ErrorType::Compiler)
    }

    pub fn with_location(mut self, location: TextLocation) -> Self {
        self.location = location;
        self
    }

    pub fn with_related(mut self, location: TextLocation, note: impl Into<String>) -> Self {
        self.related.push(RelatedLocation {
            location,
            note: note.into(),
        });
        self
    }

    pub fn with_metadata(mut self, key: ErrorMetaDataKey, value: impl Into<String>) -> Self {
        self.metadata.insert(key, value.into());
        self
    }

    pub fn new_metadata_entry(&mut self, key: ErrorMetaDataKey, value: impl Into<String>) {
        self.metadata.insert(key, value.into());
    }

    pub fn metadata_value(&self, key: ErrorMetaDataKey) -> Option<&str> {
        self.metadata.get(&key).map(String::as_str)
    }

    /// Sort key used when reporting many diagnostics at once
    pub fn sort_key(&self) -> (TextLocation, &'static str, &str) {
        (
            self.location,
            self.kind.map(DiagnosticKind::as_str).unwrap_or(""),
            self.msg.as_str(),
        )
    }

    /// Machine readable form of this error with a stable key order
    pub fn to_json(&self, string_table: &StringTable) -> serde_json::Value {
        let metadata = self
            .metadata
            .iter()
            .map(|(key, value)| (format!("{:?}", key), value.clone()))
            .collect::<BTreeMap<_, _>>();

        json!({
            "type": error_type_to_str(&self.error_type),
            "kind": self.kind.map(DiagnosticKind::as_str),
            "message": self.msg,
            "file": self.location.file_name(string_table),
            "line": self.location.start_pos.line_number + 1,
            "column": self.location.start_pos.char_column + 1,
            "related": self.related.iter().map(|related| json!({
                "line": related.location.start_pos.line_number + 1,
                "column": related.location.start_pos.char_column + 1,
                "note": related.note,
            })).collect::<Vec<_>>(),
            "metadata": metadata,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarningKind {
    UnusedValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompilerWarning {
    pub msg: String,
    pub location: TextLocation,
    pub warning_kind: WarningKind,
}

impl CompilerWarning {
    pub fn new(msg: impl Into<String>, location: TextLocation, warning_kind: WarningKind) -> Self {
        CompilerWarning {
            msg: msg.into(),
            location,
            warning_kind,
        }
    }
}

// Category of a CompilerError, used to pick how it is displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorType {
    Ownership,
    Type,
    Rule,
    Config,
    Compiler,
}

pub fn error_type_to_str(e_type: &ErrorType) -> &'static str {
    match e_type {
        ErrorType::Compiler => "Compiler Bug",
        ErrorType::Config => "Malformed Config",
        ErrorType::Rule => "Language Rule Violation",
        ErrorType::Type => "Type Error",
        ErrorType::Ownership => "Ownership Checker",
    }
}

/// Builds a tagged ownership diagnostic without returning.
///
/// The checker collects every diagnostic in a function before failing,
/// so this is the form used by the analysis passes.
///
/// Usage:
/// `ownership_error!(UseAfterMove, format!("'{}' was moved", name), location, {
///     VariableName => name,
///     PrimarySuggestion => "Reassign the value before reading it again",
/// })`;
#[macro_export]
macro_rules! ownership_error {
    ($kind:ident, $msg:expr, $location:expr, { $( $key:ident => $value:expr ),* $(,)? }) => {{
        let mut error = $crate::compiler_frontend::compiler_errors::CompilerError::new_ownership_error(
            $crate::compiler_frontend::compiler_errors::DiagnosticKind::$kind,
            $msg,
            $location,
        );
        $(
            error.new_metadata_entry(
                $crate::compiler_frontend::compiler_errors::ErrorMetaDataKey::$key,
                $value,
            );
        )*
        error
    }};
    ($kind:ident, $msg:expr, $location:expr) => {
        $crate::compiler_frontend::compiler_errors::CompilerError::new_ownership_error(
            $crate::compiler_frontend::compiler_errors::DiagnosticKind::$kind,
            $msg,
            $location,
        )
    };
}

/// Returns a new CompilerError for malformed IR or internal checker bugs.
///
/// These indicate bugs in the front end that produced the IR or in the checker itself,
/// never a problem in user code.
#[macro_export]
macro_rules! return_compiler_error {
    // Variant with format string, arguments, and metadata (with semicolon separator)
    ($fmt:expr, $($arg:expr),+ ; { $( $key:ident => $value:expr ),* $(,)? }) => {{
        let mut error = $crate::compiler_frontend::compiler_errors::CompilerError::compiler_error(
            format!($fmt, $($arg),+),
        );
        $(
            error.new_metadata_entry(
                $crate::compiler_frontend::compiler_errors::ErrorMetaDataKey::$key,
                $value,
            );
        )*
        return Err(error.into());
    }};
    // Variant with format string and arguments (no metadata)
    ($fmt:expr, $($arg:expr),+ $(,)?) => {{
        return Err($crate::compiler_frontend::compiler_errors::CompilerError::compiler_error(
            format!($fmt, $($arg),+),
        )
        .into());
    }};
    // Simple variant with just message (no metadata)
    ($msg:expr) => {{
        return Err($crate::compiler_frontend::compiler_errors::CompilerError::compiler_error($msg).into());
    }};
}

/// Returns a new CompilerError for an invalid checker configuration.
///
/// Usage: `return_config_error!("message", { PrimarySuggestion => "..." })`;
#[macro_export]
macro_rules! return_config_error {
    ($msg:expr, { $( $key:ident => $value:expr ),* $(,)? }) => {{
        let mut error = $crate::compiler_frontend::compiler_errors::CompilerError::new(
            $msg,
            $crate::compiler_frontend::ir::text_location::TextLocation::default(),
            $crate::compiler_frontend::compiler_errors::ErrorType::Config,
        );
        $(
            error.new_metadata_entry(
                $crate::compiler_frontend::compiler_errors::ErrorMetaDataKey::$key,
                $value,
            );
        )*
        return Err(error);
    }};
    ($msg:expr) => {
        return Err($crate::compiler_frontend::compiler_errors::CompilerError::new(
            $msg,
            $crate::compiler_frontend::ir::text_location::TextLocation::default(),
            $crate::compiler_frontend::compiler_errors::ErrorType::Config,
        ))
    };
}
