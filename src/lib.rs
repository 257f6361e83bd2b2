//! Lifeline checks ownership, borrowing and reference origins of a lowered,
//! block structured IR for a Python-like systems language.
//!
//! Build a module with [`ModuleBuilder`] (or construct the IR directly), then
//! pass it to [`check_module`]. An accepted module comes back as an
//! [`OwnershipReport`] with resolved conventions, drop insertions, origin facts
//! and a lowered body per function with every destructor call made explicit.

pub mod compiler_frontend;
pub mod settings;

pub use compiler_frontend::analysis::ownership_checker::{FunctionOwnershipReport, OwnershipReport};
pub use compiler_frontend::compiler_errors::{
    CompilerError, CompilerMessages, CompilerWarning, DiagnosticKind,
};
pub use compiler_frontend::display_messages::print_compiler_messages;
pub use compiler_frontend::ir::ir_builder::ModuleBuilder;
pub use compiler_frontend::ir::ir_nodes::IrModule;
pub use compiler_frontend::{OwnershipFrontend, check_module};
pub use settings::CheckerConfig;
