//! Human readable dumps of IR bodies, used by dev logging and tests.

use crate::compiler_frontend::ir::ir_nodes::{
    BinaryOperator, CallTarget, Constant, DropSubject, FunctionBody, FunctionDecl, IrModule,
    LocalKind, Operand, Place, RefKind, Rvalue, StatementKind, TerminatorKind,
};
use std::fmt::Write;

pub fn display_function(module: &IrModule, function: &FunctionDecl) -> String {
    match &function.body {
        Some(body) => display_body(module, function, body),
        None => format!("extern fn {}\n", module.name(function.name)),
    }
}

pub fn display_body(module: &IrModule, function: &FunctionDecl, body: &FunctionBody) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "fn {} {{", module.name(function.name));

    for local in &body.locals {
        let kind = match local.kind {
            LocalKind::Var => "var",
            LocalKind::Temp => "temp",
            LocalKind::Param(_) => "param",
            LocalKind::Result => "result",
            LocalKind::Static => "static",
        };
        let _ = writeln!(
            out,
            "    {} {}{}: {} // {}",
            kind,
            if local.mutable { "mut " } else { "" },
            local.id,
            module.types.display_name(local.ty, &module.string_table),
            module.name(local.name)
        );
    }

    for block in &body.blocks {
        let _ = writeln!(out, "  {}:", block.id);
        for statement in &block.statements {
            let _ = writeln!(
                out,
                "    {} {}",
                statement.id,
                display_statement(module, &statement.kind)
            );
        }
        let _ = writeln!(out, "    {}", display_terminator(module, &block.terminator.kind));
    }

    out.push_str("}\n");
    out
}

pub fn display_statement(module: &IrModule, statement: &StatementKind) -> String {
    match statement {
        StatementKind::Let { local, value: None } => format!("let {}", local),
        StatementKind::Let {
            local,
            value: Some(value),
        } => format!("let {} = {}", local, display_rvalue(module, value)),
        StatementKind::Assign { target, value } => format!(
            "{} = {}",
            display_place(target),
            display_rvalue(module, value)
        ),
        StatementKind::Call {
            target,
            args,
            destination,
        } => {
            let callee = match target {
                CallTarget::Function(id) => module
                    .function(*id)
                    .map(|function| module.name(function.name).to_owned())
                    .unwrap_or_else(|| id.to_string()),
                CallTarget::Overloaded(name) => format!("{}?", module.name(*name)),
            };
            let args = args
                .iter()
                .map(|arg| display_operand(module, arg))
                .collect::<Vec<_>>()
                .join(", ");

            match destination {
                Some(place) => format!("{} = {}({})", display_place(place), callee, args),
                None => format!("{}({})", callee, args),
            }
        }
        StatementKind::Expr(value) => display_rvalue(module, value),
        StatementKind::Drop(drop) => {
            let subject = match &drop.subject {
                DropSubject::Binding { local, field_path } => {
                    display_place(&Place {
                        local: *local,
                        projection: field_path.clone(),
                    })
                }
                DropSubject::Referent(place) => format!("*{}", display_place(place)),
                DropSubject::Temporary { ty } => format!(
                    "temp {}",
                    module.types.display_name(*ty, &module.string_table)
                ),
            };

            if drop.conditional {
                format!("drop_if_flagged {}", subject)
            } else {
                format!("drop {}", subject)
            }
        }
    }
}

pub fn display_place(place: &Place) -> String {
    let mut out = place.local.to_string();
    for field in &place.projection {
        let _ = write!(out, ".{}", field.0);
    }
    out
}

pub fn display_operand(module: &IrModule, operand: &Operand) -> String {
    match operand {
        Operand::Use(place) => display_place(place),
        Operand::Transfer(place) => format!("{}^", display_place(place)),
        Operand::Constant(Constant::Int(value)) => value.to_string(),
        Operand::Constant(Constant::Bool(value)) => value.to_string(),
        Operand::Constant(Constant::Str(text)) => format!("{:?}", module.name(*text)),
    }
}

pub fn display_rvalue(module: &IrModule, value: &Rvalue) -> String {
    match value {
        Rvalue::Use(operand) => display_operand(module, operand),
        Rvalue::Ref { place, mutability } => {
            format!("{}{}", ref_prefix(*mutability), display_place(place))
        }
        Rvalue::Select {
            condition,
            then_place,
            else_place,
            mutability,
        } => format!(
            "{}{} if {} else {}",
            ref_prefix(*mutability),
            display_place(then_place),
            display_operand(module, condition),
            display_place(else_place)
        ),
        Rvalue::Construct { ty, fields } => format!(
            "{}({})",
            module.types.display_name(*ty, &module.string_table),
            fields
                .iter()
                .map(|field| display_operand(module, field))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Rvalue::BinaryOp { op, left, right } => format!(
            "{} {} {}",
            display_operand(module, left),
            binary_operator_str(*op),
            display_operand(module, right)
        ),
        Rvalue::Take(place) => format!("take {}", display_place(place)),
    }
}

pub fn display_terminator(module: &IrModule, terminator: &TerminatorKind) -> String {
    match terminator {
        TerminatorKind::Goto(target) => format!("goto {}", target),
        TerminatorKind::Branch {
            condition,
            then_block,
            else_block,
        } => format!(
            "if {} goto {} else {}",
            display_operand(module, condition),
            then_block,
            else_block
        ),
        TerminatorKind::Return(Some(value)) => format!("return {}", display_operand(module, value)),
        TerminatorKind::Return(None) => "return".to_owned(),
        TerminatorKind::Raise(Some(value)) => format!("raise {}", display_operand(module, value)),
        TerminatorKind::Raise(None) => "raise".to_owned(),
        TerminatorKind::Unreachable => "unreachable".to_owned(),
    }
}

fn ref_prefix(mutability: RefKind) -> &'static str {
    match mutability {
        RefKind::Immutable => "&",
        RefKind::Mutable => "&mut ",
    }
}

fn binary_operator_str(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Add => "+",
        BinaryOperator::Subtract => "-",
        BinaryOperator::Multiply => "*",
        BinaryOperator::Equal => "==",
        BinaryOperator::NotEqual => "!=",
        BinaryOperator::LessThan => "<",
        BinaryOperator::And => "and",
        BinaryOperator::Or => "or",
    }
}
