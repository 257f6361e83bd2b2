#![cfg(test)]

use super::test_support::{
    Fixture, expect_accepted, expect_kinds, expect_rejected, external, function,
};
use crate::compiler_frontend::analysis::classifier::{PassingMode, ValueUseKind};
use crate::compiler_frontend::analysis::ownership_checker::FunctionOwnershipReport;
use crate::compiler_frontend::compiler_errors::{DiagnosticKind, ErrorMetaDataKey};
use crate::compiler_frontend::ir::ir_nodes::{
    CallTarget, FunctionId, Operand, ParamKeyword, Rvalue, StatementKind, StmtId,
};
use crate::compiler_frontend::ir::ir_types::{BOOL_TYPE, GENERIC_TYPE, INT_TYPE, STR_TYPE};

fn lowered_callee(report: &FunctionOwnershipReport, statement: StmtId) -> CallTarget {
    let body = report
        .lowered_body
        .as_ref()
        .expect("accepted bodies are lowered");

    body.blocks
        .iter()
        .flat_map(|block| block.statements.iter())
        .find_map(|candidate| match &candidate.kind {
            StatementKind::Call { target, .. } if candidate.id == statement => Some(*target),
            _ => None,
        })
        .expect("the call should survive lowering")
}

fn callee_of(report: &FunctionOwnershipReport, statement: StmtId) -> FunctionId {
    report
        .call_resolutions
        .iter()
        .find(|resolution| resolution.statement == statement)
        .map(|resolution| resolution.callee)
        .expect("the call should be resolved")
}

#[test]
fn overloads_resolve_by_argument_type() {
    let mut fixture = Fixture::new();
    let show_int = external(&mut fixture.module, "show", &[("x", INT_TYPE, ParamKeyword::Read)]);
    let show_str = external(&mut fixture.module, "show", &[("x", STR_TYPE, ParamKeyword::Read)]);

    let mut main = fixture.module.function("main");
    let s = main.local("s", STR_TYPE, false);
    let text = main.module().str_constant("text");
    main.let_(s, Rvalue::Use(text));
    let with_int = main.call_overloaded("show", vec![Operand::int(1)], None);
    let with_str = main.call_overloaded("show", vec![Operand::copy(s)], None);
    main.ret(None);
    main.finish().expect("main should build");

    let report = expect_accepted(fixture.check());
    let main_report = function(&report, "main");

    assert_eq!(callee_of(main_report, with_int), show_int);
    assert_eq!(callee_of(main_report, with_str), show_str);

    // Lowered bodies only call resolved functions
    assert_eq!(lowered_callee(main_report, with_int), CallTarget::Function(show_int));
    assert_eq!(lowered_callee(main_report, with_str), CallTarget::Function(show_str));
}

#[test]
fn exact_types_beat_generic_parameters() {
    let mut fixture = Fixture::new();
    let show_any = external(&mut fixture.module, "show", &[("x", GENERIC_TYPE, ParamKeyword::Read)]);
    let show_int = external(&mut fixture.module, "show", &[("x", INT_TYPE, ParamKeyword::Read)]);

    let mut main = fixture.module.function("main");
    let with_int = main.call_overloaded("show", vec![Operand::int(1)], None);
    let with_bool = main.call_overloaded("show", vec![Operand::bool(true)], None);
    main.ret(None);
    main.finish().expect("main should build");

    let report = expect_accepted(fixture.check());
    let main_report = function(&report, "main");

    assert_eq!(callee_of(main_report, with_int), show_int);
    assert_eq!(callee_of(main_report, with_bool), show_any);
}

#[test]
fn borrowing_overloads_beat_ones_that_need_a_copy() {
    let mut fixture = Fixture::new();
    external(&mut fixture.module, "keep", &[("x", STR_TYPE, ParamKeyword::Owned)]);
    let keep_borrowed = external(&mut fixture.module, "keep", &[("x", STR_TYPE, ParamKeyword::Read)]);

    let mut main = fixture.module.function("main");
    let s = main.local("s", STR_TYPE, false);
    let text = main.module().str_constant("text");
    main.let_(s, Rvalue::Use(text));
    let call = main.call_overloaded("keep", vec![Operand::copy(s)], None);
    main.ret(None);
    main.finish().expect("main should build");

    let report = expect_accepted(fixture.check());
    assert_eq!(callee_of(function(&report, "main"), call), keep_borrowed);
}

#[test]
fn equally_good_overloads_are_ambiguous() {
    let mut fixture = Fixture::new();
    external(&mut fixture.module, "show", &[("x", INT_TYPE, ParamKeyword::Read)]);
    external(&mut fixture.module, "show", &[("y", INT_TYPE, ParamKeyword::Read)]);

    let mut main = fixture.module.function("main");
    main.call_overloaded("show", vec![Operand::int(1)], None);
    main.ret(None);
    main.finish().expect("main should build");

    let messages = expect_rejected(fixture.check());
    assert_eq!(messages.kinds(), vec![DiagnosticKind::AmbiguousOverload]);
    assert_eq!(messages.errors[0].related.len(), 2);
}

#[test]
fn overloads_that_accept_nothing_are_reported() {
    let mut fixture = Fixture::new();
    external(&mut fixture.module, "show", &[("x", INT_TYPE, ParamKeyword::Read)]);
    external(&mut fixture.module, "show", &[("x", STR_TYPE, ParamKeyword::Read)]);

    let mut main = fixture.module.function("main");
    main.call_overloaded("show", vec![Operand::bool(false)], None);
    main.ret(None);
    main.finish().expect("main should build");

    let messages = expect_rejected(fixture.check());
    assert_eq!(messages.kinds(), vec![DiagnosticKind::NoMatchingOverload]);
    assert_eq!(
        messages.errors[0].metadata_value(ErrorMetaDataKey::FunctionName),
        Some("show")
    );
}

#[test]
fn overloads_needing_ownership_ask_for_a_transfer() {
    let mut fixture = Fixture::new();
    let boxed = fixture.boxed;
    external(&mut fixture.module, "eat", &[("b", boxed, ParamKeyword::Owned)]);

    let mut main = fixture.module.function("main");
    let v = main.local("v", boxed, false);
    main.let_(
        v,
        Rvalue::Construct {
            ty: boxed,
            fields: vec![Operand::int(1)],
        },
    );
    main.call_overloaded("eat", vec![Operand::copy(v)], None);
    main.ret(None);
    main.finish().expect("main should build");

    expect_kinds(fixture.check(), &[DiagnosticKind::MissingTransferIntent]);
}

#[test]
fn shared_and_mutable_access_in_one_call_conflict() {
    let mut fixture = Fixture::new();
    let update = external(
        &mut fixture.module,
        "update",
        &[("from", INT_TYPE, ParamKeyword::Read), ("into", INT_TYPE, ParamKeyword::Mut)],
    );

    let mut main = fixture.module.function("main");
    let v = main.local("v", INT_TYPE, true);
    main.let_(v, Rvalue::int(1));
    main.call(update, vec![Operand::copy(v), Operand::copy(v)], None);
    main.ret(None);
    main.finish().expect("main should build");

    let messages = expect_rejected(fixture.check());
    assert_eq!(messages.kinds(), vec![DiagnosticKind::ExclusivityViolation]);
    assert!(messages.errors[0].msg.contains("by the same statement"));
}

#[test]
fn two_shared_borrows_of_one_binding_are_fine() {
    let mut fixture = Fixture::new();
    let compare = external(
        &mut fixture.module,
        "compare",
        &[("a", STR_TYPE, ParamKeyword::Read), ("b", STR_TYPE, ParamKeyword::Read)],
    );

    let mut main = fixture.module.function("main");
    let s = main.local("s", STR_TYPE, false);
    let text = main.module().str_constant("text");
    main.let_(s, Rvalue::Use(text));
    main.call(compare, vec![Operand::copy(s), Operand::copy(s)], None);
    main.ret(None);
    main.finish().expect("main should build");

    expect_accepted(fixture.check());
}

#[test]
fn mut_parameters_need_mutable_bindings() {
    let mut fixture = Fixture::new();
    let bump = external(&mut fixture.module, "bump", &[("x", INT_TYPE, ParamKeyword::Mut)]);

    let mut main = fixture.module.function("main");
    let v = main.local("v", INT_TYPE, false);
    main.let_(v, Rvalue::int(1));
    main.call(bump, vec![Operand::copy(v)], None);
    main.ret(None);
    main.finish().expect("main should build");

    let messages = expect_rejected(fixture.check());
    assert_eq!(messages.kinds(), vec![DiagnosticKind::MutabilityViolation]);
    assert_eq!(
        messages.errors[0].metadata_value(ErrorMetaDataKey::Convention),
        Some("mut")
    );
}

#[test]
fn out_arguments_initialize_the_binding() {
    let mut fixture = Fixture::new();
    let use_str = fixture.use_str;
    let init = external(&mut fixture.module, "init", &[("x", STR_TYPE, ParamKeyword::Out)]);

    let mut main = fixture.module.function("main");
    let s = main.local("s", STR_TYPE, false);
    main.declare(s);
    let call = main.call(init, vec![Operand::copy(s)], None);
    main.call(use_str, vec![Operand::copy(s)], None);
    main.ret(None);
    main.finish().expect("main should build");

    let report = expect_accepted(fixture.check());
    let resolution = function(&report, "main")
        .call_resolutions
        .iter()
        .find(|resolution| resolution.statement == call)
        .expect("init call should be recorded");

    assert_eq!(resolution.callee, init);
    assert_eq!(resolution.argument_uses, vec![ValueUseKind::Borrow]);
    assert_eq!(resolution.passing, vec![PassingMode::Memory]);
}

#[test]
fn call_resolutions_record_conventions_per_argument() {
    let mut fixture = Fixture::new();
    let boxed = fixture.boxed;
    let mix = external(
        &mut fixture.module,
        "mix",
        &[
            ("count", INT_TYPE, ParamKeyword::Owned),
            ("flag", BOOL_TYPE, ParamKeyword::Read),
            ("b", boxed, ParamKeyword::Owned),
        ],
    );

    let mut main = fixture.module.function("main");
    let n = main.local("n", INT_TYPE, false);
    let v = main.local("v", boxed, false);
    main.let_(n, Rvalue::int(3));
    main.let_(
        v,
        Rvalue::Construct {
            ty: boxed,
            fields: vec![Operand::int(1)],
        },
    );
    let call = main.call(
        mix,
        vec![Operand::copy(n), Operand::bool(true), Operand::transfer(v)],
        None,
    );
    main.ret(None);
    main.finish().expect("main should build");

    let report = expect_accepted(fixture.check());
    let resolution = function(&report, "main")
        .call_resolutions
        .iter()
        .find(|resolution| resolution.statement == call)
        .expect("mix call should be recorded");

    assert_eq!(
        resolution.argument_uses,
        vec![ValueUseKind::Copy, ValueUseKind::Borrow, ValueUseKind::Move]
    );
    assert_eq!(
        resolution.passing,
        vec![PassingMode::Register, PassingMode::Register, PassingMode::Memory]
    );
}
