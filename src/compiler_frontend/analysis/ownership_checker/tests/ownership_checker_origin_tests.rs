#![cfg(test)]

use super::test_support::{Fixture, expect_accepted, expect_kinds, external, function};
use crate::compiler_frontend::analysis::destructors::{DropPlacement, DropReason};
use crate::compiler_frontend::analysis::origins::OriginTarget;
use crate::compiler_frontend::analysis::ownership_checker::{FunctionOwnershipReport, Site};
use crate::compiler_frontend::compiler_errors::DiagnosticKind;
use crate::compiler_frontend::ir::ir_nodes::{
    LocalId, Operand, ParamKeyword, Place, RefKind, Rvalue,
};
use crate::compiler_frontend::ir::ir_types::{
    BOOL_TYPE, ReferenceMutability, STR_TYPE, TypeCapabilities,
};

fn origin_of(report: &FunctionOwnershipReport, local: LocalId) -> (Vec<OriginTarget>, bool) {
    let fact = report
        .reference_origins
        .iter()
        .rev()
        .find(|fact| fact.local == local)
        .expect("the reference should carry an origin");
    (fact.targets.clone(), fact.mutable)
}

#[test]
fn a_reference_points_into_what_it_borrows() {
    let mut fixture = Fixture::new();
    let str_ref = fixture.module.reference(STR_TYPE, ReferenceMutability::Immutable);
    let use_str = fixture.use_str;

    let mut main = fixture.module.function("main");
    let s = main.local("s", STR_TYPE, false);
    let r = main.local("r", str_ref, false);
    let text = main.module().str_constant("text");
    main.let_(s, Rvalue::Use(text));
    let borrow = main.let_(r, Rvalue::borrow(s));
    main.call(use_str, vec![Operand::copy(r)], None);
    main.ret(None);
    main.finish().expect("main should build");

    let report = expect_accepted(fixture.check());
    let main_report = function(&report, "main");

    let fact = main_report
        .reference_origins
        .iter()
        .find(|fact| fact.local == r)
        .expect("r should carry an origin");
    assert_eq!(fact.site, Site::Statement(borrow));
    assert_eq!(fact.targets, vec![OriginTarget::Local(s)]);
    assert!(!fact.mutable);
}

#[test]
fn a_referent_lives_until_the_last_use_of_its_references() {
    let mut fixture = Fixture::new();
    let str_ref = fixture.module.reference(STR_TYPE, ReferenceMutability::Immutable);
    let use_str = fixture.use_str;

    let mut main = fixture.module.function("main");
    let s = main.local("s", STR_TYPE, false);
    let r = main.local("r", str_ref, false);
    let alias = main.local("alias", str_ref, false);
    let text = main.module().str_constant("text");
    main.let_(s, Rvalue::Use(text));
    main.let_(r, Rvalue::borrow(s));
    main.let_(alias, Rvalue::use_of(r));
    let last_use = main.call(use_str, vec![Operand::copy(alias)], None);
    main.ret(None);
    main.finish().expect("main should build");

    let report = expect_accepted(fixture.check());
    let main_report = function(&report, "main");

    // Copying a reference keeps what it points into
    assert_eq!(origin_of(main_report, alias), (vec![OriginTarget::Local(s)], false));

    let drops = main_report.drops_of(s).collect::<Vec<_>>();
    assert_eq!(drops.len(), 1);
    assert_eq!(drops[0].placement, DropPlacement::AfterStatement(last_use));
    assert_eq!(drops[0].reason, DropReason::LastUse);
}

#[test]
fn a_select_points_into_both_sides() {
    let mut fixture = Fixture::new();
    let str_ref = fixture.module.reference(STR_TYPE, ReferenceMutability::Immutable);
    let use_str = fixture.use_str;

    let mut main = fixture.module.function("main");
    let condition = main.param("condition", BOOL_TYPE, ParamKeyword::Read);
    let a = main.local("a", STR_TYPE, false);
    let b = main.local("b", STR_TYPE, false);
    let r = main.local("r", str_ref, false);
    let first = main.module().str_constant("first");
    let second = main.module().str_constant("second");
    main.let_(a, Rvalue::Use(first));
    main.let_(b, Rvalue::Use(second));
    main.let_(
        r,
        Rvalue::Select {
            condition: Operand::copy(condition),
            then_place: Place::local(a),
            else_place: Place::local(b),
            mutability: RefKind::Immutable,
        },
    );
    let last_use = main.call(use_str, vec![Operand::copy(r)], None);
    main.ret(None);
    main.finish().expect("main should build");

    let report = expect_accepted(fixture.check());
    let main_report = function(&report, "main");

    assert_eq!(
        origin_of(main_report, r),
        (vec![OriginTarget::Local(a), OriginTarget::Local(b)], false)
    );

    // Either side may be what r reads, so both outlive it
    for local in [a, b] {
        let drops = main_report.drops_of(local).collect::<Vec<_>>();
        assert_eq!(drops.len(), 1);
        assert_eq!(drops[0].placement, DropPlacement::AfterStatement(last_use));
    }
}

#[test]
fn a_mutable_reference_cannot_hold_an_immutable_borrow() {
    let mut fixture = Fixture::new();
    let str_mut = fixture.module.reference(STR_TYPE, ReferenceMutability::Mutable);
    let use_str = fixture.use_str;

    let mut main = fixture.module.function("main");
    let s = main.local("s", STR_TYPE, true);
    let r = main.local("r", str_mut, false);
    let text = main.module().str_constant("text");
    main.let_(s, Rvalue::Use(text));
    main.let_(r, Rvalue::borrow(s));
    main.call(use_str, vec![Operand::copy(r)], None);
    main.ret(None);
    main.finish().expect("main should build");

    expect_kinds(fixture.check(), &[DiagnosticKind::MutabilityViolation]);
}

#[test]
fn a_mutable_borrow_needs_a_mutable_binding() {
    let mut fixture = Fixture::new();
    let str_mut = fixture.module.reference(STR_TYPE, ReferenceMutability::Mutable);
    let use_str = fixture.use_str;

    let mut main = fixture.module.function("main");
    let s = main.local("s", STR_TYPE, false);
    let r = main.local("r", str_mut, false);
    let text = main.module().str_constant("text");
    main.let_(s, Rvalue::Use(text));
    main.let_(r, Rvalue::borrow_mut(s));
    main.call(use_str, vec![Operand::copy(r)], None);
    main.ret(None);
    main.finish().expect("main should build");

    expect_kinds(fixture.check(), &[DiagnosticKind::MutabilityViolation]);
}

#[test]
fn a_struct_holding_a_reference_keeps_its_referent_alive() {
    let mut fixture = Fixture::new();
    let str_ref = fixture.module.reference(STR_TYPE, ReferenceMutability::Immutable);
    let view = fixture.module.declare_struct_with_origins(
        "View",
        &[("o", RefKind::Immutable)],
        &[("text", str_ref, Some(0))],
        TypeCapabilities::trivial(),
    );
    let use_view = external(
        &mut fixture.module,
        "use_view",
        &[("v", view, ParamKeyword::Read)],
    );

    let mut main = fixture.module.function("main");
    let s = main.local("s", STR_TYPE, false);
    let r = main.local("r", str_ref, false);
    let v = main.local("v", view, false);
    let text = main.module().str_constant("text");
    main.let_(s, Rvalue::Use(text));
    main.let_(r, Rvalue::borrow(s));
    main.let_(
        v,
        Rvalue::Construct {
            ty: view,
            fields: vec![Operand::copy(r)],
        },
    );
    let last_use = main.call(use_view, vec![Operand::copy(v)], None);
    main.ret(None);
    main.finish().expect("main should build");

    let report = expect_accepted(fixture.check());
    let main_report = function(&report, "main");

    assert_eq!(origin_of(main_report, v), (vec![OriginTarget::Local(s)], false));

    let drops = main_report.drops_of(s).collect::<Vec<_>>();
    assert_eq!(drops.len(), 1);
    assert_eq!(drops[0].placement, DropPlacement::AfterStatement(last_use));
}

#[test]
fn a_struct_origin_rejects_a_reference_of_the_other_kind() {
    let mut fixture = Fixture::new();
    let str_mut = fixture.module.reference(STR_TYPE, ReferenceMutability::Mutable);
    let str_ref = fixture.module.reference(STR_TYPE, ReferenceMutability::Immutable);
    let view = fixture.module.declare_struct_with_origins(
        "View",
        &[("o", RefKind::Immutable)],
        &[("text", str_ref, Some(0))],
        TypeCapabilities::trivial(),
    );

    let mut main = fixture.module.function("main");
    let s = main.local("s", STR_TYPE, true);
    let r = main.local("r", str_mut, false);
    let v = main.local("v", view, false);
    let text = main.module().str_constant("text");
    main.let_(s, Rvalue::Use(text));
    main.let_(r, Rvalue::borrow_mut(s));
    main.let_(
        v,
        Rvalue::Construct {
            ty: view,
            fields: vec![Operand::copy(r)],
        },
    );
    main.ret(None);
    main.finish().expect("main should build");

    expect_kinds(fixture.check(), &[DiagnosticKind::OriginMismatch]);
}
