#![cfg(test)]

use super::test_support::{
    Fixture, expect_accepted, expect_kinds, function, real_drops,
};
use crate::compiler_frontend::analysis::destructors::{DropFlag, DropPlacement, DropReason};
use crate::compiler_frontend::analysis::ownership_checker::FunctionOwnershipReport;
use crate::compiler_frontend::compiler_errors::DiagnosticKind;
use crate::compiler_frontend::ir::ir_nodes::{
    BlockId, DropStatement, DropSubject, FieldId, FunctionBody, FunctionRole, LocalId, Operand,
    ParamKeyword, Place, Rvalue, StatementKind, TerminatorKind, TypeId,
};
use crate::compiler_frontend::ir::ir_types::{BOOL_TYPE, INT_TYPE, STR_TYPE, TypeCapabilities};
use crate::settings::{CheckerConfig, DestructorOrder, DropStrategy};

fn lowered(report: &FunctionOwnershipReport) -> &FunctionBody {
    report
        .lowered_body
        .as_ref()
        .expect("accepted bodies are lowered")
}

fn lowered_drops(body: &FunctionBody, block: usize) -> Vec<DropSubject> {
    body.blocks[block]
        .statements
        .iter()
        .filter_map(|statement| match &statement.kind {
            StatementKind::Drop(drop) => Some(drop.subject.clone()),
            _ => None,
        })
        .collect()
}

fn binding(local: LocalId) -> DropSubject {
    DropSubject::Binding {
        local,
        field_path: Vec::new(),
    }
}

/// `let s = "text"; if condition { consume_str(s^) }; return`
struct ConditionalConsume {
    fixture: Fixture,
    s: LocalId,
    consume_block: BlockId,
    exit: BlockId,
}

fn conditional_consume() -> ConditionalConsume {
    let mut fixture = Fixture::new();
    let consume_str = fixture.consume_str;

    let mut main = fixture.module.function("main");
    let condition = main.param("condition", BOOL_TYPE, ParamKeyword::Read);
    let s = main.local("s", STR_TYPE, false);
    let text = main.module().str_constant("text");
    main.let_(s, Rvalue::Use(text));

    let consume_block = main.new_block();
    let exit = main.new_block();
    main.branch(Operand::copy(condition), consume_block, exit);

    main.switch_to(consume_block);
    main.call(consume_str, vec![Operand::transfer(s)], None);
    main.goto(exit);

    main.switch_to(exit).ret(None);
    main.finish().expect("main should build");

    ConditionalConsume {
        fixture,
        s,
        consume_block,
        exit,
    }
}

#[test]
fn values_die_right_after_their_last_use() {
    let mut fixture = Fixture::new();
    let use_str = fixture.use_str;

    let mut main = fixture.module.function("main");
    let first = main.local("first", STR_TYPE, false);
    let second = main.local("second", STR_TYPE, false);
    let hello = main.module().str_constant("hello");
    let world = main.module().str_constant("world");
    main.let_(first, Rvalue::Use(hello));
    main.let_(second, Rvalue::Use(world));
    let use_first = main.call(use_str, vec![Operand::copy(first)], None);
    let use_second = main.call(use_str, vec![Operand::copy(second)], None);
    main.ret(None);
    main.finish().expect("main should build");

    let report = expect_accepted(fixture.check());
    let main_report = function(&report, "main");

    let drops = real_drops(main_report);
    assert_eq!(drops.len(), 2);
    assert_eq!(drops[0].subject, binding(first));
    assert_eq!(drops[0].placement, DropPlacement::AfterStatement(use_first));
    assert_eq!(drops[0].reason, DropReason::LastUse);
    assert_eq!(drops[1].subject, binding(second));
    assert_eq!(drops[1].placement, DropPlacement::AfterStatement(use_second));

    let body = lowered(main_report);
    let order = body.blocks[0]
        .statements
        .iter()
        .map(|statement| match &statement.kind {
            StatementKind::Drop(drop) => format!("drop {:?}", drop.subject),
            StatementKind::Call { .. } => "call".to_owned(),
            StatementKind::Let { .. } => "let".to_owned(),
            other => format!("{:?}", other),
        })
        .collect::<Vec<_>>();

    assert_eq!(
        order,
        vec![
            "let".to_owned(),
            "let".to_owned(),
            "call".to_owned(),
            format!("drop {:?}", binding(first)),
            "call".to_owned(),
            format!("drop {:?}", binding(second)),
        ]
    );
}

#[test]
fn a_value_consumed_on_one_branch_is_dropped_on_the_other_edge() {
    let ConditionalConsume {
        fixture,
        s,
        consume_block,
        exit,
    } = conditional_consume();

    let report = expect_accepted(fixture.check());
    let main_report = function(&report, "main");

    let drops = main_report.drops_of(s).collect::<Vec<_>>();
    assert_eq!(drops.len(), 1);
    assert_eq!(
        drops[0].placement,
        DropPlacement::Edge {
            from: BlockId(0),
            to: exit,
        }
    );
    assert!(!drops[0].conditional);
    assert!(main_report.drop_flags.is_empty());

    // The edge gets a block of its own
    let body = lowered(main_report);
    assert_eq!(body.blocks.len(), 4);
    let split = BlockId(3);
    assert_eq!(lowered_drops(body, 3), vec![binding(s)]);
    assert_eq!(body.blocks[3].terminator.kind, TerminatorKind::Goto(exit));

    match &body.blocks[0].terminator.kind {
        TerminatorKind::Branch {
            then_block,
            else_block,
            ..
        } => {
            assert_eq!(*then_block, consume_block);
            assert_eq!(*else_block, split);
        }
        other => panic!("entry should still branch, found {:?}", other),
    }
}

#[test]
fn drop_flags_guard_merges_when_edges_are_not_split() {
    let ConditionalConsume {
        fixture, s, exit, ..
    } = conditional_consume();

    let config = CheckerConfig {
        drop_strategy: DropStrategy::Flags,
        ..CheckerConfig::default()
    }
    .sequential();

    let report = expect_accepted(fixture.check_with(&config));
    let main_report = function(&report, "main");

    let drops = main_report.drops_of(s).collect::<Vec<_>>();
    assert_eq!(drops.len(), 1);
    assert_eq!(drops[0].placement, DropPlacement::BlockEntry(exit));
    assert!(drops[0].conditional);
    assert_eq!(
        main_report.drop_flags,
        vec![DropFlag {
            local: s,
            field_path: Vec::new(),
        }]
    );

    let body = lowered(main_report);
    assert_eq!(body.blocks.len(), 3);
    match &body.blocks[exit.0 as usize].statements[0].kind {
        StatementKind::Drop(drop) => {
            assert_eq!(drop.subject, binding(s));
            assert!(drop.conditional);
        }
        other => panic!("merge block should start with the guarded drop, found {:?}", other),
    }
}

#[test]
fn the_old_value_is_destroyed_before_an_overwrite() {
    let mut fixture = Fixture::new();
    let use_str = fixture.use_str;

    let mut main = fixture.module.function("main");
    let s = main.local("s", STR_TYPE, true);
    let text = main.module().str_constant("a");
    main.let_(s, Rvalue::Use(text));
    let overwrite = main.assign(s, Rvalue::use_of(s));
    let last_use = main.call(use_str, vec![Operand::copy(s)], None);
    main.ret(None);
    main.finish().expect("main should build");

    let report = expect_accepted(fixture.check());
    let main_report = function(&report, "main");

    let drops = main_report.drops_of(s).collect::<Vec<_>>();
    assert_eq!(drops.len(), 2);
    assert_eq!(drops[0].placement, DropPlacement::BeforeWrite(overwrite));
    assert_eq!(drops[0].reason, DropReason::Overwrite);
    assert_eq!(drops[1].placement, DropPlacement::AfterStatement(last_use));
    assert_eq!(drops[1].reason, DropReason::LastUse);

    // The new value is staged in a temporary so the drop can run before the store
    let body = lowered(main_report);
    let statements = &body.blocks[0].statements;
    assert_eq!(statements.len(), 6);

    let temp = match &statements[1].kind {
        StatementKind::Let {
            local,
            value: Some(value),
        } => {
            assert_eq!(*value, Rvalue::use_of(s));
            *local
        }
        other => panic!("expected the staged value, found {:?}", other),
    };
    assert_eq!(body.local(temp).map(|local| local.ty), Some(STR_TYPE));

    assert_eq!(
        statements[2].kind,
        StatementKind::Drop(DropStatement {
            subject: binding(s),
            conditional: false,
        })
    );
    assert_eq!(
        statements[3].kind,
        StatementKind::Assign {
            target: Place::local(s),
            value: Rvalue::transfer(temp),
        }
    );
    assert_eq!(statements[3].id, overwrite);
    assert!(matches!(statements[5].kind, StatementKind::Drop(_)));
}

#[test]
fn unbound_results_of_expressions_are_temporaries() {
    let mut fixture = Fixture::new();
    let handle = fixture.handle;

    let mut main = fixture.module.function("main");
    let statement = main.expr(Rvalue::Construct {
        ty: handle,
        fields: Vec::new(),
    });
    main.ret(None);
    main.finish().expect("main should build");

    let report = expect_accepted(fixture.check());
    let drops = real_drops(function(&report, "main"));

    assert_eq!(drops.len(), 1);
    assert_eq!(drops[0].subject, DropSubject::Temporary { ty: handle });
    assert_eq!(drops[0].placement, DropPlacement::AfterStatement(statement));
    assert_eq!(drops[0].reason, DropReason::Temporary);
}

#[test]
fn values_still_owned_at_a_raise_are_destroyed_on_the_error_exit() {
    let mut fixture = Fixture::new();

    let mut fail = fixture.module.function("fail");
    let s = fail.local("s", STR_TYPE, false);
    let text = fail.module().str_constant("reason");
    fail.let_(s, Rvalue::Use(text));
    fail.raise(Some(Operand::copy(s)));
    fail.finish().expect("fail should build");

    let report = expect_accepted(fixture.check());
    let fail_report = function(&report, "fail");

    let drops = fail_report.drops_of(s).collect::<Vec<_>>();
    assert_eq!(drops.len(), 1);
    assert_eq!(drops[0].placement, DropPlacement::TerminatorExit(BlockId(0)));
    assert_eq!(drops[0].reason, DropReason::ErrorExit);

    // The raised value is evaluated before anything is destroyed
    let body = lowered(fail_report);
    let statements = &body.blocks[0].statements;
    assert_eq!(statements.len(), 3);
    assert!(matches!(statements[1].kind, StatementKind::Let { .. }));
    assert_eq!(lowered_drops(body, 0), vec![binding(s)]);
    assert!(matches!(
        body.blocks[0].terminator.kind,
        TerminatorKind::Raise(Some(Operand::Transfer(_)))
    ));
}

#[test]
fn initialized_outputs_are_left_to_the_caller() {
    let mut fixture = Fixture::new();

    let mut fill = fixture.module.function("fill");
    let out = fill.param("out", STR_TYPE, ParamKeyword::Out);
    let text = fill.module().str_constant("done");
    fill.assign(out, Rvalue::Use(text));
    fill.ret(None);
    fill.finish().expect("fill should build");

    let report = expect_accepted(fixture.check());
    assert_eq!(function(&report, "fill").drops_of(out).count(), 0);
}

#[test]
fn returning_before_an_output_is_written_is_rejected() {
    let mut fixture = Fixture::new();

    let mut fill = fixture.module.function("fill");
    fill.param("out", STR_TYPE, ParamKeyword::Out);
    fill.ret(None);
    fill.finish().expect("fill should build");

    expect_kinds(fixture.check(), &[DiagnosticKind::UseOfUninitializedValue]);
}

fn pair_of_handles(fixture: &mut Fixture) -> (TypeId, FieldId, FieldId) {
    let handle = fixture.handle;
    let pair = fixture.module.declare_struct(
        "Pair",
        &[("lo", handle), ("hi", handle)],
        TypeCapabilities::move_only(),
    );
    (pair, FieldId(0), FieldId(1))
}

/// Fields left in the receiver of `Pair`'s destructor, in the order they are destroyed
fn drop_order(order: DestructorOrder) -> Vec<Vec<FieldId>> {
    let mut fixture = Fixture::new();
    let (pair, _, _) = pair_of_handles(&mut fixture);

    let mut destructor = fixture.module.function("Pair.__del__");
    destructor.role(FunctionRole::Destructor(pair));
    let receiver = destructor.param("self", pair, ParamKeyword::Owned);
    destructor.ret(None);
    let destructor = destructor.finish().expect("destructor should build");
    fixture.module.set_destructor(pair, destructor);

    let config = CheckerConfig {
        destructor_order: order,
        ..CheckerConfig::default()
    }
    .sequential();
    let report = expect_accepted(fixture.check_with(&config));

    function(&report, "Pair.__del__")
        .drops_of(receiver)
        .map(|drop| {
            assert_eq!(drop.placement, DropPlacement::BlockEntry(BlockId(0)));
            match &drop.subject {
                DropSubject::Binding { field_path, .. } => field_path.clone(),
                other => panic!("expected a binding drop, found {:?}", other),
            }
        })
        .collect()
}

#[test]
fn fields_are_destroyed_in_the_configured_order() {
    let (lo, hi) = (FieldId(0), FieldId(1));

    assert_eq!(drop_order(DestructorOrder::Reverse), vec![vec![hi], vec![lo]]);
    assert_eq!(drop_order(DestructorOrder::Declaration), vec![vec![lo], vec![hi]]);
}

#[test]
fn report_lists_destructor_plans_for_types_that_need_them() {
    let mut fixture = Fixture::new();
    let (pair, lo, hi) = pair_of_handles(&mut fixture);
    let (handle, boxed) = (fixture.handle, fixture.boxed);

    let report = expect_accepted(fixture.check());

    let pair_plan = report
        .destructor_plans
        .iter()
        .find(|plan| plan.ty == pair)
        .expect("Pair owns handles and needs a plan");
    assert_eq!(pair_plan.field_order, vec![hi, lo]);

    assert!(report.destructor_plans.iter().any(|plan| plan.ty == handle));
    assert!(!report.destructor_plans.iter().any(|plan| plan.ty == boxed));
}

#[test]
fn trivial_drops_can_be_left_out_of_lowered_bodies() {
    let build = || {
        let mut fixture = Fixture::new();
        let use_int = fixture.use_int;

        let mut main = fixture.module.function("main");
        let a = main.local("a", INT_TYPE, false);
        main.let_(a, Rvalue::int(1));
        main.call(use_int, vec![Operand::copy(a)], None);
        main.ret(None);
        main.finish().expect("main should build");
        fixture
    };

    let report = expect_accepted(build().check());
    let main_report = function(&report, "main");
    assert_eq!(main_report.drops.len(), 1);
    assert!(main_report.drops[0].trivial);
    assert_eq!(lowered_drops(lowered(main_report), 0).len(), 1);

    let config = CheckerConfig {
        elide_trivial_drops: true,
        ..CheckerConfig::default()
    }
    .sequential();
    let report = expect_accepted(build().check_with(&config));
    assert!(lowered_drops(lowered(function(&report, "main")), 0).is_empty());
}

#[test]
fn whole_values_with_a_user_destructor_are_dropped_as_one() {
    let mut fixture = Fixture::new();
    let handle = fixture.handle;
    let (pair, _, _) = pair_of_handles(&mut fixture);

    let mut destructor = fixture.module.function("Pair.__del__");
    destructor.role(FunctionRole::Destructor(pair));
    destructor.param("self", pair, ParamKeyword::Owned);
    let destructor = destructor.finish_external();
    fixture.module.set_destructor(pair, destructor);

    let mut main = fixture.module.function("main");
    let first = main.local("first", handle, false);
    let second = main.local("second", handle, false);
    let p = main.local("p", pair, false);
    let new_handle = || Rvalue::Construct {
        ty: handle,
        fields: Vec::new(),
    };
    main.let_(first, new_handle());
    main.let_(second, new_handle());
    let build_pair = main.let_(
        p,
        Rvalue::Construct {
            ty: pair,
            fields: vec![Operand::transfer(first), Operand::transfer(second)],
        },
    );
    main.ret(None);
    main.finish().expect("main should build");

    let report = expect_accepted(fixture.check());
    let drops = function(&report, "main").drops_of(p).collect::<Vec<_>>();

    assert_eq!(drops.len(), 1);
    assert_eq!(drops[0].subject, binding(p));
    assert_eq!(drops[0].placement, DropPlacement::AfterStatement(build_pair));

    let plan = report
        .destructor_plans
        .iter()
        .find(|plan| plan.ty == pair)
        .expect("Pair needs a plan");
    assert_eq!(plan.user_destructor, Some(destructor));
}
