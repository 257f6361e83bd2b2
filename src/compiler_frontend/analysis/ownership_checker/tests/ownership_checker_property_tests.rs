#![cfg(test)]

use super::test_support::{Fixture, function};
use crate::compiler_frontend::check_module;
use crate::compiler_frontend::compiler_errors::ErrorType;
use crate::compiler_frontend::ir::ir_builder::FunctionBuilder;
use crate::compiler_frontend::ir::ir_nodes::{
    BlockId, DropSubject, FunctionBody, FunctionId, LocalId, Operand, ParamKeyword, Rvalue, StatementKind,
    TerminatorKind,
};
use crate::compiler_frontend::ir::ir_types::{BOOL_TYPE, STR_TYPE};
use crate::settings::{CheckerConfig, DropStrategy};
use proptest::prelude::*;
use rustc_hash::FxHashSet;

const BINDINGS: usize = 3;

#[derive(Debug, Clone, Copy)]
enum Op {
    Read(usize),
    Consume(usize),
    Reassign(usize),
}

/// Straight-line ops, then an if/else on a parameter, then more ops.
#[derive(Debug, Clone)]
struct Program {
    before: Vec<Op>,
    branches: Option<(Vec<Op>, Vec<Op>)>,
    after: Vec<Op>,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..BINDINGS).prop_map(Op::Read),
        2 => (0..BINDINGS).prop_map(Op::Consume),
        2 => (0..BINDINGS).prop_map(Op::Reassign),
    ]
}

fn arb_ops(max: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(arb_op(), 0..max)
}

fn arb_straight_line() -> impl Strategy<Value = Program> {
    arb_ops(12).prop_map(|before| Program {
        before,
        branches: None,
        after: Vec::new(),
    })
}

fn arb_branching() -> impl Strategy<Value = Program> {
    (arb_ops(5), arb_ops(4), arb_ops(4), arb_ops(5)).prop_map(|(before, then_ops, else_ops, after)| {
        Program {
            before,
            branches: Some((then_ops, else_ops)),
            after,
        }
    })
}

/// Mutable Str bindings, all initialized up front, then the program's ops.
fn build(program: &Program) -> Fixture {
    let mut fixture = Fixture::new();
    let (use_str, consume_str) = (fixture.use_str, fixture.consume_str);

    let mut main = fixture.module.function("main");
    let flag = main.param("flag", BOOL_TYPE, ParamKeyword::Read);
    let bindings = (0..BINDINGS)
        .map(|index| main.local(&format!("x{index}"), STR_TYPE, true))
        .collect::<Vec<_>>();

    for (index, binding) in bindings.iter().enumerate() {
        let text = main.module().str_constant(&format!("initial {index}"));
        main.let_(*binding, Rvalue::Use(text));
    }

    let calls = (use_str, consume_str);
    emit(&mut main, &bindings, calls, &program.before);

    if let Some((then_ops, else_ops)) = &program.branches {
        let then_block = main.new_block();
        let else_block = main.new_block();
        let merge = main.new_block();
        main.branch(Operand::copy(flag), then_block, else_block);

        main.switch_to(then_block);
        emit(&mut main, &bindings, calls, then_ops);
        main.goto(merge);

        main.switch_to(else_block);
        emit(&mut main, &bindings, calls, else_ops);
        main.goto(merge);

        main.switch_to(merge);
    }

    emit(&mut main, &bindings, calls, &program.after);
    main.ret(None);

    if let Err(error) = main.finish() {
        panic!("generated body should build: {}", error.msg);
    }

    fixture
}

fn emit(
    main: &mut FunctionBuilder<'_>,
    bindings: &[LocalId],
    (use_str, consume_str): (FunctionId, FunctionId),
    ops: &[Op],
) {
    for op in ops {
        match *op {
            Op::Read(index) => {
                main.call(use_str, vec![Operand::copy(bindings[index])], None);
            }
            Op::Consume(index) => {
                main.call(consume_str, vec![Operand::transfer(bindings[index])], None);
            }
            Op::Reassign(index) => {
                let text = main.module().str_constant("replacement");
                main.assign(bindings[index], Rvalue::Use(text));
            }
        }
    }
}

/// A use of a moved binding is the only way straight-line bodies can go wrong
fn straight_line_passes(ops: &[Op]) -> bool {
    let mut moved = [false; BINDINGS];
    for op in ops {
        match *op {
            Op::Read(index) | Op::Consume(index) if moved[index] => return false,
            Op::Read(_) => {}
            Op::Consume(index) => moved[index] = true,
            Op::Reassign(index) => moved[index] = false,
        }
    }
    true
}

fn read(live: &mut FxHashSet<LocalId>, operand: &Operand) -> Result<(), String> {
    match operand {
        Operand::Constant(_) => Ok(()),
        Operand::Use(place) if live.contains(&place.local) => Ok(()),
        Operand::Transfer(place) if live.remove(&place.local) => Ok(()),
        other => Err(format!("{:?} reads a local that holds no value", other)),
    }
}

fn initialize(live: &mut FxHashSet<LocalId>, local: LocalId) -> Result<(), String> {
    if live.insert(local) {
        Ok(())
    } else {
        Err(format!("{} is overwritten without being destroyed", local))
    }
}

/// Run every path of an acyclic lowered body, tracking which locals hold a
/// value. Each value must be destroyed or moved away exactly once before the
/// function returns. Conditional drops stand in for a runtime drop flag.
fn simulate(body: &FunctionBody, block: BlockId, mut live: FxHashSet<LocalId>) -> Result<(), String> {
    let Some(block) = body.blocks.get(block.0 as usize) else {
        return Err(format!("{} is not a block of the body", block));
    };

    for statement in &block.statements {
        match &statement.kind {
            StatementKind::Let { local, value } => {
                if let Some(value) = value {
                    if let Rvalue::Use(operand) = value {
                        read(&mut live, operand)?;
                    }
                    initialize(&mut live, *local)?;
                }
            }
            StatementKind::Assign { target, value } => {
                if let Rvalue::Use(operand) = value {
                    read(&mut live, operand)?;
                }
                initialize(&mut live, target.local)?;
            }
            StatementKind::Call { args, .. } => {
                for arg in args {
                    read(&mut live, arg)?;
                }
            }
            StatementKind::Drop(drop) => match &drop.subject {
                DropSubject::Binding { local, field_path } if field_path.is_empty() => {
                    if !live.remove(local) && !drop.conditional {
                        return Err(format!("{} is destroyed without holding a value", local));
                    }
                }
                DropSubject::Temporary { .. } => {}
                other => return Err(format!("unexpected drop of {:?}", other)),
            },
            StatementKind::Expr(_) => {}
        }
    }

    match &block.terminator.kind {
        TerminatorKind::Goto(target) => simulate(body, *target, live),
        TerminatorKind::Branch {
            then_block,
            else_block,
            ..
        } => {
            simulate(body, *then_block, live.clone())?;
            simulate(body, *else_block, live)
        }
        TerminatorKind::Return(_) if live.is_empty() => Ok(()),
        TerminatorKind::Return(_) => Err(format!("{:?} are never destroyed", live)),
        other => Err(format!("unexpected terminator {:?}", other)),
    }
}

fn check_paths(program: &Program, strategy: DropStrategy) -> Result<bool, TestCaseError> {
    let config = CheckerConfig {
        drop_strategy: strategy,
        ..CheckerConfig::default().sequential()
    };

    let report = match build(program).check_with(&config) {
        Ok(report) => report,
        Err(messages) => {
            // Lowering that no longer checks is reported as a compiler bug
            if let Some(bug) = messages
                .errors
                .iter()
                .find(|error| error.error_type == ErrorType::Compiler)
            {
                return Err(TestCaseError::fail(format!(
                    "{} with {strategy:?} drops for {program:?}",
                    bug.msg
                )));
            }
            return Ok(false);
        }
    };

    let main = function(&report, "main");
    let body = main.lowered_body.as_ref().expect("accepted bodies are lowered");
    match simulate(body, body.entry, FxHashSet::default()) {
        Ok(()) => Ok(true),
        Err(problem) => Err(TestCaseError::fail(format!(
            "{problem} with {strategy:?} drops for {program:?}"
        ))),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    #[test]
    fn straight_line_values_are_destroyed_exactly_once(program in arb_straight_line()) {
        let accepted = check_paths(&program, DropStrategy::Edge)?;
        prop_assert_eq!(accepted, straight_line_passes(&program.before));
    }

    #[test]
    fn every_path_destroys_each_value_exactly_once(program in arb_branching()) {
        let with_edges = check_paths(&program, DropStrategy::Edge)?;
        let with_flags = check_paths(&program, DropStrategy::Flags)?;

        // Where drops go never changes whether a body is accepted
        prop_assert_eq!(with_edges, with_flags);
    }

    #[test]
    fn parallel_checking_matches_sequential_checking(program in arb_branching()) {
        let sequential = build(&program).check();
        let parallel = check_module(&build(&program).module.finish(), &CheckerConfig::default());

        match (sequential, parallel) {
            (Ok(sequential), Ok(parallel)) => {
                let sequential = sequential.to_json().expect("report should serialize");
                let parallel = parallel.to_json().expect("report should serialize");
                prop_assert_eq!(sequential, parallel);
            }
            (Err(sequential), Err(parallel)) => {
                prop_assert_eq!(sequential.kinds(), parallel.kinds());
            }
            _ => prop_assert!(false, "only one of the runs accepted {:?}", program),
        }
    }
}
