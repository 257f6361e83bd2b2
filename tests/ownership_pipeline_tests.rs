use lifeline::compiler_frontend::ir::ir_nodes::{
    FunctionId, Operand, ParamKeyword, Place, Rvalue, StatementKind, TypeId,
};
use lifeline::compiler_frontend::ir::ir_types::{INT_TYPE, TypeCapabilities};
use lifeline::settings::{DropStrategy, CONFIG_FILE_NAME};
use lifeline::{CheckerConfig, DiagnosticKind, ModuleBuilder, check_module, print_compiler_messages};
use std::fs;

struct Runtime {
    boxed: TypeId,
    use_box: FunctionId,
    consume_box: FunctionId,
}

fn runtime(module: &mut ModuleBuilder) -> Runtime {
    let boxed = module.declare_struct("Box", &[("value", INT_TYPE)], TypeCapabilities::move_only());

    let mut use_box = module.function("use_box");
    use_box.param("b", boxed, ParamKeyword::Read);
    let use_box = use_box.finish_external();

    let mut consume_box = module.function("consume_box");
    consume_box.param("b", boxed, ParamKeyword::Owned);
    let consume_box = consume_box.finish_external();

    Runtime {
        boxed,
        use_box,
        consume_box,
    }
}

fn new_box(runtime: &Runtime) -> Rvalue {
    Rvalue::Construct {
        ty: runtime.boxed,
        fields: vec![Operand::int(1)],
    }
}

#[test]
fn a_module_checks_with_a_config_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "[checker]\ndrop_strategy = \"flags\"\nparallel = false\n",
    )
    .expect("write config");
    let config = CheckerConfig::from_path(dir.path()).expect("config should load");
    assert_eq!(config.drop_strategy, DropStrategy::Flags);

    let mut module = ModuleBuilder::new();
    let runtime = runtime(&mut module);

    let mut main = module.function("main");
    let v = main.local("v", runtime.boxed, false);
    main.let_(v, new_box(&runtime));
    main.call(runtime.use_box, vec![Operand::copy(v)], None);
    main.call(runtime.consume_box, vec![Operand::transfer(v)], None);
    main.ret(None);
    main.finish().expect("main should build");

    let report = match check_module(&module.finish(), &config) {
        Ok(report) => report,
        Err(messages) => panic!("module should be accepted: {:?}", messages.kinds()),
    };

    assert_eq!(report.stats.functions_analyzed, 1);
    assert_eq!(report.stats.external_functions, 2);

    let main = report.function_named("main").expect("main should be reported");
    assert_eq!(main.moves_of(v).count(), 1);
    assert!(main.drops_of(v).next().is_none());

    let json = report.to_json().expect("report should serialize");
    assert!(json.contains("\"lowered_body\""));
}

#[test]
fn every_function_reports_its_errors_in_order() {
    let mut module = ModuleBuilder::new();
    let runtime = runtime(&mut module);

    let mut first = module.function("first");
    let v = first.local("v", runtime.boxed, false);
    first.at_line(2).let_(v, new_box(&runtime));
    first.at_line(3).call(runtime.consume_box, vec![Operand::transfer(v)], None);
    first.at_line(4).call(runtime.use_box, vec![Operand::copy(v)], None);
    first.ret(None);
    first.finish().expect("first should build");

    let mut second = module.function("second");
    let n = second.local("n", INT_TYPE, false);
    second.at_line(9).let_(n, Rvalue::int(1));
    second.at_line(10).assign(n, Rvalue::int(2));
    second.ret(None);
    second.finish().expect("second should build");

    let module = module.finish();
    let messages = match check_module(&module, &CheckerConfig::default()) {
        Ok(_) => panic!("module should be rejected"),
        Err(messages) => messages,
    };

    assert_eq!(
        messages.kinds(),
        vec![DiagnosticKind::UseAfterMove, DiagnosticKind::MutabilityViolation]
    );
    assert_eq!(messages.errors[0].location.start_pos.line_number, 4);
    assert_eq!(messages.errors[1].location.start_pos.line_number, 10);

    print_compiler_messages(&messages, &module.string_table);
}

#[test]
fn a_field_moved_out_is_not_destroyed_again() {
    let mut module = ModuleBuilder::new();
    let pair = module.declare_struct(
        "Pair",
        &[("lo", INT_TYPE), ("hi", INT_TYPE)],
        TypeCapabilities::move_only(),
    );
    let lo_field = module.field(pair, "lo").expect("Pair has a lo field");

    let mut main = module.function("main");
    let p = main.local("p", pair, false);
    let lo = main.local("lo", INT_TYPE, false);
    main.let_(
        p,
        Rvalue::Construct {
            ty: pair,
            fields: vec![Operand::int(1), Operand::int(2)],
        },
    );
    main.let_(lo, Rvalue::transfer(Place::local(p).field(lo_field)));
    main.ret(None);
    main.finish().expect("main should build");

    let report = check_module(&module.finish(), &CheckerConfig::default().sequential())
        .unwrap_or_else(|messages| panic!("module should be accepted: {:?}", messages.kinds()));
    let main = report.function_named("main").expect("main should be reported");

    let lowered = main.lowered_body.as_ref().expect("accepted bodies are lowered");
    let dropped_fields = lowered
        .blocks
        .iter()
        .flat_map(|block| block.statements.iter())
        .filter_map(|statement| match &statement.kind {
            StatementKind::Drop(drop) => Some(format!("{:?}", drop.subject)),
            _ => None,
        })
        .filter(|subject| subject.contains(&format!("local: {:?}", p)))
        .collect::<Vec<_>>();

    assert_eq!(dropped_fields.len(), 1);
    assert!(!dropped_fields[0].contains(&format!("{:?}", lo_field)));
}
