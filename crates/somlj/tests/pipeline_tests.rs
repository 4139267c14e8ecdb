mod common;

use common::{class_id, compile, compile_fixture, method_proto};
use pretty_assertions::assert_eq;
use somlj::{bytecode::Instr, object::Value};

#[test]
fn hello_world_end_to_end() {
    let c = compile_fixture("Hello.som");
    assert!(!c.diags.has_errors());
    // one module per loaded class
    assert_eq!(c.modules.len(), c.loading_order.len());
    assert_eq!(c.model.class_name(c.main_class), "Hello");
    // the run method is installed on Hello's class table
    let hello = c.memory.class_table("Hello").expect("class table");
    assert!(matches!(c.memory.get_field(hello, "run"), Some(Value::Method(_))));
}

#[test]
fn counter_scenario_numbers_the_field_from_zero() {
    let c = compile_fixture("Ctr.som");
    let ctr = class_id(&c, "Ctr");
    assert_eq!(c.model.var(c.model.class(ctr).inst_vars[0]).slot, 0);
    let bump = method_proto(&c, "Ctr", "bump");
    // the trailing ^ n returns a single value at method level
    assert!(bump.instrs.iter().any(|i| matches!(i, Instr::Ret { n: 1, .. })));
}

#[test]
fn the_whole_core_library_compiles_clean() {
    let c = compile("Probe", "Probe = ( )", &[]);
    assert!(c.diags.is_empty(), "{}", c.diags.render(&c.model));
    assert_eq!(c.modules.len(), 17); // 16 built-ins plus the probe
    for module in &c.modules {
        let main = module.proto(module.main);
        assert!(
            main.instrs.iter().any(|i| matches!(i, Instr::Ret { .. })),
            "module {} has no return",
            module.class_name
        );
    }
}

#[test]
fn compiling_twice_yields_identical_modules() {
    let c1 = compile_fixture("Sum.som");
    let c2 = compile_fixture("Sum.som");
    let m1 = c1.module_for(class_id(&c1, "Sum")).expect("module");
    let m2 = c2.module_for(class_id(&c2, "Sum")).expect("module");
    assert_eq!(m1.disassemble(), m2.disassemble());
}

#[test]
fn emitted_artifacts_serialize_to_json() {
    let c = compile_fixture("Hello.som");
    let module = c.module_for(class_id(&c, "Hello")).expect("module");
    let json = module.to_json();
    assert!(json.contains("\"class_name\": \"Hello\""));
    assert!(json.contains("\"protos\""));
}

#[test]
fn ast_dump_reflects_resolution_results() {
    let c = compile_fixture("Sum.som");
    let text = somlj::dump::dump_class(&c.model, class_id(&c, "Sum"));
    assert!(text.contains("class Sum super Object"));
    assert!(text.contains("method sum: (keyword)"));
    assert!(text.contains("send whileTrue: (inline)"));
    assert!(text.contains("block depth 1/0 inline"));
}

#[test]
fn program_arguments_and_vm_switches_ride_along() {
    let mut options = somlj::CompileOptions::new();
    options.use_jit = false;
    options.trace = true;
    options.program_args = vec!["alpha".to_owned(), "beta".to_owned()];
    let compiler = somlj::Compiler::new(options);
    let c = compiler.compile_source("A", "A = ( run = ( ^ 1 ) )").expect("compiles");
    assert!(!c.options.use_jit);
    assert!(c.options.trace);
    assert_eq!(c.options.program_args, vec!["alpha", "beta"]);
}

#[test]
fn phases_short_circuit_after_parse_errors() {
    let failure = common::try_compile("A", "A = ( m = ( ^ ) )", &[]).expect_err("must fail");
    // nothing later than parse ran, so only parse diagnostics exist
    assert!(failure.diags.has_errors());
    assert!(failure.diags.iter().all(|d| matches!(d.phase, somlj::Phase::Parse | somlj::Phase::Load)));
}

#[test]
fn position_lookup_returns_the_innermost_covering_expression() {
    let c = compile_fixture("Hello.som");
    let m = common::method_id(&c, "Hello", "run");
    let somlj::ast::Expr::Send(send) = &c.model.func(m).body[0] else {
        panic!("expected a send statement")
    };
    // a position inside the string literal resolves to the literal, not the send
    let hit = c
        .model
        .find_expr_at(m, send.receiver.loc().pos + 1)
        .expect("a covering node");
    assert!(matches!(hit, somlj::ast::Expr::Str(_)), "innermost node wins");
    // a position on the selector resolves to the send itself
    let hit = c.model.find_expr_at(m, send.loc.pos).expect("a covering node");
    assert!(matches!(hit, somlj::ast::Expr::Send(_)));
    assert!(c.model.find_expr_at(m, 0).is_none(), "positions outside the body miss");
}

#[test]
fn corelib_integer_uses_the_inline_while_in_to_do() {
    let c = compile("Probe", "Probe = ( )", &[]);
    let to_do = method_proto(&c, "Integer", "to:do:");
    assert!(to_do.instrs.iter().any(|i| matches!(i, Instr::Loop)));
}

#[test]
fn corelib_array_do_closes_over_the_block_argument() {
    let c = compile("Probe", "Probe = ( )", &[]);
    let array = class_id(&c, "Array");
    let module = c.module_for(array).expect("module");
    // do: instantiates a block, so a block prototype exists
    assert!(module.protos.iter().any(|p| p.name.contains("block")));
}
