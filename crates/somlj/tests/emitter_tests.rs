mod common;

use common::{class_id, compile, compile_fixture, method_id, method_proto, try_compile};
use pretty_assertions::assert_eq;
use somlj::{
    ast::PatternKind,
    bytecode::{Const, Instr, Proto},
    selector,
};

fn has_const_str(p: &Proto, s: &str) -> bool {
    p.consts.iter().any(|k| matches!(k, Const::Str(v) if v == s))
}

fn count_instr(p: &Proto, pred: impl Fn(&Instr) -> bool) -> usize {
    p.instrs.iter().copied().filter(|i| pred(i)).count()
}

#[test]
fn selector_encoding_is_stable() {
    assert_eq!(selector::encode("at:put:", PatternKind::Keyword), "at_put_");
    assert_eq!(selector::encode("<=", PatternKind::Binary), "_0lq");
    assert_eq!(selector::encode("println", PatternKind::Unary), "println");
    assert_eq!(selector::encode(",", PatternKind::Binary), "_0c");
    assert_eq!(selector::encode("~=", PatternKind::Binary), "_0tq");
    assert_eq!(selector::encode("end", PatternKind::Unary), "_end");
    assert_eq!(selector::encode_any("at:put:"), "at_put_");
    assert_eq!(selector::encode_any("<="), "_0lq");
    assert_eq!(selector::encode_any("println"), "println");
}

#[test]
fn hello_world_compiles_to_a_send_of_println() {
    let c = compile_fixture("Hello.som");
    let run = method_proto(&c, "Hello", "run");
    assert!(has_const_str(run, "Hello, World"), "string literal constant");
    assert!(has_const_str(run, "_str"), "string boxing key");
    assert!(has_const_str(run, "println"), "encoded selector key");
    assert!(count_instr(run, |i| matches!(i, Instr::Call { .. })) >= 1);
    // the module stores the method under its selector
    let module = c.module_for(class_id(&c, "Hello")).expect("module");
    let main = module.proto(module.main);
    assert!(has_const_str(main, "run"));
    assert!(has_const_str(main, "Hello"));
    assert!(count_instr(main, |i| matches!(i, Instr::FNew { .. })) == 1);
    assert!(count_instr(main, |i| matches!(i, Instr::TSet { .. })) == 1);
}

#[test]
fn methods_without_trailing_return_answer_self() {
    let c = compile_fixture("Hello.som");
    let run = method_proto(&c, "Hello", "run");
    let tail: Vec<&Instr> = run.instrs.iter().rev().take(2).collect();
    assert!(matches!(tail[0], Instr::Ret { n: 1, .. }));
    assert!(matches!(tail[1], Instr::TGetI { tbl: 0, idx: 0, .. }));
}

#[test]
fn field_assignment_uses_the_one_based_fast_path() {
    let c = compile_fixture("Ctr.som");
    // n occupies slot 0: Object contributes no instance variables
    let ctr = class_id(&c, "Ctr");
    let n = c.model.class(ctr).inst_vars[0];
    assert_eq!(c.model.var(n).slot, 0);
    let init = method_proto(&c, "Ctr", "init");
    assert!(count_instr(init, |i| matches!(i, Instr::TSetI { idx: 1, .. })) == 1);
}

#[test]
fn large_field_slots_take_the_constant_keyed_path() {
    let fields: String = (0..300).map(|i| format!("f{i} ")).collect();
    let src = format!("Big = ( | {fields} | get = ( ^ f299 ) set = ( f299 := 1 ) )");
    let c = compile("Big", &src, &[]);
    let get = method_proto(&c, "Big", "get");
    assert!(count_instr(get, |i| matches!(i, Instr::TGet { .. })) >= 1);
    assert!(get.consts.iter().any(|k| matches!(k, Const::Int(300))));
    let set = method_proto(&c, "Big", "set");
    assert!(count_instr(set, |i| matches!(i, Instr::TSet { .. })) >= 1);
    // small slots keep the immediate form
    let c2 = compile("Small", "Small = ( | f | get = ( ^ f ) )", &[]);
    let get2 = method_proto(&c2, "Small", "get");
    assert!(count_instr(get2, |i| matches!(i, Instr::TGet { .. })) == 0);
}

#[test]
fn inline_while_creates_no_closure() {
    let c = compile_fixture("Sum.som");
    let sum_class = class_id(&c, "Sum");
    let module = c.module_for(sum_class).expect("module");
    // only the method prototype plus the module function
    assert_eq!(module.protos.len(), 2);
    let sum = method_proto(&c, "Sum", "sum:");
    assert!(count_instr(sum, |i| matches!(i, Instr::Loop)) == 1);
    assert!(count_instr(sum, |i| matches!(i, Instr::FNew { .. })) == 0);
    assert!(count_instr(sum, |i| matches!(i, Instr::UGet { .. })) == 0);
    // the back edge jumps to just after LOOP
    let loop_pc = sum
        .instrs
        .iter()
        .position(|i| matches!(i, Instr::Loop))
        .expect("loop");
    let has_back_edge = sum.instrs.iter().enumerate().any(|(pc, i)| match i {
        Instr::Jmp { offset } => {
            *offset < 0 && pc as i64 + 1 + i64::from(*offset) == loop_pc as i64 + 1
        }
        _ => false,
    });
    assert!(has_back_edge, "no back edge to the loop header:\n{}", sum.disassemble());
}

#[test]
fn inline_if_tests_and_jumps_over_the_arm() {
    let c = compile("A", "A = ( m: x = ( ^ x ifTrue: [ 1 ] ifFalse: [ 2 ] ) )", &[]);
    let m = method_proto(&c, "A", "m:");
    assert!(count_instr(m, |i| matches!(i, Instr::Isf { .. })) == 1);
    // two jumps: over the then arm, and over the else arm
    assert!(count_instr(m, |i| matches!(i, Instr::Jmp { .. })) >= 2);
    assert!(count_instr(m, |i| matches!(i, Instr::Call { .. })) == 0, "no dynamic send remains");
}

#[test]
fn if_false_tests_with_ist() {
    let c = compile("A", "A = ( m: x = ( ^ x ifFalse: [ 1 ] ) )", &[]);
    let m = method_proto(&c, "A", "m:");
    assert!(count_instr(m, |i| matches!(i, Instr::Ist { .. })) == 1);
}

#[test]
fn message_send_reserves_a_contiguous_call_window() {
    let c = compile("A", "A = ( m = ( ^ 1 max: 2 min: 3 ) )", &[]);
    let m = method_proto(&c, "A", "m");
    let call = m
        .instrs
        .iter()
        .find_map(|i| match i {
            Instr::Call { base, nres, nargs } => Some((*base, *nres, *nargs)),
            _ => None,
        })
        .expect("a call");
    // receiver plus two arguments, two results for the return protocol
    assert_eq!(call.1, 2);
    assert_eq!(call.2, 3);
    // the method value is fetched into the window base under the encoded key
    assert!(has_const_str(m, "max_min_"));
    let _ = call.0;
}

#[test]
fn non_local_return_emits_the_two_value_protocol() {
    let c = compile_fixture("NL.som");
    let nl = class_id(&c, "NL");
    let module = c.module_for(nl).expect("module");
    let find = method_id(&c, "NL", "find:");

    // the do: block returns (value, cookie)
    let block_proto = module
        .protos
        .iter()
        .find(|p| p.name.contains("block"))
        .expect("block proto");
    assert!(count_instr(block_proto, |i| matches!(i, Instr::Ret { n: 2, .. })) >= 1);
    assert!(
        block_proto
            .consts
            .iter()
            .any(|k| matches!(k, Const::Method(f) if *f == find)),
        "cookie constant names the home method"
    );

    // the method-level send checks the cookie for home
    let find_proto = module.method_proto(find).expect("find: proto");
    assert!(count_instr(find_proto, |i| matches!(i, Instr::IsEq { .. })) >= 1);
    assert!(count_instr(find_proto, |i| matches!(i, Instr::Ret { n: 2, .. })) >= 1);
}

#[test]
fn sends_in_methods_without_nlr_propagate_without_cookie_check() {
    let c = compile_fixture("Hello.som");
    let run = method_proto(&c, "Hello", "run");
    assert!(count_instr(run, |i| matches!(i, Instr::IsEq { .. })) == 0);
    assert!(count_instr(run, |i| matches!(i, Instr::Isf { .. })) >= 1);
}

#[test]
fn super_send_goes_through_the_static_super_table() {
    let c = compile_fixture("B.som");
    let greet = method_proto(&c, "B", "greet");
    assert!(has_const_str(greet, "B"), "starts from the own metaclass global");
    assert!(has_const_str(greet, "_class"));
    assert!(has_const_str(greet, "_super"));
    assert!(has_const_str(greet, "greet"));
    assert!(has_const_str(greet, "_0c"), "the ',' send is encoded");
    assert!(count_instr(greet, |i| matches!(i, Instr::GGet { .. })) >= 1);
}

#[test]
fn block_values_carry_the_function_and_parameter_chain() {
    let c = compile("A", "A = ( m: b = ( #(1 2) do: [ :x | b value: x ] ) )", &[]);
    let a = class_id(&c, "A");
    let module = c.module_for(a).expect("module");
    // method + block + module
    assert_eq!(module.protos.len(), 3);
    let m = method_proto(&c, "A", "m:");
    assert!(count_instr(m, |i| matches!(i, Instr::UGet { .. })) == 1);
    assert!(has_const_str(m, "_f"));
    assert!(has_const_str(m, "Block"));
    // the block function value arrives via one upvalue on the module frame
    assert_eq!(m.upvals.len(), 1);
    assert!(m.upvals[0].in_parent_stack);
}

#[test]
fn outer_variable_access_indexes_the_parameter_chain() {
    let c = compile("A", "A = ( m: b = ( #(1) do: [ :x | b value: x ] ) )", &[]);
    let a = class_id(&c, "A");
    let module = c.module_for(a).expect("module");
    let block = module
        .protos
        .iter()
        .find(|p| p.name.contains("block"))
        .expect("block proto");
    // reading `b`: block instance at [0], method table at chain level 0,
    // then the variable's slot
    assert!(count_instr(block, |i| matches!(i, Instr::TGetI { tbl: 0, idx: 0, .. })) >= 1);
    assert!(count_instr(block, |i| matches!(i, Instr::TGetI { idx: 1, .. })) >= 1);
}

#[test]
fn array_literals_fill_with_tseti_and_get_the_array_metatable() {
    let c = compile("A", "A = ( m = ( ^ #(1 2 3) ) )", &[]);
    let m = method_proto(&c, "A", "m");
    assert!(has_const_str(m, "Array"));
    assert!(has_const_str(m, "setmetatable"));
    assert_eq!(count_instr(m, |i| matches!(i, Instr::TSetI { idx: 1..=3, .. })), 3);
}

#[test]
fn real_literals_box_into_dbl_tables() {
    let c = compile("A", "A = ( m = ( ^ 3.25 ) )", &[]);
    let m = method_proto(&c, "A", "m");
    assert!(m.consts.iter().any(|k| matches!(k, Const::Num(v) if (*v - 3.25).abs() < f64::EPSILON)));
    assert!(has_const_str(m, "_dbl"));
    assert!(has_const_str(m, "Double"));
}

#[test]
fn assignment_to_a_global_is_an_emit_error() {
    let failure = try_compile("A", "A = ( m = ( system := 1 ) )", &[]).expect_err("must fail");
    assert!(failure.render().contains("cannot emit assignment to a global"), "{}", failure.render());
}

#[test]
fn emitted_frames_stay_within_the_register_file() {
    let c = compile_fixture("Sum.som");
    for module in &c.modules {
        for p in &module.protos {
            assert!(usize::from(p.frame_size) <= 256, "{} overflows", p.name);
        }
    }
}

#[test]
fn disassembly_lists_every_instruction() {
    let c = compile_fixture("Hello.som");
    let run = method_proto(&c, "Hello", "run");
    let text = run.disassemble();
    assert!(text.contains("function run"));
    let listed = text
        .lines()
        .filter(|l| l.trim_start().chars().next().is_some_and(char::is_numeric))
        .count();
    assert_eq!(listed, run.instrs.len());
}
