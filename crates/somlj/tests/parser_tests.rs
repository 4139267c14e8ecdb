use pretty_assertions::assert_eq;
use somlj::{
    Diagnostics, Model,
    ast::{ClassId, Expr, PatternKind},
    parser::{Parser, parse_integer, parse_real},
};

fn parse(source: &str) -> (Model, Diagnostics, Option<ClassId>) {
    let mut model = Model::new();
    let mut diags = Diagnostics::new();
    let sid = model.add_source("Test.som");
    let class = Parser::new(&mut model, &mut diags, source, sid).parse_file();
    (model, diags, class)
}

fn parse_ok(source: &str) -> (Model, ClassId) {
    let (model, diags, class) = parse(source);
    assert!(!diags.has_errors(), "unexpected errors:\n{}", diags.render(&model));
    (model, class.expect("no class parsed"))
}

fn has_error(source: &str, needle: &str) {
    let (model, diags, _) = parse(source);
    let rendered = diags.render(&model);
    assert!(
        diags.has_errors() && rendered.contains(needle),
        "expected error containing {needle:?}, got:\n{rendered}"
    );
}

#[test]
fn missing_super_name_defaults_to_object() {
    let (model, cid) = parse_ok("A = ( )");
    assert_eq!(model.interner.get(model.class(cid).super_name), "Object");
}

#[test]
fn explicit_super_name_is_kept() {
    let (model, cid) = parse_ok("B = Vehicle ( )");
    assert_eq!(model.interner.get(model.class(cid).super_name), "Vehicle");
}

#[test]
fn instance_fields_parse_in_order() {
    let (model, cid) = parse_ok("A = ( | x y z | )");
    let names: Vec<&str> = model
        .class(cid)
        .inst_vars
        .iter()
        .map(|&v| model.interner.get(model.var(v).name))
        .collect();
    assert_eq!(names, vec!["x", "y", "z"]);
}

#[test]
fn separator_splits_instance_and_class_sides() {
    let (model, cid) = parse_ok("A = ( | x | foo = ( ^ x ) ---- | c | bar = ( ^ c ) )");
    let class = model.class(cid);
    assert_eq!(class.inst_vars.len(), 1);
    assert_eq!(class.class_vars.len(), 1);
    let levels: Vec<bool> = class
        .methods
        .iter()
        .map(|&m| model.func(m).method().class_level)
        .collect();
    assert_eq!(levels, vec![false, true]);
}

#[test]
fn method_patterns_and_arity() {
    let (model, cid) = parse_ok("A = ( one = ( ^ 1 ) + other = ( ^ other ) at: i put: v = ( ^ v ) )");
    let info: Vec<(String, PatternKind, u8)> = model
        .class(cid)
        .methods
        .iter()
        .map(|&m| {
            let f = model.func(m);
            let i = f.method();
            (model.interner.get(i.selector).to_owned(), i.pattern, f.num_params)
        })
        .collect();
    assert_eq!(
        info,
        vec![
            ("one".to_owned(), PatternKind::Unary, 0),
            ("+".to_owned(), PatternKind::Binary, 1),
            ("at:put:".to_owned(), PatternKind::Keyword, 2),
        ]
    );
}

#[test]
fn precedence_is_unary_then_binary_then_keyword() {
    let (model, cid) = parse_ok("A = ( m = ( ^ 1 + 2 double max: 3 ) )");
    let m = model.class(cid).methods[0];
    let body = &model.func(m).body;
    let Expr::Return(r) = &body[0] else { panic!("expected return") };
    // keyword send on top
    let Expr::Send(max) = &r.value else { panic!("expected send") };
    assert_eq!(model.interner.get(max.selector), "max:");
    // its receiver is the binary chain
    let Expr::Send(plus) = &max.receiver else { panic!("expected send") };
    assert_eq!(model.interner.get(plus.selector), "+");
    // whose argument is the unary send
    let Expr::Send(double) = &plus.args[0] else { panic!("expected send") };
    assert_eq!(model.interner.get(double.selector), "double");
    let Expr::Integer(two) = &double.receiver else { panic!("expected integer") };
    assert_eq!(two.value, 2);
}

#[test]
fn minus_at_expression_start_folds_into_the_literal() {
    let (model, cid) = parse_ok("A = ( m = ( ^ -5 ) )");
    let m = model.class(cid).methods[0];
    let Expr::Return(r) = &model.func(m).body[0] else { panic!() };
    let Expr::Integer(n) = &r.value else { panic!("expected folded literal") };
    assert_eq!(n.value, -5);
}

#[test]
fn minus_between_expressions_is_a_binary_send() {
    let (model, cid) = parse_ok("A = ( m = ( ^ 1 - 2 ) )");
    let m = model.class(cid).methods[0];
    let Expr::Return(r) = &model.func(m).body[0] else { panic!() };
    let Expr::Send(s) = &r.value else { panic!("expected send") };
    assert_eq!(model.interner.get(s.selector), "-");
}

#[test]
fn parentheses_override_precedence() {
    let (model, cid) = parse_ok("A = ( m = ( ^ (1 max: 2) double ) )");
    let m = model.class(cid).methods[0];
    let Expr::Return(r) = &model.func(m).body[0] else { panic!() };
    let Expr::Send(double) = &r.value else { panic!() };
    assert_eq!(model.interner.get(double.selector), "double");
    let Expr::Send(max) = &double.receiver else { panic!("parenthesized keyword send") };
    assert_eq!(model.interner.get(max.selector), "max:");
}

#[test]
fn assignment_target_must_be_an_identifier() {
    has_error("A = ( m = ( 3 := 4 ) )", "cannot assign");
}

#[test]
fn duplicate_method_is_recoverable_and_first_wins() {
    let (model, diags, class) = parse("A = ( foo = ( ^ 1 ) foo = ( ^ 2 ) )");
    assert!(diags.render(&model).contains("duplicate method name"));
    assert_eq!(model.class(class.expect("class")).methods.len(), 1);
}

#[test]
fn duplicate_method_across_the_separator_is_allowed() {
    let (model, cid) = parse_ok("A = ( foo = ( ^ 1 ) ---- foo = ( ^ 2 ) )");
    assert_eq!(model.class(cid).methods.len(), 2);
}

#[test]
fn duplicate_local_is_recoverable_and_first_wins() {
    let (model, diags, class) = parse("A = ( m = ( | a a | ^ a ) )");
    assert!(diags.render(&model).contains("duplicate local name"));
    let m = model.class(class.expect("class")).methods[0];
    assert_eq!(model.func(m).vars.len(), 1);
}

#[test]
fn empty_block_body_is_rejected() {
    has_error("A = ( m = ( [ ] value ) )", "empty block");
}

#[test]
fn trailing_dot_is_optional() {
    parse_ok("A = ( m = ( 1 println. 2 println ) n = ( 1 println. 2 println. ) )");
}

#[test]
fn return_inside_block_is_non_local() {
    let (model, cid) = parse_ok("A = ( m = ( [ ^ 1 ] value. ^ 2 ) )");
    let m = model.class(cid).methods[0];
    assert!(model.func(m).method().has_non_local_return);
    let Expr::Return(top) = &model.func(m).body[1] else { panic!() };
    assert!(!top.non_local, "method-level return is local");
}

#[test]
fn block_parameters_and_locals() {
    let (model, cid) = parse_ok("A = ( m = ( ^ [ :a :b | | t | t := a + b. t ] ) )");
    let m = model.class(cid).methods[0];
    let Expr::Return(r) = &model.func(m).body[0] else { panic!() };
    let Expr::Block(b) = &r.value else { panic!("expected block") };
    let f = model.func(b.func);
    assert_eq!(f.num_params, 2);
    assert_eq!(f.vars.len(), 3);
    assert_eq!(f.block().syntax_depth, 1);
}

#[test]
fn array_literal_elements() {
    let (model, cid) = parse_ok("A = ( m = ( ^ #(1 -2 foo #bar 'str' $c (3 4)) ) )");
    let m = model.class(cid).methods[0];
    let Expr::Return(r) = &model.func(m).body[0] else { panic!() };
    let Expr::Array(a) = &r.value else { panic!("expected array") };
    assert_eq!(a.elements.len(), 7);
    assert!(matches!(&a.elements[0], Expr::Integer(n) if n.value == 1));
    assert!(matches!(&a.elements[1], Expr::Integer(n) if n.value == -2));
    assert!(matches!(&a.elements[2], Expr::Sym(s) if s.text == "foo"));
    assert!(matches!(&a.elements[3], Expr::Sym(s) if s.text == "bar"));
    assert!(matches!(&a.elements[4], Expr::Str(_)));
    assert!(matches!(&a.elements[5], Expr::Char(c) if c.value == b'c'));
    assert!(matches!(&a.elements[6], Expr::Array(inner) if inner.elements.len() == 2));
}

#[test]
fn keyword_run_in_array_is_one_symbol() {
    let (model, cid) = parse_ok("A = ( m = ( ^ #(at:put:) ) )");
    let m = model.class(cid).methods[0];
    let Expr::Return(r) = &model.func(m).body[0] else { panic!() };
    let Expr::Array(a) = &r.value else { panic!() };
    assert!(matches!(&a.elements[0], Expr::Sym(s) if s.text == "at:put:"));
}

#[test]
fn only_one_class_per_file() {
    has_error("A = ( ) B = ( )", "only one class per file");
}

#[test]
fn primitive_method_bodies() {
    let (model, cid) = parse_ok("A = ( word = primitive m = ( ^ 1 ) )");
    let m = model.class(cid).methods[0];
    assert!(model.func(m).method().primitive);
}

#[test]
fn integer_literal_values_follow_the_radix() {
    assert_eq!(parse_integer("42"), Some(42));
    assert_eq!(parse_integer("-42"), Some(-42));
    assert_eq!(parse_integer("2r101"), Some(5));
    assert_eq!(parse_integer("8r17"), Some(15));
    assert_eq!(parse_integer("16rFF"), Some(255));
    assert_eq!(parse_integer("16r-F"), Some(-15));
    assert_eq!(parse_integer("10r42"), Some(42));
    assert_eq!(parse_integer("7r11"), None);
}

#[test]
fn real_literal_values() {
    assert_eq!(parse_real("3.14"), Some(3.14));
    assert_eq!(parse_real("2e3"), Some(2000.0));
    assert_eq!(parse_real("2.5e-1"), Some(0.25));
    assert_eq!(parse_real("-1.5"), Some(-1.5));
}
