mod common;

use common::{class_id, compile, compile_fixture};
use pretty_assertions::assert_eq;
use somlj::object::{ObjectMemory, Value};

fn table_of(mem: &ObjectMemory, name: &str) -> (somlj::object::TableId, somlj::object::TableId) {
    let meta = mem.metaclass_table(name).unwrap_or_else(|| panic!("no metaclass {name}"));
    let class = mem.class_table(name).unwrap_or_else(|| panic!("no class table {name}"));
    (class, meta)
}

#[test]
fn class_and_metaclass_are_cross_wired() {
    let c = compile("A", "A = ( )", &[]);
    let (class_t, meta_t) = table_of(&c.memory, "A");
    assert_eq!(c.memory.get_field(class_t, "_meta"), Some(&Value::Table(meta_t)));
    assert_eq!(c.memory.get_field(meta_t, "_class"), Some(&Value::Table(class_t)));
    assert_eq!(
        c.memory.get_field(class_t, "_name"),
        Some(&Value::Str("A".to_owned()))
    );
}

#[test]
fn super_links_mirror_the_hierarchy_on_both_sides() {
    let c = compile("B", "B = A ( )", &[("A", "A = ( )")]);
    let (a_class, a_meta) = table_of(&c.memory, "A");
    let (b_class, b_meta) = table_of(&c.memory, "B");
    assert_eq!(c.memory.get_field(b_class, "_super"), Some(&Value::Table(a_class)));
    assert_eq!(c.memory.get_field(b_meta, "_super"), Some(&Value::Table(a_meta)));
}

#[test]
fn object_is_the_root_and_its_metaclass_supers_to_class() {
    let c = compile("A", "A = ( )", &[]);
    let (object_class, object_meta) = table_of(&c.memory, "Object");
    assert_eq!(c.memory.get_field(object_class, "_super"), None);
    let class_class = c.memory.class_table("Class").expect("Class table");
    assert_eq!(
        c.memory.get_field(object_meta, "_super"),
        Some(&Value::Table(class_class))
    );
}

#[test]
fn every_metaclass_dispatches_through_metaclass() {
    let c = compile("A", "A = ( )", &[]);
    let metaclass_class = c.memory.class_table("Metaclass").expect("Metaclass table");
    for name in ["A", "Object", "Integer", "Metaclass"] {
        let (_, meta) = table_of(&c.memory, name);
        assert_eq!(c.memory.table(meta).meta, Some(metaclass_class), "{name}");
    }
}

#[test]
fn field_lists_extend_the_super_chain() {
    let c = compile(
        "B",
        "B = A ( | y z | )",
        &[("A", "A = ( | x | )")],
    );
    let (b_class, _) = table_of(&c.memory, "B");
    let Some(&Value::Table(fields)) = c.memory.get_field(b_class, "_fields") else {
        panic!("no _fields")
    };
    let names: Vec<&Value> = c.memory.table(fields).arr.iter().collect();
    assert_eq!(
        names,
        vec![
            &Value::Str("x".to_owned()),
            &Value::Str("y".to_owned()),
            &Value::Str("z".to_owned())
        ]
    );
}

#[test]
fn ancestor_methods_are_copied_and_overrides_win() {
    let c = compile(
        "B",
        "B = A ( greet = ( ^ 'B' ) )",
        &[("A", "A = ( greet = ( ^ 'A' ) wave = ( ^ 'hi' ) )")],
    );
    let a = class_id(&c, "A");
    let b = class_id(&c, "B");
    let (a_class, _) = table_of(&c.memory, "A");
    let (b_class, _) = table_of(&c.memory, "B");

    // the inherited method is the same compiled function by reference
    let Some(Value::Method(wave)) = c.memory.get_field(b_class, "wave") else {
        panic!("wave not copied")
    };
    assert_eq!(wave.class, a);
    assert_eq!(c.memory.get_field(a_class, "wave"), c.memory.get_field(b_class, "wave"));

    // the override replaces the copy
    let Some(Value::Method(greet)) = c.memory.get_field(b_class, "greet") else {
        panic!("greet missing")
    };
    assert_eq!(greet.class, b);
}

#[test]
fn object_methods_reach_every_class() {
    let c = compile("A", "A = ( )", &[]);
    let (a_class, _) = table_of(&c.memory, "A");
    assert!(matches!(
        c.memory.get_field(a_class, "println"),
        Some(Value::Method(_))
    ));
    assert!(matches!(
        c.memory.get_field(a_class, "hashcode"),
        Some(Value::Primitive(_))
    ));
}

#[test]
fn primitive_methods_become_primitive_references() {
    let c = compile("A", "A = ( )", &[]);
    let (int_class, _) = table_of(&c.memory, "Integer");
    let Some(Value::Primitive(p)) = c.memory.get_field(int_class, "_0p") else {
        panic!("Integer>>+ should be a primitive")
    };
    assert_eq!(p.holder, "Integer");
    assert_eq!(p.selector, "_0p");
    assert!(!p.class_level);
}

#[test]
fn class_side_methods_land_on_the_metaclass() {
    let c = compile("A", "A = ( ---- make = ( ^ self new ) )", &[]);
    let (a_class, a_meta) = table_of(&c.memory, "A");
    assert!(matches!(c.memory.get_field(a_meta, "make"), Some(Value::Method(_))));
    assert_eq!(c.memory.get_field(a_class, "make"), None);
    // Array>>new: is a class-side primitive inherited onto A's metaclass
    assert!(c.memory.get_field(a_meta, "new_").is_none(), "Array is not an ancestor of A");
}

#[test]
fn literal_values_get_their_class_metatables() {
    let c = compile("A", "A = ( )", &[]);
    assert_eq!(c.memory.nil_meta, c.memory.class_table("Nil"));
    assert_eq!(c.memory.true_meta, c.memory.class_table("True"));
    assert_eq!(c.memory.false_meta, c.memory.class_table("False"));
    assert_eq!(c.memory.integer_meta, c.memory.class_table("Integer"));
    assert!(c.memory.nil_meta.is_some());
}

#[test]
fn system_global_is_an_instance_of_system() {
    let c = compile("A", "A = ( )", &[]);
    let Some(&Value::Table(sys)) = c.memory.globals.get("system") else {
        panic!("no system global")
    };
    assert_eq!(c.memory.table(sys).meta, c.memory.class_table("System"));
}

#[test]
fn empty_class_materializes_wired_to_object() {
    let c = compile("Empty", "Empty = ( )", &[]);
    let (empty_class, empty_meta) = table_of(&c.memory, "Empty");
    let (object_class, object_meta) = table_of(&c.memory, "Object");
    assert_eq!(
        c.memory.get_field(empty_class, "_super"),
        Some(&Value::Table(object_class))
    );
    assert_eq!(
        c.memory.get_field(empty_meta, "_super"),
        Some(&Value::Table(object_meta))
    );
}

#[test]
fn materialization_is_deterministic_and_method_copying_idempotent() {
    let src = "B = A ( greet = ( ^ 'B' ) )";
    let extra = [("A", "A = ( greet = ( ^ 'A' ) wave = ( ^ 'hi' ) )")];
    let c1 = compile("B", src, &extra);
    let c2 = compile("B", src, &extra);
    for name in ["A", "B", "Object"] {
        let (t1, m1) = table_of(&c1.memory, name);
        let (t2, m2) = table_of(&c2.memory, name);
        let keys1: Vec<&String> = c1.memory.table(t1).hash.keys().collect();
        let keys2: Vec<&String> = c2.memory.table(t2).hash.keys().collect();
        assert_eq!(keys1, keys2, "class-table keys of {name}");
        let mkeys1: Vec<&String> = c1.memory.table(m1).hash.keys().collect();
        let mkeys2: Vec<&String> = c2.memory.table(m2).hash.keys().collect();
        assert_eq!(mkeys1, mkeys2, "metaclass keys of {name}");
    }
}

#[test]
fn repeated_materialization_over_the_same_order_is_a_no_op() {
    let c = compile(
        "B",
        "B = A ( greet = ( ^ 'B' ) )",
        &[("A", "A = ( greet = ( ^ 'A' ) )")],
    );
    let mut materializer = somlj::object::Materializer::new(&c.model);
    let mut diags = somlj::Diagnostics::new();
    materializer.instantiate(&c.loading_order, &mut diags);
    let (b_class, _) = {
        let mem = &materializer.memory;
        table_of(mem, "B")
    };
    let before: Vec<String> = materializer.memory.table(b_class).hash.keys().cloned().collect();

    // a second pass over the fully materialized hierarchy changes nothing
    materializer.instantiate(&c.loading_order, &mut diags);
    let after: Vec<String> = materializer.memory.table(b_class).hash.keys().cloned().collect();
    assert_eq!(before, after);
    assert!(!diags.has_errors(), "no duplicate-instantiation errors");
}

#[test]
fn super_dispatch_scenario_compiles_against_the_static_super() {
    let c = compile_fixture("B.som");
    let a = class_id(&c, "A");
    let (b_class, _) = table_of(&c.memory, "B");
    // B's own greet overrides the copied one
    let Some(Value::Method(greet)) = c.memory.get_field(b_class, "greet") else {
        panic!("greet missing")
    };
    assert_eq!(c.model.class_name(greet.class), "B");
    // and A's greet is still reachable through B's super table
    let Some(&Value::Table(b_super)) = c.memory.get_field(b_class, "_super") else {
        panic!("no _super")
    };
    let Some(Value::Method(inherited)) = c.memory.get_field(b_super, "greet") else {
        panic!("A>>greet missing")
    };
    assert_eq!(inherited.class, a);
}
