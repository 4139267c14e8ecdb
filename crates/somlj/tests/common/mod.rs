//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use somlj::{
    Compilation, CompileFailure, CompileOptions, Compiler, Model,
    ast::{ClassId, Expr, FlowControl, FuncId, MsgSend},
    bytecode::Proto,
};

/// Compiles an in-memory main class, with optional extra classes available
/// by name, and asserts success.
pub fn compile(main: &str, source: &str, extra: &[(&str, &str)]) -> Compilation {
    match try_compile(main, source, extra) {
        Ok(c) => c,
        Err(failure) => panic!("compilation failed:\n{}", failure.render()),
    }
}

pub fn try_compile(
    main: &str,
    source: &str,
    extra: &[(&str, &str)],
) -> Result<Compilation, CompileFailure> {
    let mut compiler = Compiler::new(CompileOptions::new());
    for (name, src) in extra {
        compiler.add_virtual_source(*name, *src);
    }
    compiler.compile_source(main, source)
}

/// Compiles a fixture file from `tests/fixtures/` through the filesystem
/// loader.
pub fn compile_fixture(name: &str) -> Compilation {
    let path = fixture_path(name);
    match Compiler::new(CompileOptions::new()).compile(&path) {
        Ok(c) => c,
        Err(failure) => panic!("compilation of {name} failed:\n{}", failure.render()),
    }
}

pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

pub fn class_id(c: &Compilation, name: &str) -> ClassId {
    let sym = c.model.interner.lookup(name).unwrap_or_else(|| panic!("class {name} not interned"));
    c.model
        .class_by_name(sym)
        .unwrap_or_else(|| panic!("class {name} not registered"))
}

pub fn method_id(c: &Compilation, class: &str, selector: &str) -> FuncId {
    let cid = class_id(c, class);
    let sym = c
        .model
        .interner
        .lookup(selector)
        .unwrap_or_else(|| panic!("selector {selector} not interned"));
    c.model
        .find_method_in_class(cid, sym, None, false)
        .unwrap_or_else(|| panic!("method {class}>>{selector} not found"))
}

pub fn method_proto<'a>(c: &'a Compilation, class: &str, selector: &str) -> &'a Proto {
    let cid = class_id(c, class);
    let m = method_id(c, class, selector);
    c.module_for(cid)
        .unwrap_or_else(|| panic!("no module for {class}"))
        .method_proto(m)
        .unwrap_or_else(|| panic!("no proto for {class}>>{selector}"))
}

/// All message sends under a function, depth-first, blocks included.
pub fn sends_of(model: &Model, func: FuncId) -> Vec<MsgSend> {
    fn walk(model: &Model, e: &Expr, out: &mut Vec<MsgSend>) {
        match e {
            Expr::Send(s) => {
                out.push((**s).clone());
                walk(model, &s.receiver, out);
                for a in &s.args {
                    walk(model, a, out);
                }
            }
            Expr::Assign(a) => walk(model, &a.value, out),
            Expr::Return(r) => walk(model, &r.value, out),
            Expr::Array(a) => {
                for e in &a.elements {
                    walk(model, e, out);
                }
            }
            Expr::Block(b) => {
                for e in &model.func(b.func).body {
                    walk(model, e, out);
                }
            }
            Expr::Cascade(c) => {
                for s in &c.sends {
                    out.push(s.clone());
                }
            }
            _ => {}
        }
    }
    let mut out = Vec::new();
    for e in &model.func(func).body {
        walk(model, e, &mut out);
    }
    out
}

/// The first send of a given selector under a function.
pub fn send_named(c: &Compilation, func: FuncId, selector: &str) -> MsgSend {
    sends_of(&c.model, func)
        .into_iter()
        .find(|s| c.model.interner.get(s.selector) == selector)
        .unwrap_or_else(|| panic!("no send of {selector}"))
}

pub fn flow_of(c: &Compilation, func: FuncId, selector: &str) -> FlowControl {
    send_named(c, func, selector).flow
}
