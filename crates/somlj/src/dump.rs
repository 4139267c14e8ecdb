//! Plain-text AST dumps for tooling and debugging.

use std::fmt::Write;

use crate::{
    ast::{ClassId, Expr, FuncId, PatternKind, VarId},
    model::Model,
};

/// Renders a class declaration as an indented tree.
#[must_use]
pub fn dump_class(model: &Model, class: ClassId) -> String {
    let c = model.class(class);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "class {} super {}",
        model.interner.get(c.name),
        model.interner.get(c.super_name)
    );
    for &v in &c.inst_vars {
        let _ = writeln!(out, "  field {} slot {}", var_name(model, v), model.var(v).slot);
    }
    for &v in &c.class_vars {
        let _ = writeln!(
            out,
            "  class-field {} slot {}",
            var_name(model, v),
            model.var(v).slot
        );
    }
    for &m in &c.methods {
        dump_method(model, m, &mut out);
    }
    out
}

fn var_name(model: &Model, v: VarId) -> &str {
    model.interner.get(model.var(v).name)
}

fn dump_method(model: &Model, fid: FuncId, out: &mut String) {
    let f = model.func(fid);
    let info = f.method();
    let kind = match info.pattern {
        PatternKind::Unary => "unary",
        PatternKind::Binary => "binary",
        PatternKind::Keyword => "keyword",
    };
    let mut flags = String::new();
    if info.class_level {
        flags.push_str(" class-side");
    }
    if info.primitive {
        flags.push_str(" primitive");
    }
    if info.has_non_local_return {
        flags.push_str(" nlr");
    }
    if info.has_non_local_return_if_inlined {
        flags.push_str(" nlr-if-inlined");
    }
    let _ = writeln!(
        out,
        "  method {} ({kind}){flags}",
        model.interner.get(info.selector)
    );
    for &v in &f.vars {
        let _ = writeln!(out, "    var {} slot {}", var_name(model, v), model.var(v).slot);
    }
    for e in &f.body {
        dump_expr(model, e, 2, out);
    }
}

fn dump_expr(model: &Model, e: &Expr, level: usize, out: &mut String) {
    let pad = "  ".repeat(level);
    match e {
        Expr::Ident(id) => {
            let _ = writeln!(out, "{pad}ident {}", model.interner.get(id.name));
        }
        Expr::Integer(n) => {
            let _ = writeln!(out, "{pad}integer {}", n.value);
        }
        Expr::Real(n) => {
            let _ = writeln!(out, "{pad}real {}", ryu::Buffer::new().format(n.value));
        }
        Expr::Char(c) => {
            let _ = writeln!(out, "{pad}char '{}'", c.value as char);
        }
        Expr::Str(s) => {
            let _ = writeln!(out, "{pad}string {:?}", s.value);
        }
        Expr::Sym(s) => {
            let _ = writeln!(out, "{pad}symbol #{}", s.text);
        }
        Expr::Array(a) => {
            let _ = writeln!(out, "{pad}array");
            for elem in &a.elements {
                dump_expr(model, elem, level + 1, out);
            }
        }
        Expr::Assign(a) => {
            let _ = writeln!(out, "{pad}assign {}", model.interner.get(a.target.name));
            dump_expr(model, &a.value, level + 1, out);
        }
        Expr::Send(s) => {
            let _ = writeln!(
                out,
                "{pad}send {}{}",
                model.interner.get(s.selector),
                match s.flow {
                    crate::ast::FlowControl::None => "",
                    _ => " (inline)",
                }
            );
            dump_expr(model, &s.receiver, level + 1, out);
            for arg in &s.args {
                dump_expr(model, arg, level + 1, out);
            }
        }
        Expr::Cascade(c) => {
            let _ = writeln!(out, "{pad}cascade");
            for s in &c.sends {
                dump_expr(model, &Expr::Send(Box::new(s.clone())), level + 1, out);
            }
        }
        Expr::Block(b) => {
            let f = model.func(b.func);
            let info = f.block();
            let _ = writeln!(
                out,
                "{pad}block depth {}/{}{}",
                info.syntax_depth,
                info.inlined_depth,
                if info.inline { " inline" } else { "" }
            );
            for &v in &f.vars {
                let _ = writeln!(
                    out,
                    "{pad}  var {} slot {}",
                    var_name(model, v),
                    model.var(v).slot
                );
            }
            for inner in &f.body {
                dump_expr(model, inner, level + 1, out);
            }
        }
        Expr::Return(r) => {
            let mut flags = String::new();
            if r.non_local {
                flags.push_str(" non-local");
            }
            if r.non_local_if_inlined {
                flags.push_str(" non-local-if-inlined");
            }
            let _ = writeln!(out, "{pad}return{flags}");
            dump_expr(model, &r.value, level + 1, out);
        }
    }
}
