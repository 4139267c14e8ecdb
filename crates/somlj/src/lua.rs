//! Lua source emission: the textual equivalent of the bytecode modules.
//!
//! Each class becomes one chunk that defines its non-primitive methods on
//! `class`/`metaclass`. Blocks become `_block(function(...) ... end)`
//! closures over the host's own upvalues; methods with a non-local return
//! run their body under `pcall` so an inner `error(...)` unwinds to the
//! method frame.

use std::fmt::Write;

use crate::{
    ast::{ClassId, Expr, FuncId, Reserved, Resolved, VarKind},
    model::Model,
    selector,
};

/// Transpiles one class to Lua source text.
#[must_use]
pub fn transpile_class(model: &Model, class: ClassId) -> String {
    let name = model.class_name(class);
    let mut w = LuaWriter {
        model,
        out: String::new(),
        level: 0,
    };
    let _ = writeln!(w.out, "-- generated by somlj\n");
    let _ = writeln!(w.out, "local metaclass = {name}");
    let _ = writeln!(w.out, "local class = {name}._class");
    let _ = writeln!(
        w.out,
        "local function _block(f) local t = {{ _f = f }}; setmetatable(t,Block._class); return t end"
    );
    let _ = writeln!(w.out, "local _str = _primitives._newString");
    let _ = writeln!(w.out, "local _sym = _primitives._newSymbol");
    let _ = writeln!(w.out, "local _dbl = _primitives._newDouble");
    let _ = writeln!(w.out, "local _lit = _primitives._newLit");
    let _ = writeln!(w.out, "local _cl = _primitives._checkLoad\n");
    // every instance is convertible to a number
    let _ = writeln!(w.out, "class.__unm = _primitives.__unm\n");

    for &m in &model.class(class).methods {
        if !model.func(m).method().primitive {
            w.method(m);
        }
    }
    w.out
}

/// Escapes a SOM string for a double-quoted Lua literal. SOM escape pairs
/// are preserved as written; only quote and control bytes change form.
#[must_use]
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\u{b}' => out.push_str("\\v"),
            _ => out.push(ch),
        }
    }
    out
}

fn var_name(model: &Model, v: crate::ast::VarId) -> String {
    selector::prefix(model.interner.get(model.var(v).name))
}

struct LuaWriter<'m> {
    model: &'m Model,
    out: String,
    level: usize,
}

impl<'m> LuaWriter<'m> {
    fn ws(&self) -> String {
        "\t".repeat(self.level)
    }

    fn method(&mut self, fid: FuncId) {
        let f = self.model.func(fid);
        let info = f.method();
        let target = if info.class_level { "metaclass" } else { "class" };
        let encoded = selector::encode(self.model.interner.get(info.selector), info.pattern);
        let _ = write!(self.out, "function {target}.{encoded}(self");
        let params = usize::from(f.num_params);
        for &v in f.vars.iter().take(params) {
            let _ = write!(self.out, ",{}", var_name(self.model, v));
        }
        let _ = writeln!(self.out, ")");
        self.level += 1;

        if info.has_non_local_return {
            let pad = self.ws();
            let _ = writeln!(self.out, "{pad}local _nonLocal, _nlRes");
            let _ = writeln!(self.out, "{pad}local _status, _pcallRes = pcall( function()");
            self.level += 1;
        }

        let pad = self.ws();
        for &v in f.vars.iter().skip(params) {
            let _ = writeln!(self.out, "{pad}local {}", var_name(self.model, v));
        }

        for e in &f.body {
            let pad = self.ws();
            let _ = write!(self.out, "{pad}");
            self.expr(e);
            // ';' avoids the "ambiguous syntax" trap between a call and the
            // next statement
            let _ = writeln!(self.out, ";");
        }
        if f.body.last().is_none_or(|e| !e.is_return()) {
            let pad = self.ws();
            let _ = writeln!(self.out, "{pad}return self");
        }

        if info.has_non_local_return {
            self.level -= 1;
            let pad = self.ws();
            let _ = writeln!(self.out, "{pad}end )");
            let _ = writeln!(
                self.out,
                "{pad}if _status then return _pcallRes elseif _nonLocal then return _nlRes else error(_pcallRes) end"
            );
        }

        self.level -= 1;
        let pad = self.ws();
        let _ = writeln!(self.out, "{pad}end\n");
    }

    fn block(&mut self, fid: FuncId) {
        let f = self.model.func(fid);
        let params = usize::from(f.num_params);
        let _ = write!(self.out, "_block( function(");
        for (i, &v) in f.vars.iter().take(params).enumerate() {
            if i != 0 {
                let _ = write!(self.out, ",");
            }
            let _ = write!(self.out, "{}", var_name(self.model, v));
        }
        let _ = writeln!(self.out, ")");
        self.level += 1;
        let pad = self.ws();
        for &v in f.vars.iter().skip(params) {
            let _ = writeln!(self.out, "{pad}local {}", var_name(self.model, v));
        }
        let n = f.body.len();
        for (i, e) in f.body.iter().enumerate() {
            let pad = self.ws();
            let _ = write!(self.out, "{pad}");
            if i == n - 1 {
                // the last expression is the block's value
                match e {
                    Expr::Assign(a) => {
                        self.expr(e);
                        let _ = writeln!(self.out);
                        let pad = self.ws();
                        let _ = write!(self.out, "{pad}return ");
                        self.ident(&a.target);
                    }
                    Expr::Return(_) => self.expr(e),
                    _ => {
                        let _ = write!(self.out, "return ");
                        self.expr(e);
                    }
                }
            } else {
                self.expr(e);
                let _ = write!(self.out, ";");
            }
            let _ = writeln!(self.out);
        }
        self.level -= 1;
        let pad = self.ws();
        let _ = write!(self.out, "{pad}end )");
    }

    /// Lua assignments are statements; lift them into an expression where
    /// SOM uses an assignment's value.
    fn assign_to_expr(&mut self, e: &Expr) {
        if let Expr::Assign(a) = e {
            let _ = write!(self.out, "( function()");
            self.expr(e);
            let _ = write!(self.out, "; return ");
            self.ident(&a.target);
            let _ = write!(self.out, " end )()");
        } else {
            self.expr(e);
        }
    }

    fn expr(&mut self, e: &Expr) {
        match e {
            Expr::Ident(id) => self.ident(id),
            Expr::Integer(n) => {
                let _ = write!(self.out, "({})", n.value);
            }
            Expr::Real(n) => {
                let _ = write!(self.out, "_dbl({})", ryu::Buffer::new().format(n.value));
            }
            Expr::Char(c) => {
                let _ = write!(self.out, "_str(\"{}\")", escape(&(c.value as char).to_string()));
            }
            Expr::Str(s) => {
                let _ = write!(self.out, "_str(\"{}\")", escape(&s.value));
            }
            Expr::Sym(s) => {
                let _ = write!(self.out, "_sym(\"{}\")", escape(&selector::encode_any(&s.text)));
            }
            Expr::Array(a) => {
                let _ = write!(self.out, "_lit({{ ");
                for (i, elem) in a.elements.iter().enumerate() {
                    if i != 0 {
                        let _ = write!(self.out, ", ");
                    }
                    self.expr(elem);
                }
                let _ = write!(self.out, " }})");
            }
            Expr::Assign(a) => {
                self.ident(&a.target);
                let _ = write!(self.out, " = ");
                self.assign_to_expr(&a.value);
            }
            Expr::Send(s) => {
                let to_super = s.receiver.reserved() == Some(Reserved::Super);
                if to_super {
                    let _ = write!(self.out, "self._super.");
                } else {
                    let _ = write!(self.out, "(");
                    self.assign_to_expr(&s.receiver);
                    let _ = write!(self.out, "):");
                }
                let encoded = selector::encode(self.model.interner.get(s.selector), s.pattern);
                let _ = write!(self.out, "{encoded}(");
                if to_super {
                    let _ = write!(self.out, "self");
                }
                for (i, arg) in s.args.iter().enumerate() {
                    if to_super || i != 0 {
                        let _ = write!(self.out, ",");
                    }
                    self.expr(arg);
                }
                let _ = write!(self.out, ")");
            }
            Expr::Cascade(c) => {
                // SOM itself never produces cascades
                for (i, s) in c.sends.iter().enumerate() {
                    if i != 0 {
                        let _ = write!(self.out, "; ");
                    }
                    self.expr(&Expr::Send(Box::new(s.clone())));
                }
            }
            Expr::Block(b) => self.block(b.func),
            Expr::Return(r) => {
                if r.non_local {
                    let _ = write!(self.out, "_nlRes = ");
                    self.assign_to_expr(&r.value);
                    // error(x) would mangle x into a string, hence the local
                    let _ = write!(self.out, "; _nonLocal = true; error(_nlRes)");
                } else {
                    let _ = write!(self.out, "return ");
                    self.assign_to_expr(&r.value);
                }
            }
        }
    }

    fn ident(&mut self, id: &crate::ast::Ident) {
        if let Some(r) = id.reserved {
            match r {
                Reserved::Super => {
                    let _ = write!(self.out, "self._super");
                }
                Reserved::SelfRef => {
                    let _ = write!(self.out, "self");
                }
                _ => {
                    let _ = write!(self.out, "{}", self.model.interner.get(id.name));
                }
            }
            return;
        }
        match id.target {
            Some(Resolved::Var(v)) => {
                let var = self.model.var(v);
                match var.kind {
                    VarKind::Instance | VarKind::Class => {
                        // one-based field indices
                        let _ = write!(self.out, "self[{}]", var.slot + 1);
                    }
                    VarKind::Argument | VarKind::Temporary => {
                        let _ = write!(self.out, "{}", var_name(self.model, v));
                    }
                    VarKind::Global => {
                        let _ = write!(
                            self.out,
                            "_cl(\"{}\")",
                            selector::prefix(self.model.interner.get(var.name))
                        );
                    }
                }
            }
            Some(Resolved::Method(m)) => {
                let info = self.model.func(m).method();
                let encoded = selector::encode(self.model.interner.get(info.selector), info.pattern);
                let _ = write!(self.out, "self.{encoded}");
            }
            Some(Resolved::Class(_)) | None => {
                let _ = write!(
                    self.out,
                    "{}",
                    selector::prefix(self.model.interner.get(id.name))
                );
            }
        }
    }
}
