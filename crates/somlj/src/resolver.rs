//! Late name binding and inline-expansion analysis.
//!
//! The resolver walks one class with a stack of scopes: block, then method,
//! then class, then the super chain, then globals and the class registry.
//! Along the way it numbers field and local slots, tags reserved keywords,
//! marks up-value sources, detects inlinable control-flow sends, computes
//! inlined nesting depths, and classifies non-local returns.
//!
//! Names that bind to nothing are returned to the loader, which defers them
//! until the super-chain batch is complete and then either binds them to a
//! newly loaded class or reports them.

use crate::{
    ast::{
        ClassId, Expr, FlowControl, FuncId, FuncKind, Ident, Loc, PatternKind, Reserved, Resolved,
        UseKind, VarKind,
    },
    error::{Diagnostics, Phase},
    intern::Symbol,
    model::{Model, SendSite},
};

/// The control-flow selectors whose literal-block arguments expand in place.
const INLINE_SELECTORS: [&str; 5] = ["ifTrue:", "ifFalse:", "ifTrue:ifFalse:", "whileTrue:", "whileFalse:"];

pub struct Resolver<'a> {
    model: &'a mut Model,
    diags: &'a mut Diagnostics,
    class: ClassId,
    /// Innermost-last stack of function scopes (method, then blocks).
    scopes: Vec<FuncId>,
    /// Innermost-last stack of blocks only.
    blocks: Vec<FuncId>,
    method: Option<FuncId>,
    in_assign: bool,
    inline_set: [Symbol; 5],
    unresolved: Vec<(Symbol, Loc)>,
}

impl<'a> Resolver<'a> {
    pub fn new(model: &'a mut Model, diags: &'a mut Diagnostics, class: ClassId) -> Self {
        let inline_set = INLINE_SELECTORS.map(|s| model.interner.intern(s));
        Self {
            model,
            diags,
            class,
            scopes: Vec::new(),
            blocks: Vec::new(),
            method: None,
            in_assign: false,
            inline_set,
            unresolved: Vec::new(),
        }
    }

    /// Resolves one class and returns the names that bound to nothing.
    pub fn resolve_class(mut self) -> Vec<(Symbol, Loc)> {
        let cid = self.class;
        let (inst_start, class_start) = self.model.count_super_vars(cid);
        let class = self.model.class(cid);
        let inst_vars = class.inst_vars.clone();
        let class_vars = class.class_vars.clone();
        let methods = class.methods.clone();
        for (i, v) in inst_vars.into_iter().enumerate() {
            self.model.var_mut(v).slot = u16::try_from(inst_start + i).unwrap_or(u16::MAX);
        }
        for (i, v) in class_vars.into_iter().enumerate() {
            self.model.var_mut(v).slot = u16::try_from(class_start + i).unwrap_or(u16::MAX);
        }
        for m in methods {
            self.resolve_method(m);
        }
        self.unresolved
    }

    fn resolve_method(&mut self, fid: FuncId) {
        self.method = Some(fid);
        let vars = self.model.func(fid).vars.clone();
        for (i, v) in vars.into_iter().enumerate() {
            let var = self.model.var_mut(v);
            var.slot = u16::try_from(i + 1).unwrap_or(u16::MAX);
            var.inlined_owner = Some(fid);
        }
        self.walk_function(fid);
        self.method = None;
    }

    /// Walks a function body with its scope pushed. The body is detached
    /// from the arena for the duration so other arena entries stay
    /// reachable for mutation.
    fn walk_function(&mut self, fid: FuncId) {
        self.scopes.push(fid);
        let mut body = std::mem::take(&mut self.model.func_mut(fid).body);
        for expr in &mut body {
            self.walk_expr(expr);
        }
        self.model.func_mut(fid).body = body;
        // adopted inline-block variables go after the function's own slots
        let inlined = self.model.func(fid).inlined_vars.clone();
        let base = self.model.func(fid).vars.len() + 1;
        for (i, v) in inlined.into_iter().enumerate() {
            self.model.var_mut(v).slot = u16::try_from(base + i).unwrap_or(u16::MAX);
        }
        self.scopes.pop();
    }

    fn walk_expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::Ident(id) => self.resolve_ident(id),
            Expr::Assign(a) => {
                self.in_assign = true;
                self.resolve_ident(&mut a.target);
                self.in_assign = false;
                self.walk_expr(&mut a.value);
                if a.target.reserved.is_some() {
                    self.diags
                        .error(Phase::Resolve, "cannot assign to keyword", Some(a.target.loc));
                }
                match a.value.reserved() {
                    Some(Reserved::Super) => self.diags.error(
                        Phase::Resolve,
                        "cannot assign 'super' to variable",
                        Some(a.target.loc),
                    ),
                    Some(Reserved::Primitive) => self.diags.error(
                        Phase::Resolve,
                        "cannot assign 'primitive' to variable",
                        Some(a.target.loc),
                    ),
                    _ => {}
                }
            }
            Expr::Send(s) => {
                self.tag_flow_control(s);
                for arg in &mut s.args {
                    self.walk_expr(arg);
                }
                self.walk_expr(&mut s.receiver);
                if let Expr::Ident(id) = &mut s.receiver {
                    id.use_kind = UseKind::MsgReceiver;
                }
                if let Some(method) = self.method {
                    self.model
                        .sends_by_selector
                        .entry(s.selector)
                        .or_default()
                        .push(SendSite {
                            class: self.class,
                            method,
                            loc: s.loc,
                        });
                }
            }
            Expr::Cascade(c) => {
                for send in &mut c.sends {
                    for arg in &mut send.args {
                        self.walk_expr(arg);
                    }
                    self.walk_expr(&mut send.receiver);
                }
            }
            Expr::Return(r) => {
                if let Some(&block) = self.blocks.last()
                    && self.model.func(block).block().inlined_depth > 0
                {
                    r.non_local_if_inlined = true;
                    if let Some(m) = self.method {
                        self.model.func_mut(m).method_mut().has_non_local_return_if_inlined = true;
                    }
                }
                self.walk_expr(&mut r.value);
            }
            Expr::Array(a) => {
                for e in &mut a.elements {
                    self.walk_expr(e);
                }
            }
            Expr::Block(b) => self.walk_block(b.func),
            Expr::Integer(_) | Expr::Real(_) | Expr::Char(_) | Expr::Str(_) | Expr::Sym(_) => {}
        }
    }

    /// Tags a send for inline expansion. The tag applies only when the
    /// selector is in the inline set and every argument (plus the receiver,
    /// for the `while*` forms) is a literal block.
    fn tag_flow_control(&mut self, s: &mut crate::ast::MsgSend) {
        if s.pattern != PatternKind::Keyword || !self.inline_set.contains(&s.selector) {
            return;
        }
        let name = self.model.interner.get(s.selector);
        let (flow, needs_block_receiver) = match name {
            "ifTrue:" => (FlowControl::IfTrue, false),
            "ifFalse:" => (FlowControl::IfFalse, false),
            "ifTrue:ifFalse:" => (FlowControl::IfElse, false),
            "whileTrue:" => (FlowControl::WhileTrue, true),
            "whileFalse:" => (FlowControl::WhileFalse, true),
            _ => return,
        };
        if !s.args.iter().all(Expr::is_block) {
            return;
        }
        if needs_block_receiver && !s.receiver.is_block() {
            return;
        }
        s.flow = flow;
        for arg in &s.args {
            if let Expr::Block(b) = arg {
                self.model.func_mut(b.func).block_mut().inline = true;
            }
        }
        if needs_block_receiver && let Expr::Block(b) = &s.receiver {
            self.model.func_mut(b.func).block_mut().inline = true;
        }
    }

    fn walk_block(&mut self, fid: FuncId) {
        let inline = self.model.func(fid).block().inline;
        let depth = match self.blocks.last() {
            Some(&prev) => {
                let pd = self.model.func(prev).block().inlined_depth;
                if inline { pd } else { pd + 1 }
            }
            None => u8::from(!inline),
        };
        self.model.func_mut(fid).block_mut().inlined_depth = depth;

        // inline blocks contribute no frame: their variables live in the
        // nearest non-inline enclosing function's parameter table
        let vars = self.model.func(fid).vars.clone();
        if inline {
            let host = self.nearest_frame();
            for v in vars {
                self.model.var_mut(v).inlined_owner = Some(host);
                self.model.func_mut(host).inlined_vars.push(v);
            }
        } else {
            for (i, v) in vars.into_iter().enumerate() {
                let var = self.model.var_mut(v);
                var.slot = u16::try_from(i + 1).unwrap_or(u16::MAX);
                var.inlined_owner = Some(fid);
            }
        }

        self.blocks.push(fid);
        self.walk_function(fid);
        self.blocks.pop();
    }

    /// The innermost enclosing function that owns a runtime frame.
    fn nearest_frame(&self) -> FuncId {
        for &b in self.blocks.iter().rev() {
            if !self.model.func(b).block().inline {
                return b;
            }
        }
        self.method.expect("block outside a method")
    }

    fn resolve_ident(&mut self, id: &mut Ident) {
        id.use_kind = if self.in_assign {
            UseKind::AssignTarget
        } else {
            UseKind::Rhs
        };

        if let Some(r) = self.model.reserved_of(id.name) {
            id.reserved = Some(r);
            if r == Reserved::SelfRef
                && let Some(m) = self.method
            {
                // `self` always denotes the method's implicit receiver, also
                // inside blocks
                id.target = Some(Resolved::Var(self.model.func(m).method().self_var));
            }
            return;
        }

        // innermost function scope outward
        let innermost = *self.scopes.last().expect("identifier outside any scope");
        let mut hit = None;
        for i in (0..self.scopes.len()).rev() {
            if let Some(v) = self.model.find_var_local(self.scopes[i], id.name) {
                hit = Some(v);
                break;
            }
        }
        if let Some(v) = hit {
            id.target = Some(Resolved::Var(v));
            self.note_var_ref(v, id.loc);
            self.mark_upvalue(v, innermost);
            return;
        }

        if self.in_assign {
            // assignment targets are variables: fields, then the globals
            if let Some(v) = self.model.find_var_in_class(self.class, id.name, true) {
                id.target = Some(Resolved::Var(v));
                self.note_var_ref(v, id.loc);
                return;
            }
            if let Some(v) = self.model.find_global(id.name) {
                id.target = Some(Resolved::Var(v));
                self.note_var_ref(v, id.loc);
                return;
            }
        } else {
            if let Some(v) = self.model.find_var_in_class(self.class, id.name, true) {
                id.target = Some(Resolved::Var(v));
                self.note_var_ref(v, id.loc);
                return;
            }
            if let Some(m) = self.model.find_method_in_class(self.class, id.name, None, true) {
                id.target = Some(Resolved::Method(m));
                return;
            }
            if let Some(v) = self.model.find_global(id.name) {
                id.target = Some(Resolved::Var(v));
                self.note_var_ref(v, id.loc);
                return;
            }
            if let Some(c) = self.model.class_by_name(id.name) {
                id.target = Some(Resolved::Class(c));
                return;
            }
        }

        // likely a class that is not loaded yet; the loader re-checks after
        // the super-chain batch
        self.unresolved.push((id.name, id.loc));
    }

    fn note_var_ref(&mut self, v: crate::ast::VarId, loc: Loc) {
        self.model.var_refs.entry(v).or_default().push(loc);
    }

    /// Marks the owning frame of `v` as an up-value source when the
    /// reference crosses a runtime frame boundary.
    fn mark_upvalue(&mut self, v: crate::ast::VarId, innermost: FuncId) {
        let var = self.model.var(v);
        if !matches!(var.kind, VarKind::Argument | VarKind::Temporary) {
            return;
        }
        let Some(owner) = var.inlined_owner else { return };
        let cur_frame = match &self.model.func(innermost).kind {
            FuncKind::Method(_) => innermost,
            FuncKind::Block(b) if !b.inline => innermost,
            FuncKind::Block(_) => self.nearest_frame(),
        };
        if owner != cur_frame {
            self.model.func_mut(owner).upvalue_source = true;
        }
    }
}

/// Binds identifiers left unresolved during the first pass to classes that
/// the loader has since brought in. Remaining unknowns were already
/// reported.
pub fn rebind_class(model: &mut Model, class: ClassId) {
    let methods = model.class(class).methods.clone();
    for m in methods {
        rebind_function(model, m);
    }
}

fn rebind_function(model: &mut Model, fid: FuncId) {
    let mut body = std::mem::take(&mut model.func_mut(fid).body);
    for expr in &mut body {
        rebind_expr(model, expr);
    }
    model.func_mut(fid).body = body;
}

fn rebind_expr(model: &mut Model, expr: &mut Expr) {
    match expr {
        Expr::Ident(id) => {
            if id.target.is_none()
                && id.reserved.is_none()
                && let Some(c) = model.class_by_name(id.name)
            {
                id.target = Some(Resolved::Class(c));
            }
        }
        Expr::Assign(a) => {
            rebind_expr(model, &mut a.value);
            if a.target.target.is_none()
                && a.target.reserved.is_none()
                && let Some(c) = model.class_by_name(a.target.name)
            {
                a.target.target = Some(Resolved::Class(c));
            }
        }
        Expr::Send(s) => {
            for arg in &mut s.args {
                rebind_expr(model, arg);
            }
            rebind_expr(model, &mut s.receiver);
        }
        Expr::Cascade(c) => {
            for send in &mut c.sends {
                for arg in &mut send.args {
                    rebind_expr(model, arg);
                }
                rebind_expr(model, &mut send.receiver);
            }
        }
        Expr::Return(r) => rebind_expr(model, &mut r.value),
        Expr::Array(a) => {
            for e in &mut a.elements {
                rebind_expr(model, e);
            }
        }
        Expr::Block(b) => rebind_function(model, b.func),
        Expr::Integer(_) | Expr::Real(_) | Expr::Char(_) | Expr::Str(_) | Expr::Sym(_) => {}
    }
}
