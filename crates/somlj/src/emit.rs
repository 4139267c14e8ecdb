//! Translation of resolved methods into register-machine modules.
//!
//! Each class compiles to a module: one prototype per non-primitive method,
//! one per non-inline block, and a module function that materializes every
//! function value and stores the methods into the class/metaclass pair.
//!
//! Functions use the parameter-table convention: slot 0 of a running
//! function holds a fresh table `[receiver, p1..pn, l1..lm, adopted…]`.
//! Non-inline blocks are pre-compiled module-level functions; the enclosing
//! function closes over each via a single upvalue. A block value is a table
//! `{ _f = <function> }` that also carries the enclosing parameter tables,
//! one per inlined-depth level, so outer-variable access is
//! `TGETi outer[depth], slot`.
//!
//! A non-local return travels as a second return value: the home method's
//! cookie. Every send checks the second result and propagates, stops, or
//! continues (see `emit_send`).

use ahash::AHashMap;

use crate::{
    ast::{
        ClassId, Expr, FlowControl, FuncId, Loc, MsgSend, Reserved, Resolved, VarId, VarKind,
    },
    bytecode::{
        ClassModule, Const, EmitError, FuncBuilder, Instr, Proto, ProtoId, Upval,
    },
    error::{Diagnostics, Phase},
    model::Model,
    selector,
};

/// Compiles one class into a module. Emission errors are recoverable: the
/// offending method is skipped and reported, the rest of the class emits.
pub fn emit_class(model: &Model, class: ClassId, diags: &mut Diagnostics) -> ClassModule {
    let mut e = ClassEmitter {
        model,
        class,
        protos: Vec::new(),
        module: FuncBuilder::new(
            model.class_name(class).to_owned(),
            0,
            model.class(class).loc,
            model.class(class).end,
        ),
        module_slots: AHashMap::new(),
        methods: Vec::new(),
    };
    e.run(diags);
    let class_name = model.class_name(class).to_owned();
    let main = ProtoId(u32::try_from(e.protos.len()).unwrap_or(u32::MAX));
    let module = e.module.finish(main, Vec::new());
    let mut protos = e.protos;
    protos.push(module);
    ClassModule {
        class,
        class_name,
        protos,
        main,
        methods: e.methods,
    }
}

struct ClassEmitter<'m> {
    model: &'m Model,
    class: ClassId,
    protos: Vec<Proto>,
    module: FuncBuilder,
    /// Module-frame slot holding each compiled function value.
    module_slots: AHashMap<FuncId, u8>,
    methods: Vec<(FuncId, ProtoId)>,
}

impl<'m> ClassEmitter<'m> {
    fn run(&mut self, diags: &mut Diagnostics) {
        let class = self.model.class(self.class);
        let compiled: Vec<FuncId> = class
            .methods
            .iter()
            .copied()
            .filter(|&m| !self.model.func(m).method().primitive)
            .collect();

        // one persistent module slot per function value
        let mut blocks_of: AHashMap<FuncId, Vec<FuncId>> = AHashMap::new();
        for &m in &compiled {
            let mut blocks = Vec::new();
            collect_block_funcs(self.model, m, &mut blocks);
            for &b in &blocks {
                if let Ok(slot) = self.module.alloc_slots(1, class.loc) {
                    self.module_slots.insert(b, slot);
                }
            }
            if let Ok(slot) = self.module.alloc_slots(1, class.loc) {
                self.module_slots.insert(m, slot);
            }
            blocks_of.insert(m, blocks);
        }

        let mut ok: Vec<(FuncId, ProtoId)> = Vec::new();
        for &m in &compiled {
            match self.emit_method_with_blocks(m, &blocks_of[&m]) {
                Ok(pid) => ok.push((m, pid)),
                Err(err) => {
                    diags.error(Phase::Emit, err.message(), Some(err.loc()));
                }
            }
        }
        self.methods = ok;

        if let Err(err) = self.emit_module_tail() {
            diags.error(Phase::Emit, err.message(), Some(err.loc()));
        }
    }

    fn emit_method_with_blocks(
        &mut self,
        method: FuncId,
        blocks: &[FuncId],
    ) -> Result<ProtoId, EmitError> {
        let loc = self.model.func(method).loc;
        for &b in blocks {
            let pid = self.emit_func(b, method)?;
            let slot = self.func_slot(b, loc)?;
            self.module.op(Instr::FNew { dst: slot, func: pid }, self.model.func(b).loc);
        }
        let pid = self.emit_func(method, method)?;
        let slot = self.func_slot(method, loc)?;
        self.module.op(Instr::FNew { dst: slot, func: pid }, loc);
        Ok(pid)
    }

    fn func_slot(&self, func: FuncId, loc: Loc) -> Result<u8, EmitError> {
        self.module_slots
            .get(&func)
            .copied()
            .ok_or(EmitError::UpvalueHomeMissing { loc })
    }

    /// Emits one function (method or block) as a module-level prototype.
    fn emit_func(&mut self, func: FuncId, method: FuncId) -> Result<ProtoId, EmitError> {
        let f = self.model.func(func);
        let name = if f.is_method() {
            self.model.interner.get(f.method().selector).to_owned()
        } else {
            format!("{}-block-{}", self.model.class_name(self.class), func.index())
        };
        let mut ctx = FnCtx {
            model: self.model,
            b: FuncBuilder::new(name, f.num_params + 1, f.loc, f.end),
            func,
            method,
            in_block: !f.is_method(),
            slot_stack: Vec::new(),
        };
        ctx.emit_body()?;

        // resolve function-value upvalues against the module frame
        let mut upvals = Vec::new();
        for uf in ctx.b.upval_funcs() {
            let slot = self.func_slot(uf, f.loc)?;
            upvals.push(Upval {
                slot: u16::from(slot),
                in_parent_stack: true,
                readonly: true,
            });
        }
        let pid = ProtoId(u32::try_from(self.protos.len()).unwrap_or(u32::MAX));
        self.protos.push(ctx.b.finish(pid, upvals));
        Ok(pid)
    }

    /// Stores the compiled methods into the class/metaclass pair.
    fn emit_module_tail(&mut self) -> Result<(), EmitError> {
        let class = self.model.class(self.class);
        let loc = class.end;
        let name = self.model.class_name(self.class).to_owned();

        let meta = self.module.alloc_slots(1, loc)?;
        let name_k = self.module.konst(Const::Str(name), loc)?;
        self.module.op(Instr::GGet { dst: meta, name: name_k }, loc);
        let clst = self.module.alloc_slots(1, loc)?;
        let key = self.module.alloc_slots(1, loc)?;
        let class_k = self.module.konst(Const::Str("_class".to_owned()), loc)?;
        self.module.op(Instr::KSet { dst: key, k: class_k }, loc);
        self.module.op(Instr::TGet { dst: clst, tbl: meta, key }, loc);

        for &(m, _) in &self.methods.clone() {
            let info = self.model.func(m).method();
            let encoded = selector::encode(self.model.interner.get(info.selector), info.pattern);
            let slot = self.func_slot(m, loc)?;
            let k = self.module.konst(Const::Str(encoded), loc)?;
            self.module.op(Instr::KSet { dst: key, k }, loc);
            let tbl = if info.class_level { meta } else { clst };
            self.module.op(Instr::TSet { src: slot, tbl, key }, loc);
        }

        self.module.free_slots(key, 1);
        self.module.free_slots(clst, 1);
        self.module.free_slots(meta, 1);
        self.module.op(Instr::Ret { base: 0, n: 0 }, loc);
        Ok(())
    }
}

/// Collects the non-inline block functions under one method, in pre-order.
fn collect_block_funcs(model: &Model, func: FuncId, out: &mut Vec<FuncId>) {
    fn walk(model: &Model, e: &Expr, out: &mut Vec<FuncId>) {
        match e {
            Expr::Block(b) => {
                if !model.func(b.func).block().inline {
                    out.push(b.func);
                }
                for inner in &model.func(b.func).body {
                    walk(model, inner, out);
                }
            }
            Expr::Assign(a) => {
                walk(model, &a.value, out);
            }
            Expr::Send(s) => {
                walk(model, &s.receiver, out);
                for arg in &s.args {
                    walk(model, arg, out);
                }
            }
            Expr::Cascade(c) => {
                for s in &c.sends {
                    walk(model, &s.receiver, out);
                    for arg in &s.args {
                        walk(model, arg, out);
                    }
                }
            }
            Expr::Return(r) => walk(model, &r.value, out),
            Expr::Array(a) => {
                for e in &a.elements {
                    walk(model, e, out);
                }
            }
            _ => {}
        }
    }
    for e in &model.func(func).body {
        walk(model, e, out);
    }
}

/// Emission context for one function.
struct FnCtx<'m> {
    model: &'m Model,
    b: FuncBuilder,
    /// The function being compiled.
    func: FuncId,
    /// The owning method.
    method: FuncId,
    in_block: bool,
    /// Expression-result slots, innermost last.
    slot_stack: Vec<u8>,
}

impl<'m> FnCtx<'m> {
    fn push(&mut self, slot: u8) {
        self.slot_stack.push(slot);
    }

    fn pop(&mut self) -> u8 {
        self.slot_stack.pop().expect("emitter slot stack underflow")
    }

    fn top(&self) -> u8 {
        *self.slot_stack.last().expect("emitter slot stack underflow")
    }

    fn sell_top(&mut self) {
        let s = self.pop();
        self.b.free_slots(s, 1);
    }

    fn emit_body(&mut self) -> Result<(), EmitError> {
        let f = self.model.func(self.func);
        let loc = f.loc;
        let end = f.end;
        self.create_param_array()?;

        let body = &self.model.func(self.func).body;
        let n = body.len();
        for (i, e) in body.iter().enumerate() {
            self.expr(e)?;
            if self.in_block && i == n - 1 && !e.is_return() {
                // blocks return their last expression
                self.b.op(Instr::Ret { base: self.top(), n: 1 }, end);
            }
            self.sell_top();
        }

        if self.in_block {
            if n == 0 {
                let tmp = self.b.alloc_slots(1, loc)?;
                self.b.op(Instr::KNil { dst: tmp, n: 1 }, loc);
                self.b.op(Instr::Ret { base: tmp, n: 1 }, end);
                self.b.free_slots(tmp, 1);
            }
        } else if n == 0 || !body[n - 1].is_return() {
            // methods without a trailing return answer self
            let tmp = self.b.alloc_slots(1, end)?;
            self.b.op(Instr::TGetI { dst: tmp, tbl: 0, idx: 0 }, end);
            self.b.op(Instr::Ret { base: tmp, n: 1 }, end);
            self.b.free_slots(tmp, 1);
        }
        Ok(())
    }

    /// Moves the incoming receiver and parameters into a fresh parameter
    /// table and parks it in slot 0. The parameter slots become plain
    /// temporaries afterwards.
    fn create_param_array(&mut self) -> Result<(), EmitError> {
        let f = self.model.func(self.func);
        let loc = f.loc;
        let table_len = u16::try_from(f.param_table_len()).unwrap_or(u16::MAX);
        let nparams = usize::from(f.num_params);

        let _receiver = self.b.alloc_slots(1, loc)?; // slot 0
        let params = if nparams > 0 { self.b.alloc_slots(nparams, loc)? } else { 1 };
        let pa = self.b.alloc_slots(1, loc)?;
        self.b.op(Instr::TNew { dst: pa, nhash: 0, narr: table_len }, loc);
        self.b.op(Instr::TSetI { src: 0, tbl: pa, idx: 0 }, loc);
        for i in 0..nparams {
            let idx = u8::try_from(i + 1).unwrap_or(u8::MAX);
            self.b.op(
                Instr::TSetI { src: params + idx - 1, tbl: pa, idx },
                loc,
            );
        }
        self.b.op(Instr::Mov { dst: 0, src: pa }, loc);
        self.b.free_slots(pa, 1);
        if nparams > 0 {
            self.b.free_slots(params, nparams);
        }
        Ok(())
    }

    // --- expressions ------------------------------------------------------

    fn expr(&mut self, e: &Expr) -> Result<(), EmitError> {
        match e {
            Expr::Ident(id) => self.load_ident(id),
            Expr::Integer(n) => {
                let res = self.b.alloc_slots(1, n.loc)?;
                let k = self.b.konst(Const::Int(n.value), n.loc)?;
                self.b.op(Instr::KSet { dst: res, k }, n.loc);
                self.push(res);
                Ok(())
            }
            Expr::Real(n) => {
                let dbl = self.b.alloc_slots(1, n.loc)?;
                let k = self.b.konst(Const::Num(n.value), n.loc)?;
                self.b.op(Instr::KSet { dst: dbl, k }, n.loc);
                let res = self.b.alloc_slots(1, n.loc)?;
                self.b.op(Instr::TNew { dst: res, nhash: 1, narr: 0 }, n.loc);
                self.tset_key(dbl, res, Const::Str("_dbl".to_owned()), n.loc)?;
                self.b.free_slots(dbl, 1);
                self.push(res);
                self.set_metatable(res, "Double", n.loc)
            }
            Expr::Str(s) => self.emit_string(&s.value, "String", s.loc),
            Expr::Char(c) => self.emit_string(&(c.value as char).to_string(), "String", c.loc),
            Expr::Sym(s) => {
                let encoded = selector::encode_any(&s.text);
                self.emit_string(&encoded, "Symbol", s.loc)
            }
            Expr::Array(a) => {
                let res = self.b.alloc_slots(1, a.loc)?;
                self.push(res);
                self.b.op(Instr::TNew { dst: res, nhash: 0, narr: 0 }, a.loc);
                self.set_metatable(res, "Array", a.loc)?;
                for (i, elem) in a.elements.iter().enumerate() {
                    self.expr(elem)?;
                    let src = self.top();
                    self.table_store(src, res, i + 1, elem.loc())?;
                    self.sell_top();
                }
                Ok(())
            }
            Expr::Assign(a) => self.emit_assign(a),
            Expr::Send(s) => match s.flow {
                FlowControl::IfTrue | FlowControl::IfFalse | FlowControl::IfElse => self.inline_if(s),
                FlowControl::WhileTrue | FlowControl::WhileFalse => self.inline_while(s),
                FlowControl::None => self.emit_send(s),
            },
            Expr::Cascade(c) => Err(EmitError::Unsupported {
                what: "cascade",
                loc: c.loc,
            }),
            Expr::Block(b) => self.emit_block_value(b.func, b.loc),
            Expr::Return(r) => {
                self.expr(&r.value)?;
                if self.in_block && r.non_local_if_inlined {
                    // non-local: return the value plus the home cookie
                    let pair = self.b.alloc_slots(2, r.loc)?;
                    self.b.op(Instr::Mov { dst: pair, src: self.top() }, r.loc);
                    let k = self.b.konst(Const::Method(self.method), r.loc)?;
                    self.b.op(Instr::KSet { dst: pair + 1, k }, r.loc);
                    self.b.op(Instr::Ret { base: pair, n: 2 }, r.loc);
                    self.b.free_slots(pair, 2);
                } else {
                    self.b.op(Instr::Ret { base: self.top(), n: 1 }, r.loc);
                }
                // the value slot stays pushed so statements are sold uniformly
                Ok(())
            }
        }
    }

    fn load_ident(&mut self, id: &crate::ast::Ident) -> Result<(), EmitError> {
        let loc = id.loc;
        match id.target {
            Some(Resolved::Class(cid)) => {
                let res = self.b.alloc_slots(1, loc)?;
                let k = self
                    .b
                    .konst(Const::Str(self.model.class_name(cid).to_owned()), loc)?;
                self.b.op(Instr::GGet { dst: res, name: k }, loc);
                self.push(res);
                Ok(())
            }
            Some(Resolved::Var(v)) => self.load_var(v, loc),
            Some(Resolved::Method(_)) => Err(EmitError::Unsupported {
                what: "method-valued identifier",
                loc,
            }),
            None => match id.reserved {
                Some(Reserved::Nil) => self.load_const(Const::Nil, loc),
                Some(Reserved::True) => self.load_const(Const::True, loc),
                Some(Reserved::False) => self.load_const(Const::False, loc),
                Some(Reserved::SelfRef) => {
                    let s = self.self_to_slot(loc)?;
                    self.push(s);
                    Ok(())
                }
                Some(Reserved::Super) => Err(EmitError::Unsupported {
                    what: "'super' outside a receiver position",
                    loc,
                }),
                Some(Reserved::Primitive) => Err(EmitError::Unsupported {
                    what: "'primitive' in expression position",
                    loc,
                }),
                None => Err(EmitError::Unsupported {
                    what: "unresolved identifier",
                    loc,
                }),
            },
        }
    }

    fn load_const(&mut self, k: Const, loc: Loc) -> Result<(), EmitError> {
        let res = self.b.alloc_slots(1, loc)?;
        let k = self.b.konst(k, loc)?;
        self.b.op(Instr::KSet { dst: res, k }, loc);
        self.push(res);
        Ok(())
    }

    fn load_var(&mut self, v: VarId, loc: Loc) -> Result<(), EmitError> {
        let var = self.model.var(v);
        match var.kind {
            VarKind::Instance | VarKind::Class => {
                let this = self.self_to_slot(loc)?;
                let res = self.b.alloc_slots(1, loc)?;
                // object field indices are one-based
                self.table_load(res, this, usize::from(var.slot) + 1, loc)?;
                self.b.free_slots(this, 1);
                self.push(res);
                Ok(())
            }
            VarKind::Argument | VarKind::Temporary => {
                let res = self.b.alloc_slots(1, loc)?;
                if self.crosses_frame(v) {
                    self.outer_param_table(res, v, loc)?;
                    self.b.op(
                        Instr::TGetI {
                            dst: res,
                            tbl: res,
                            idx: u8::try_from(var.slot).unwrap_or(u8::MAX),
                        },
                        loc,
                    );
                } else {
                    self.b.op(
                        Instr::TGetI {
                            dst: res,
                            tbl: 0,
                            idx: u8::try_from(var.slot).unwrap_or(u8::MAX),
                        },
                        loc,
                    );
                }
                self.push(res);
                Ok(())
            }
            VarKind::Global => {
                let res = self.b.alloc_slots(1, loc)?;
                let k = self
                    .b
                    .konst(Const::Str(self.model.interner.get(var.name).to_owned()), loc)?;
                self.b.op(Instr::GGet { dst: res, name: k }, loc);
                self.push(res);
                Ok(())
            }
        }
    }

    /// A local variable reference crosses the frame boundary when its
    /// post-inlining owner is not the function being compiled.
    fn crosses_frame(&self, v: VarId) -> bool {
        self.model.var(v).inlined_owner != Some(self.func)
    }

    /// Fetches the receiver into a fresh slot. Inside a block, slot 0 holds
    /// the block instance; the method's parameter table sits at its index 0
    /// and `self` at index 0 of that table.
    fn self_to_slot(&mut self, loc: Loc) -> Result<u8, EmitError> {
        let s = self.b.alloc_slots(1, loc)?;
        self.b.op(Instr::TGetI { dst: s, tbl: 0, idx: 0 }, loc);
        if self.in_block {
            self.b.op(Instr::TGetI { dst: s, tbl: s, idx: 0 }, loc);
            self.b.op(Instr::TGetI { dst: s, tbl: s, idx: 0 }, loc);
        }
        Ok(s)
    }

    /// Loads the parameter table of the frame owning `v` into `to`.
    fn outer_param_table(&mut self, to: u8, v: VarId, loc: Loc) -> Result<(), EmitError> {
        let owner = self.model.var(v).inlined_owner.ok_or(EmitError::Unsupported {
            what: "variable without a frame",
            loc,
        })?;
        let level = self.model.func(owner).inlined_depth();
        self.b.op(Instr::TGetI { dst: to, tbl: 0, idx: 0 }, loc);
        self.b.op(
            Instr::TGetI { dst: to, tbl: to, idx: level },
            loc,
        );
        Ok(())
    }

    /// `tbl[idx] = src`, taking the fast immediate form when the index fits.
    fn table_store(&mut self, src: u8, tbl: u8, idx: usize, loc: Loc) -> Result<(), EmitError> {
        if let Ok(small) = u8::try_from(idx) {
            self.b.op(Instr::TSetI { src, tbl, idx: small }, loc);
        } else {
            let key = self.b.alloc_slots(1, loc)?;
            let k = self.b.konst(Const::Int(i64::try_from(idx).unwrap_or(i64::MAX)), loc)?;
            self.b.op(Instr::KSet { dst: key, k }, loc);
            self.b.op(Instr::TSet { src, tbl, key }, loc);
            self.b.free_slots(key, 1);
        }
        Ok(())
    }

    fn table_load(&mut self, dst: u8, tbl: u8, idx: usize, loc: Loc) -> Result<(), EmitError> {
        if let Ok(small) = u8::try_from(idx) {
            self.b.op(Instr::TGetI { dst, tbl, idx: small }, loc);
        } else {
            let key = self.b.alloc_slots(1, loc)?;
            let k = self.b.konst(Const::Int(i64::try_from(idx).unwrap_or(i64::MAX)), loc)?;
            self.b.op(Instr::KSet { dst: key, k }, loc);
            self.b.op(Instr::TGet { dst, tbl, key }, loc);
            self.b.free_slots(key, 1);
        }
        Ok(())
    }

    /// `dst = tbl[k]` with a constant key.
    fn tget_key(&mut self, dst: u8, tbl: u8, k: Const, loc: Loc) -> Result<(), EmitError> {
        let key = self.b.alloc_slots(1, loc)?;
        let kid = self.b.konst(k, loc)?;
        self.b.op(Instr::KSet { dst: key, k: kid }, loc);
        self.b.op(Instr::TGet { dst, tbl, key }, loc);
        self.b.free_slots(key, 1);
        Ok(())
    }

    /// `tbl[k] = src` with a constant key.
    fn tset_key(&mut self, src: u8, tbl: u8, k: Const, loc: Loc) -> Result<(), EmitError> {
        let key = self.b.alloc_slots(1, loc)?;
        let kid = self.b.konst(k, loc)?;
        self.b.op(Instr::KSet { dst: key, k: kid }, loc);
        self.b.op(Instr::TSet { src, tbl, key }, loc);
        self.b.free_slots(key, 1);
        Ok(())
    }

    /// `setmetatable(t, <Class>._class)`.
    fn set_metatable(&mut self, t: u8, class_name: &str, loc: Loc) -> Result<(), EmitError> {
        let args = self.b.alloc_slots(3, loc)?;
        let k = self.b.konst(Const::Str("setmetatable".to_owned()), loc)?;
        self.b.op(Instr::GGet { dst: args, name: k }, loc);
        self.b.op(Instr::Mov { dst: args + 1, src: t }, loc);
        let k = self.b.konst(Const::Str(class_name.to_owned()), loc)?;
        self.b.op(Instr::GGet { dst: args + 2, name: k }, loc);
        self.tget_key(args + 2, args + 2, Const::Str("_class".to_owned()), loc)?;
        self.b.op(Instr::Call { base: args, nres: 0, nargs: 2 }, loc);
        self.b.free_slots(args, 3);
        Ok(())
    }

    /// A fresh `{ _str = <bytes> }` with the given class's metatable.
    fn emit_string(&mut self, bytes: &str, class_name: &str, loc: Loc) -> Result<(), EmitError> {
        let str_slot = self.b.alloc_slots(1, loc)?;
        let k = self.b.konst(Const::Str(bytes.to_owned()), loc)?;
        self.b.op(Instr::KSet { dst: str_slot, k }, loc);
        let res = self.b.alloc_slots(1, loc)?;
        self.b.op(Instr::TNew { dst: res, nhash: 1, narr: 0 }, loc);
        self.tset_key(str_slot, res, Const::Str("_str".to_owned()), loc)?;
        self.b.free_slots(str_slot, 1);
        self.push(res);
        self.set_metatable(res, class_name, loc)
    }

    fn emit_assign(&mut self, a: &crate::ast::Assign) -> Result<(), EmitError> {
        self.expr(&a.value)?;
        let loc = a.loc;
        let Some(Resolved::Var(v)) = a.target.target else {
            return Err(EmitError::Unsupported {
                what: "assignment to a non-variable",
                loc,
            });
        };
        let var = self.model.var(v);
        match var.kind {
            VarKind::Instance | VarKind::Class => {
                let this = self.self_to_slot(loc)?;
                let src = self.top();
                self.table_store(src, this, usize::from(var.slot) + 1, loc)?;
                self.b.free_slots(this, 1);
            }
            VarKind::Argument | VarKind::Temporary => {
                let src = self.top();
                if self.crosses_frame(v) {
                    let tmp = self.b.alloc_slots(1, loc)?;
                    self.outer_param_table(tmp, v, loc)?;
                    self.b.op(
                        Instr::TSetI {
                            src,
                            tbl: tmp,
                            idx: u8::try_from(var.slot).unwrap_or(u8::MAX),
                        },
                        loc,
                    );
                    self.b.free_slots(tmp, 1);
                } else {
                    self.b.op(
                        Instr::TSetI {
                            src,
                            tbl: 0,
                            idx: u8::try_from(var.slot).unwrap_or(u8::MAX),
                        },
                        loc,
                    );
                }
            }
            VarKind::Global => {
                return Err(EmitError::Unsupported {
                    what: "assignment to a global",
                    loc,
                });
            }
        }
        // the value stays on the slot stack as the expression's result
        Ok(())
    }

    // --- blocks and control flow -----------------------------------------

    /// Emits an inline block's body in place; the last expression's slot is
    /// the result.
    fn inline_block(&mut self, func: FuncId) -> Result<(), EmitError> {
        let body = &self.model.func(func).body;
        let n = body.len();
        for (i, e) in body.iter().enumerate() {
            self.expr(e)?;
            if i < n - 1 {
                self.sell_top();
            }
        }
        if n == 0 {
            let loc = self.model.func(func).loc;
            let res = self.b.alloc_slots(1, loc)?;
            self.b.op(Instr::KNil { dst: res, n: 1 }, loc);
            self.push(res);
        }
        Ok(())
    }

    fn inline_arm(&mut self, e: &Expr) -> Result<(), EmitError> {
        if let Expr::Block(b) = e {
            self.inline_block(b.func)
        } else {
            self.expr(e)
        }
    }

    fn emit_receiver(&mut self, s: &MsgSend, do_inline: bool) -> Result<(), EmitError> {
        if s.receiver.reserved() == Some(Reserved::Super) {
            // super sends resolve against the statically known super table
            let loc = s.loc;
            let slot = self.b.alloc_slots(1, loc)?;
            let info = self.model.func(s.method).method();
            let class_name = self.model.class_name(self.model.func(s.method).class).to_owned();
            let k = self.b.konst(Const::Str(class_name), loc)?;
            self.b.op(Instr::GGet { dst: slot, name: k }, loc);
            if !info.class_level {
                self.tget_key(slot, slot, Const::Str("_class".to_owned()), loc)?;
            }
            self.tget_key(slot, slot, Const::Str("_super".to_owned()), loc)?;
            self.push(slot);
            Ok(())
        } else if do_inline && s.receiver.is_block() {
            if let Expr::Block(b) = &s.receiver {
                self.inline_block(b.func)
            } else {
                unreachable!()
            }
        } else {
            self.expr(&s.receiver)
        }
    }

    fn inline_if(&mut self, s: &MsgSend) -> Result<(), EmitError> {
        let loc = s.loc;
        self.emit_receiver(s, true)?;
        match s.flow {
            FlowControl::IfTrue | FlowControl::IfElse => {
                self.b.op(Instr::Isf { src: self.top() }, loc);
            }
            FlowControl::IfFalse => {
                self.b.op(Instr::Ist { src: self.top() }, loc);
            }
            _ => unreachable!("inline_if on a non-if send"),
        }
        self.sell_top();
        let skip = self.b.emit_jump(loc);

        self.inline_arm(&s.args[0])?;

        if s.flow == FlowControl::IfElse {
            // the taken branch jumps over the alternative
            let done = self.b.emit_jump(loc);
            self.b.patch_jump(skip);
            let res = self.top();
            self.inline_arm(&s.args[1])?;
            self.b.op(Instr::Mov { dst: res, src: self.top() }, loc);
            self.sell_top();
            self.b.patch_jump(done);
        } else {
            self.b.patch_jump(skip);
        }
        Ok(())
    }

    fn inline_while(&mut self, s: &MsgSend) -> Result<(), EmitError> {
        let loc = s.loc;
        self.b.op(Instr::Loop, loc);
        let start = self.b.cur_pc();
        let res = self.b.alloc_slots(1, loc)?;

        self.emit_receiver(s, true)?;
        match s.flow {
            FlowControl::WhileTrue => self.b.op(Instr::Isf { src: self.top() }, loc),
            FlowControl::WhileFalse => self.b.op(Instr::Ist { src: self.top() }, loc),
            _ => unreachable!("inline_while on a non-while send"),
        }
        self.sell_top();
        let exit = self.b.emit_jump(loc);

        self.inline_arm(&s.args[0])?;
        self.b.op(Instr::Mov { dst: res, src: self.top() }, loc);
        self.sell_top();
        self.b.jump_back(start, loc);

        self.b.patch_jump(exit);
        self.push(res);
        Ok(())
    }

    fn emit_send(&mut self, s: &MsgSend) -> Result<(), EmitError> {
        let loc = s.loc;
        let is_super = s.receiver.reserved() == Some(Reserved::Super);
        self.emit_receiver(s, false)?;

        let nargs = s.args.len();
        let window = u8::try_from(nargs + 2).map_err(|_| EmitError::SlotPoolExhausted { loc })?;
        let base = self.b.alloc_slots(usize::from(window), loc)?;

        // fetch the method from the receiver's table
        let encoded = selector::encode(self.model.interner.get(s.selector), s.pattern);
        self.tget_key(base, self.top(), Const::Str(encoded), loc)?;
        if is_super {
            // super sends still pass self
            let this = self.self_to_slot(loc)?;
            self.b.op(Instr::Mov { dst: base + 1, src: this }, loc);
            self.b.free_slots(this, 1);
        } else {
            self.b.op(Instr::Mov { dst: base + 1, src: self.top() }, loc);
        }
        self.sell_top();
        for (i, arg) in s.args.iter().enumerate() {
            self.expr(arg)?;
            let dst = base + 2 + u8::try_from(i).unwrap_or(u8::MAX);
            self.b.op(Instr::Mov { dst, src: self.top() }, loc);
            self.sell_top();
        }
        self.b.op(
            Instr::Call {
                base,
                nres: 2,
                nargs: u8::try_from(nargs + 1).unwrap_or(u8::MAX),
            },
            loc,
        );

        // the second result is the non-local-return cookie
        let home = self.model.func(s.method).method().has_non_local_return_if_inlined;
        if self.in_block || !home {
            // inside blocks, and in methods that own no non-local return,
            // a present cookie passes straight through
            self.b.op(Instr::Isf { src: base + 1 }, loc);
            let normal = self.b.emit_jump(loc);
            self.b.op(Instr::Ret { base, n: 2 }, loc);
            self.b.patch_jump(normal);
        } else {
            // method level in the cookie's potential home
            self.b.op(Instr::Isf { src: base + 1 }, loc);
            let normal = self.b.emit_jump(loc);
            let tmp = self.b.alloc_slots(1, loc)?;
            let k = self.b.konst(Const::Method(self.method), loc)?;
            self.b.op(Instr::KSet { dst: tmp, k }, loc);
            self.b.op(Instr::IsEq { a: base + 1, b: tmp }, loc);
            let reached_home = self.b.emit_jump(loc);
            self.b.op(Instr::Ret { base, n: 2 }, loc);
            self.b.patch_jump(reached_home);
            self.b.op(Instr::Ret { base, n: 1 }, loc);
            self.b.free_slots(tmp, 1);
            self.b.patch_jump(normal);
        }

        let res = self.b.alloc_slots(1, loc)?;
        self.push(res);
        self.b.op(Instr::Mov { dst: res, src: base }, loc);
        self.b.free_slots(base, usize::from(window));
        Ok(())
    }

    /// Materializes a block value: `{ _f = <function> }` carrying the
    /// enclosing parameter-table chain, with `Block` as its metatable.
    fn emit_block_value(&mut self, func: FuncId, loc: Loc) -> Result<(), EmitError> {
        let depth = self.model.func(func).block().inlined_depth;

        let inst = self.b.alloc_slots(1, loc)?;
        self.push(inst);
        let bf = self.b.alloc_slots(1, loc)?;
        let uv = self.b.upval_index(func);
        self.b.op(Instr::UGet { dst: bf, upval: uv }, loc);

        self.b.op(
            Instr::TNew { dst: inst, nhash: 1, narr: u16::from(depth) },
            loc,
        );
        self.tset_key(bf, inst, Const::Str("_f".to_owned()), loc)?;

        if self.in_block {
            // copy the outer chain from the running block's instance, then
            // add this frame's parameter table
            let outer = self.b.alloc_slots(1, loc)?;
            self.b.op(Instr::TGetI { dst: outer, tbl: 0, idx: 0 }, loc);
            let tmp = self.b.alloc_slots(1, loc)?;
            for i in 0..depth.saturating_sub(1) {
                self.b.op(Instr::TGetI { dst: tmp, tbl: outer, idx: i }, loc);
                self.b.op(Instr::TSetI { src: tmp, tbl: inst, idx: i }, loc);
            }
            self.b.op(
                Instr::TSetI { src: 0, tbl: inst, idx: depth - 1 },
                loc,
            );
            self.b.free_slots(tmp, 1);
            self.b.free_slots(outer, 1);
        } else {
            // at method level the chain is just the method's parameter table
            self.b.op(Instr::TSetI { src: 0, tbl: inst, idx: 0 }, loc);
        }

        self.b.free_slots(bf, 1);
        self.set_metatable(inst, "Block", loc)
    }
}
