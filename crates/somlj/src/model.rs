//! The cross-class registry: arenas, the intern pool, the global scope, and
//! the lookup rules shared by the resolver and the object-model builder.
//!
//! The registry maps each class name to exactly one class; re-declarations
//! are reported by the loader and the first definition wins. Iteration
//! orders are insertion orders, so a given set of inputs always produces the
//! same traversals.

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    ast::{
        Class, ClassId, FuncId, Function, Loc, Reserved, SourceId, VarId, VarKind, VarOwner, Variable,
    },
    intern::{Interner, Symbol, WellKnown},
};

type Map<K, V> = IndexMap<K, V, ahash::RandomState>;

/// Where a message send occurs, for the selector cross-reference.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct SendSite {
    pub class: ClassId,
    pub method: FuncId,
    pub loc: Loc,
}

#[derive(Debug)]
pub struct Model {
    pub interner: Interner,
    sources: Vec<String>,
    classes: Vec<Class>,
    funcs: Vec<Function>,
    vars: Vec<Variable>,
    /// Class name to class, first declaration wins, insertion-ordered.
    pub registry: Map<Symbol, ClassId>,
    /// The predeclared globals; currently just `system`.
    pub globals: Vec<VarId>,
    reserved: AHashMap<Symbol, Reserved>,
    /// Selector to send sites, filled during resolution.
    pub sends_by_selector: AHashMap<Symbol, Vec<SendSite>>,
    /// Variable to reference sites, filled during resolution.
    pub var_refs: AHashMap<VarId, Vec<Loc>>,
    /// Method name to defining methods, filled as classes register.
    pub methods_by_name: AHashMap<Symbol, Vec<FuncId>>,
}

impl Model {
    #[must_use]
    pub fn new() -> Self {
        let interner = Interner::new();
        let wk = *interner.wk();
        let mut reserved = AHashMap::new();
        reserved.insert(wk.nil, Reserved::Nil);
        reserved.insert(wk.true_, Reserved::True);
        reserved.insert(wk.false_, Reserved::False);
        reserved.insert(wk.self_, Reserved::SelfRef);
        reserved.insert(wk.super_, Reserved::Super);
        reserved.insert(wk.primitive, Reserved::Primitive);

        let mut model = Self {
            interner,
            sources: Vec::new(),
            classes: Vec::new(),
            funcs: Vec::new(),
            vars: Vec::new(),
            registry: Map::default(),
            globals: Vec::new(),
            reserved,
            sends_by_selector: AHashMap::new(),
            var_refs: AHashMap::new(),
            methods_by_name: AHashMap::new(),
        };
        let system = model.alloc_var(Variable {
            name: wk.system,
            kind: VarKind::Global,
            slot: 0,
            owner: VarOwner::Global,
            inlined_owner: None,
            loc: Loc::default(),
        });
        model.globals.push(system);
        model
    }

    #[inline]
    #[must_use]
    pub fn wk(&self) -> &WellKnown {
        self.interner.wk()
    }

    pub fn add_source(&mut self, path: impl Into<String>) -> SourceId {
        let id = SourceId(u32::try_from(self.sources.len()).unwrap_or(u32::MAX));
        self.sources.push(path.into());
        id
    }

    #[must_use]
    pub fn source_path(&self, id: SourceId) -> &str {
        self.sources.get(id.index()).map_or("<unknown>", String::as_str)
    }

    // --- arenas -----------------------------------------------------------

    pub fn alloc_class(&mut self, class: Class) -> ClassId {
        let id = ClassId(u32::try_from(self.classes.len()).unwrap_or(u32::MAX));
        self.classes.push(class);
        id
    }

    pub fn alloc_func(&mut self, func: Function) -> FuncId {
        let id = FuncId(u32::try_from(self.funcs.len()).unwrap_or(u32::MAX));
        self.funcs.push(func);
        id
    }

    pub fn alloc_var(&mut self, var: Variable) -> VarId {
        let id = VarId(u32::try_from(self.vars.len()).unwrap_or(u32::MAX));
        self.vars.push(var);
        id
    }

    #[must_use]
    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.index()]
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut Class {
        &mut self.classes[id.index()]
    }

    #[must_use]
    pub fn func(&self, id: FuncId) -> &Function {
        &self.funcs[id.index()]
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.funcs[id.index()]
    }

    #[must_use]
    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.index()]
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.vars[id.index()]
    }

    #[must_use]
    pub fn class_name(&self, id: ClassId) -> &str {
        self.interner.get(self.class(id).name)
    }

    // --- registry ---------------------------------------------------------

    /// Registers a parsed class. On a name collision the first declaration
    /// wins and the existing id comes back as `Err`.
    pub fn register_class(&mut self, id: ClassId) -> Result<(), ClassId> {
        let name = self.class(id).name;
        if let Some(&existing) = self.registry.get(&name) {
            return Err(existing);
        }
        self.registry.insert(name, id);
        for &m in &self.classes[id.index()].methods.clone() {
            let sel = self.func(m).method().selector;
            self.methods_by_name.entry(sel).or_default().push(m);
        }
        Ok(())
    }

    #[must_use]
    pub fn class_by_name(&self, name: Symbol) -> Option<ClassId> {
        self.registry.get(&name).copied()
    }

    #[must_use]
    pub fn reserved_of(&self, name: Symbol) -> Option<Reserved> {
        self.reserved.get(&name).copied()
    }

    /// The predeclared global with this name, if any.
    #[must_use]
    pub fn find_global(&self, name: Symbol) -> Option<VarId> {
        self.globals.iter().copied().find(|&v| self.var(v).name == name)
    }

    // --- scope lookup -----------------------------------------------------

    /// Finds a variable declared directly in one function scope. For methods
    /// this includes the implicit `self`.
    #[must_use]
    pub fn find_var_local(&self, func: FuncId, name: Symbol) -> Option<VarId> {
        let f = self.func(func);
        if let Some(&v) = f.vars.iter().find(|&&v| self.var(v).name == name) {
            return Some(v);
        }
        if f.is_method() && name == self.wk().self_ {
            return Some(f.method().self_var);
        }
        None
    }

    /// Finds a field in a class, walking the super chain when `recursive`.
    /// When an instance-level and a class-level field share a name, the
    /// instance-level one is preferred.
    #[must_use]
    pub fn find_var_in_class(&self, class: ClassId, name: Symbol, recursive: bool) -> Option<VarId> {
        let mut cur = Some(class);
        while let Some(cid) = cur {
            let c = self.class(cid);
            if let Some(&v) = c.inst_vars.iter().find(|&&v| self.var(v).name == name) {
                return Some(v);
            }
            if let Some(&v) = c.class_vars.iter().find(|&&v| self.var(v).name == name) {
                return Some(v);
            }
            if !recursive {
                return None;
            }
            cur = c.super_class;
        }
        None
    }

    /// Finds a method by selector, walking the super chain when `recursive`.
    /// `class_level` of `None` matches either side.
    #[must_use]
    pub fn find_method_in_class(
        &self,
        class: ClassId,
        selector: Symbol,
        class_level: Option<bool>,
        recursive: bool,
    ) -> Option<FuncId> {
        let mut cur = Some(class);
        while let Some(cid) = cur {
            let c = self.class(cid);
            for &m in &c.methods {
                let info = self.func(m).method();
                if info.selector == selector && class_level.is_none_or(|cl| cl == info.class_level) {
                    return Some(m);
                }
            }
            if !recursive {
                return None;
            }
            cur = c.super_class;
        }
        None
    }

    /// Instance- and class-variable counts summed over the super chain,
    /// excluding `class` itself. These are the slot-numbering start indices.
    #[must_use]
    pub fn count_super_vars(&self, class: ClassId) -> (usize, usize) {
        let mut res = (0, 0);
        let mut cur = self.class(class).super_class;
        while let Some(cid) = cur {
            let c = self.class(cid);
            res.0 += c.inst_vars.len();
            res.1 += c.class_vars.len();
            cur = c.super_class;
        }
        res
    }

    /// The super chain of a class, nearest first, excluding the class itself.
    #[must_use]
    pub fn super_chain(&self, class: ClassId) -> Vec<ClassId> {
        let mut res = Vec::new();
        let mut cur = self.class(class).super_class;
        while let Some(cid) = cur {
            res.push(cid);
            cur = self.class(cid).super_class;
        }
        res
    }

    /// Finds the innermost expression of a method covering a byte offset.
    /// A plain searching traversal that returns on the first hit.
    #[must_use]
    pub fn find_expr_at(&self, method: FuncId, pos: u32) -> Option<&crate::ast::Expr> {
        fn covers(loc: Loc, pos: u32) -> bool {
            pos >= loc.pos && pos < loc.pos + u32::from(loc.len.max(1))
        }
        fn search<'a>(model: &'a Model, e: &'a crate::ast::Expr, pos: u32) -> Option<&'a crate::ast::Expr> {
            use crate::ast::Expr;
            let inner = match e {
                Expr::Assign(a) => search(model, &a.value, pos),
                Expr::Send(s) => search(model, &s.receiver, pos)
                    .or_else(|| s.args.iter().find_map(|a| search(model, a, pos))),
                Expr::Cascade(c) => c.sends.iter().find_map(|s| {
                    search(model, &s.receiver, pos).or_else(|| s.args.iter().find_map(|a| search(model, a, pos)))
                }),
                Expr::Return(r) => search(model, &r.value, pos),
                Expr::Array(a) => a.elements.iter().find_map(|el| search(model, el, pos)),
                Expr::Block(b) => model
                    .func(b.func)
                    .body
                    .iter()
                    .find_map(|el| search(model, el, pos)),
                _ => None,
            };
            inner.or_else(|| covers(e.loc(), pos).then_some(e))
        }
        self.func(method)
            .body
            .iter()
            .find_map(|e| search(self, e, pos))
    }

    /// Sorts every class's subclass list by class name.
    pub fn sort_subclasses(&mut self) {
        let names: Vec<Symbol> = self.classes.iter().map(|c| c.name).collect();
        let interner = &self.interner;
        for class in &mut self.classes {
            class
                .subclasses
                .sort_by(|a, b| interner.get(names[a.index()]).cmp(interner.get(names[b.index()])));
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}
