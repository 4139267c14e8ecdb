//! Object-model materialization: the runtime's class/metaclass table
//! layout, inheritance wiring, and method copying.
//!
//! Each SOM class becomes two tables. The metaclass table is reachable as a
//! global under the class name; the class table hangs off its `_class`
//! field. `_super` mirrors the hierarchy on both sides, `Metaclass`'s class
//! table is the metatable of every metaclass, and all ancestor methods are
//! copied flat into each table so dispatch never walks the chain at call
//! time. Field names ride along in `_fields`, continuing the super chain's
//! numbering.
//!
//! Method values are references to compiled functions (class and function
//! id), so materialization does not depend on emission having run.

use indexmap::IndexMap;

use crate::{
    ast::{ClassId, FuncId},
    error::{Diagnostics, Phase},
    model::Model,
    selector,
};

type Map<V> = IndexMap<String, V, ahash::RandomState>;

/// Index into the table arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TableId(u32);

impl TableId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Reference to a compiled method function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MethodRef {
    pub class: ClassId,
    pub func: FuncId,
}

/// Reference to a host primitive, bound by the VM at startup.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PrimitiveRef {
    pub holder: String,
    /// Encoded selector; class-level primitives are looked up under a `^`
    /// prefix on the host side.
    pub selector: String,
    pub class_level: bool,
}

/// A runtime value in the materialized object model.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    Table(TableId),
    Method(MethodRef),
    Primitive(PrimitiveRef),
}

/// A table: ordered hash part, array part, optional metatable.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Table {
    pub hash: Map<Value>,
    pub arr: Vec<Value>,
    pub meta: Option<TableId>,
}

/// The arena of tables plus the globals.
#[derive(Debug, Default)]
pub struct ObjectMemory {
    tables: Vec<Table>,
    pub globals: Map<Value>,
    /// Metatables attached to the literal values `nil`, `true`, `false`, `0`.
    pub nil_meta: Option<TableId>,
    pub true_meta: Option<TableId>,
    pub false_meta: Option<TableId>,
    pub integer_meta: Option<TableId>,
}

impl ObjectMemory {
    pub fn new_table(&mut self) -> TableId {
        let id = TableId(u32::try_from(self.tables.len()).unwrap_or(u32::MAX));
        self.tables.push(Table::default());
        id
    }

    #[must_use]
    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id.index()]
    }

    pub fn table_mut(&mut self, id: TableId) -> &mut Table {
        &mut self.tables[id.index()]
    }

    pub fn set_field(&mut self, id: TableId, name: &str, value: Value) {
        self.table_mut(id).hash.insert(name.to_owned(), value);
    }

    #[must_use]
    pub fn get_field(&self, id: TableId, name: &str) -> Option<&Value> {
        self.table(id).hash.get(name)
    }

    /// The metaclass table registered under a class name.
    #[must_use]
    pub fn metaclass_table(&self, name: &str) -> Option<TableId> {
        match self.globals.get(name) {
            Some(Value::Table(t)) => Some(*t),
            _ => None,
        }
    }

    /// The class table of a class name (`<name>._class`).
    #[must_use]
    pub fn class_table(&self, name: &str) -> Option<TableId> {
        let meta = self.metaclass_table(name)?;
        match self.get_field(meta, "_class") {
            Some(Value::Table(t)) => Some(*t),
            _ => None,
        }
    }
}

/// Builds class and metaclass tables for classes in loading order.
pub struct Materializer<'m> {
    model: &'m Model,
    pub memory: ObjectMemory,
    instantiated: usize,
    methods_attached: usize,
}

impl<'m> Materializer<'m> {
    #[must_use]
    pub fn new(model: &'m Model) -> Self {
        Self {
            model,
            memory: ObjectMemory::default(),
            instantiated: 0,
            methods_attached: 0,
        }
    }

    pub fn into_memory(self) -> ObjectMemory {
        self.memory
    }

    /// Materializes every class not yet done, in loading order: tables
    /// first, then root wiring on the first run, then method copying.
    pub fn instantiate(&mut self, order: &[ClassId], diags: &mut Diagnostics) {
        let first_run = self.instantiated == 0;
        while self.instantiated < order.len() {
            let cid = order[self.instantiated];
            self.instantiated += 1;
            self.instantiate_class(cid, diags);
        }
        if first_run {
            self.wire_roots();
        }
        while self.methods_attached < order.len() {
            let cid = order[self.methods_attached];
            self.methods_attached += 1;
            self.attach_methods(cid);
        }
    }

    fn instantiate_class(&mut self, cid: ClassId, diags: &mut Diagnostics) {
        let class = self.model.class(cid);
        let name = self.model.interner.get(class.name).to_owned();
        if self.memory.globals.contains_key(&name) {
            diags.error(
                Phase::Load,
                format!("class '{name}' already instantiated"),
                Some(class.loc),
            );
            return;
        }

        let class_t = self.memory.new_table();
        let meta_t = self.memory.new_table();

        self.memory.set_field(class_t, "_meta", Value::Table(meta_t));
        self.memory.set_field(class_t, "_name", Value::Str(name.clone()));
        self.memory.set_field(meta_t, "_class", Value::Table(class_t));
        // instances reach their methods through the class table
        self.memory.set_field(class_t, "__index", Value::Table(class_t));
        self.memory.globals.insert(name, Value::Table(meta_t));

        if class.super_name != self.model.wk().nil {
            let super_name = self.model.interner.get(class.super_name);
            if let Some(super_meta) = self.memory.metaclass_table(super_name) {
                let super_class = self.memory.class_table(super_name);
                self.memory.set_field(meta_t, "_super", Value::Table(super_meta));
                if let Some(sc) = super_class {
                    self.memory.set_field(class_t, "_super", Value::Table(sc));
                }
            }

            let inst_fields = self.field_names(cid, false);
            let inst_fields = self.alloc_string_array(&inst_fields);
            self.memory.set_field(class_t, "_fields", Value::Table(inst_fields));
            let class_fields = self.field_names(cid, true);
            let class_fields = self.alloc_string_array(&class_fields);
            self.memory.set_field(meta_t, "_fields", Value::Table(class_fields));
        }
    }

    fn alloc_string_array(&mut self, names: &[String]) -> TableId {
        let t = self.memory.new_table();
        self.memory.table_mut(t).arr = names.iter().map(|n| Value::Str(n.clone())).collect();
        t
    }

    /// Field names over the whole super chain, outermost ancestor first.
    fn field_names(&self, cid: ClassId, class_level: bool) -> Vec<String> {
        let mut chain = self.model.super_chain(cid);
        chain.reverse();
        chain.push(cid);
        let mut out = Vec::new();
        for c in chain {
            let class = self.model.class(c);
            let vars = if class_level { &class.class_vars } else { &class.inst_vars };
            for &v in vars {
                out.push(self.model.interner.get(self.model.var(v).name).to_owned());
            }
        }
        out
    }

    /// One-time wiring once the root classes exist: `Object` has no super,
    /// its metaclass's super is `Class`'s class table, and the literal
    /// values get their metatables.
    fn wire_roots(&mut self) {
        if let (Some(object_meta), Some(class_class)) = (
            self.memory.metaclass_table("Object"),
            self.memory.class_table("Class"),
        ) {
            self.memory
                .set_field(object_meta, "_super", Value::Table(class_class));
        }
        self.memory.nil_meta = self.memory.class_table("Nil");
        self.memory.true_meta = self.memory.class_table("True");
        self.memory.false_meta = self.memory.class_table("False");
        self.memory.integer_meta = self.memory.class_table("Integer");

        // the `system` global is an instance of System
        if let Some(system_class) = self.memory.class_table("System") {
            let sys = self.memory.new_table();
            self.memory.table_mut(sys).meta = Some(system_class);
            self.memory.globals.insert("system".to_owned(), Value::Table(sys));
        }
    }

    /// Copies all ancestor methods into the pair, then installs this
    /// class's own methods over them.
    fn attach_methods(&mut self, cid: ClassId) {
        let class = self.model.class(cid);
        let name = self.model.interner.get(class.name).to_owned();
        let Some(meta_t) = self.memory.metaclass_table(&name) else {
            return;
        };
        let Some(class_t) = self.memory.class_table(&name) else {
            return;
        };

        // Metaclass's class table dispatches for every metaclass
        let metaclass_class = self.memory.class_table("Metaclass");
        self.memory.table_mut(meta_t).meta = metaclass_class;

        if class.super_name != self.model.wk().nil
            && let Some(super_cid) = class.super_class
        {
            let super_name = self.model.class_name(super_cid).to_owned();
            for class_level in [false, true] {
                let from = if class_level {
                    self.memory.metaclass_table(&super_name)
                } else {
                    self.memory.class_table(&super_name)
                };
                let to = if class_level { meta_t } else { class_t };
                let Some(from) = from else { continue };
                for key in self.method_keys(super_cid, class_level) {
                    if let Some(v) = self.memory.get_field(from, &key).cloned() {
                        self.memory.set_field(to, &key, v);
                    }
                }
            }
        }

        for &m in &class.methods {
            let info = self.model.func(m).method();
            let encoded = selector::encode(self.model.interner.get(info.selector), info.pattern);
            let value = if info.primitive {
                Value::Primitive(PrimitiveRef {
                    holder: name.clone(),
                    selector: encoded.clone(),
                    class_level: info.class_level,
                })
            } else {
                Value::Method(MethodRef { class: cid, func: m })
            };
            let to = if info.class_level { meta_t } else { class_t };
            self.memory.set_field(to, &encoded, value);
        }
    }

    /// Encoded method names of a class and all its ancestors, one side.
    fn method_keys(&self, cid: ClassId, class_level: bool) -> Vec<String> {
        let mut chain = self.model.super_chain(cid);
        chain.reverse();
        chain.push(cid);
        let mut seen = indexmap::IndexSet::<String, ahash::RandomState>::default();
        for c in chain {
            for &m in &self.model.class(c).methods {
                let info = self.model.func(m).method();
                if info.class_level == class_level {
                    seen.insert(selector::encode(
                        self.model.interner.get(info.selector),
                        info.pattern,
                    ));
                }
            }
        }
        seen.into_iter().collect()
    }
}
