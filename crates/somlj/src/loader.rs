//! Class loading and super-chain resolution.
//!
//! Given a main class and a list of search directories, the loader brings in
//! every class reachable through super-class references. The search order is
//! the embedded core library first, then the user's class paths in order,
//! then the main file's directory; the first `<Name>.som` found wins.
//!
//! Identifiers that bind to nothing during a class's resolution are
//! deferred; after each super-chain batch the deferred set is re-checked,
//! names that match a now-known class are bound, and the remaining unknowns
//! are reported.

use std::path::{Path, PathBuf};

use crate::{
    ast::{ClassId, Loc},
    corelib,
    error::{Diagnostics, Phase},
    intern::Symbol,
    model::Model,
    parser::Parser,
    resolver::{self, Resolver},
};

/// Where a class source came from.
enum ClassSource {
    Embedded(&'static str),
    Virtual(usize),
    File(PathBuf),
}

pub struct Loader<'a> {
    model: &'a mut Model,
    diags: &'a mut Diagnostics,
    class_paths: Vec<PathBuf>,
    /// In-memory sources consulted after the core library and before the
    /// filesystem; used by embedders and tests.
    virtual_sources: Vec<(String, String)>,
    loading_order: Vec<ClassId>,
    unresolved: Vec<(ClassId, Symbol, Loc)>,
    /// Classes whose first resolution pass deferred at least one name.
    needs_rebind: Vec<ClassId>,
}

impl<'a> Loader<'a> {
    pub fn new(model: &'a mut Model, diags: &'a mut Diagnostics) -> Self {
        Self {
            model,
            diags,
            class_paths: Vec::new(),
            virtual_sources: Vec::new(),
            loading_order: Vec::new(),
            unresolved: Vec::new(),
            needs_rebind: Vec::new(),
        }
    }

    pub fn add_virtual_source(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.virtual_sources.push((name.into(), source.into()));
    }

    /// Classes in the order they were loaded, super before subclass. This is
    /// the order the object model is materialized in.
    #[must_use]
    pub fn loading_order(&self) -> &[ClassId] {
        &self.loading_order
    }

    pub fn into_loading_order(self) -> Vec<ClassId> {
        self.loading_order
    }

    /// Loads the main class from a file, after force-loading the built-ins.
    pub fn load(&mut self, main_file: &Path, class_paths: &[PathBuf]) -> Option<ClassId> {
        let Ok(source) = std::fs::read_to_string(main_file) else {
            self.diags.error(
                Phase::Load,
                format!("invalid main SOM file '{}'", main_file.display()),
                None,
            );
            return None;
        };
        let home = main_file.parent().map(Path::to_path_buf);
        self.set_class_paths(class_paths, home);
        self.load_builtins();
        self.load_main(&main_file.to_string_lossy(), &source)
    }

    /// Loads the main class from an in-memory source.
    pub fn load_source(&mut self, name: &str, source: &str, class_paths: &[PathBuf]) -> Option<ClassId> {
        self.set_class_paths(class_paths, None);
        self.load_builtins();
        self.load_main(&format!("{name}.som"), source)
    }

    fn set_class_paths(&mut self, class_paths: &[PathBuf], home: Option<PathBuf>) {
        self.class_paths = class_paths.to_vec();
        if let Some(home) = home {
            for p in &mut self.class_paths {
                if p.is_relative() {
                    *p = home.join(p.as_path());
                }
            }
            self.class_paths.push(home);
        }
    }

    fn load_builtins(&mut self) {
        for name in corelib::FORCE_LOADED {
            let sym = self.model.interner.intern(name);
            self.get_or_load_class(sym);
        }
    }

    fn load_main(&mut self, path: &str, source: &str) -> Option<ClassId> {
        let parsed = self.parse_source(path, source)?;
        let main = self.register(parsed);
        if main == parsed {
            self.load_and_set_super(main);
        }
        self.handle_unresolved();
        Some(main)
    }

    fn parse_source(&mut self, path: &str, source: &str) -> Option<ClassId> {
        let errors_before = self.diags.error_count();
        let id = self.model.add_source(path);
        let class = Parser::new(self.model, self.diags, source, id).parse_file();
        if self.diags.error_count() != errors_before {
            return None;
        }
        class
    }

    /// Registers a parsed class and returns the surviving id: on a name
    /// collision the first definition wins and a warning is recorded.
    fn register(&mut self, class: ClassId) -> ClassId {
        match self.model.register_class(class) {
            Ok(()) => class,
            Err(existing) => {
                let name = self.model.class_name(class).to_owned();
                let first = self.model.class(existing).loc;
                let loc = self.model.class(class).loc;
                self.diags.warning(
                    Phase::Load,
                    format!(
                        "class '{name}' already loaded from '{}', first definition wins",
                        self.model.source_path(first.source)
                    ),
                    Some(loc),
                );
                existing
            }
        }
    }

    fn find_class_source(&self, name: &str) -> Option<ClassSource> {
        if let Some(src) = corelib::find(name) {
            return Some(ClassSource::Embedded(src));
        }
        if let Some(i) = self.virtual_sources.iter().position(|(n, _)| n == name) {
            return Some(ClassSource::Virtual(i));
        }
        let file_name = format!("{name}.som");
        for dir in &self.class_paths {
            let path = dir.join(&file_name);
            if path.is_file() {
                return Some(ClassSource::File(path));
            }
        }
        None
    }

    /// Loads a class by name unless it is already known, then completes its
    /// super chain and re-checks the deferred names.
    pub fn get_or_load_class(&mut self, name: Symbol) -> Option<ClassId> {
        let (class, loaded) = self.get_or_load_class_imp(name);
        if loaded && let Some(cid) = class {
            self.load_and_set_super(cid);
            self.handle_unresolved();
        }
        class
    }

    /// Returns the class and whether this call freshly parsed it.
    fn get_or_load_class_imp(&mut self, name: Symbol) -> (Option<ClassId>, bool) {
        if let Some(cid) = self.model.class_by_name(name) {
            return (Some(cid), false);
        }
        let name_str = self.model.interner.get(name).to_owned();
        let Some(found) = self.find_class_source(&name_str) else {
            return (None, false);
        };
        let class = match found {
            ClassSource::Embedded(src) => self.parse_source(&format!("som:{name_str}.som"), src),
            ClassSource::Virtual(i) => {
                let source = self.virtual_sources[i].1.clone();
                self.parse_source(&format!("{name_str}.som"), &source)
            }
            ClassSource::File(path) => match std::fs::read_to_string(&path) {
                Ok(src) => self.parse_source(&path.to_string_lossy(), &src),
                Err(_) => {
                    self.diags.error(
                        Phase::Load,
                        format!("cannot open file for reading '{}'", path.display()),
                        None,
                    );
                    None
                }
            },
        };
        if let Some(cid) = class {
            let survivor = self.register(cid);
            (Some(survivor), survivor == cid)
        } else {
            (None, false)
        }
    }

    /// Transitively loads the super chain of `class`, wires the super and
    /// subclass links, and resolves the batch super-first.
    fn load_and_set_super(&mut self, class: ClassId) {
        let mut order = vec![class];
        let mut sub = class;
        let nil = self.model.wk().nil;
        let mut super_name = self.model.class(class).super_name;
        while super_name != nil {
            let (super_class, loaded) = self.get_or_load_class_imp(super_name);
            let Some(super_class) = super_class else {
                let name = self.model.interner.get(super_name).to_owned();
                let loc = self.model.class(sub).loc;
                self.diags
                    .error(Phase::Load, format!("cannot find class file of '{name}'"), Some(loc));
                break;
            };
            self.model.class_mut(sub).super_class = Some(super_class);
            self.model.class_mut(super_class).subclasses.push(sub);
            sub = super_class;
            if loaded {
                order.push(super_class);
                super_name = self.model.class(super_class).super_name;
            } else {
                break;
            }
        }
        for &cid in order.iter().rev() {
            self.loading_order.push(cid);
            self.resolve_class(cid);
        }
    }

    fn resolve_class(&mut self, class: ClassId) {
        let pending = Resolver::new(self.model, self.diags, class).resolve_class();
        if !pending.is_empty() {
            self.needs_rebind.push(class);
        }
        for (name, loc) in pending {
            self.unresolved.push((class, name, loc));
        }
    }

    /// Re-checks the deferred identifiers: each unknown name is tried as a
    /// class to load; what still binds to nothing is an error.
    fn handle_unresolved(&mut self) {
        let mut i = 0;
        while i < self.unresolved.len() {
            let (_, name, loc) = self.unresolved[i];
            let (class, loaded) = self.get_or_load_class_imp(name);
            match class {
                Some(cid) => {
                    if loaded {
                        self.load_and_set_super(cid);
                    }
                }
                None => {
                    let text = self.model.interner.get(name).to_owned();
                    self.diags.error(
                        Phase::Resolve,
                        format!("cannot resolve identifier '{text}'"),
                        Some(loc),
                    );
                }
            }
            i += 1;
        }
        self.unresolved.clear();
        let classes = std::mem::take(&mut self.needs_rebind);
        for cid in classes {
            resolver::rebind_class(self.model, cid);
        }
    }
}
