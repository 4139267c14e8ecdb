//! The pipeline context: one compilation, one set of arenas, one
//! diagnostics list.
//!
//! The phases run in dependency order: load (which parses and resolves each
//! super-chain batch), object-model materialization, then per-class
//! emission. Each phase checks the diagnostics list and short-circuits when
//! an earlier phase failed; nothing unwinds across a phase boundary.

use std::path::{Path, PathBuf};

use crate::{
    ast::ClassId,
    bytecode::ClassModule,
    emit,
    error::Diagnostics,
    loader::Loader,
    lua,
    model::Model,
    object::{Materializer, ObjectMemory},
};

/// Everything the front end can be told from outside.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Extra class-search directories, tried after the embedded library.
    pub class_paths: Vec<PathBuf>,
    /// Also produce Lua source text per class.
    pub emit_lua: bool,
    /// Arguments handed to the compiled program at run time.
    pub program_args: Vec<String>,
    /// VM boundary switches, recorded for the launcher.
    pub use_jit: bool,
    pub trace: bool,
}

impl CompileOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            use_jit: true,
            ..Self::default()
        }
    }
}

/// The products of a successful compilation.
#[derive(Debug)]
pub struct Compilation {
    pub model: Model,
    /// Warnings survive into a successful compilation.
    pub diags: Diagnostics,
    pub options: CompileOptions,
    pub main_class: ClassId,
    /// Super before subclass; materialization and emission order.
    pub loading_order: Vec<ClassId>,
    pub modules: Vec<ClassModule>,
    pub memory: ObjectMemory,
    /// Lua source per class, when requested.
    pub lua_sources: Vec<(ClassId, String)>,
}

impl Compilation {
    #[must_use]
    pub fn module_for(&self, class: ClassId) -> Option<&ClassModule> {
        self.modules.iter().find(|m| m.class == class)
    }
}

/// A failed compilation: the accumulated diagnostics plus the model needed
/// to render them.
#[derive(Debug)]
pub struct CompileFailure {
    pub model: Model,
    pub diags: Diagnostics,
}

impl CompileFailure {
    #[must_use]
    pub fn render(&self) -> String {
        self.diags.render(&self.model)
    }
}

enum MainSource<'a> {
    File(&'a Path),
    Text { name: &'a str, source: &'a str },
}

pub struct Compiler {
    model: Model,
    diags: Diagnostics,
    options: CompileOptions,
    /// Named in-memory class sources, consulted before the filesystem.
    virtual_sources: Vec<(String, String)>,
}

impl Compiler {
    #[must_use]
    pub fn new(options: CompileOptions) -> Self {
        Self {
            model: Model::new(),
            diags: Diagnostics::new(),
            options,
            virtual_sources: Vec::new(),
        }
    }

    /// Registers an in-memory class source, tried after the embedded
    /// library and before any class path.
    pub fn add_virtual_source(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.virtual_sources.push((name.into(), source.into()));
    }

    /// Compiles the program rooted at a main `.som` file.
    pub fn compile(self, main_file: &Path) -> Result<Compilation, CompileFailure> {
        self.run(MainSource::File(main_file))
    }

    /// Compiles the program rooted at an in-memory main class source.
    pub fn compile_source(self, name: &str, source: &str) -> Result<Compilation, CompileFailure> {
        self.run(MainSource::Text { name, source })
    }

    fn run(mut self, main: MainSource<'_>) -> Result<Compilation, CompileFailure> {
        let mut loader = Loader::new(&mut self.model, &mut self.diags);
        for (name, source) in &self.virtual_sources {
            loader.add_virtual_source(name.clone(), source.clone());
        }
        let main_class = match main {
            MainSource::File(path) => loader.load(path, &self.options.class_paths),
            MainSource::Text { name, source } => {
                loader.load_source(name, source, &self.options.class_paths)
            }
        };
        let loading_order = loader.into_loading_order();

        let (Some(main_class), false) = (main_class, self.diags.has_errors()) else {
            return Err(CompileFailure {
                model: self.model,
                diags: self.diags,
            });
        };
        self.model.sort_subclasses();

        let mut materializer = Materializer::new(&self.model);
        materializer.instantiate(&loading_order, &mut self.diags);
        let memory = materializer.into_memory();
        if self.diags.has_errors() {
            return Err(CompileFailure {
                model: self.model,
                diags: self.diags,
            });
        }

        let mut modules = Vec::with_capacity(loading_order.len());
        for &cid in &loading_order {
            modules.push(emit::emit_class(&self.model, cid, &mut self.diags));
        }
        if self.diags.has_errors() {
            return Err(CompileFailure {
                model: self.model,
                diags: self.diags,
            });
        }

        let lua_sources = if self.options.emit_lua {
            loading_order
                .iter()
                .map(|&cid| (cid, lua::transpile_class(&self.model, cid)))
                .collect()
        } else {
            Vec::new()
        };

        Ok(Compilation {
            model: self.model,
            diags: self.diags,
            options: self.options,
            main_class,
            loading_order,
            modules,
            memory,
            lua_sources,
        })
    }
}
