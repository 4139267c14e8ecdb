//! Identifier interning for the compiler pipeline.
//!
//! Every identifier byte-string that enters the model is canonicalized to a
//! [`Symbol`] handle. Equality and hashing on symbols are integer operations;
//! two symbols are equal exactly when their byte-strings are equal. The pool
//! lives as long as the pipeline that owns it.

use ahash::AHashMap;

/// Index into the symbol pool's storage.
///
/// Uses `u32` to save space over `usize`; four billion distinct identifiers
/// is far beyond any class library this compiler will see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Symbol(u32);

impl Symbol {
    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Names the compiler refers to by handle without re-interning.
///
/// Built once when the pool is created, so comparisons against reserved
/// words and core class names are plain handle comparisons.
#[derive(Debug, Clone, Copy)]
pub struct WellKnown {
    pub object: Symbol,
    pub nil: Symbol,
    pub true_: Symbol,
    pub false_: Symbol,
    pub self_: Symbol,
    pub super_: Symbol,
    pub primitive: Symbol,
    pub system: Symbol,
    pub run: Symbol,
    pub class: Symbol,
    pub metaclass: Symbol,
}

/// The symbol pool.
///
/// Insertion is idempotent: interning the same byte-string twice yields the
/// same handle. The empty string is never interned; callers must not pass it.
#[derive(Debug)]
pub struct Interner {
    map: AHashMap<String, Symbol>,
    names: Vec<String>,
    wk: WellKnown,
}

impl Interner {
    #[must_use]
    pub fn new() -> Self {
        // Dummy handles, immediately replaced below.
        let zero = Symbol(0);
        let mut pool = Self {
            map: AHashMap::new(),
            names: Vec::new(),
            wk: WellKnown {
                object: zero,
                nil: zero,
                true_: zero,
                false_: zero,
                self_: zero,
                super_: zero,
                primitive: zero,
                system: zero,
                run: zero,
                class: zero,
                metaclass: zero,
            },
        };
        pool.wk = WellKnown {
            object: pool.intern("Object"),
            nil: pool.intern("nil"),
            true_: pool.intern("true"),
            false_: pool.intern("false"),
            self_: pool.intern("self"),
            super_: pool.intern("super"),
            primitive: pool.intern("primitive"),
            system: pool.intern("system"),
            run: pool.intern("run"),
            class: pool.intern("Class"),
            metaclass: pool.intern("Metaclass"),
        };
        pool
    }

    /// The pre-interned well-known names.
    #[inline]
    #[must_use]
    pub fn wk(&self) -> &WellKnown {
        &self.wk
    }

    /// Canonicalizes `name` to a handle. Idempotent.
    pub fn intern(&mut self, name: &str) -> Symbol {
        debug_assert!(!name.is_empty(), "the empty string is never interned");
        if let Some(&sym) = self.map.get(name) {
            return sym;
        }
        let sym = Symbol(u32::try_from(self.names.len()).unwrap_or(u32::MAX));
        self.names.push(name.to_owned());
        self.map.insert(name.to_owned(), sym);
        sym
    }

    /// Looks up a handle without inserting.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.map.get(name).copied()
    }

    /// Returns the byte-string of a handle.
    #[must_use]
    pub fn get(&self, sym: Symbol) -> &str {
        &self.names[sym.index()]
    }

    /// Number of distinct interned strings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}
