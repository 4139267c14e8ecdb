//! The abstract model of a SOM program: classes, functions, variables, and
//! the expression tree.
//!
//! Classes, functions (methods and block bodies), and variables live in
//! arenas owned by the [`crate::model::Model`] and reference each other by
//! stable indices. Parent links (class to superclass, variable to owning
//! scope) are back-references and never own anything, which is how the
//! inherently cyclic class/metaclass/method/block graph stays safe without a
//! collector. Expressions form plain trees owned by the function bodies.

use smallvec::SmallVec;

use crate::intern::Symbol;

/// Identifies one loaded source (a file path or an embedded library entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct SourceId(pub(crate) u32);

impl SourceId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A source position. The length spans exactly the node's lexical extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Loc {
    /// Byte offset from the start of the source.
    pub pos: u32,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub col: u16,
    /// Length in bytes.
    pub len: u16,
    pub source: SourceId,
}

/// Arena index of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Arena index of a function (a method or a block body).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct FuncId(pub(crate) u32);

impl FuncId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Arena index of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct VarId(pub(crate) u32);

impl VarId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A method's selector decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr, serde::Serialize, serde::Deserialize)]
pub enum PatternKind {
    Unary,
    Binary,
    Keyword,
}

/// What storage a variable lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr, serde::Serialize, serde::Deserialize)]
pub enum VarKind {
    /// Instance-level field; slot numbering continues the super chain's.
    Instance,
    /// Class-level field; same discipline on the metaclass side.
    Class,
    Argument,
    Temporary,
    Global,
}

/// The reserved identifiers of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Reserved {
    Nil,
    True,
    False,
    SelfRef,
    Super,
    Primitive,
}

/// How an identifier occurrence is used, set during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum UseKind {
    #[default]
    Undefined,
    Declaration,
    AssignTarget,
    MsgReceiver,
    Rhs,
}

/// Flow-control tag a message send receives when inline expansion applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum FlowControl {
    #[default]
    None,
    IfTrue,
    IfFalse,
    IfElse,
    WhileTrue,
    WhileFalse,
}

/// The scope a variable is declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VarOwner {
    Class(ClassId),
    Func(FuncId),
    Global,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Variable {
    pub name: Symbol,
    pub kind: VarKind,
    /// Storage slot, assigned during resolution.
    pub slot: u16,
    pub owner: VarOwner,
    /// The enclosing function after inline expansion of control-flow blocks;
    /// differs from `owner` for variables declared inside inline blocks.
    pub inlined_owner: Option<FuncId>,
    pub loc: Loc,
}

/// A parsed class declaration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Class {
    pub name: Symbol,
    /// Non-empty after parse: the implicit super is `Object`, and only
    /// `Object` itself names `nil`.
    pub super_name: Symbol,
    /// Resolved after loading; `None` for `Object` (and before resolution).
    pub super_class: Option<ClassId>,
    pub category: String,
    pub comment: String,
    pub inst_vars: Vec<VarId>,
    pub class_vars: Vec<VarId>,
    /// Instance- and class-side methods, in declaration order.
    pub methods: Vec<FuncId>,
    /// Kept sorted by class name for deterministic traversals.
    pub subclasses: Vec<ClassId>,
    pub loc: Loc,
    pub end: Loc,
}

/// Method-only attributes of a [`Function`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MethodInfo {
    /// The full selector, e.g. `at:put:`.
    pub selector: Symbol,
    pub pattern: PatternKind,
    pub parts: SmallVec<[Symbol; 2]>,
    pub class_level: bool,
    pub primitive: bool,
    /// Set by the parser: some `^` appears inside a block, syntactically.
    pub has_non_local_return: bool,
    /// Set by the resolver: some `^` appears inside a block that survives
    /// inline expansion (inlined depth > 0).
    pub has_non_local_return_if_inlined: bool,
    /// The implicit `self` argument (slot 0 of the parameter table).
    pub self_var: VarId,
}

/// Block-only attributes of a [`Function`].
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct BlockInfo {
    /// Source-level `[...]` nesting depth, 1 for a block directly in a method.
    pub syntax_depth: u8,
    /// Runtime frame depth after inline expansion; inline blocks share their
    /// host's depth. The method level is depth 0.
    pub inlined_depth: u8,
    /// True when a control-flow selector consumes this literal block in place.
    pub inline: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum FuncKind {
    Method(MethodInfo),
    Block(BlockInfo),
}

/// A function-like scope: a method or one `[...]` literal.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Function {
    pub class: ClassId,
    /// Enclosing function, for blocks.
    pub parent: Option<FuncId>,
    pub num_params: u8,
    /// Parameters first, then temporaries, in declaration order.
    pub vars: Vec<VarId>,
    /// Variables adopted from inline blocks; they live in this function's
    /// parameter table after their own slots.
    pub inlined_vars: Vec<VarId>,
    pub body: Vec<Expr>,
    /// True when some inner function references one of this function's
    /// variables across the frame boundary.
    pub upvalue_source: bool,
    pub loc: Loc,
    pub end: Loc,
    pub kind: FuncKind,
}

impl Function {
    #[must_use]
    pub fn is_method(&self) -> bool {
        matches!(self.kind, FuncKind::Method(_))
    }

    /// Method attributes; the caller asserts this function is a method.
    #[must_use]
    pub fn method(&self) -> &MethodInfo {
        match &self.kind {
            FuncKind::Method(m) => m,
            FuncKind::Block(_) => panic!("function is a block, not a method"),
        }
    }

    pub fn method_mut(&mut self) -> &mut MethodInfo {
        match &mut self.kind {
            FuncKind::Method(m) => m,
            FuncKind::Block(_) => panic!("function is a block, not a method"),
        }
    }

    /// Block attributes; the caller asserts this function is a block.
    #[must_use]
    pub fn block(&self) -> &BlockInfo {
        match &self.kind {
            FuncKind::Block(b) => b,
            FuncKind::Method(_) => panic!("function is a method, not a block"),
        }
    }

    pub fn block_mut(&mut self) -> &mut BlockInfo {
        match &mut self.kind {
            FuncKind::Block(b) => b,
            FuncKind::Method(_) => panic!("function is a method, not a block"),
        }
    }

    /// Frame depth after inline expansion; 0 at method level.
    #[must_use]
    pub fn inlined_depth(&self) -> u8 {
        match &self.kind {
            FuncKind::Method(_) => 0,
            FuncKind::Block(b) => b.inlined_depth,
        }
    }

    /// Entries in this function's parameter table: receiver slot, own
    /// variables, then adopted inline-block variables.
    #[must_use]
    pub fn param_table_len(&self) -> usize {
        1 + self.vars.len() + self.inlined_vars.len()
    }
}

/// An identifier occurrence.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Ident {
    pub name: Symbol,
    /// Reserved-keyword tag, set during resolution.
    pub reserved: Option<Reserved>,
    pub use_kind: UseKind,
    pub target: Option<Resolved>,
    pub loc: Loc,
}

impl Ident {
    #[must_use]
    pub fn new(name: Symbol, loc: Loc) -> Self {
        Self {
            name,
            reserved: None,
            use_kind: UseKind::Undefined,
            target: None,
            loc,
        }
    }
}

/// What an identifier was bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Resolved {
    Var(VarId),
    Method(FuncId),
    Class(ClassId),
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IntegerLit {
    pub value: i64,
    pub loc: Loc,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RealLit {
    pub value: f64,
    pub loc: Loc,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CharLit {
    pub value: u8,
    pub loc: Loc,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StrLit {
    pub value: String,
    pub loc: Loc,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SymbolLit {
    pub text: String,
    pub loc: Loc,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ArrayLit {
    pub elements: Vec<Expr>,
    pub loc: Loc,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Assign {
    pub target: Ident,
    pub value: Expr,
    pub loc: Loc,
}

/// A message send.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MsgSend {
    pub pattern: PatternKind,
    /// Selector parts with their positions, e.g. `[("at:", ..), ("put:", ..)]`.
    pub parts: SmallVec<[(Symbol, Loc); 2]>,
    /// The joined selector, e.g. `at:put:`.
    pub selector: Symbol,
    pub receiver: Expr,
    pub args: Vec<Expr>,
    /// The enclosing method.
    pub method: FuncId,
    /// Set by the resolver when inline expansion applies.
    pub flow: FlowControl,
    pub loc: Loc,
}

/// A cascade. SOM source never produces one, but the model keeps the variant
/// so tooling built on the tree can represent Smalltalk-80 input.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Cascade {
    pub sends: Vec<MsgSend>,
    pub loc: Loc,
}

/// A literal block in expression position; the body lives in the function
/// arena under `func`.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct BlockRef {
    pub func: FuncId,
    pub loc: Loc,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Return {
    pub value: Expr,
    /// Set by the parser when the `^` is lexically inside a block.
    pub non_local: bool,
    /// Set by the resolver when the enclosing block is not inlined away.
    pub non_local_if_inlined: bool,
    pub loc: Loc,
}

/// The expression tree.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    Ident(Ident),
    Integer(IntegerLit),
    Real(RealLit),
    Char(CharLit),
    Str(StrLit),
    Sym(SymbolLit),
    Array(ArrayLit),
    Assign(Box<Assign>),
    Send(Box<MsgSend>),
    Cascade(Cascade),
    Block(BlockRef),
    Return(Box<Return>),
}

impl Expr {
    #[must_use]
    pub fn loc(&self) -> Loc {
        match self {
            Self::Ident(e) => e.loc,
            Self::Integer(e) => e.loc,
            Self::Real(e) => e.loc,
            Self::Char(e) => e.loc,
            Self::Str(e) => e.loc,
            Self::Sym(e) => e.loc,
            Self::Array(e) => e.loc,
            Self::Assign(e) => e.loc,
            Self::Send(e) => e.loc,
            Self::Cascade(e) => e.loc,
            Self::Block(e) => e.loc,
            Self::Return(e) => e.loc,
        }
    }

    /// The reserved-keyword tag when this expression is a reserved identifier.
    #[must_use]
    pub fn reserved(&self) -> Option<Reserved> {
        match self {
            Self::Ident(id) => id.reserved,
            _ => None,
        }
    }

    #[must_use]
    pub fn is_block(&self) -> bool {
        matches!(self, Self::Block(_))
    }

    #[must_use]
    pub fn is_return(&self) -> bool {
        matches!(self, Self::Return(_))
    }
}
