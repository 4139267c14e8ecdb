//! The target instruction set, function prototypes, and class modules.
//!
//! The target is a register machine in the LuaJIT mould. `IST`, `ISF`, and
//! `ISEQ` pair with the `JMP` that follows them: the jump is taken when the
//! test holds, otherwise the pair falls through. Jump offsets are relative
//! to the instruction after the `JMP`. Operand counts on `CALL` and `RET`
//! are stored plainly; the +1 bias of the target's wire encoding is left to
//! the encoder of the VM, which is out of scope here.

use crate::ast::{ClassId, FuncId, Loc};

/// Index into a prototype's constant pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConstId(pub(crate) u16);

impl ConstId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a prototype within its class module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProtoId(pub(crate) u32);

impl ProtoId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A constant-pool entry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Const {
    Nil,
    True,
    False,
    Int(i64),
    Num(f64),
    Str(String),
    /// The non-local-return cookie of a method: its stable arena id.
    Method(FuncId),
}

impl PartialEq for Const {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) | (Self::True, Self::True) | (Self::False, Self::False) => true,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Num(a), Self::Num(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Method(a), Self::Method(b)) => a == b,
            _ => false,
        }
    }
}

/// One instruction. Register operands are `u8`; the register file per
/// function holds 256 slots.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Instr {
    Mov { dst: u8, src: u8 },
    KSet { dst: u8, k: ConstId },
    /// Sets `n` consecutive slots starting at `dst` to nil.
    KNil { dst: u8, n: u8 },
    TNew { dst: u8, nhash: u8, narr: u16 },
    /// `dst = tbl[key]` with a register key.
    TGet { dst: u8, tbl: u8, key: u8 },
    /// `dst = tbl[idx]` with an immediate index.
    TGetI { dst: u8, tbl: u8, idx: u8 },
    /// `tbl[key] = src` with a register key.
    TSet { src: u8, tbl: u8, key: u8 },
    /// `tbl[idx] = src` with an immediate index.
    TSetI { src: u8, tbl: u8, idx: u8 },
    GGet { dst: u8, name: ConstId },
    UGet { dst: u8, upval: u16 },
    USet { upval: u16, src: u8 },
    /// Relative jump; the target is the next pc plus `offset`.
    Jmp { offset: i32 },
    /// Takes the following `Jmp` when `src` is truthy.
    Ist { src: u8 },
    /// Takes the following `Jmp` when `src` is falsy.
    Isf { src: u8 },
    /// Takes the following `Jmp` when the operands are equal.
    IsEq { a: u8, b: u8 },
    /// Loop-header marker; the back edge jumps to the instruction after it.
    Loop,
    Ret { base: u8, n: u8 },
    Call { base: u8, nres: u8, nargs: u8 },
    /// Closes upvalues at or above `base`, then jumps.
    Uclo { base: u8, offset: i32 },
    FNew { dst: u8, func: ProtoId },
}

/// An upvalue descriptor of a prototype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Upval {
    /// Slot in the parent frame (`in_parent_stack`) or index into the
    /// parent's upvalue list.
    pub slot: u16,
    pub in_parent_stack: bool,
    pub readonly: bool,
}

/// One compiled function.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Proto {
    pub id: ProtoId,
    pub name: String,
    pub num_params: u8,
    pub frame_size: u8,
    pub instrs: Vec<Instr>,
    /// Source line per instruction, parallel to `instrs`.
    pub lines: Vec<u32>,
    pub consts: Vec<Const>,
    pub upvals: Vec<Upval>,
    pub loc: Loc,
    pub end: Loc,
}

impl Proto {
    /// A plain-text listing of the prototype.
    #[must_use]
    pub fn disassemble(&self) -> String {
        let mut out = format!(
            "function {} (params {}, frame {}, upvals {})\n",
            self.name,
            self.num_params,
            self.frame_size,
            self.upvals.len()
        );
        for (i, k) in self.consts.iter().enumerate() {
            out.push_str(&format!("  const {i}: {}\n", render_const(k)));
        }
        for (pc, instr) in self.instrs.iter().enumerate() {
            out.push_str(&format!("  {pc:04} {}\n", render_instr(*instr)));
        }
        out
    }
}

fn render_const(k: &Const) -> String {
    match k {
        Const::Nil => "nil".to_owned(),
        Const::True => "true".to_owned(),
        Const::False => "false".to_owned(),
        Const::Int(v) => v.to_string(),
        Const::Num(v) => ryu::Buffer::new().format(*v).to_owned(),
        Const::Str(s) => format!("{s:?}"),
        Const::Method(f) => format!("<method #{}>", f.index()),
    }
}

fn render_instr(i: Instr) -> String {
    match i {
        Instr::Mov { dst, src } => format!("MOV   {dst}, {src}"),
        Instr::KSet { dst, k } => format!("KSET  {dst}, k{}", k.index()),
        Instr::KNil { dst, n } => format!("KNIL  {dst}, {n}"),
        Instr::TNew { dst, nhash, narr } => format!("TNEW  {dst}, {nhash}, {narr}"),
        Instr::TGet { dst, tbl, key } => format!("TGET  {dst}, {tbl}, {key}"),
        Instr::TGetI { dst, tbl, idx } => format!("TGETi {dst}, {tbl}, {idx}"),
        Instr::TSet { src, tbl, key } => format!("TSET  {src}, {tbl}, {key}"),
        Instr::TSetI { src, tbl, idx } => format!("TSETi {src}, {tbl}, {idx}"),
        Instr::GGet { dst, name } => format!("GGET  {dst}, k{}", name.index()),
        Instr::UGet { dst, upval } => format!("UGET  {dst}, uv{upval}"),
        Instr::USet { upval, src } => format!("USET  uv{upval}, {src}"),
        Instr::Jmp { offset } => format!("JMP   {offset}"),
        Instr::Ist { src } => format!("IST   {src}"),
        Instr::Isf { src } => format!("ISF   {src}"),
        Instr::IsEq { a, b } => format!("ISEQ  {a}, {b}"),
        Instr::Loop => "LOOP".to_owned(),
        Instr::Ret { base, n } => format!("RET   {base}, {n}"),
        Instr::Call { base, nres, nargs } => format!("CALL  {base}, {nres}, {nargs}"),
        Instr::Uclo { base, offset } => format!("UCLO  {base}, {offset}"),
        Instr::FNew { dst, func } => format!("FNEW  {dst}, f{}", func.index()),
    }
}

/// The compiled form of one class: a module function that, when run,
/// populates the class/metaclass pair with its methods, plus a prototype
/// per method and per non-inline block.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ClassModule {
    pub class: ClassId,
    pub class_name: String,
    pub protos: Vec<Proto>,
    /// The module function; always the last prototype.
    pub main: ProtoId,
    /// Non-primitive methods and their prototypes.
    pub methods: Vec<(FuncId, ProtoId)>,
}

impl ClassModule {
    #[must_use]
    pub fn disassemble(&self) -> String {
        let mut out = format!("-- module {}\n", self.class_name);
        for p in &self.protos {
            out.push_str(&p.disassemble());
            out.push('\n');
        }
        out
    }

    #[must_use]
    pub fn proto(&self, id: ProtoId) -> &Proto {
        &self.protos[id.index()]
    }

    /// The module as pretty-printed JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// The prototype compiled for a method, if it wasn't a primitive.
    #[must_use]
    pub fn method_proto(&self, method: FuncId) -> Option<&Proto> {
        self.methods
            .iter()
            .find(|(f, _)| *f == method)
            .map(|&(_, p)| self.proto(p))
    }
}
