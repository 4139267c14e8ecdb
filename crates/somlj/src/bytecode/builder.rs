//! Per-function emission state: instruction buffer, constant pool, jump
//! patching, and the register slot pool.

use indexmap::IndexMap;

use crate::{
    ast::{FuncId, Loc},
    bytecode::op::{Const, ConstId, Instr, Proto, ProtoId, Upval},
};

/// A recoverable emission failure; it aborts the current method only.
#[derive(Debug, Clone, PartialEq)]
pub enum EmitError {
    /// The 256-slot register pool could not satisfy an allocation.
    SlotPoolExhausted { loc: Loc },
    ConstPoolOverflow { loc: Loc },
    /// A block function's module slot is missing.
    UpvalueHomeMissing { loc: Loc },
    Unsupported { what: &'static str, loc: Loc },
}

impl EmitError {
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::SlotPoolExhausted { .. } => "out of register slots".to_owned(),
            Self::ConstPoolOverflow { .. } => "constant pool overflow".to_owned(),
            Self::UpvalueHomeMissing { .. } => "upvalue home not found".to_owned(),
            Self::Unsupported { what, .. } => format!("cannot emit {what}"),
        }
    }

    #[must_use]
    pub fn loc(&self) -> Loc {
        match self {
            Self::SlotPoolExhausted { loc }
            | Self::ConstPoolOverflow { loc }
            | Self::UpvalueHomeMissing { loc }
            | Self::Unsupported { loc, .. } => *loc,
        }
    }
}

/// The per-function free-slot pool. Allocations are contiguous runs
/// (`CALL` windows need adjacency) and are released in LIFO order.
#[derive(Debug, Default)]
pub struct SlotPool {
    used: [u64; 4],
    frame_size: u16,
}

impl SlotPool {
    fn is_used(&self, i: usize) -> bool {
        self.used[i / 64] & (1 << (i % 64)) != 0
    }

    fn set(&mut self, i: usize, on: bool) {
        if on {
            self.used[i / 64] |= 1 << (i % 64);
        } else {
            self.used[i / 64] &= !(1 << (i % 64));
        }
    }

    /// First-fit allocation of `len` contiguous slots.
    pub fn alloc(&mut self, len: usize) -> Option<u8> {
        if len == 0 || len > 256 {
            return None;
        }
        let mut base = 0usize;
        while base + len <= 256 {
            match (base..base + len).find(|&i| self.is_used(i)) {
                Some(clash) => base = clash + 1,
                None => {
                    for i in base..base + len {
                        self.set(i, true);
                    }
                    self.frame_size = self.frame_size.max(u16::try_from(base + len).unwrap_or(256));
                    return u8::try_from(base).ok();
                }
            }
        }
        None
    }

    pub fn free(&mut self, base: u8, len: usize) {
        for i in usize::from(base)..usize::from(base) + len {
            self.set(i, false);
        }
    }

    #[must_use]
    pub fn frame_size(&self) -> u16 {
        self.frame_size
    }
}

/// Emission buffer for one function.
pub struct FuncBuilder {
    pub name: String,
    pub num_params: u8,
    instrs: Vec<Instr>,
    lines: Vec<u32>,
    consts: Vec<Const>,
    pool: SlotPool,
    /// Function-value upvalues: block function to upvalue index.
    upvals: IndexMap<FuncId, u16, ahash::RandomState>,
    loc: Loc,
    end: Loc,
}

/// A forward jump awaiting its target.
#[derive(Debug, Clone, Copy)]
pub struct JumpLabel(usize);

impl FuncBuilder {
    #[must_use]
    pub fn new(name: String, num_params: u8, loc: Loc, end: Loc) -> Self {
        Self {
            name,
            num_params,
            instrs: Vec::new(),
            lines: Vec::new(),
            consts: Vec::new(),
            pool: SlotPool::default(),
            upvals: IndexMap::default(),
            loc,
            end,
        }
    }

    pub fn op(&mut self, instr: Instr, loc: Loc) {
        self.instrs.push(instr);
        self.lines.push(loc.line);
    }

    #[must_use]
    pub fn cur_pc(&self) -> usize {
        self.instrs.len()
    }

    /// Emits a placeholder `JMP` and returns its label for patching.
    pub fn emit_jump(&mut self, loc: Loc) -> JumpLabel {
        self.op(Instr::Jmp { offset: 0 }, loc);
        JumpLabel(self.instrs.len() - 1)
    }

    /// Points a forward jump at the current pc.
    pub fn patch_jump(&mut self, label: JumpLabel) {
        let target = self.instrs.len();
        let offset = i32::try_from(target).unwrap_or(i32::MAX) - i32::try_from(label.0 + 1).unwrap_or(0);
        if let Instr::Jmp { offset: o } = &mut self.instrs[label.0] {
            *o = offset;
        }
    }

    /// Emits a backward jump to `target_pc`.
    pub fn jump_back(&mut self, target_pc: usize, loc: Loc) {
        let offset =
            i32::try_from(target_pc).unwrap_or(0) - i32::try_from(self.instrs.len() + 1).unwrap_or(0);
        self.op(Instr::Jmp { offset }, loc);
    }

    /// Adds a constant, reusing an existing equal entry.
    pub fn konst(&mut self, k: Const, loc: Loc) -> Result<ConstId, EmitError> {
        if let Some(i) = self.consts.iter().position(|c| *c == k) {
            return Ok(ConstId(u16::try_from(i).unwrap_or(u16::MAX)));
        }
        let id = u16::try_from(self.consts.len()).map_err(|_| EmitError::ConstPoolOverflow { loc })?;
        self.consts.push(k);
        Ok(ConstId(id))
    }

    pub fn alloc_slots(&mut self, len: usize, loc: Loc) -> Result<u8, EmitError> {
        self.pool.alloc(len).ok_or(EmitError::SlotPoolExhausted { loc })
    }

    pub fn free_slots(&mut self, base: u8, len: usize) {
        self.pool.free(base, len);
    }

    /// The upvalue index for a block function value, registering it on
    /// first use.
    pub fn upval_index(&mut self, func: FuncId) -> u16 {
        let next = u16::try_from(self.upvals.len()).unwrap_or(u16::MAX);
        *self.upvals.entry(func).or_insert(next)
    }

    /// The block functions this function closes over, in upvalue order.
    #[must_use]
    pub fn upval_funcs(&self) -> Vec<FuncId> {
        self.upvals.keys().copied().collect()
    }

    pub fn finish(self, id: ProtoId, upvals: Vec<Upval>) -> Proto {
        Proto {
            id,
            name: self.name,
            num_params: self.num_params,
            frame_size: u8::try_from(self.pool.frame_size()).unwrap_or(u8::MAX),
            instrs: self.instrs,
            lines: self.lines,
            consts: self.consts,
            upvals,
            loc: self.loc,
            end: self.end,
        }
    }
}
