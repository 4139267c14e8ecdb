//! The parser: one token stream in, one class declaration out.
//!
//! Errors are collected into the shared diagnostics list and parsing
//! continues where recovery is obvious (statement terminators, the class's
//! closing paren). Precedence is classic Smalltalk: unary binds tightest and
//! left-associative, then binary left-associative, then a single keyword
//! message consumes the tail.

use smallvec::{SmallVec, smallvec};

use crate::{
    ast::{
        ArrayLit, Assign, BlockInfo, BlockRef, CharLit, Class, ClassId, Expr, FuncId, FuncKind,
        Function, Ident, IntegerLit, Loc, MethodInfo, MsgSend, PatternKind, RealLit, Return,
        SourceId, StrLit, SymbolLit, VarId, VarKind, VarOwner, Variable,
    },
    error::{Diagnostics, Phase},
    lexer::{Lexer, Token, TokenKind},
    model::Model,
};

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    model: &'a mut Model,
    diags: &'a mut Diagnostics,
    block_level: u8,
    cur_class: Option<ClassId>,
    cur_method: Option<FuncId>,
}

impl<'a> Parser<'a> {
    pub fn new(model: &'a mut Model, diags: &'a mut Diagnostics, source: &'a str, id: SourceId) -> Self {
        Self {
            lexer: Lexer::new(source, id),
            model,
            diags,
            block_level: 0,
            cur_class: None,
            cur_method: None,
        }
    }

    /// Parses the single class a `.som` file holds.
    pub fn parse_file(&mut self) -> Option<ClassId> {
        let class = self.read_class_expr()?;
        let t = self.lexer.next_token();
        if t.is_valid() {
            self.err("only one class per file", t.loc);
        }
        Some(class)
    }

    fn err(&mut self, msg: impl Into<std::borrow::Cow<'static, str>>, loc: Loc) {
        self.diags.error(Phase::Parse, msg, Some(loc));
    }

    fn next(&mut self) -> Token {
        self.lexer.next_token()
    }

    fn peek1(&mut self) -> Token {
        self.lexer.peek(1)
    }

    fn class_id(&self) -> ClassId {
        self.cur_class.expect("parsing outside a class")
    }

    fn read_class_expr(&mut self) -> Option<ClassId> {
        let t = self.next();
        if t.kind != TokenKind::Ident {
            self.err("expecting class name", t.loc);
            return None;
        }
        let name = self.model.interner.intern(&t.val);
        let object = self.model.wk().object;
        let cid = self.model.alloc_class(Class {
            name,
            super_name: object,
            super_class: None,
            category: String::new(),
            comment: String::new(),
            inst_vars: Vec::new(),
            class_vars: Vec::new(),
            methods: Vec::new(),
            subclasses: Vec::new(),
            loc: t.loc,
            end: t.loc,
        });
        self.cur_class = Some(cid);

        let t = self.next();
        if t.kind != TokenKind::Eq {
            self.err("expecting '='", t.loc);
            return None;
        }

        let mut t = self.next();
        if t.kind == TokenKind::Ident {
            let super_name = self.model.interner.intern(&t.val);
            self.model.class_mut(cid).super_name = super_name;
            t = self.next();
        }
        if t.kind != TokenKind::Lpar {
            self.err("expecting '('", t.loc);
            return None;
        }

        if self.peek1().kind == TokenKind::Bar {
            self.parse_fields(false);
        }
        let mut t = self.peek1();
        while is_method_start(t.kind) {
            self.read_method(false)?;
            t = self.peek1();
        }

        if t.kind == TokenKind::Separator {
            self.next();
            if self.peek1().kind == TokenKind::Bar {
                self.parse_fields(true);
            }
            t = self.peek1();
            while is_method_start(t.kind) {
                self.read_method(true)?;
                t = self.peek1();
            }
        }

        if t.kind != TokenKind::Rpar {
            self.err("expecting ')' at class end", t.loc);
            return None;
        }
        let t = self.next();
        self.model.class_mut(cid).end = t.loc;
        Some(cid)
    }

    fn parse_fields(&mut self, class_level: bool) {
        self.next(); // the opening '|'
        let cid = self.class_id();
        let mut t = self.next();
        while t.kind == TokenKind::Ident {
            let name = self.model.interner.intern(&t.val);
            if self.model.find_var_in_class(cid, name, false).is_some() {
                self.err("duplicate field name", t.loc);
            } else {
                let var = self.model.alloc_var(Variable {
                    name,
                    kind: if class_level { VarKind::Class } else { VarKind::Instance },
                    slot: 0,
                    owner: VarOwner::Class(cid),
                    inlined_owner: None,
                    loc: t.loc,
                });
                if class_level {
                    self.model.class_mut(cid).class_vars.push(var);
                } else {
                    self.model.class_mut(cid).inst_vars.push(var);
                }
            }
            t = self.next();
        }
        if t.kind != TokenKind::Bar {
            self.err("expecting '|'", t.loc);
        }
    }

    fn read_method(&mut self, class_level: bool) -> Option<FuncId> {
        let cid = self.class_id();
        let first = self.next();
        let t0_loc = first.loc;
        let mut sig = vec![first];
        loop {
            let t = self.peek1();
            if !t.is_valid() || t.kind == TokenKind::Eq {
                break;
            }
            sig.push(self.next());
        }
        let t = self.next();
        if t.kind != TokenKind::Eq {
            self.err("expecting '='", t.loc);
            return None;
        }

        let fid = self.model.alloc_func(Function {
            class: cid,
            parent: None,
            num_params: 0,
            vars: Vec::new(),
            inlined_vars: Vec::new(),
            body: Vec::new(),
            upvalue_source: false,
            loc: t0_loc,
            end: t0_loc,
            kind: FuncKind::Method(MethodInfo {
                selector: self.model.wk().run, // placeholder until the pattern is read
                pattern: PatternKind::Unary,
                parts: smallvec![],
                class_level,
                primitive: false,
                has_non_local_return: false,
                has_non_local_return_if_inlined: false,
                self_var: VarId(0), // placeholder, wired right below
            }),
        });
        let self_name = self.model.wk().self_;
        let self_var = self.model.alloc_var(Variable {
            name: self_name,
            kind: VarKind::Argument,
            slot: 0,
            owner: VarOwner::Func(fid),
            inlined_owner: Some(fid),
            loc: t0_loc,
        });
        self.model.func_mut(fid).method_mut().self_var = self_var;

        // decode the signature
        let mut parts: SmallVec<[crate::intern::Symbol; 2]> = smallvec![];
        let mut sel_text = String::new();
        let pattern;
        let t0 = sig[0].clone();
        if t0.kind.is_binary_char() || t0.kind == TokenKind::BinSelector {
            pattern = PatternKind::Binary;
            sel_text.push_str(&t0.val);
            parts.push(self.model.interner.intern(&t0.val));
            if sig.len() < 2 || sig[1].kind != TokenKind::Ident {
                self.err("invalid message header", t0.loc);
            } else {
                let arg = sig[1].clone();
                self.add_argument(fid, &arg);
            }
        } else if t0.kind == TokenKind::Keyword {
            pattern = PatternKind::Keyword;
            let mut i = 0;
            while i + 1 < sig.len()
                && sig[i].kind == TokenKind::Keyword
                && sig[i + 1].kind == TokenKind::Ident
            {
                let part = sig[i].clone();
                let arg = sig[i + 1].clone();
                sel_text.push_str(&part.val);
                parts.push(self.model.interner.intern(&part.val));
                self.add_argument(fid, &arg);
                i += 2;
            }
            if parts.is_empty() {
                self.err("invalid message header", t0.loc);
            }
        } else if t0.kind == TokenKind::Ident {
            pattern = PatternKind::Unary;
            sel_text.push_str(&t0.val);
            parts.push(self.model.interner.intern(&t0.val));
        } else {
            self.err("invalid message header", t0.loc);
            return None;
        }
        let selector = self.model.interner.intern(&sel_text);
        let num_params = u8::try_from(self.model.func(fid).vars.len()).unwrap_or(u8::MAX);
        {
            let f = self.model.func_mut(fid);
            f.num_params = num_params;
            let m = f.method_mut();
            m.selector = selector;
            m.pattern = pattern;
            m.parts = parts;
        }

        // both sides of the separator may define the same name; within one
        // side the first definition wins
        if self
            .model
            .find_method_in_class(cid, selector, Some(class_level), false)
            .is_some()
        {
            self.err("duplicate method name", t0_loc);
        } else {
            self.model.class_mut(cid).methods.push(fid);
        }

        let t = self.next();
        if t.kind == TokenKind::Ident {
            if t.val != "primitive" {
                self.err("expecting 'primitive'", t.loc);
                return None;
            }
            let f = self.model.func_mut(fid);
            f.end = t.loc;
            f.method_mut().primitive = true;
        } else if t.kind == TokenKind::Lpar {
            self.cur_method = Some(fid);
            self.parse_method_body(fid);
            self.cur_method = None;
        } else {
            self.err("expecting 'primitive' or '('", t.loc);
            return None;
        }

        Some(fid)
    }

    fn add_argument(&mut self, fid: FuncId, t: &Token) {
        let name = self.model.interner.intern(&t.val);
        if self.model.find_var_local(fid, name).is_some() {
            self.err("duplicate argument name", t.loc);
            return;
        }
        let var = self.model.alloc_var(Variable {
            name,
            kind: VarKind::Argument,
            slot: 0,
            owner: VarOwner::Func(fid),
            inlined_owner: None,
            loc: t.loc,
        });
        self.model.func_mut(fid).vars.push(var);
    }

    fn parse_method_body(&mut self, fid: FuncId) {
        if self.peek1().kind == TokenKind::Bar {
            self.parse_locals(fid);
        }
        loop {
            let t = self.peek1();
            match t.kind {
                k if is_stmt_start(k) => match self.parse_expression(fid, None) {
                    Some(e) => self.model.func_mut(fid).body.push(e),
                    None => self.skip_to_statement_boundary(),
                },
                TokenKind::Hat => {
                    if let Some(e) = self.parse_return(fid) {
                        self.model.func_mut(fid).body.push(e);
                    } else {
                        self.skip_to_statement_boundary();
                    }
                }
                TokenKind::Dot => {
                    self.next();
                }
                TokenKind::Rpar => {
                    let t = self.next();
                    self.model.func_mut(fid).end = t.loc;
                    return;
                }
                TokenKind::Eof | TokenKind::Invalid | TokenKind::Error => {
                    self.err("expecting ')'", t.loc);
                    return;
                }
                _ => {
                    self.err("expecting statement", t.loc);
                    self.next();
                }
            }
        }
    }

    /// After a failed statement, resumes at the next terminator or the
    /// enclosing closer, balancing nested parens and brackets on the way.
    fn skip_to_statement_boundary(&mut self) {
        let mut depth = 0usize;
        loop {
            let t = self.peek1();
            match t.kind {
                TokenKind::Dot if depth == 0 => {
                    self.next();
                    return;
                }
                TokenKind::Rpar | TokenKind::Rbrack if depth == 0 => return,
                TokenKind::Rpar | TokenKind::Rbrack => {
                    depth -= 1;
                    self.next();
                }
                TokenKind::Lpar | TokenKind::Lbrack => {
                    depth += 1;
                    self.next();
                }
                TokenKind::Eof | TokenKind::Invalid | TokenKind::Error => return,
                _ => {
                    self.next();
                }
            }
        }
    }

    fn parse_locals(&mut self, scope: FuncId) {
        self.next(); // the opening '|'
        loop {
            let t = self.peek1();
            if t.kind != TokenKind::Ident {
                break;
            }
            self.next();
            let name = self.model.interner.intern(&t.val);
            if self.model.find_var_local(scope, name).is_some() {
                self.err("duplicate local name", t.loc);
                continue;
            }
            let var = self.model.alloc_var(Variable {
                name,
                kind: VarKind::Temporary,
                slot: 0,
                owner: VarOwner::Func(scope),
                inlined_owner: None,
                loc: t.loc,
            });
            self.model.func_mut(scope).vars.push(var);
        }
        let t = self.peek1();
        if t.kind == TokenKind::Bar {
            self.next();
        } else {
            self.err("expecting '|' after temps declaration", t.loc);
        }
    }

    fn parse_expression(&mut self, scope: FuncId, in_pattern: Option<PatternKind>) -> Option<Expr> {
        let lhs = self.simple_expression(scope)?;

        let t = self.peek1();
        if t.kind == TokenKind::Assign {
            self.next();
            let Expr::Ident(target) = lhs else {
                self.err("cannot assign to expression or keywords", t.loc);
                return None;
            };
            let value = self.parse_expression(scope, None)?;
            return Some(Expr::Assign(Box::new(Assign {
                target,
                value,
                loc: t.loc,
            })));
        }

        let mut cur = lhs;
        let mut t = self.peek1();
        loop {
            match t.kind {
                TokenKind::Ident => {
                    self.next();
                    let part = self.model.interner.intern(&t.val);
                    cur = self.make_send(
                        PatternKind::Unary,
                        smallvec![(part, t.loc)],
                        cur,
                        Vec::new(),
                        scope,
                        t.loc,
                    );
                }
                k if k.is_binary_char() || k == TokenKind::BinSelector => {
                    if in_pattern == Some(PatternKind::Binary) {
                        break;
                    }
                    self.next();
                    let part = self.model.interner.intern(&t.val);
                    let mut args = Vec::new();
                    let arg = self.parse_expression(scope, Some(PatternKind::Binary));
                    let bailed = arg.is_none();
                    if let Some(a) = arg {
                        args.push(a);
                    }
                    cur = self.make_send(
                        PatternKind::Binary,
                        smallvec![(part, t.loc)],
                        cur,
                        args,
                        scope,
                        t.loc,
                    );
                    if bailed {
                        return Some(cur);
                    }
                }
                TokenKind::Keyword => {
                    if matches!(in_pattern, Some(PatternKind::Keyword | PatternKind::Binary)) {
                        break;
                    }
                    let loc0 = t.loc;
                    let mut parts: SmallVec<[(crate::intern::Symbol, Loc); 2]> = smallvec![];
                    let mut args = Vec::new();
                    let mut bailed = false;
                    while self.peek1().kind == TokenKind::Keyword {
                        let kt = self.next();
                        parts.push((self.model.interner.intern(&kt.val), kt.loc));
                        match self.parse_expression(scope, Some(PatternKind::Keyword)) {
                            Some(a) => args.push(a),
                            None => {
                                bailed = true;
                                break;
                            }
                        }
                    }
                    cur = self.make_send(PatternKind::Keyword, parts, cur, args, scope, loc0);
                    if bailed {
                        return Some(cur);
                    }
                }
                _ => break,
            }
            t = self.peek1();
        }
        Some(cur)
    }

    fn make_send(
        &mut self,
        pattern: PatternKind,
        parts: SmallVec<[(crate::intern::Symbol, Loc); 2]>,
        receiver: Expr,
        args: Vec<Expr>,
        scope: FuncId,
        loc: Loc,
    ) -> Expr {
        let text: String = parts
            .iter()
            .map(|&(s, _)| self.model.interner.get(s))
            .collect();
        let selector = self.model.interner.intern(&text);
        Expr::Send(Box::new(MsgSend {
            pattern,
            parts,
            selector,
            receiver,
            args,
            method: self.cur_method.unwrap_or(scope),
            flow: crate::ast::FlowControl::None,
            loc,
        }))
    }

    fn simple_expression(&mut self, scope: FuncId) -> Option<Expr> {
        let t = self.peek1();
        match t.kind {
            TokenKind::Ident => {
                self.next();
                let name = self.model.interner.intern(&t.val);
                Some(Expr::Ident(Ident::new(name, t.loc)))
            }
            TokenKind::Minus => {
                // a '-' at expression start folds into a negative literal
                self.next();
                let t2 = self.peek1();
                if t2.kind == TokenKind::Integer || t2.kind == TokenKind::Real {
                    self.next();
                    let text = format!("-{}", t2.val);
                    Some(self.number_expr(&text, t2.kind == TokenKind::Real, t2.loc))
                } else {
                    self.err("expecting number after '-'", t2.loc);
                    None
                }
            }
            TokenKind::Integer | TokenKind::Real => {
                self.next();
                Some(self.number_expr(&t.val, t.kind == TokenKind::Real, t.loc))
            }
            TokenKind::Str => {
                self.next();
                Some(Expr::Str(StrLit {
                    value: t.val,
                    loc: t.loc,
                }))
            }
            TokenKind::Char => {
                self.next();
                Some(Expr::Char(CharLit {
                    value: t.val.bytes().next().unwrap_or(0),
                    loc: t.loc,
                }))
            }
            TokenKind::Hash => {
                if self.lexer.peek(2).kind == TokenKind::Lpar {
                    self.next();
                    self.parse_array(scope)
                } else {
                    self.err("expecting '('", t.loc);
                    None
                }
            }
            TokenKind::Symbol => {
                self.next();
                Some(Expr::Sym(SymbolLit {
                    text: t.val,
                    loc: t.loc,
                }))
            }
            TokenKind::Lpar => {
                self.next();
                let e = self.parse_expression(scope, None)?;
                let t2 = self.next();
                if t2.kind != TokenKind::Rpar {
                    self.err("expecting ')'", t2.loc);
                }
                Some(e)
            }
            TokenKind::Lbrack => self.parse_block(scope),
            _ => {
                self.err("invalid expression", t.loc);
                None
            }
        }
    }

    fn number_expr(&mut self, text: &str, real: bool, loc: Loc) -> Expr {
        if real {
            match parse_real(text) {
                Some(value) => Expr::Real(RealLit { value, loc }),
                None => {
                    self.err("invalid real", loc);
                    Expr::Real(RealLit { value: 0.0, loc })
                }
            }
        } else {
            match parse_integer(text) {
                Some(value) => Expr::Integer(IntegerLit { value, loc }),
                None => {
                    self.err("invalid integer", loc);
                    Expr::Integer(IntegerLit { value: 0, loc })
                }
            }
        }
    }

    fn parse_block(&mut self, outer: FuncId) -> Option<Expr> {
        let t = self.next(); // '['
        self.block_level += 1;
        let cid = self.class_id();
        let fid = self.model.alloc_func(Function {
            class: cid,
            parent: Some(outer),
            num_params: 0,
            vars: Vec::new(),
            inlined_vars: Vec::new(),
            body: Vec::new(),
            upvalue_source: false,
            loc: t.loc,
            end: t.loc,
            kind: FuncKind::Block(BlockInfo {
                syntax_depth: self.block_level,
                inlined_depth: 0,
                inline: false,
            }),
        });
        self.parse_block_body(fid);
        self.block_level -= 1;
        Some(Expr::Block(BlockRef { func: fid, loc: t.loc }))
    }

    fn parse_block_body(&mut self, block: FuncId) {
        let mut t = self.peek1();
        let mut has_params = false;
        while t.kind == TokenKind::Colon {
            self.next();
            let t2 = self.next();
            if t2.kind != TokenKind::Ident {
                self.err("expecting identifier in block argument declaration", t2.loc);
                return;
            }
            let name = self.model.interner.intern(&t2.val);
            if self.model.find_var_local(block, name).is_some() {
                self.err("block argument names must be unique", t2.loc);
            } else {
                let var = self.model.alloc_var(Variable {
                    name,
                    kind: VarKind::Argument,
                    slot: 0,
                    owner: VarOwner::Func(block),
                    inlined_owner: None,
                    loc: t2.loc,
                });
                self.model.func_mut(block).vars.push(var);
            }
            has_params = true;
            t = self.peek1();
        }
        if has_params && t.kind == TokenKind::Bar {
            self.next();
        }
        let num_params = u8::try_from(self.model.func(block).vars.len()).unwrap_or(u8::MAX);
        self.model.func_mut(block).num_params = num_params;

        let mut locals_allowed = true;
        loop {
            let t = self.peek1();
            match t.kind {
                k if is_stmt_start(k) => match self.parse_expression(block, None) {
                    Some(e) => self.model.func_mut(block).body.push(e),
                    None => {
                        self.skip_to_statement_boundary();
                    }
                },
                TokenKind::Bar => {
                    if locals_allowed {
                        locals_allowed = false;
                        self.parse_locals(block);
                    } else {
                        self.err("temp declaration not allowed here", t.loc);
                        return;
                    }
                }
                TokenKind::Hat => {
                    if let Some(e) = self.parse_return(block) {
                        self.model.func_mut(block).body.push(e);
                        if let Some(m) = self.cur_method {
                            self.model.func_mut(m).method_mut().has_non_local_return = true;
                        }
                    } else {
                        self.skip_to_statement_boundary();
                    }
                }
                TokenKind::Dot => {
                    self.next();
                }
                TokenKind::Rbrack => {
                    self.next();
                    self.model.func_mut(block).end = t.loc;
                    if self.model.func(block).body.is_empty() {
                        self.err("empty block bodies not supported", t.loc);
                    }
                    return;
                }
                _ => {
                    self.err("expecting statement", t.loc);
                    return;
                }
            }
        }
    }

    fn parse_return(&mut self, scope: FuncId) -> Option<Expr> {
        let t = self.next(); // '^'
        let value = self.parse_expression(scope, None)?;
        Some(Expr::Return(Box::new(Return {
            value,
            non_local: self.block_level > 0,
            non_local_if_inlined: false,
            loc: t.loc,
        })))
    }

    fn parse_array(&mut self, scope: FuncId) -> Option<Expr> {
        let open = self.next();
        if open.kind != TokenKind::Lpar {
            self.err("expecting '('", open.loc);
            return None;
        }
        let mut elements = Vec::new();
        loop {
            let t = self.peek1();
            match t.kind {
                TokenKind::Rpar => {
                    self.next();
                    break;
                }
                TokenKind::Integer | TokenKind::Real => {
                    self.next();
                    elements.push(self.number_expr(&t.val, t.kind == TokenKind::Real, t.loc));
                }
                TokenKind::Minus => {
                    self.next();
                    let t2 = self.peek1();
                    if t2.kind == TokenKind::Integer || t2.kind == TokenKind::Real {
                        self.next();
                        let text = format!("-{}", t2.val);
                        elements.push(self.number_expr(&text, t2.kind == TokenKind::Real, t2.loc));
                    } else {
                        self.err("invalid array element", t2.loc);
                        return Some(Expr::Array(ArrayLit {
                            elements,
                            loc: open.loc,
                        }));
                    }
                }
                TokenKind::Str => {
                    self.next();
                    elements.push(Expr::Str(StrLit {
                        value: t.val,
                        loc: t.loc,
                    }));
                }
                TokenKind::Char => {
                    self.next();
                    elements.push(Expr::Char(CharLit {
                        value: t.val.bytes().next().unwrap_or(0),
                        loc: t.loc,
                    }));
                }
                TokenKind::Symbol => {
                    self.next();
                    elements.push(Expr::Sym(SymbolLit {
                        text: t.val,
                        loc: t.loc,
                    }));
                }
                // bare identifiers and keyword runs inside array literals
                // denote symbols
                TokenKind::Ident => {
                    self.next();
                    elements.push(Expr::Sym(SymbolLit {
                        text: t.val,
                        loc: t.loc,
                    }));
                }
                TokenKind::Keyword => {
                    let mut text = String::new();
                    while self.peek1().kind == TokenKind::Keyword {
                        text.push_str(&self.next().val);
                    }
                    elements.push(Expr::Sym(SymbolLit { text, loc: t.loc }));
                }
                TokenKind::Hash => {
                    self.next();
                    if self.peek1().kind == TokenKind::Lpar {
                        elements.push(self.parse_array(scope)?);
                    } else {
                        self.err("invalid array element", t.loc);
                        return Some(Expr::Array(ArrayLit {
                            elements,
                            loc: open.loc,
                        }));
                    }
                }
                TokenKind::Lpar => {
                    elements.push(self.parse_array(scope)?);
                }
                TokenKind::Eof | TokenKind::Invalid | TokenKind::Error => {
                    self.err("non-terminated array literal", t.loc);
                    break;
                }
                _ => {
                    self.err("invalid array element", t.loc);
                    self.next();
                    break;
                }
            }
        }
        Some(Expr::Array(ArrayLit {
            elements,
            loc: open.loc,
        }))
    }
}

fn is_method_start(k: TokenKind) -> bool {
    k == TokenKind::Ident || k == TokenKind::Keyword || k == TokenKind::BinSelector || k.is_binary_char()
}

fn is_stmt_start(k: TokenKind) -> bool {
    matches!(
        k,
        TokenKind::Ident
            | TokenKind::Hash
            | TokenKind::Symbol
            | TokenKind::Lpar
            | TokenKind::Lbrack
            | TokenKind::Real
            | TokenKind::Integer
            | TokenKind::Str
            | TokenKind::Char
            | TokenKind::Minus
    )
}

/// Evaluates an integer literal, with the optional `B r digits` radix form.
#[must_use]
pub fn parse_integer(text: &str) -> Option<i64> {
    let (neg, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = match body.split_once('r') {
        Some((base, digits)) => {
            let base: u32 = base.parse().ok()?;
            if !matches!(base, 2 | 8 | 10 | 16) {
                return None;
            }
            i64::from_str_radix(digits, base).ok()?
        }
        None => body.parse::<i64>().ok()?,
    };
    Some(if neg { value.checked_neg()? } else { value })
}

/// Evaluates a real literal, including radix mantissas and exponents.
#[must_use]
pub fn parse_real(text: &str) -> Option<f64> {
    let (neg, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = match body.split_once('r') {
        Some((base, digits)) => {
            let base: u32 = base.parse().ok()?;
            if !matches!(base, 2 | 8 | 10 | 16) {
                return None;
            }
            let (mantissa, exp) = match digits.split_once('e') {
                Some((m, e)) => (m, e.parse::<i32>().ok()?),
                None => (digits, 0),
            };
            let (whole, frac) = match mantissa.split_once('.') {
                Some((w, f)) => (w, f),
                None => (mantissa, ""),
            };
            let mut v = if whole.is_empty() {
                0.0
            } else {
                i64::from_str_radix(whole, base).ok()? as f64
            };
            if !frac.is_empty() {
                let f = i64::from_str_radix(frac, base).ok()? as f64;
                v += f / f64::from(base).powi(i32::try_from(frac.len()).ok()?);
            }
            v * 10f64.powi(exp)
        }
        None => body.parse::<f64>().ok()?,
    };
    Some(if neg { -value } else { value })
}
