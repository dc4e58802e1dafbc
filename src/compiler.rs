// File: src/compiler.rs
//
// Single-pass Pratt parser and bytecode code generator for Glint. Drives
// the scanner token-by-token, classifies each token through a static
// precedence table, and emits bytecode directly into the chunk of the
// function currently being compiled — there is no intermediate AST.
//
// Lexical state (locals, upvalues, scope depth, enclosing compiler) is
// threaded as an explicit stack of `CompilerFrame`s rather than a
// module-level `current` pointer; pushing a frame when compiling a
// nested `fun` and popping it back off when the body ends plays the
// role of the source's `enclosing` linked list.

use std::rc::Rc;

use colored::Colorize;

use crate::chunk::{Chunk, OpCode};
use crate::scanner::{Scanner, Token, TokenKind};
use crate::value::{ObjFunction, StringInterner, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    fn plus_one(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

type ParseFn = for<'s, 'i> fn(&mut Compiler<'s, 'i>, bool);

struct ParseRule {
    prefix: Option<ParseFn>,
    infix: Option<ParseFn>,
    precedence: Precedence,
}

const fn rule(prefix: Option<ParseFn>, infix: Option<ParseFn>, precedence: Precedence) -> ParseRule {
    ParseRule { prefix, infix, precedence }
}

// Declarative table, built once, indexed by `TokenKind` discriminant —
// not a chain of `if`/`else` dispatching on token kind.
const RULES: [ParseRule; 40] = [
    rule(Some(grouping), Some(call), Precedence::Call), // LeftParen
    rule(None, None, Precedence::None),                 // RightParen
    rule(None, None, Precedence::None),                 // LeftBrace
    rule(None, None, Precedence::None),                 // RightBrace
    rule(None, None, Precedence::None),                 // Comma
    rule(None, None, Precedence::None),                 // Dot
    rule(Some(unary), Some(binary), Precedence::Term),  // Minus
    rule(None, Some(binary), Precedence::Term),         // Plus
    rule(None, None, Precedence::None),                 // Semicolon
    rule(None, Some(binary), Precedence::Factor),       // Slash
    rule(None, Some(binary), Precedence::Factor),       // Star
    rule(Some(unary), None, Precedence::None),          // Bang
    rule(None, Some(binary), Precedence::Equality),     // BangEqual
    rule(None, None, Precedence::None),                 // Equal
    rule(None, Some(binary), Precedence::Equality),     // EqualEqual
    rule(None, Some(binary), Precedence::Comparison),   // Greater
    rule(None, Some(binary), Precedence::Comparison),   // GreaterEqual
    rule(None, Some(binary), Precedence::Comparison),   // Less
    rule(None, Some(binary), Precedence::Comparison),   // LessEqual
    rule(Some(variable), None, Precedence::None),       // Identifier
    rule(Some(string_lit), None, Precedence::None),     // String
    rule(Some(number), None, Precedence::None),         // Number
    rule(None, Some(and_), Precedence::And),            // And
    rule(None, None, Precedence::None),                 // Class
    rule(None, None, Precedence::None),                 // Else
    rule(Some(literal), None, Precedence::None),        // False
    rule(None, None, Precedence::None),                 // For
    rule(None, None, Precedence::None),                 // Fun
    rule(None, None, Precedence::None),                 // If
    rule(Some(literal), None, Precedence::None),        // Nil
    rule(None, Some(or_), Precedence::Or),              // Or
    rule(None, None, Precedence::None),                 // Print
    rule(None, None, Precedence::None),                 // Return
    rule(None, None, Precedence::None),                 // Super
    rule(None, None, Precedence::None),                 // This
    rule(Some(literal), None, Precedence::None),        // True
    rule(None, None, Precedence::None),                 // Var
    rule(None, None, Precedence::None),                 // While
    rule(None, None, Precedence::None),                 // Error
    rule(None, None, Precedence::None),                 // Eof
];

fn get_rule(kind: TokenKind) -> &'static ParseRule {
    &RULES[kind as usize]
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum FunctionType {
    Function,
    Script,
}

struct Local<'src> {
    name: Token<'src>,
    // None = declared but not yet initialized (its own initializer is
    // still compiling); Some(d) = initialized at scope depth d.
    depth: Option<i32>,
    is_captured: bool,
}

struct UpvalueDesc {
    index: u8,
    is_local: bool,
}

struct CompilerFrame<'src> {
    function: ObjFunction,
    ftype: FunctionType,
    locals: Vec<Local<'src>>,
    scope_depth: i32,
    upvalues: Vec<UpvalueDesc>,
}

impl<'src> CompilerFrame<'src> {
    fn new(ftype: FunctionType, name: Option<Rc<crate::value::ObjString>>) -> Self {
        // Slot 0 is reserved: for a script it's unused, for a function
        // frame it holds the closure value itself.
        let reserved = Local {
            name: Token { kind: TokenKind::Identifier, lexeme: "", line: 0 },
            depth: Some(0),
            is_captured: false,
        };
        CompilerFrame {
            function: ObjFunction::new(name),
            ftype,
            locals: vec![reserved],
            scope_depth: 0,
            upvalues: Vec::new(),
        }
    }
}

pub struct Compiler<'src, 'i> {
    current: Token<'src>,
    previous: Token<'src>,
    scanner: Scanner<'src>,
    had_error: bool,
    panic_mode: bool,
    frames: Vec<CompilerFrame<'src>>,
    strings: &'i mut StringInterner,
}

const UINT8_COUNT: usize = 256;

/// Compiles a full source string into a top-level function ("script").
/// Returns `None` if any compile error was reported.
pub fn compile(source: &str, strings: &mut StringInterner) -> Option<Rc<ObjFunction>> {
    let scanner = Scanner::new(source);
    let mut compiler = Compiler {
        current: Token { kind: TokenKind::Error, lexeme: "", line: 0 },
        previous: Token { kind: TokenKind::Error, lexeme: "", line: 0 },
        scanner,
        had_error: false,
        panic_mode: false,
        frames: vec![CompilerFrame::new(FunctionType::Script, None)],
        strings,
    };

    compiler.advance();
    while !compiler.match_token(TokenKind::Eof) {
        compiler.declaration();
    }
    compiler.consume(TokenKind::Eof, "Expect end of expression.");

    let function = compiler.end_compiler();
    if compiler.had_error {
        None
    } else {
        Some(function)
    }
}

impl<'src, 'i> Compiler<'src, 'i> {
    fn frame(&mut self) -> &mut CompilerFrame<'src> {
        self.frames.last_mut().expect("compiler always has a frame")
    }

    fn chunk(&mut self) -> &mut Chunk {
        &mut self.frame().function.chunk
    }

    // --- token stream -----------------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme;
            self.error_at_current(message);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    // --- error reporting ----------------------------------------------
    // Fixed textual format: "[line N] Error at '<lexeme>': <message>",
    // "at end" for EOF, and no "at ..." segment for scanner error tokens
    // (their diagnostic text already became `message`).

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;

        let mut line = format!("[line {}] Error", token.line);
        match token.kind {
            TokenKind::Eof => line.push_str(" at end"),
            TokenKind::Error => {}
            _ => line.push_str(&format!(" at '{}'", token.lexeme)),
        }
        line.push_str(&format!(": {}", message));
        eprintln!("{}", line.red());
        self.had_error = true;
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;

        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    // --- emission -----------------------------------------------------

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.chunk().write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op as u8);
    }

    fn emit_bytes(&mut self, a: u8, b: u8) {
        self.emit_byte(a);
        self.emit_byte(b);
    }

    fn emit_return(&mut self) {
        self.emit_op(OpCode::Nil);
        self.emit_op(OpCode::Return);
    }

    fn emit_constant(&mut self, value: Value) {
        let idx = self.make_constant(value);
        self.emit_bytes(OpCode::Constant as u8, idx);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        let idx = self.chunk().add_constant(value);
        if idx > u8::MAX as usize {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        idx as u8
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk().code.len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        let jump = self.chunk().code.len() - offset - 2;
        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }
        let bytes = (jump as u16).to_be_bytes();
        let chunk = self.chunk();
        chunk.code[offset] = bytes[0];
        chunk.code[offset + 1] = bytes[1];
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.chunk().code.len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }
        let bytes = (offset as u16).to_be_bytes();
        self.emit_byte(bytes[0]);
        self.emit_byte(bytes[1]);
    }

    // --- scopes and locals ----------------------------------------------

    fn begin_scope(&mut self) {
        self.frame().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.frame().scope_depth -= 1;
        let depth = self.frame().scope_depth;

        while let Some(local) = self.frame().locals.last() {
            if local.depth.map_or(false, |d| d > depth) {
                if local.is_captured {
                    self.emit_op(OpCode::CloseUpvalue);
                } else {
                    self.emit_op(OpCode::Pop);
                }
                self.frame().locals.pop();
            } else {
                break;
            }
        }
    }

    fn identifier_constant(&mut self, name: Token<'src>) -> u8 {
        let interned = self.strings.intern(name.lexeme);
        self.make_constant(Value::String(interned))
    }

    fn add_local(&mut self, name: Token<'src>) {
        if self.frame().locals.len() >= UINT8_COUNT {
            self.error("Too many local variables in function.");
            return;
        }
        self.frame().locals.push(Local { name, depth: None, is_captured: false });
    }

    fn declare_variable(&mut self) {
        if self.frame().scope_depth == 0 {
            return;
        }
        let name = self.previous;
        let scope_depth = self.frame().scope_depth;

        let mut redeclared = false;
        for local in self.frame().locals.iter().rev() {
            if let Some(d) = local.depth {
                if d < scope_depth {
                    break;
                }
            }
            if local.name.lexeme == name.lexeme {
                redeclared = true;
            }
        }
        if redeclared {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.frame().scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.previous)
    }

    fn mark_initialized(&mut self) {
        if self.frame().scope_depth == 0 {
            return;
        }
        let depth = self.frame().scope_depth;
        if let Some(local) = self.frame().locals.last_mut() {
            local.depth = Some(depth);
        }
    }

    fn define_variable(&mut self, global: u8) {
        if self.frame().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_bytes(OpCode::DefineGlobal as u8, global);
    }

    fn resolve_local(&mut self, level: usize, name: Token<'src>) -> Option<u8> {
        let found = self.frames[level]
            .locals
            .iter()
            .enumerate()
            .rev()
            .find(|(_, local)| local.name.lexeme == name.lexeme)
            .map(|(i, local)| (i as u8, local.depth.is_none()));

        let (slot, is_uninit) = found?;
        if is_uninit {
            self.error("Can't read local variable in its own initializer.");
        }
        Some(slot)
    }

    fn resolve_upvalue(&mut self, level: usize, name: Token<'src>) -> Option<u8> {
        if level == 0 {
            return None;
        }
        let enclosing = level - 1;

        if let Some(local) = self.resolve_local(enclosing, name) {
            self.frames[enclosing].locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(level, local, true));
        }
        if let Some(upvalue) = self.resolve_upvalue(enclosing, name) {
            return Some(self.add_upvalue(level, upvalue, false));
        }
        None
    }

    fn add_upvalue(&mut self, level: usize, index: u8, is_local: bool) -> u8 {
        let frame = &mut self.frames[level];
        for (i, existing) in frame.upvalues.iter().enumerate() {
            if existing.index == index && existing.is_local == is_local {
                return i as u8;
            }
        }
        if frame.upvalues.len() >= UINT8_COUNT {
            self.error("Too many closure variables in function.");
            return 0;
        }
        frame.upvalues.push(UpvalueDesc { index, is_local });
        frame.function.upvalue_count = frame.upvalues.len();
        (frame.upvalues.len() - 1) as u8
    }

    fn named_variable(&mut self, name: Token<'src>, can_assign: bool) {
        let level = self.frames.len() - 1;

        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local(level, name) {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else if let Some(slot) = self.resolve_upvalue(level, name) {
            (OpCode::GetUpvalue, OpCode::SetUpvalue, slot)
        } else {
            let idx = self.identifier_constant(name);
            (OpCode::GetGlobal, OpCode::SetGlobal, idx)
        };

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_bytes(set_op as u8, arg);
        } else {
            self.emit_bytes(get_op as u8, arg);
        }
    }

    // --- declarations and statements --------------------------------------

    fn declaration(&mut self) {
        if self.match_token(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("Expect function name.");
        self.mark_initialized();
        self.function(FunctionType::Function);
        self.define_variable(global);
    }

    fn function(&mut self, ftype: FunctionType) {
        let name = self.strings.intern(self.previous.lexeme);
        self.frames.push(CompilerFrame::new(ftype, Some(name)));
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            loop {
                let frame_arity = self.frame().function.arity as usize;
                if frame_arity >= 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                self.frame().function.arity += 1;
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);

                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        self.emit_return();
        let frame = self.frames.pop().expect("pushed frame above");
        let upvalues = frame.upvalues;
        let function = Rc::new(frame.function);

        let idx = self.make_constant(Value::Function(function));
        self.emit_bytes(OpCode::Closure as u8, idx);
        for upvalue in upvalues {
            self.emit_byte(upvalue.is_local as u8);
            self.emit_byte(upvalue.index);
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.match_token(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");
        self.define_variable(global);
    }

    fn statement(&mut self) {
        if self.match_token(TokenKind::Print) {
            self.print_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.match_token(TokenKind::For) {
            self.for_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.match_token(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk().code.len();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "Expect '(' after 'for'.");

        if self.match_token(TokenKind::Semicolon) {
            // No initializer clause.
        } else if self.match_token(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.chunk().code.len();
        let mut exit_jump = None;

        if !self.match_token(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.match_token(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.chunk().code.len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(OpCode::Pop);
        }

        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.frame().ftype == FunctionType::Script {
            self.error("Can't return from top-level code.");
        }

        if self.match_token(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
            self.emit_op(OpCode::Return);
        }
    }

    // --- expressions -------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let prefix_rule = get_rule(self.previous.kind).prefix;
        let Some(prefix_rule) = prefix_rule else {
            self.error("Expect expression.");
            return;
        };

        let can_assign = precedence <= Precedence::Assignment;
        prefix_rule(self, can_assign);

        while precedence <= get_rule(self.current.kind).precedence {
            self.advance();
            let infix_rule =
                get_rule(self.previous.kind).infix.expect("infix precedence implies infix rule");
            infix_rule(self, can_assign);
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn end_compiler(&mut self) -> Rc<ObjFunction> {
        self.emit_return();
        let frame = self.frames.pop().expect("top-level frame always present");
        Rc::new(frame.function)
    }
}

// --- parse rule callbacks --------------------------------------------------
//
// Free functions rather than methods, so they can be stored as plain `fn`
// pointers in the `RULES` table.

fn grouping<'s, 'i>(c: &mut Compiler<'s, 'i>, _can_assign: bool) {
    c.expression();
    c.consume(TokenKind::RightParen, "Expect ')' after expression.");
}

fn unary<'s, 'i>(c: &mut Compiler<'s, 'i>, _can_assign: bool) {
    let operator = c.previous.kind;
    c.parse_precedence(Precedence::Unary);

    match operator {
        TokenKind::Bang => c.emit_op(OpCode::Not),
        TokenKind::Minus => c.emit_op(OpCode::Negate),
        _ => unreachable!("unary rule registered for non-unary token"),
    }
}

fn binary<'s, 'i>(c: &mut Compiler<'s, 'i>, _can_assign: bool) {
    let operator = c.previous.kind;
    let rule = get_rule(operator);
    // Left-associative: parse the right operand one precedence level
    // higher than this operator's own (see DESIGN.md for why this, not
    // the operator's own precedence, is the correct fix).
    c.parse_precedence(rule.precedence.plus_one());

    match operator {
        TokenKind::BangEqual => c.emit_bytes(OpCode::Equal as u8, OpCode::Not as u8),
        TokenKind::EqualEqual => c.emit_op(OpCode::Equal),
        TokenKind::Greater => c.emit_op(OpCode::Greater),
        TokenKind::GreaterEqual => c.emit_bytes(OpCode::Less as u8, OpCode::Not as u8),
        TokenKind::Less => c.emit_op(OpCode::Less),
        TokenKind::LessEqual => c.emit_bytes(OpCode::Greater as u8, OpCode::Not as u8),
        TokenKind::Plus => c.emit_op(OpCode::Add),
        TokenKind::Minus => c.emit_op(OpCode::Subtract),
        TokenKind::Star => c.emit_op(OpCode::Multiply),
        TokenKind::Slash => c.emit_op(OpCode::Divide),
        _ => unreachable!("binary rule registered for non-binary token"),
    }
}

fn call<'s, 'i>(c: &mut Compiler<'s, 'i>, _can_assign: bool) {
    let arg_count = argument_list(c);
    c.emit_bytes(OpCode::Call as u8, arg_count);
}

fn argument_list<'s, 'i>(c: &mut Compiler<'s, 'i>) -> u8 {
    let mut count: u32 = 0;
    if !c.check(TokenKind::RightParen) {
        loop {
            c.expression();
            if count == 255 {
                c.error("Can't have more than 255 arguments.");
            }
            count += 1;
            if !c.match_token(TokenKind::Comma) {
                break;
            }
        }
    }
    c.consume(TokenKind::RightParen, "Expect ')' after arguments.");
    count as u8
}

fn number<'s, 'i>(c: &mut Compiler<'s, 'i>, _can_assign: bool) {
    let value: f64 = c.previous.lexeme.parse().expect("scanner only emits well-formed numbers");
    c.emit_constant(Value::Number(value));
}

fn string_lit<'s, 'i>(c: &mut Compiler<'s, 'i>, _can_assign: bool) {
    let lexeme = c.previous.lexeme;
    let text = &lexeme[1..lexeme.len() - 1]; // strip surrounding quotes
    let interned = c.strings.intern(text);
    c.emit_constant(Value::String(interned));
}

fn literal<'s, 'i>(c: &mut Compiler<'s, 'i>, _can_assign: bool) {
    match c.previous.kind {
        TokenKind::False => c.emit_op(OpCode::False),
        TokenKind::Nil => c.emit_op(OpCode::Nil),
        TokenKind::True => c.emit_op(OpCode::True),
        _ => unreachable!("literal rule registered for non-literal token"),
    }
}

fn variable<'s, 'i>(c: &mut Compiler<'s, 'i>, can_assign: bool) {
    let name = c.previous;
    c.named_variable(name, can_assign);
}

fn and_<'s, 'i>(c: &mut Compiler<'s, 'i>, _can_assign: bool) {
    let end_jump = c.emit_jump(OpCode::JumpIfFalse);
    c.emit_op(OpCode::Pop);
    c.parse_precedence(Precedence::And);
    c.patch_jump(end_jump);
}

fn or_<'s, 'i>(c: &mut Compiler<'s, 'i>, _can_assign: bool) {
    let else_jump = c.emit_jump(OpCode::JumpIfFalse);
    let end_jump = c.emit_jump(OpCode::Jump);

    c.patch_jump(else_jump);
    c.emit_op(OpCode::Pop);

    c.parse_precedence(Precedence::Or);
    c.patch_jump(end_jump);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(src: &str) -> Rc<ObjFunction> {
        let mut strings = StringInterner::new();
        compile(src, &mut strings).expect("expected successful compile")
    }

    fn compile_err(src: &str) -> Option<Rc<ObjFunction>> {
        let mut strings = StringInterner::new();
        compile(src, &mut strings)
    }

    #[test]
    fn simple_expression_statement_pops_once() {
        let function = compile_ok("1 + 2;");
        let pops = function.chunk.code.iter().filter(|&&b| b == OpCode::Pop as u8).count();
        assert_eq!(pops, 1);
    }

    #[test]
    fn global_with_self_referencing_initializer_compiles() {
        // At global scope there is no "own initializer" restriction —
        // only locals enforce that.
        assert!(compile_err("var a = a;").is_some());
    }

    #[test]
    fn local_read_in_own_initializer_is_a_compile_error() {
        assert!(compile_err("{ var a = a; }").is_none());
    }

    #[test]
    fn redeclaring_local_in_same_scope_is_an_error() {
        assert!(compile_err("{ var a = 1; var a = 2; }").is_none());
    }

    #[test]
    fn top_level_return_is_an_error() {
        assert!(compile_err("return 1;").is_none());
    }

    #[test]
    fn invalid_assignment_target_is_an_error() {
        assert!(compile_err("var a = 1; var b = 2; a + b = 3;").is_none());
    }

    #[test]
    fn nested_function_builds_one_closure_at_the_enclosing_scope() {
        let function = compile_ok(
            "fun make() { var x = 10; fun get() { return x; } return get; }",
        );
        let closures = function.chunk.code.iter().filter(|&&b| b == OpCode::Closure as u8).count();
        assert_eq!(closures, 1);
    }
}
