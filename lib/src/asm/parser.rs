//! Line-oriented parser for the textual assembly form
//!
//! One operation per line: a directive or mnemonic name followed by a
//! parenthesized, comma-separated argument list. `#` starts a comment.
//! The grammar is small and fixed, so this is a hand-rolled tokenizer plus
//! recursive descent - argument expressions are only integers, strings,
//! `(width, count)` pairs, and operand-constructor calls.

use super::{AsmInstr, AsmOperand, Assembler, Error, Item, LabelRef, RefKind};
use crate::glulx::{CallingConvention, FuncHeader, Opcode, Operand};

/// Parse a whole program, up to and including its `eof()` directive
pub fn parse(source: &str) -> Result<Assembler, Error> {
    let mut asm = Assembler::new();
    for (index, raw_line) in source.lines().enumerate() {
        let line = index + 1;
        let tokens = lex(raw_line, line)?;
        if tokens.is_empty() {
            continue;
        }
        let mut stream = TokenStream { tokens, at: 0, line };
        let (name, args) = stream.statement()?;
        if apply(&mut asm, &name, args, line)? == Outcome::Finished {
            return Ok(asm);
        }
    }
    Err(Error::Parse { line: 0, message: "source ended without an eof() directive".to_owned() })
}

#[derive(PartialEq, Eq)]
enum Outcome {
    Continue,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Int(i64),
    Str(String),
    LParen,
    RParen,
    Comma,
}

fn lex(raw: &str, line: usize) -> Result<Vec<Token>, Error> {
    let err = |message: String| Error::Parse { line, message };
    let mut tokens = vec![];
    let bytes = raw.as_bytes();
    let mut at = 0;
    while at < bytes.len() {
        let c = bytes[at] as char;
        match c {
            '#' => break,
            c if c.is_ascii_whitespace() => at += 1,
            '(' => {
                tokens.push(Token::LParen);
                at += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                at += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                at += 1;
            }
            '"' => {
                at += 1;
                let mut text = String::new();
                loop {
                    match bytes.get(at).copied() {
                        None => return Err(err("unterminated string literal".to_owned())),
                        Some(b'"') => {
                            at += 1;
                            break;
                        }
                        Some(b'\\') => {
                            let escaped = bytes
                                .get(at + 1)
                                .ok_or_else(|| err("unterminated escape".to_owned()))?;
                            text.push(match escaped {
                                b'n' => '\n',
                                b't' => '\t',
                                b'0' => '\0',
                                other => *other as char,
                            });
                            at += 2;
                        }
                        Some(byte) => {
                            text.push(byte as char);
                            at += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c == '-' || c.is_ascii_digit() => {
                let negative = c == '-';
                if negative {
                    at += 1;
                }
                let start = at;
                let radix = if raw[at..].starts_with("0x") || raw[at..].starts_with("0X") {
                    at += 2;
                    16
                } else {
                    10
                };
                let digits_from = at;
                while at < bytes.len() && (bytes[at] as char).is_ascii_hexdigit() {
                    at += 1;
                }
                if at == digits_from {
                    return Err(err(format!("malformed number at column {}", start + 1)));
                }
                let magnitude = i64::from_str_radix(&raw[digits_from..at], radix)
                    .map_err(|_| err(format!("number out of range: {}", &raw[start..at])))?;
                tokens.push(Token::Int(if negative { -magnitude } else { magnitude }));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = at;
                while at < bytes.len()
                    && ((bytes[at] as char).is_ascii_alphanumeric() || bytes[at] == b'_')
                {
                    at += 1;
                }
                tokens.push(Token::Ident(raw[start..at].to_owned()));
            }
            other => return Err(err(format!("unexpected character {:?}", other))),
        }
    }
    Ok(tokens)
}

/// Argument expression of a statement
#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Int(i64),
    Str(String),
    Pair(i64, i64),
    Call(String, Vec<Expr>),
}

struct TokenStream {
    tokens: Vec<Token>,
    at: usize,
    line: usize,
}

impl TokenStream {
    fn err(&self, message: impl Into<String>) -> Error {
        Error::Parse { line: self.line, message: message.into() }
    }

    fn next(&mut self) -> Result<Token, Error> {
        let token = self.tokens.get(self.at).cloned().ok_or_else(|| self.err("unexpected end of line"))?;
        self.at += 1;
        Ok(token)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.at)
    }

    fn expect(&mut self, token: Token) -> Result<(), Error> {
        let found = self.next()?;
        if found == token {
            Ok(())
        } else {
            Err(self.err(format!("expected {:?}, found {:?}", token, found)))
        }
    }

    fn int(&mut self) -> Result<i64, Error> {
        match self.next()? {
            Token::Int(value) => Ok(value),
            other => Err(self.err(format!("expected integer, found {:?}", other))),
        }
    }

    /// `name ( arg, ... )` followed by end of line
    fn statement(&mut self) -> Result<(String, Vec<Expr>), Error> {
        let name = match self.next()? {
            Token::Ident(name) => name,
            other => return Err(self.err(format!("expected a directive name, found {:?}", other))),
        };
        let args = self.call_args()?;
        if let Some(extra) = self.peek() {
            return Err(self.err(format!("trailing tokens after statement: {:?}", extra)));
        }
        Ok((name, args))
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, Error> {
        self.expect(Token::LParen)?;
        let mut args = vec![];
        if self.peek() == Some(&Token::RParen) {
            self.at += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.next()? {
                Token::Comma => continue,
                Token::RParen => return Ok(args),
                other => return Err(self.err(format!("expected `,` or `)`, found {:?}", other))),
            }
        }
    }

    fn expr(&mut self) -> Result<Expr, Error> {
        match self.next()? {
            Token::Int(value) => Ok(Expr::Int(value)),
            Token::Str(text) => Ok(Expr::Str(text)),
            Token::LParen => {
                let first = self.int()?;
                self.expect(Token::Comma)?;
                let second = self.int()?;
                self.expect(Token::RParen)?;
                Ok(Expr::Pair(first, second))
            }
            Token::Ident(name) => Ok(Expr::Call(name, self.call_args()?)),
            other => Err(self.err(format!("expected an expression, found {:?}", other))),
        }
    }
}

fn parse_err(line: usize, message: impl Into<String>) -> Error {
    Error::Parse { line, message: message.into() }
}

fn apply(asm: &mut Assembler, name: &str, args: Vec<Expr>, line: usize) -> Result<Outcome, Error> {
    match name {
        "label" => {
            let [Expr::Str(label)] = args.as_slice() else {
                return Err(parse_err(line, "label() takes one string argument"));
            };
            asm.define_label(label)?;
        }
        "version" => {
            let [Expr::Int(major), Expr::Int(minor), Expr::Int(patch)] = args.as_slice() else {
                return Err(parse_err(line, "version() takes three integers"));
            };
            asm.set_version(*major as u16, *minor as u8, *patch as u8);
        }
        "stack_size" => {
            let [Expr::Int(size)] = args.as_slice() else {
                return Err(parse_err(line, "stack_size() takes one integer"));
            };
            asm.set_stack_size(*size as u32);
        }
        "decoding_tbl" => {
            let [Expr::Int(offset)] = args.as_slice() else {
                return Err(parse_err(line, "decoding_tbl() takes one integer"));
            };
            asm.set_decoding_tbl(*offset as u32);
        }
        "db" | "dw" | "dd" => {
            let width = match name {
                "db" => 1,
                "dw" => 2,
                _ => 4,
            };
            let mut bytes = Vec::with_capacity(args.len() * width);
            for arg in &args {
                let Expr::Int(value) = arg else {
                    return Err(parse_err(line, format!("{}() takes integers", name)));
                };
                match width {
                    1 => bytes.push(*value as u8),
                    2 => bytes.extend_from_slice(&(*value as u16).to_be_bytes()),
                    _ => bytes.extend_from_slice(&(*value as u32).to_be_bytes()),
                }
            }
            asm.push(Item::Data(bytes));
        }
        "dc" => {
            let [Expr::Str(text)] = args.as_slice() else {
                return Err(parse_err(line, "dc() takes one string argument"));
            };
            let mut bytes: Vec<u8> = text.bytes().collect();
            bytes.push(0);
            asm.push(Item::Data(bytes));
        }
        "fill" => {
            let [Expr::Int(count)] = args.as_slice() else {
                return Err(parse_err(line, "fill() takes one integer"));
            };
            if *count < 0 {
                return Err(parse_err(line, "fill() count must be non-negative"));
            }
            asm.push(Item::Data(vec![0; *count as usize]));
        }
        "pad" => {
            let [Expr::Int(boundary)] = args.as_slice() else {
                return Err(parse_err(line, "pad() takes one integer"));
            };
            let boundary = *boundary;
            if boundary <= 0 || boundary & (boundary - 1) != 0 {
                return Err(parse_err(line, "pad() boundary must be a power of two"));
            }
            asm.push(Item::Padding { boundary: boundary as u32 });
        }
        "func_stack" | "func_local" => {
            let convention = if name == "func_stack" {
                CallingConvention::StackArgs
            } else {
                CallingConvention::LocalArgs
            };
            let mut locals = vec![];
            for arg in &args {
                let Expr::Pair(width, count) = arg else {
                    return Err(parse_err(line, format!("{}() takes (width, count) pairs", name)));
                };
                if !matches!(*width, 1 | 2 | 4) {
                    return Err(parse_err(line, format!("local width must be 1, 2, or 4, not {}", width)));
                }
                if !(1..=255).contains(count) {
                    return Err(parse_err(line, format!("local count {} out of range", count)));
                }
                locals.push((*width as u8, *count as u8));
            }
            asm.push(Item::Func(FuncHeader::new(convention, locals)));
        }
        "eof" => {
            if !args.is_empty() {
                return Err(parse_err(line, "eof() takes no arguments"));
            }
            return Ok(Outcome::Finished);
        }
        mnemonic => {
            let Some(opcode) = Opcode::from_mnemonic(mnemonic) else {
                return Err(parse_err(line, format!("unknown directive or mnemonic `{}`", mnemonic)));
            };
            if args.len() != opcode.params().len() {
                return Err(parse_err(
                    line,
                    format!(
                        "{} takes {} operands, found {}",
                        mnemonic,
                        opcode.params().len(),
                        args.len()
                    ),
                ));
            }
            let operands = args
                .into_iter()
                .map(|arg| operand_expr(arg, line))
                .collect::<Result<Vec<_>, _>>()?;
            asm.push(Item::Instr(AsmInstr::new(opcode, operands)));
        }
    }
    Ok(Outcome::Continue)
}

/// Turn one argument expression into an operand (fixed or label reference)
fn operand_expr(expr: Expr, line: usize) -> Result<AsmOperand, Error> {
    let operand = match expr {
        // a bare integer is a canonical immediate
        Expr::Int(value) => AsmOperand::Fixed(Operand::imm(int32(value, line)?)),
        Expr::Call(name, args) => match name.as_str() {
            "imm" => {
                let (value, width) = value_and_width(&name, &args, line)?;
                let value = int32(value, line)?;
                match width {
                    None => AsmOperand::Fixed(Operand::imm(value)),
                    Some(0) if value == 0 => {
                        AsmOperand::Fixed(Operand::Imm { value: 0, width: 0 })
                    }
                    Some(0) => return Err(parse_err(line, "imm(v, 0) requires v == 0")),
                    Some(width) => {
                        AsmOperand::Fixed(Operand::Imm { value, width: operand_width(width, line)? })
                    }
                }
            }
            "mem" | "ram" | "loc" => {
                let (value, width) = value_and_width(&name, &args, line)?;
                let value = value as u32;
                let operand = match (name.as_str(), width) {
                    ("mem", None) => Operand::mem(value),
                    ("mem", Some(w)) => Operand::Mem { addr: value, width: operand_width(w, line)? },
                    ("ram", None) => Operand::ram(value),
                    ("ram", Some(w)) => Operand::Ram { offset: value, width: operand_width(w, line)? },
                    ("loc", None) => Operand::local(value),
                    (_, Some(w)) => Operand::Local { offset: value, width: operand_width(w, line)? },
                    (_, None) => unreachable!(),
                };
                AsmOperand::Fixed(operand)
            }
            "stk" => {
                if !args.is_empty() {
                    return Err(parse_err(line, "stk() takes no arguments"));
                }
                AsmOperand::Fixed(Operand::Stack)
            }
            "lb" | "la" | "limm" | "lmem" | "lram" => {
                let kind = match name.as_str() {
                    "lb" => RefKind::Branch,
                    "la" | "limm" => RefKind::Absolute,
                    "lmem" => RefKind::Mem,
                    _ => RefKind::Ram,
                };
                let (label, width) = match args.as_slice() {
                    [Expr::Str(label)] => (label.clone(), None),
                    [Expr::Str(label), Expr::Int(width)] => {
                        (label.clone(), Some(operand_width(*width, line)?))
                    }
                    _ => {
                        return Err(parse_err(
                            line,
                            format!("{}() takes a label name and an optional width", name),
                        ))
                    }
                };
                AsmOperand::Ref(LabelRef::new(label, kind, width))
            }
            other => return Err(parse_err(line, format!("unknown operand constructor `{}`", other))),
        },
        other => return Err(parse_err(line, format!("expected an operand, found {:?}", other))),
    };
    Ok(operand)
}

fn int32(value: i64, line: usize) -> Result<i32, Error> {
    if !(-0x8000_0000..=0xffff_ffff).contains(&value) {
        return Err(parse_err(line, format!("value {} does not fit in 32 bits", value)));
    }
    Ok(value as u32 as i32)
}

fn operand_width(width: i64, line: usize) -> Result<u8, Error> {
    match width {
        1 | 2 | 4 => Ok(width as u8),
        other => Err(parse_err(line, format!("operand width must be 1, 2, or 4, not {}", other))),
    }
}

/// `(value)` or `(value, width)` argument shapes shared by imm/mem/ram/loc
fn value_and_width(name: &str, args: &[Expr], line: usize) -> Result<(i64, Option<i64>), Error> {
    match args {
        [Expr::Int(value)] => Ok((*value, None)),
        [Expr::Int(value), Expr::Int(width)] => Ok((*value, Some(*width))),
        _ => Err(parse_err(line, format!("{}() takes a value and an optional width", name))),
    }
}
