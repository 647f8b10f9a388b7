//! Reverse Polish expressions over decoded results.
//!
//! Tokens are separated by whitespace. Numbers (`0x` hex allowed) and result names push a value,
//! `@` pushes the result's own masked raw value. Operators pop their operands.
use crate::decode::error::Error;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn as_int(self, op: &str) -> Result<i64, Error> {
        match self {
            Number::Int(i) => Ok(i),
            Number::Float(_) => Err(Error::Rpn(format!("{} needs integer operands", op))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
enum Token<'a> {
    Number(Number),
    Name(&'a str),
    Raw,
    Binary(&'a str),
    Unary(&'a str),
}

const BINARY: &[&str] = &["+", "-", "*", "/", "%", "&", "|", "^", "<<", ">>"];
const UNARY: &[&str] = &["~", "neg"];

fn looks_numeric(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('-') | Some('.') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

fn parse_number(token: &str) -> Result<Number, Error> {
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16)
            .map(Number::Int)
            .map_err(|_| Error::Rpn(format!("bad number {}", token)));
    }
    if let Ok(i) = token.parse::<i64>() {
        return Ok(Number::Int(i));
    }
    token
        .parse::<f64>()
        .map(Number::Float)
        .map_err(|_| Error::Rpn(format!("bad number {}", token)))
}

fn tokenize(expr: &str) -> Result<Vec<Token<'_>>, Error> {
    expr.split_whitespace()
        .map(|token| {
            Ok(if token == "@" {
                Token::Raw
            } else if BINARY.contains(&token) {
                Token::Binary(token)
            } else if UNARY.contains(&token) {
                Token::Unary(token)
            } else if looks_numeric(token) {
                Token::Number(parse_number(token)?)
            } else {
                Token::Name(token)
            })
        })
        .collect()
}

/// Result names referenced by `expr`.
pub fn references(expr: &str) -> Vec<&str> {
    expr.split_whitespace()
        .filter(|token| {
            *token != "@" && !BINARY.contains(token) && !UNARY.contains(token) && !looks_numeric(token)
        })
        .collect()
}

/// Whether `expr` uses the raw value of its own byte range.
pub fn uses_raw(expr: &str) -> bool {
    expr.split_whitespace().any(|token| token == "@")
}

fn binary(op: &str, a: Number, b: Number) -> Result<Number, Error> {
    let overflow = || Error::Overflow;

    if let (Number::Int(a), Number::Int(b)) = (a, b) {
        let value = match op {
            "+" => a.checked_add(b).ok_or_else(overflow)?,
            "-" => a.checked_sub(b).ok_or_else(overflow)?,
            "*" => a.checked_mul(b).ok_or_else(overflow)?,
            "/" | "%" if b == 0 => return Err(Error::DivisionByZero),
            "/" => a.checked_div(b).ok_or_else(overflow)?,
            "%" => a.checked_rem(b).ok_or_else(overflow)?,
            "&" => a & b,
            "|" => a | b,
            "^" => a ^ b,
            "<<" | ">>" => {
                let shift = u32::try_from(b)
                    .ok()
                    .filter(|s| *s < 64)
                    .ok_or_else(|| Error::Rpn(format!("bad shift amount {}", b)))?;
                if op == "<<" {
                    a << shift
                } else {
                    a >> shift
                }
            }
            _ => return Err(Error::Rpn(format!("unknown operator {}", op))),
        };
        return Ok(Number::Int(value));
    }

    if matches!(op, "&" | "|" | "^" | "<<" | ">>") {
        return Err(Error::Rpn(format!("{} needs integer operands", op)));
    }

    let (a, b) = (a.as_f64(), b.as_f64());
    let value = match op {
        "+" => a + b,
        "-" => a - b,
        "*" => a * b,
        "/" | "%" if b == 0.0 => return Err(Error::DivisionByZero),
        "/" => a / b,
        "%" => a % b,
        _ => return Err(Error::Rpn(format!("unknown operator {}", op))),
    };
    Ok(Number::Float(value))
}

fn unary(op: &str, a: Number) -> Result<Number, Error> {
    match (op, a) {
        ("~", a) => Ok(Number::Int(!a.as_int(op)?)),
        ("neg", Number::Int(i)) => i.checked_neg().map(Number::Int).ok_or(Error::Overflow),
        ("neg", Number::Float(f)) => Ok(Number::Float(-f)),
        _ => Err(Error::Rpn(format!("unknown operator {}", op))),
    }
}

/// Evaluate `expr`. `raw` backs `@`, `lookup` resolves result names.
pub fn evaluate<F>(expr: &str, raw: Option<u64>, mut lookup: F) -> Result<Number, Error>
where
    F: FnMut(&str) -> Result<Number, Error>,
{
    let mut stack: Vec<Number> = vec![];
    let underflow = || Error::Rpn(format!("stack underflow in {:?}", expr));

    for token in tokenize(expr)? {
        match token {
            Token::Number(n) => stack.push(n),
            Token::Name(name) => stack.push(lookup(name)?),
            Token::Raw => {
                let raw = raw.ok_or_else(|| Error::Rpn("@ used without a byte range".into()))?;
                let raw = i64::try_from(raw).map_err(|_| Error::Overflow)?;
                stack.push(Number::Int(raw));
            }
            Token::Binary(op) => {
                let b = stack.pop().ok_or_else(underflow)?;
                let a = stack.pop().ok_or_else(underflow)?;
                stack.push(binary(op, a, b)?);
            }
            Token::Unary(op) => {
                let a = stack.pop().ok_or_else(underflow)?;
                stack.push(unary(op, a)?);
            }
        }
    }

    match stack.as_slice() {
        [n] => Ok(*n),
        [] => Err(Error::Rpn("empty expression".into())),
        _ => Err(Error::Rpn(format!("{} values left on the stack", stack.len()))),
    }
}
