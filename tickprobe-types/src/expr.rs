//! Integer arithmetic over `+ - * /` and parentheses.
//!
//! Timestamps sit around 10^18, well past the 2^53 limit where `f64` stops
//! representing every integer, so evaluation stays in checked `i64` the whole
//! way through.
//!
//! Grammar:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := ('+' | '-') factor | integer | '(' expr ')'
//! ```

use thiserror::Error;

/// Deepest nesting of parentheses and unary signs accepted.
pub const MAX_DEPTH: usize = 64;

/// Errors from [`evaluate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("empty expression")]
    Empty,

    #[error("unexpected character {found:?} at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unclosed parenthesis opened at offset {0}")]
    UnclosedParen(usize),

    #[error("unexpected input {rest:?} at offset {offset}")]
    TrailingInput { rest: String, offset: usize },

    #[error("integer literal {0:?} does not fit in 64 bits")]
    InvalidInteger(String),

    #[error("arithmetic overflow")]
    Overflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("expression nested deeper than {max} levels at offset {0}", max = MAX_DEPTH)]
    TooDeep(usize),
}

/// Evaluate an integer expression such as `"1700000000000000000-(3600000000000-60000000000)"`.
///
/// Whitespace between tokens is ignored. Division truncates toward zero.
pub fn evaluate(input: &str) -> Result<i64, ExprError> {
    let mut parser = Parser {
        src: input,
        pos: 0,
        depth: 0,
    };

    parser.skip_whitespace();
    if parser.at_end() {
        return Err(ExprError::Empty);
    }

    let value = parser.expr()?;

    parser.skip_whitespace();
    if !parser.at_end() {
        let rest = &input[parser.pos..];
        if rest.starts_with(')') {
            return Err(ExprError::UnexpectedChar {
                found: ')',
                offset: parser.pos,
            });
        }
        return Err(ExprError::TrailingInput {
            rest: rest.to_string(),
            offset: parser.pos,
        });
    }

    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    /// Consume `c` if it is the next non-whitespace character.
    fn eat(&mut self, c: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<i64, ExprError> {
        let mut acc = self.term()?;
        loop {
            if self.eat('+') {
                let rhs = self.term()?;
                acc = acc.checked_add(rhs).ok_or(ExprError::Overflow)?;
            } else if self.eat('-') {
                let rhs = self.term()?;
                acc = acc.checked_sub(rhs).ok_or(ExprError::Overflow)?;
            } else {
                return Ok(acc);
            }
        }
    }

    fn term(&mut self) -> Result<i64, ExprError> {
        let mut acc = self.factor()?;
        loop {
            if self.eat('*') {
                let rhs = self.factor()?;
                acc = acc.checked_mul(rhs).ok_or(ExprError::Overflow)?;
            } else if self.eat('/') {
                let rhs = self.factor()?;
                if rhs == 0 {
                    return Err(ExprError::DivisionByZero);
                }
                acc = acc.checked_div(rhs).ok_or(ExprError::Overflow)?;
            } else {
                return Ok(acc);
            }
        }
    }

    fn factor(&mut self) -> Result<i64, ExprError> {
        self.skip_whitespace();
        if self.depth >= MAX_DEPTH {
            return Err(ExprError::TooDeep(self.pos));
        }
        self.depth += 1;
        let value = self.primary();
        self.depth -= 1;
        value
    }

    fn primary(&mut self) -> Result<i64, ExprError> {
        let start = self.pos;

        match self.peek() {
            None => Err(ExprError::UnexpectedEnd),
            Some('+') => {
                self.pos += 1;
                self.factor()
            }
            Some('-') => {
                self.pos += 1;
                let value = self.factor()?;
                value.checked_neg().ok_or(ExprError::Overflow)
            }
            Some('(') => {
                self.pos += 1;
                let value = self.expr()?;
                if !self.eat(')') {
                    return match self.peek() {
                        None => Err(ExprError::UnclosedParen(start)),
                        Some(found) => Err(ExprError::UnexpectedChar {
                            found,
                            offset: self.pos,
                        }),
                    };
                }
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() => {
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.pos += 1;
                }
                let digits = &self.src[start..self.pos];
                digits
                    .parse()
                    .map_err(|_| ExprError::InvalidInteger(digits.to_string()))
            }
            Some(found) => Err(ExprError::UnexpectedChar {
                found,
                offset: start,
            }),
        }
    }
}
