//! The `{{#expr:…}}` / `{{#ifexpr:…}}` arithmetic language.
//!
//! Operators and their binding strength, strongest first:
//!
//! | precedence | operators |
//! |---|---|
//! | 10 | unary `+` `-`, binary `e` (`2e3` = 2000) |
//! | 9 | `not`, `trunc` `floor` `ceil` `abs` `sqrt` `exp` `ln` `sin` `cos` `tan` `asin` `acos` `atan` |
//! | 8 | `^` |
//! | 7 | `*` `/` `div` `mod` `fmod` |
//! | 6 | binary `+` `-` |
//! | 5 | `round` |
//! | 4 | `=` `<` `>` `<=` `>=` `<>` `!=` |
//! | 3 | `and` |
//! | 2 | `or` |
//!
//! All binary operators associate to the left, so `-2^2` is 4 and `2^3^2` is 64. `pi` and `e` (in
//! operand position) are constants. Comparisons and logical operators yield 1 or 0.

use std::f64::consts;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    #[error("Expression error: Unexpected number.")]
    UnexpectedNumber,
    #[error("Expression error: Unrecognized punctuation character \"{0}\".")]
    UnrecognizedPunctuation(char),
    #[error("Expression error: Unrecognized word \"{0}\".")]
    UnrecognizedWord(String),
    #[error("Expression error: Missing operand for {0}.")]
    MissingOperand(&'static str),
    #[error("Expression error: Unexpected {0} operator.")]
    UnexpectedOperator(&'static str),
    #[error("Expression error: Unexpected closing bracket.")]
    UnexpectedClosingBracket,
    #[error("Expression error: Unclosed bracket.")]
    UnclosedBracket,
    #[error("Division by zero.")]
    DivisionByZero,
    #[error("Invalid argument for {0}: < -1 or > 1.")]
    OutOfDomain(&'static str),
    #[error("Invalid argument for ln: <= 0.")]
    InvalidLogarithm,
    #[error("In {0}: result is not a number.")]
    NotANumber(&'static str),
    #[error("Expression error: Expression nested too deeply.")]
    TooDeep,
}

impl ExprError {
    /// The inline error text, recognizable by `{{#iferror:…}}`.
    pub fn marker(&self) -> String {
        format!("<strong class=\"error\">{self}</strong>")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Plus,
    Minus,
    Times,
    Divide,
    Mod,
    Fmod,
    Pow,
    Exponent,
    Round,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    And,
    Or,
    Not,
    Trunc,
    Floor,
    Ceil,
    Abs,
    Sqrt,
    Exp,
    Ln,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
}

const UNARY_PRECEDENCE: u8 = 10;

/// Brackets, signs and prefix functions that may be open at once.
const MAX_NESTING: usize = 256;

impl Op {
    fn name(self) -> &'static str {
        match self {
            Op::Plus => "+",
            Op::Minus => "-",
            Op::Times => "*",
            Op::Divide => "/",
            Op::Mod => "mod",
            Op::Fmod => "fmod",
            Op::Pow => "^",
            Op::Exponent => "e",
            Op::Round => "round",
            Op::Equal => "=",
            Op::NotEqual => "<>",
            Op::Less => "<",
            Op::Greater => ">",
            Op::LessEqual => "<=",
            Op::GreaterEqual => ">=",
            Op::And => "and",
            Op::Or => "or",
            Op::Not => "not",
            Op::Trunc => "trunc",
            Op::Floor => "floor",
            Op::Ceil => "ceil",
            Op::Abs => "abs",
            Op::Sqrt => "sqrt",
            Op::Exp => "exp",
            Op::Ln => "ln",
            Op::Sin => "sin",
            Op::Cos => "cos",
            Op::Tan => "tan",
            Op::Asin => "asin",
            Op::Acos => "acos",
            Op::Atan => "atan",
        }
    }

    fn from_word(word: &str) -> Option<Op> {
        Some(match word {
            "e" => Op::Exponent,
            "mod" => Op::Mod,
            "fmod" => Op::Fmod,
            "div" => Op::Divide,
            "round" => Op::Round,
            "and" => Op::And,
            "or" => Op::Or,
            "not" => Op::Not,
            "trunc" => Op::Trunc,
            "floor" => Op::Floor,
            "ceil" => Op::Ceil,
            "abs" => Op::Abs,
            "sqrt" => Op::Sqrt,
            "exp" => Op::Exp,
            "ln" => Op::Ln,
            "sin" => Op::Sin,
            "cos" => Op::Cos,
            "tan" => Op::Tan,
            "asin" => Op::Asin,
            "acos" => Op::Acos,
            "atan" => Op::Atan,
            _ => return None,
        })
    }

    /// Binding strength as a binary operator; `None` for prefix-only operators.
    fn binary_precedence(self) -> Option<u8> {
        match self {
            Op::Exponent => Some(10),
            Op::Pow => Some(8),
            Op::Times | Op::Divide | Op::Mod | Op::Fmod => Some(7),
            Op::Plus | Op::Minus => Some(6),
            Op::Round => Some(5),
            Op::Equal
            | Op::NotEqual
            | Op::Less
            | Op::Greater
            | Op::LessEqual
            | Op::GreaterEqual => Some(4),
            Op::And => Some(3),
            Op::Or => Some(2),
            _ => None,
        }
    }

    fn apply_binary(self, left: f64, right: f64) -> Result<f64, ExprError> {
        let truth = |b: bool| if b { 1.0 } else { 0.0 };
        Ok(match self {
            Op::Plus => left + right,
            Op::Minus => left - right,
            Op::Times => left * right,
            Op::Divide => {
                if right == 0.0 {
                    return Err(ExprError::DivisionByZero);
                }
                left / right
            }
            Op::Mod => {
                let divisor = right.trunc() as i64;
                if divisor == 0 {
                    return Err(ExprError::DivisionByZero);
                }
                (left.trunc() as i64).checked_rem(divisor).unwrap_or(0) as f64
            }
            Op::Fmod => {
                if right == 0.0 {
                    return Err(ExprError::DivisionByZero);
                }
                left % right
            }
            Op::Pow => {
                let result = left.powf(right);
                if result.is_nan() {
                    return Err(ExprError::NotANumber("^"));
                }
                result
            }
            Op::Exponent => left * 10f64.powf(right),
            Op::Round => {
                let factor = 10f64.powi((right.trunc() as i32).clamp(-300, 300));
                (left * factor).round() / factor
            }
            Op::Equal => truth(left == right),
            Op::NotEqual => truth(left != right),
            Op::Less => truth(left < right),
            Op::Greater => truth(left > right),
            Op::LessEqual => truth(left <= right),
            Op::GreaterEqual => truth(left >= right),
            Op::And => truth(left != 0.0 && right != 0.0),
            Op::Or => truth(left != 0.0 || right != 0.0),
            _ => unreachable!("{} is not a binary operator", self.name()),
        })
    }

    fn apply_prefix(self, value: f64) -> Result<f64, ExprError> {
        Ok(match self {
            Op::Plus => value,
            Op::Minus => -value,
            Op::Not => {
                if value == 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Op::Trunc => value.trunc(),
            Op::Floor => value.floor(),
            Op::Ceil => value.ceil(),
            Op::Abs => value.abs(),
            Op::Sqrt => {
                if value < 0.0 {
                    return Err(ExprError::NotANumber("sqrt"));
                }
                value.sqrt()
            }
            Op::Exp => value.exp(),
            Op::Ln => {
                if value <= 0.0 {
                    return Err(ExprError::InvalidLogarithm);
                }
                value.ln()
            }
            Op::Sin => value.sin(),
            Op::Cos => value.cos(),
            Op::Tan => value.tan(),
            Op::Asin | Op::Acos if !(-1.0..=1.0).contains(&value) => {
                return Err(ExprError::OutOfDomain(self.name()));
            }
            Op::Asin => value.asin(),
            Op::Acos => value.acos(),
            Op::Atan => value.atan(),
            _ => return Err(ExprError::UnexpectedOperator(self.name())),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Constant(f64),
    Op(Op),
    Open,
    Close,
}

fn tokenize(text: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '0'..='9' | '.' => {
                let mut end = start + 1;
                while let Some(&(i, d)) = chars.peek() {
                    if !(d.is_ascii_digit() || d == '.') {
                        break;
                    }
                    end = i + 1;
                    chars.next();
                }
                Token::Number(parse_number(&text[start..end]))
            }
            'a'..='z' | 'A'..='Z' => {
                let mut end = start + 1;
                while let Some(&(i, d)) = chars.peek() {
                    if !d.is_ascii_alphabetic() {
                        break;
                    }
                    end = i + 1;
                    chars.next();
                }
                let word = text[start..end].to_ascii_lowercase();
                match word.as_str() {
                    "pi" => Token::Constant(consts::PI),
                    word => match Op::from_word(word) {
                        Some(op) => Token::Op(op),
                        None => return Err(ExprError::UnrecognizedWord(word.to_string())),
                    },
                }
            }
            '+' => Token::Op(Op::Plus),
            '-' | '\u{2212}' => Token::Op(Op::Minus),
            '*' => Token::Op(Op::Times),
            '/' => Token::Op(Op::Divide),
            '^' => Token::Op(Op::Pow),
            '(' => Token::Open,
            ')' => Token::Close,
            '=' => Token::Op(Op::Equal),
            '<' | '>' | '!' => {
                let next = chars.peek().map(|&(_, n)| n);
                let (op, two) = match (c, next) {
                    ('<', Some('=')) => (Op::LessEqual, true),
                    ('<', Some('>')) => (Op::NotEqual, true),
                    ('>', Some('=')) => (Op::GreaterEqual, true),
                    ('!', Some('=')) => (Op::NotEqual, true),
                    ('<', _) => (Op::Less, false),
                    ('>', _) => (Op::Greater, false),
                    _ => return Err(ExprError::UnrecognizedPunctuation(c)),
                };
                if two {
                    chars.next();
                }
                Token::Op(op)
            }
            c => return Err(ExprError::UnrecognizedPunctuation(c)),
        };
        tokens.push(token);
    }
    Ok(tokens)
}

/// Numbers are digit/dot runs; like PHP's `floatval`, everything from a second dot on is ignored.
fn parse_number(run: &str) -> f64 {
    let valid = match run.match_indices('.').nth(1) {
        Some((second_dot, _)) => &run[..second_dot],
        None => run,
    };
    valid.parse().unwrap_or(0.0)
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    /// `after` is the operator whose operand is being parsed, `None` directly after `(`.
    fn operand(&mut self, after: Option<Op>) -> Result<f64, ExprError> {
        if self.depth >= MAX_NESTING {
            return Err(ExprError::TooDeep);
        }
        self.depth += 1;
        let value = self.operand_inner(after);
        self.depth -= 1;
        value
    }

    fn operand_inner(&mut self, after: Option<Op>) -> Result<f64, ExprError> {
        match self.next() {
            None => Err(match after {
                Some(op) => ExprError::MissingOperand(op.name()),
                None => ExprError::UnclosedBracket,
            }),
            Some(Token::Number(n) | Token::Constant(n)) => Ok(n),
            Some(Token::Open) => {
                let value = self.expression(0, None)?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    _ => Err(ExprError::UnclosedBracket),
                }
            }
            Some(Token::Close) => Err(match after {
                Some(op) => ExprError::MissingOperand(op.name()),
                None => ExprError::UnexpectedClosingBracket,
            }),
            Some(Token::Op(Op::Exponent)) => Ok(consts::E),
            Some(Token::Op(op @ (Op::Plus | Op::Minus))) => {
                let value = self.expression(UNARY_PRECEDENCE, Some(op))?;
                op.apply_prefix(value)
            }
            Some(Token::Op(op)) if op.binary_precedence().is_none() => {
                let value = self.expression(9, Some(op))?;
                op.apply_prefix(value)
            }
            Some(Token::Op(op)) => Err(ExprError::UnexpectedOperator(op.name())),
        }
    }

    /// Parse an operand followed by binary operators binding tighter than `min_precedence`.
    fn expression(&mut self, min_precedence: u8, after: Option<Op>) -> Result<f64, ExprError> {
        let mut left = self.operand(after)?;
        loop {
            match self.peek() {
                None | Some(Token::Close) => return Ok(left),
                Some(Token::Number(_) | Token::Constant(_)) => {
                    return Err(ExprError::UnexpectedNumber)
                }
                Some(Token::Open) => return Err(ExprError::UnexpectedOperator("(")),
                Some(Token::Op(op)) => {
                    let Some(precedence) = op.binary_precedence() else {
                        return Err(ExprError::UnexpectedOperator(op.name()));
                    };
                    if precedence <= min_precedence {
                        return Ok(left);
                    }
                    self.pos += 1;
                    let right = self.expression(precedence, Some(op))?;
                    left = op.apply_binary(left, right)?;
                }
            }
        }
    }
}

/// Evaluate an expression; `Ok(None)` for blank input.
pub fn evaluate(text: &str) -> Result<Option<f64>, ExprError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Ok(None);
    }
    let mut parser = ExprParser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expression(0, None)?;
    match parser.peek() {
        None => Ok(Some(value)),
        Some(_) => Err(ExprError::UnexpectedClosingBracket),
    }
}

/// Render a result the way PHP prints floats (14 significant digits).
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NAN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let scientific = format!("{:.13e}", value.abs());
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return value.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return value.to_string();
    };
    let digits = mantissa.replace('.', "");
    let digits = digits.trim_end_matches('0');
    let sign = if value < 0.0 { "-" } else { "" };

    if !(-4..14).contains(&exponent) {
        let (head, tail) = digits.split_at(1);
        let tail = if tail.is_empty() { "0" } else { tail };
        let exponent_sign = if exponent < 0 { '-' } else { '+' };
        format!("{sign}{head}.{tail}E{exponent_sign}{}", exponent.abs())
    } else if exponent < 0 {
        let zeros = "0".repeat((-exponent - 1) as usize);
        format!("{sign}0.{zeros}{digits}")
    } else {
        let integer_len = exponent as usize + 1;
        if digits.len() <= integer_len {
            let zeros = "0".repeat(integer_len - digits.len());
            format!("{sign}{digits}{zeros}")
        } else {
            format!("{sign}{}.{}", &digits[..integer_len], &digits[integer_len..])
        }
    }
}
