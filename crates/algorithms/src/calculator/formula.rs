//! Grid calculator formulas
//!
//! Grids are referenced by letter in input order (`a` is the first grid,
//! `b` the second, ...). Supported syntax:
//! - numbers, `pi`
//! - `+ - * / ^`, unary minus, parentheses
//! - comparisons `<`, `>`, `=` (1 when true, 0 otherwise)
//! - `gt lt eq ge le and or not ifelse`
//! - `abs sqrt exp ln log int min max pow sin cos tan atan`
//!
//! Example: `(or(gt(a,0),eq(a,0)))+(or(gt(a,5),eq(a,5)))` counts how many
//! thresholds `a` reaches.

use slopeclass_core::{Error, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char), // + - * / ^ < > =
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Gt,
    Lt,
    Eq,
    Ge,
    Le,
    And,
    Or,
    Not,
    IfElse,
    Abs,
    Sqrt,
    Exp,
    Ln,
    Log,
    Int,
    Min,
    Max,
    Pow,
    Sin,
    Cos,
    Tan,
    Atan,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        let f = match name {
            "gt" => Func::Gt,
            "lt" => Func::Lt,
            "eq" => Func::Eq,
            "ge" => Func::Ge,
            "le" => Func::Le,
            "and" => Func::And,
            "or" => Func::Or,
            "not" => Func::Not,
            "ifelse" => Func::IfElse,
            "abs" => Func::Abs,
            "sqrt" => Func::Sqrt,
            "exp" => Func::Exp,
            "ln" => Func::Ln,
            "log" => Func::Log,
            "int" => Func::Int,
            "min" => Func::Min,
            "max" => Func::Max,
            "pow" => Func::Pow,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "atan" => Func::Atan,
            _ => return None,
        };
        Some(f)
    }

    fn arity(self) -> usize {
        match self {
            Func::Not
            | Func::Abs
            | Func::Sqrt
            | Func::Exp
            | Func::Ln
            | Func::Log
            | Func::Int
            | Func::Sin
            | Func::Cos
            | Func::Tan
            | Func::Atan => 1,
            Func::IfElse => 3,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Num(f64),
    Grid(usize),
    BinOp {
        op: char,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Neg(Box<Expr>),
    Call { func: Func, args: Vec<Expr> },
}

fn tokenize(formula: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = formula.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => {
                i += 1;
            }
            '+' | '-' | '*' | '/' | '^' | '<' | '>' | '=' => {
                tokens.push(Token::Op(chars[i]));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent: 1e-3, 2.5E4
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let num_str: String = chars[start..i].iter().collect();
                let num = num_str
                    .parse::<f64>()
                    .map_err(|_| Error::Formula(format!("Invalid number: {}", num_str)))?;
                tokens.push(Token::Number(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(name.to_ascii_lowercase()));
            }
            c => {
                return Err(Error::Formula(format!(
                    "Unexpected character '{}' in formula",
                    c
                )));
            }
        }
    }

    Ok(tokens)
}

/// Recursive descent parser, lowest precedence first:
/// comparison, additive, multiplicative, unary, power, primary
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<()> {
        match self.advance() {
            Some(t) if t == token => Ok(()),
            other => Err(Error::Formula(format!("Expected {}, found {:?}", what, other))),
        }
    }

    fn parse(mut self) -> Result<Expr> {
        let expr = self.parse_comparison()?;
        match self.peek() {
            None => Ok(expr),
            Some(t) => Err(Error::Formula(format!("Unexpected trailing token {:?}", t))),
        }
    }

    fn binary(op: char, left: Expr, right: Expr) -> Expr {
        Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// comparison = additive (('<' | '>' | '=') additive)*
    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        while let Some(Token::Op(op @ ('<' | '>' | '='))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_additive()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    /// additive = term (('+' | '-') term)*
    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_term()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    /// term = unary (('*' | '/') unary)*
    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_unary()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    /// unary = ('-' | '+') unary | power
    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.advance();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Some(Token::Op('+')) => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    /// power = primary ('^' unary)?, right associative
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_primary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.advance();
            let exponent = self.parse_unary()?;
            return Ok(Self::binary('^', base, exponent));
        }
        Ok(base)
    }

    /// primary = number | grid | constant | call | '(' comparison ')'
    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Num(n)),
            Some(Token::LParen) => {
                let expr = self.parse_comparison()?;
                self.expect(Token::RParen, "closing parenthesis")?;
                Ok(expr)
            }
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.advance();
                    return self.parse_call(&name);
                }
                ident_value(&name)
            }
            other => Err(Error::Formula(format!(
                "Unexpected token in formula: {:?}",
                other
            ))),
        }
    }

    fn parse_call(&mut self, name: &str) -> Result<Expr> {
        let func = Func::lookup(name)
            .ok_or_else(|| Error::Formula(format!("Unknown function '{}'", name)))?;

        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            args.push(self.parse_comparison()?);
            while let Some(Token::Comma) = self.peek() {
                self.advance();
                args.push(self.parse_comparison()?);
            }
        }
        self.expect(Token::RParen, "closing parenthesis")?;

        if args.len() != func.arity() {
            return Err(Error::Formula(format!(
                "Function '{}' takes {} argument(s), got {}",
                name,
                func.arity(),
                args.len()
            )));
        }
        Ok(Expr::Call { func, args })
    }
}

fn ident_value(name: &str) -> Result<Expr> {
    if name == "pi" {
        return Ok(Expr::Num(std::f64::consts::PI));
    }
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c @ 'a'..='z'), None) => Ok(Expr::Grid((c as u8 - b'a') as usize)),
        _ => Err(Error::Formula(format!("Unknown identifier '{}'", name))),
    }
}

fn truth(v: bool) -> f64 {
    if v {
        1.0
    } else {
        0.0
    }
}

fn eval(expr: &Expr, values: &[f64]) -> f64 {
    match expr {
        Expr::Num(n) => *n,
        Expr::Grid(i) => values.get(*i).copied().unwrap_or(f64::NAN),
        Expr::Neg(inner) => -eval(inner, values),
        Expr::BinOp { op, left, right } => {
            let l = eval(left, values);
            let r = eval(right, values);
            match op {
                '+' => l + r,
                '-' => l - r,
                '*' => l * r,
                '/' => {
                    if r == 0.0 {
                        f64::NAN
                    } else {
                        l / r
                    }
                }
                '^' => l.powf(r),
                '<' => truth(l < r),
                '>' => truth(l > r),
                '=' => truth(l == r),
                _ => f64::NAN,
            }
        }
        Expr::Call { func, args } => {
            let arg = |k: usize| eval(&args[k], values);
            match func {
                Func::Gt => truth(arg(0) > arg(1)),
                Func::Lt => truth(arg(0) < arg(1)),
                Func::Eq => truth(arg(0) == arg(1)),
                Func::Ge => truth(arg(0) >= arg(1)),
                Func::Le => truth(arg(0) <= arg(1)),
                Func::And => truth(arg(0) != 0.0 && arg(1) != 0.0),
                Func::Or => truth(arg(0) != 0.0 || arg(1) != 0.0),
                Func::Not => truth(arg(0) == 0.0),
                Func::IfElse => {
                    if arg(0) != 0.0 {
                        arg(1)
                    } else {
                        arg(2)
                    }
                }
                Func::Abs => arg(0).abs(),
                Func::Sqrt => arg(0).sqrt(),
                Func::Exp => arg(0).exp(),
                Func::Ln => arg(0).ln(),
                Func::Log => arg(0).log10(),
                Func::Int => arg(0).trunc(),
                Func::Min => arg(0).min(arg(1)),
                Func::Max => arg(0).max(arg(1)),
                Func::Pow => arg(0).powf(arg(1)),
                Func::Sin => arg(0).sin(),
                Func::Cos => arg(0).cos(),
                Func::Tan => arg(0).tan(),
                Func::Atan => arg(0).atan(),
            }
        }
    }
}

fn max_grid(expr: &Expr) -> Option<usize> {
    match expr {
        Expr::Num(_) => None,
        Expr::Grid(i) => Some(*i),
        Expr::Neg(inner) => max_grid(inner),
        Expr::BinOp { left, right, .. } => max_grid(left).max(max_grid(right)),
        Expr::Call { args, .. } => args.iter().filter_map(max_grid).max(),
    }
}

/// A parsed calculator formula
#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    expr: Expr,
    grids: usize,
}

impl Formula {
    pub fn parse(formula: &str) -> Result<Self> {
        let tokens = tokenize(formula)?;
        if tokens.is_empty() {
            return Err(Error::Formula("Empty formula".into()));
        }
        let expr = Parser::new(tokens).parse()?;
        let grids = max_grid(&expr).map_or(0, |i| i + 1);
        Ok(Self {
            source: formula.to_string(),
            expr,
            grids,
        })
    }

    /// Number of input grids the formula needs (highest letter referenced)
    pub fn grid_count(&self) -> usize {
        self.grids
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate with `values[0]` bound to `a`, `values[1]` to `b`, ...
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        eval(&self.expr, values)
    }
}

impl FromStr for Formula {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Formula::parse(s)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
