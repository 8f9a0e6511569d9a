//! Restricted expression language used by condition nodes and computed fields.
//!
//! Expressions are tokenized and parsed by a small recursive-descent parser into
//! an AST, then evaluated against a read-only JSON scope. Nothing is ever handed
//! to an interpreter: the grammar below is the whole language.
//!
//! ```text
//! expr           := or
//! or             := and ( "||" and )*
//! and            := equality ( "&&" equality )*
//! equality       := comparison ( ("==" | "!=" | "===" | "!==") comparison )*
//! comparison     := additive ( ("<" | "<=" | ">" | ">=") additive )*
//! additive       := multiplicative ( ("+" | "-") multiplicative )*
//! multiplicative := unary ( ("*" | "/" | "%") unary )*
//! unary          := ("!" | "-") unary | primary
//! primary        := NUMBER | STRING | "true" | "false" | "null"
//!                 | IDENT ( "." IDENT | "[" (STRING | NUMBER) "]" )*
//!                 | "(" expr ")"
//! ```
//!
//! # Scope
//!
//! Paths must start at one of [`SCOPE_ROOTS`]. A missing leaf property reads as
//! `null`; reading a property of `null` or of a scalar is an error.
//!
//! # Example
//!
//! ```rust
//! use assetrules::engine::expression::Expression;
//! use serde_json::json;
//!
//! let expression = Expression::parse("telemetry.pressure > 500 && attributes.zone == 'north'").unwrap();
//! let scope = json!({
//!     "telemetry": {"pressure": 612.5},
//!     "attributes": {"zone": "north"},
//!     "computed": {},
//!     "asset": {}
//! });
//!
//! assert_eq!(expression.evaluate(&scope).unwrap(), json!(true));
//! ```

use crate::engine::common::{as_number, is_truthy, json_equal, number_value, type_name};
use crate::errors::ExpressionError;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Root identifiers an expression may reference.
pub const SCOPE_ROOTS: [&str; 4] = ["telemetry", "attributes", "computed", "asset"];

const MAX_DEPTH: usize = 64;

/// Binary and logical operators allowed in one expression. Chains nest to the
/// left, so this also bounds the depth of the parsed tree.
const MAX_OPERATORS: usize = 256;

type Result<T> = std::result::Result<T, ExpressionError>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {}", n),
            Token::Str(s) => write!(f, "string '{}'", s),
            Token::Ident(name) => write!(f, "'{}'", name),
            Token::Op(op) => write!(f, "'{}'", op),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::LBracket => f.write_str("'['"),
            Token::RBracket => f.write_str("']'"),
            Token::Dot => f.write_str("'.'"),
            Token::Eof => f.write_str("end of expression"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    let next_is = |i: usize, expected: char| i < len && chars[i] == expected;

    while i < len {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' => {
                let start = i;
                while i < len && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < len && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < len && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < len && chars[j].is_ascii_digit() {
                        i = j;
                        while i < len && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                match literal.parse::<f64>() {
                    Ok(n) if n.is_finite() => tokens.push(Token::Number(n)),
                    _ => return Err(ExpressionError::InvalidNumber { literal }),
                }
            }
            '"' | '\'' => {
                let quote = c;
                let start = i;
                let mut value = String::new();
                i += 1;
                loop {
                    if i >= len {
                        return Err(ExpressionError::UnterminatedString { position: start });
                    }
                    match chars[i] {
                        ch if ch == quote => {
                            i += 1;
                            break;
                        }
                        '\\' if i + 1 < len => {
                            value.push(match chars[i + 1] {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                other => other,
                            });
                            i += 2;
                        }
                        ch => {
                            value.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < len && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '|' if next_is(i + 1, '|') => {
                tokens.push(Token::Op("||"));
                i += 2;
            }
            '&' if next_is(i + 1, '&') => {
                tokens.push(Token::Op("&&"));
                i += 2;
            }
            '=' if next_is(i + 1, '=') => {
                if next_is(i + 2, '=') {
                    tokens.push(Token::Op("==="));
                    i += 3;
                } else {
                    tokens.push(Token::Op("=="));
                    i += 2;
                }
            }
            '!' => {
                if next_is(i + 1, '=') {
                    if next_is(i + 2, '=') {
                        tokens.push(Token::Op("!=="));
                        i += 3;
                    } else {
                        tokens.push(Token::Op("!="));
                        i += 2;
                    }
                } else {
                    tokens.push(Token::Op("!"));
                    i += 1;
                }
            }
            '<' | '>' => {
                let op = match (c, next_is(i + 1, '=')) {
                    ('<', true) => "<=",
                    ('<', false) => "<",
                    (_, true) => ">=",
                    (_, false) => ">",
                };
                tokens.push(Token::Op(op));
                i += op.len();
            }
            '+' | '-' | '*' | '/' | '%' => {
                tokens.push(Token::Op(match c {
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    '/' => "/",
                    _ => "%",
                }));
                i += 1;
            }
            other => {
                return Err(ExpressionError::UnexpectedCharacter {
                    character: other,
                    position: i,
                });
            }
        }
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Path { root: String, segments: Vec<Segment> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    operators: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token != Token::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Token::Op(current) if *current == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        let found = self.advance();
        if found == expected {
            Ok(())
        } else {
            Err(ExpressionError::UnexpectedToken {
                found: found.to_string(),
                expected: expected.to_string(),
            })
        }
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::TooDeep);
        }
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn charge_operator(&mut self) -> Result<()> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(ExpressionError::TooDeep);
        }
        Ok(())
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        self.nested(Self::parse_or)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat_op("||") {
            self.charge_operator()?;
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.eat_op("&&") {
            self.charge_operator()?;
            let rhs = self.parse_equality()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_binary(
        &mut self,
        operators: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut lhs = next(self)?;
        'outer: loop {
            for (symbol, op) in operators {
                if self.eat_op(symbol) {
                    self.charge_operator()?;
                    let rhs = next(self)?;
                    lhs = Expr::Binary {
                        op: *op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    };
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        self.parse_binary(
            &[
                ("===", BinaryOp::Eq),
                ("!==", BinaryOp::NotEq),
                ("==", BinaryOp::Eq),
                ("!=", BinaryOp::NotEq),
            ],
            Self::parse_comparison,
        )
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        self.parse_binary(
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        self.parse_binary(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        self.parse_binary(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Rem),
            ],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = if self.eat_op("!") {
            UnaryOp::Not
        } else if self.eat_op("-") {
            UnaryOp::Neg
        } else {
            return self.parse_primary();
        };

        let operand = self.nested(Self::parse_unary)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::Number(n) => Ok(Expr::Literal(number_literal(n)?)),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                root if SCOPE_ROOTS.contains(&root) => self.parse_path(name),
                _ => Err(ExpressionError::UnknownIdentifier { name }),
            },
            Token::LParen => {
                let inner = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            found => Err(ExpressionError::UnexpectedToken {
                found: found.to_string(),
                expected: "expression".to_string(),
            }),
        }
    }

    fn parse_path(&mut self, root: String) -> Result<Expr> {
        let mut segments = Vec::new();
        loop {
            match self.peek() {
                Token::Dot => {
                    self.pos += 1;
                    match self.advance() {
                        Token::Ident(key) => segments.push(Segment::Key(key)),
                        found => {
                            return Err(ExpressionError::UnexpectedToken {
                                found: found.to_string(),
                                expected: "property name".to_string(),
                            });
                        }
                    }
                }
                Token::LBracket => {
                    self.pos += 1;
                    match self.advance() {
                        Token::Str(key) => segments.push(Segment::Key(key)),
                        Token::Number(n) if n >= 0.0 && n.fract() == 0.0 => {
                            segments.push(Segment::Index(n as usize))
                        }
                        Token::Number(n) => {
                            return Err(ExpressionError::InvalidNumber {
                                literal: n.to_string(),
                            });
                        }
                        found => {
                            return Err(ExpressionError::UnexpectedToken {
                                found: found.to_string(),
                                expected: "string or index".to_string(),
                            });
                        }
                    }
                    self.expect(Token::RBracket)?;
                }
                _ => return Ok(Expr::Path { root, segments }),
            }
        }
    }
}

fn number_literal(n: f64) -> Result<Value> {
    number_value(n).ok_or_else(|| ExpressionError::InvalidNumber {
        literal: n.to_string(),
    })
}

fn read_segment(target: &Value, segment: &Segment) -> Result<Value> {
    let property = match segment {
        Segment::Key(key) => key.clone(),
        Segment::Index(index) => index.to_string(),
    };

    match (target, segment) {
        (Value::Object(fields), _) => Ok(fields.get(&property).cloned().unwrap_or(Value::Null)),
        (Value::Array(items), Segment::Index(index)) => {
            Ok(items.get(*index).cloned().unwrap_or(Value::Null))
        }
        (Value::Array(items), Segment::Key(key)) if key == "length" => Ok(Value::from(items.len())),
        (Value::Array(_), Segment::Key(_)) => Ok(Value::Null),
        (other, _) => Err(ExpressionError::PropertyAccess {
            property,
            target: type_name(other).to_string(),
        }),
    }
}

fn numeric_operands(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<(f64, f64)> {
    match (as_number(lhs), as_number(rhs)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(ExpressionError::TypeMismatch {
            details: format!(
                "operator {:?} needs numbers, got {} and {}",
                op,
                type_name(lhs),
                type_name(rhs)
            ),
        }),
    }
}

fn arithmetic_result(value: f64) -> Result<Value> {
    number_value(value).ok_or_else(|| ExpressionError::TypeMismatch {
        details: "result is not a finite number".to_string(),
    })
}

fn evaluate_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(json_equal(&lhs, &rhs))),
        BinaryOp::NotEq => Ok(Value::Bool(!json_equal(&lhs, &rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&lhs, &rhs) {
                (Value::String(a), Value::String(b)) => a.partial_cmp(b),
                _ => {
                    let (a, b) = numeric_operands(op, &lhs, &rhs)?;
                    a.partial_cmp(&b)
                }
            };
            let result = match ordering {
                Some(ordering) => match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                },
                None => false,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add => match (&lhs, &rhs) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            _ => {
                let (a, b) = numeric_operands(op, &lhs, &rhs)?;
                arithmetic_result(a + b)
            }
        },
        BinaryOp::Sub => {
            let (a, b) = numeric_operands(op, &lhs, &rhs)?;
            arithmetic_result(a - b)
        }
        BinaryOp::Mul => {
            let (a, b) = numeric_operands(op, &lhs, &rhs)?;
            arithmetic_result(a * b)
        }
        BinaryOp::Div | BinaryOp::Rem => {
            let (a, b) = numeric_operands(op, &lhs, &rhs)?;
            if b == 0.0 {
                return Err(ExpressionError::DivisionByZero);
            }
            arithmetic_result(if op == BinaryOp::Div { a / b } else { a % b })
        }
    }
}

fn evaluate_expr(expr: &Expr, scope: &Value) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path { root, segments } => {
            let mut current = scope.get(root).cloned().unwrap_or(Value::Null);
            for segment in segments {
                current = read_segment(&current, segment)?;
            }
            Ok(current)
        }
        Expr::Unary { op, operand } => {
            let value = evaluate_expr(operand, scope)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!is_truthy(&value))),
                UnaryOp::Neg => match as_number(&value) {
                    Some(n) => arithmetic_result(-n),
                    None => Err(ExpressionError::TypeMismatch {
                        details: format!("cannot negate {}", type_name(&value)),
                    }),
                },
            }
        }
        Expr::And(lhs, rhs) => {
            if !is_truthy(&evaluate_expr(lhs, scope)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(is_truthy(&evaluate_expr(rhs, scope)?)))
        }
        Expr::Or(lhs, rhs) => {
            if is_truthy(&evaluate_expr(lhs, scope)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(is_truthy(&evaluate_expr(rhs, scope)?)))
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = evaluate_expr(lhs, scope)?;
            let rhs = evaluate_expr(rhs, scope)?;
            evaluate_binary(*op, lhs, rhs)
        }
    }
}

/// A parsed expression, ready to be evaluated any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self> {
        let mut parser = Parser {
            tokens: tokenize(source)?,
            pos: 0,
            depth: 0,
            operators: 0,
        };
        let root = parser.parse_expression()?;
        parser.expect(Token::Eof)?;

        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, scope: &Value) -> Result<Value> {
        evaluate_expr(&self.root, scope)
    }

    /// Evaluates and coerces the result by truthiness.
    pub fn evaluate_bool(&self, scope: &Value) -> Result<bool> {
        Ok(is_truthy(&self.evaluate(scope)?))
    }
}

impl FromStr for Expression {
    type Err = ExpressionError;

    fn from_str(source: &str) -> Result<Self> {
        Self::parse(source)
    }
}

/// Parses and evaluates in one step.
pub fn evaluate(source: &str, scope: &Value) -> Result<Value> {
    Expression::parse(source)?.evaluate(scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> Value {
        json!({
            "telemetry": {"pressure": 600, "temperature": 71.5, "readings": [3, 5, 8]},
            "attributes": {"zone": "north", "depth": 1500, "flags": {"critical": true}},
            "computed": {"efficiency": 0.82},
            "asset": {"id": "asset-1", "status": "OPERATIONAL"}
        })
    }

    fn eval(source: &str) -> Result<Value> {
        evaluate(source, &scope())
    }

    #[test]
    fn test_comparison_against_scope() {
        assert_eq!(eval("telemetry.pressure > 500").unwrap(), json!(true));
        assert_eq!(eval("telemetry.pressure <= 500").unwrap(), json!(false));
        assert_eq!(eval("telemetry.temperature >= 71.5").unwrap(), json!(true));
        assert_eq!(eval("attributes.zone < 'south'").unwrap(), json!(true));
    }

    #[test]
    fn test_precedence_and_grouping() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), json!(7));
        assert_eq!(eval("(1 + 2) * 3").unwrap(), json!(9));
        assert_eq!(eval("10 - 4 - 3").unwrap(), json!(3));
        assert_eq!(eval("7 % 4 + -1").unwrap(), json!(2));
        assert_eq!(eval("1 + 2 * 3 == 7 && !false").unwrap(), json!(true));
        assert_eq!(eval("10 / 4").unwrap(), json!(2.5));
    }

    #[test]
    fn test_equality_is_structural() {
        assert_eq!(eval("telemetry.pressure === 600.0").unwrap(), json!(true));
        assert_eq!(eval("asset.status == 'OPERATIONAL'").unwrap(), json!(true));
        assert_eq!(eval("asset.status !== 'DOWN'").unwrap(), json!(true));
        assert_eq!(eval("telemetry.missing == null").unwrap(), json!(true));
        assert_eq!(eval("'600' == telemetry.pressure").unwrap(), json!(false));
    }

    #[test]
    fn test_path_access() {
        assert_eq!(eval("attributes.flags.critical").unwrap(), json!(true));
        assert_eq!(eval("attributes['zone']").unwrap(), json!("north"));
        assert_eq!(eval("telemetry.readings[1]").unwrap(), json!(5));
        assert_eq!(eval("telemetry.readings[9]").unwrap(), json!(null));
        assert_eq!(eval("telemetry.readings.length").unwrap(), json!(3));
        assert_eq!(eval("computed.unknown").unwrap(), json!(null));
    }

    #[test]
    fn test_property_of_null_or_scalar_is_an_error() {
        assert!(matches!(
            eval("telemetry.missing.value"),
            Err(ExpressionError::PropertyAccess { .. })
        ));
        assert!(matches!(
            eval("telemetry.pressure.value"),
            Err(ExpressionError::PropertyAccess { .. })
        ));
    }

    #[test]
    fn test_logical_operators_short_circuit() {
        assert_eq!(eval("false && telemetry.missing.value").unwrap(), json!(false));
        assert_eq!(eval("true || telemetry.missing.value").unwrap(), json!(true));
        assert_eq!(eval("attributes.zone && computed.efficiency").unwrap(), json!(true));
        assert_eq!(eval("0 || ''").unwrap(), json!(false));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(eval("attributes.zone + '-' + asset.id").unwrap(), json!("north-asset-1"));
        assert!(matches!(
            eval("attributes.zone + 1"),
            Err(ExpressionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_type_mismatch_and_division_by_zero() {
        assert!(matches!(
            eval("attributes.zone > 5"),
            Err(ExpressionError::TypeMismatch { .. })
        ));
        assert_eq!(eval("telemetry.pressure / 0"), Err(ExpressionError::DivisionByZero));
        assert_eq!(eval("telemetry.pressure % 0"), Err(ExpressionError::DivisionByZero));
        assert!(eval("-attributes.zone").is_err());
    }

    #[test]
    fn test_unknown_roots_are_rejected() {
        assert_eq!(
            Expression::parse("process.exit(1)"),
            Err(ExpressionError::UnknownIdentifier {
                name: "process".to_string()
            })
        );
        assert!(Expression::parse("constructor").is_err());
    }

    #[test]
    fn test_malformed_expressions() {
        assert!(Expression::parse("").is_err());
        assert!(Expression::parse("telemetry.pressure >").is_err());
        assert!(Expression::parse("telemetry.pressure = 5").is_err());
        assert!(Expression::parse("(1 + 2").is_err());
        assert!(Expression::parse("1 2").is_err());
        assert!(Expression::parse("telemetry.").is_err());
        assert!(Expression::parse("telemetry[1.5]").is_err());
        assert!(Expression::parse("1.2.3").is_err());
        assert_eq!(
            Expression::parse("'open"),
            Err(ExpressionError::UnterminatedString { position: 0 })
        );
        assert_eq!(
            Expression::parse("telemetry.pressure # 2"),
            Err(ExpressionError::UnexpectedCharacter {
                character: '#',
                position: 19
            })
        );
    }

    #[test]
    fn test_nesting_is_bounded() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(Expression::parse(&deep), Err(ExpressionError::TooDeep));

        let negations = format!("{}true", "!".repeat(200));
        assert_eq!(Expression::parse(&negations), Err(ExpressionError::TooDeep));

        let long_sum = format!("telemetry.pressure{} > 500", " + 1".repeat(3000));
        assert_eq!(Expression::parse(&long_sum), Err(ExpressionError::TooDeep));

        let long_conjunction = vec!["telemetry.pressure > 1"; 3000].join(" && ");
        assert_eq!(
            Expression::parse(&long_conjunction),
            Err(ExpressionError::TooDeep)
        );

        let bounded_sum = format!("telemetry.pressure{}", " + 1".repeat(200));
        assert_eq!(evaluate(&bounded_sum, &scope()).unwrap(), json!(800));

        let shallow = format!("{}1{}", "(".repeat(10), ")".repeat(10));
        assert_eq!(evaluate(&shallow, &scope()).unwrap(), json!(1));
    }

    #[test]
    fn test_parsed_expression_is_reusable() {
        let expression: Expression = "telemetry.pressure > 500".parse().unwrap();
        assert_eq!(expression.source(), "telemetry.pressure > 500");

        assert!(expression.evaluate_bool(&scope()).unwrap());
        let low = json!({"telemetry": {"pressure": 400}, "attributes": {}, "computed": {}, "asset": {}});
        assert!(!expression.evaluate_bool(&low).unwrap());
    }

    #[test]
    fn test_escapes_in_strings() {
        assert_eq!(eval(r#""a\"b""#).unwrap(), json!("a\"b"));
        assert_eq!(eval(r"'it\'s'").unwrap(), json!("it's"));
    }
}
