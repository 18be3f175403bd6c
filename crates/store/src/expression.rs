//! Update expression parsing and evaluation
//!
//! Supports the subset of the DynamoDB update expression grammar that
//! migrations need:
//!
//! ```text
//! SET a = :v, #alias = b + :inc, c = if_not_exists(c, :zero) - :dec
//! REMOVE d, #other
//! ```
//!
//! Only top-level attribute paths are accepted.

use crate::{AttributeValue, Item, StoreError, StoreResult};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Name(String),
    Value(String),
    Eq,
    Comma,
    Plus,
    Minus,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Path(String),
    Value(String),
    IfNotExists(String, Box<Operand>),
}

#[derive(Debug, Clone, PartialEq)]
enum SetValue {
    Operand(Operand),
    Plus(Operand, Operand),
    Minus(Operand, Operand),
}

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Set(String, SetValue),
    Remove(String),
}

/// A parsed update expression with `#alias` names already resolved
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExpression {
    clauses: Vec<Clause>,
}

fn invalid(msg: impl Into<String>) -> StoreError {
    StoreError::InvalidExpression(msg.into())
}

fn tokenize(input: &str) -> StoreResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '#' | ':' => {
                chars.next();
                let word = take_word(&mut chars);
                if word.is_empty() {
                    return Err(invalid(format!("empty name after '{}'", c)));
                }
                tokens.push(if c == '#' {
                    Token::Name(format!("#{}", word))
                } else {
                    Token::Value(format!(":{}", word))
                });
            }
            '.' | '[' | ']' => {
                return Err(invalid("nested attribute paths are not supported"));
            }
            c if c.is_alphanumeric() || c == '_' => {
                tokens.push(Token::Ident(take_word(&mut chars)));
            }
            other => return Err(invalid(format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

fn take_word(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut word = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_alphanumeric() || c == '_' {
            word.push(c);
            chars.next();
        } else {
            break;
        }
    }
    word
}

fn clause_keyword(token: Option<&Token>) -> Option<String> {
    match token {
        Some(Token::Ident(word)) => {
            let upper = word.to_ascii_uppercase();
            matches!(upper.as_str(), "SET" | "REMOVE" | "ADD" | "DELETE").then_some(upper)
        }
        _ => None,
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    names: Option<&'a HashMap<String, String>>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> StoreResult<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(invalid(format!("expected {:?}, found {:?}", expected, token))),
            None => Err(invalid(format!("expected {:?}, found end of expression", expected))),
        }
    }

    fn path(&mut self) -> StoreResult<String> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            Some(Token::Name(alias)) => self
                .names
                .and_then(|names| names.get(&alias))
                .cloned()
                .ok_or_else(|| invalid(format!("undefined attribute name alias {}", alias))),
            Some(token) => Err(invalid(format!("expected attribute path, found {:?}", token))),
            None => Err(invalid("expected attribute path, found end of expression")),
        }
    }

    fn operand(&mut self) -> StoreResult<Operand> {
        match self.peek() {
            Some(Token::Value(_)) => match self.next() {
                Some(Token::Value(placeholder)) => Ok(Operand::Value(placeholder)),
                _ => Err(invalid("expected value placeholder")),
            },
            Some(Token::Ident(word))
                if word.eq_ignore_ascii_case("if_not_exists")
                    && self.tokens.get(self.pos + 1) == Some(&Token::LParen) =>
            {
                self.pos += 2;
                let path = self.path()?;
                self.expect(Token::Comma)?;
                let fallback = self.operand()?;
                self.expect(Token::RParen)?;
                Ok(Operand::IfNotExists(path, Box::new(fallback)))
            }
            _ => Ok(Operand::Path(self.path()?)),
        }
    }

    fn set_value(&mut self) -> StoreResult<SetValue> {
        let left = self.operand()?;
        match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                Ok(SetValue::Plus(left, self.operand()?))
            }
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(SetValue::Minus(left, self.operand()?))
            }
            _ => Ok(SetValue::Operand(left)),
        }
    }

    fn parse(mut self) -> StoreResult<Vec<Clause>> {
        let mut clauses = Vec::new();
        let mut seen_keywords = HashSet::new();

        while self.peek().is_some() {
            let keyword = clause_keyword(self.peek())
                .ok_or_else(|| invalid(format!("expected clause keyword, found {:?}", self.peek())))?;
            self.pos += 1;
            if !seen_keywords.insert(keyword.clone()) {
                return Err(invalid(format!("{} clause appears more than once", keyword)));
            }

            loop {
                match keyword.as_str() {
                    "SET" => {
                        let path = self.path()?;
                        self.expect(Token::Eq)?;
                        let value = self.set_value()?;
                        clauses.push(Clause::Set(path, value));
                    }
                    "REMOVE" => clauses.push(Clause::Remove(self.path()?)),
                    other => return Err(invalid(format!("{} clauses are not supported", other))),
                }

                match self.peek() {
                    Some(Token::Comma) => {
                        self.pos += 1;
                    }
                    None => break,
                    next if clause_keyword(next).is_some() => break,
                    Some(token) => {
                        return Err(invalid(format!("unexpected token {:?}", token)));
                    }
                }
            }
        }

        if clauses.is_empty() {
            return Err(invalid("expression is empty"));
        }
        Ok(clauses)
    }
}

impl UpdateExpression {
    /// Parse an expression, resolving `#alias` names through `names`
    pub fn parse(expression: &str, names: Option<&HashMap<String, String>>) -> StoreResult<Self> {
        let parser = Parser {
            tokens: tokenize(expression)?,
            pos: 0,
            names,
        };
        let clauses = parser.parse()?;

        let mut targets = HashSet::new();
        for clause in &clauses {
            let target = match clause {
                Clause::Set(path, _) | Clause::Remove(path) => path,
            };
            if !targets.insert(target.as_str()) {
                return Err(invalid(format!("two document paths overlap: {}", target)));
            }
        }

        Ok(Self { clauses })
    }

    /// Names of every attribute the expression writes or removes
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.clauses.iter().map(|clause| match clause {
            Clause::Set(path, _) | Clause::Remove(path) => path.as_str(),
        })
    }

    /// Apply the expression to `item`
    ///
    /// Every operand is evaluated against the item as it was before the update.
    pub fn apply(&self, item: &mut Item, values: &Item) -> StoreResult<()> {
        let mut sets = Vec::new();
        for clause in &self.clauses {
            if let Clause::Set(path, value) = clause {
                sets.push((path.clone(), evaluate(value, item, values)?));
            }
        }

        for clause in &self.clauses {
            if let Clause::Remove(path) = clause {
                item.remove(path);
            }
        }
        for (path, value) in sets {
            item.insert(path, value);
        }
        Ok(())
    }
}

fn evaluate(value: &SetValue, item: &Item, values: &Item) -> StoreResult<AttributeValue> {
    match value {
        SetValue::Operand(operand) => resolve(operand, item, values),
        SetValue::Plus(left, right) => arithmetic(
            &resolve(left, item, values)?,
            &resolve(right, item, values)?,
            false,
        ),
        SetValue::Minus(left, right) => arithmetic(
            &resolve(left, item, values)?,
            &resolve(right, item, values)?,
            true,
        ),
    }
}

fn resolve(operand: &Operand, item: &Item, values: &Item) -> StoreResult<AttributeValue> {
    match operand {
        Operand::Path(path) => item.get(path).cloned().ok_or_else(|| {
            invalid(format!(
                "the expression refers to attribute '{}' which does not exist in the item",
                path
            ))
        }),
        Operand::Value(placeholder) => values
            .get(placeholder)
            .cloned()
            .ok_or_else(|| invalid(format!("missing value for placeholder {}", placeholder))),
        Operand::IfNotExists(path, fallback) => match item.get(path) {
            Some(existing) => Ok(existing.clone()),
            None => resolve(fallback, item, values),
        },
    }
}

fn arithmetic(
    left: &AttributeValue,
    right: &AttributeValue,
    subtract: bool,
) -> StoreResult<AttributeValue> {
    let (a, b) = match (left, right) {
        (AttributeValue::N(a), AttributeValue::N(b)) => (a.trim(), b.trim()),
        _ => {
            return Err(invalid(format!(
                "arithmetic requires numbers, found {} and {}",
                left.type_name(),
                right.type_name()
            )))
        }
    };

    if let (Ok(x), Ok(y)) = (a.parse::<i128>(), b.parse::<i128>()) {
        let result = if subtract { x.checked_sub(y) } else { x.checked_add(y) };
        if let Some(result) = result {
            return Ok(AttributeValue::N(result.to_string()));
        }
    }

    let x: f64 = a
        .parse()
        .map_err(|_| invalid(format!("invalid number {}", a)))?;
    let y: f64 = b
        .parse()
        .map_err(|_| invalid(format!("invalid number {}", b)))?;
    let result = if subtract { x - y } else { x + y };
    Ok(AttributeValue::N(result.to_string()))
}
