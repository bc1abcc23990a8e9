//! Pointcut expression parser
//!
//! ```text
//! expr      := and ("||" and)*
//! and       := unary ("&&" unary)*
//! unary     := "!" unary | "(" expr ")" | primary
//! primary   := designator "(" body ")" | Aspect "->" name | name
//! ```
//!
//! Designators: `class`, `within`, `method`, `setting`,
//! `classAnnotatedWith`, `methodAnnotatedWith`, `evaluate`, `filter`.
//! A bare `name` refers to a pointcut of the aspect being parsed.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::{Number, Value};

use super::{
    ClassAnnotatedWithFilter, ClassNameFilter, CompositeFilter, MethodAnnotatedWithFilter,
    MethodNameFilter, Pointcut, PointcutFilter, PointcutReferenceFilter, RuntimeEvaluationFilter,
    SettingFilter, WithinFilter,
};
use crate::aop::condition::{Condition, Operand, Operator};
use crate::config::Settings;
use crate::error::{AopError, AopResult};
use crate::reflect::Visibility;

/// Builds filter trees from pointcut expressions
pub struct PointcutExpressionParser<'a> {
    settings: &'a Settings,
    filters: FxHashMap<String, Arc<dyn PointcutFilter>>,
}

impl<'a> PointcutExpressionParser<'a> {
    /// Create a parser resolving `setting(..)` against `settings`
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            filters: FxHashMap::default(),
        }
    }

    /// Register a custom filter usable as `filter(name)`
    pub fn with_filter(mut self, name: &str, filter: Arc<dyn PointcutFilter>) -> Self {
        self.filters.insert(name.to_string(), filter);
        self
    }

    /// Parse an expression declared by `aspect_class`
    pub fn parse(&self, expression: &str, aspect_class: &str) -> AopResult<Arc<dyn PointcutFilter>> {
        let mut parser = Parser {
            cursor: Cursor::new(expression),
            owner: self,
            aspect_class,
        };
        let filter = parser.parse_or()?;
        parser.cursor.skip_ws();
        if !parser.cursor.is_at_end() {
            return Err(parser.cursor.error(format!(
                "unexpected '{}'",
                parser.cursor.rest()
            )));
        }
        Ok(filter)
    }

    /// Parse an expression into a [`Pointcut`]
    pub fn pointcut(&self, expression: &str, aspect_class: &str) -> AopResult<Pointcut> {
        let filter = self.parse(expression, aspect_class)?;
        Ok(Pointcut::new(expression, aspect_class, filter))
    }
}

struct Parser<'p, 's> {
    cursor: Cursor<'s>,
    owner: &'p PointcutExpressionParser<'p>,
    aspect_class: &'p str,
}

impl Parser<'_, '_> {
    fn parse_or(&mut self) -> AopResult<Arc<dyn PointcutFilter>> {
        let mut children = vec![self.parse_and()?];
        while self.cursor.eat("||") {
            children.push(self.parse_and()?);
        }
        Ok(combine(children, CompositeFilter::Or))
    }

    fn parse_and(&mut self) -> AopResult<Arc<dyn PointcutFilter>> {
        let mut children = vec![self.parse_unary()?];
        while self.cursor.eat("&&") {
            children.push(self.parse_unary()?);
        }
        Ok(combine(children, CompositeFilter::And))
    }

    fn parse_unary(&mut self) -> AopResult<Arc<dyn PointcutFilter>> {
        if self.cursor.eat("!") {
            let inner = self.parse_unary()?;
            return Ok(Arc::new(CompositeFilter::Not(inner)));
        }
        if self.cursor.eat("(") {
            let inner = self.parse_or()?;
            if !self.cursor.eat(")") {
                return Err(self.cursor.error("expected ')'"));
            }
            return Ok(inner);
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> AopResult<Arc<dyn PointcutFilter>> {
        self.cursor.skip_ws();
        let name = self.cursor.read_while(is_name_char);
        if name.is_empty() {
            return Err(self.cursor.error("expected a pointcut"));
        }

        if self.cursor.eat("(") {
            let body = self.cursor.read_balanced()?;
            return self.designator(name, body);
        }
        if self.cursor.eat("->") {
            self.cursor.skip_ws();
            let pointcut = self.cursor.read_while(is_word_char);
            if pointcut.is_empty() {
                return Err(self.cursor.error("expected a pointcut name after '->'"));
            }
            return Ok(Arc::new(PointcutReferenceFilter::new(name, pointcut)));
        }
        Ok(Arc::new(PointcutReferenceFilter::new(self.aspect_class, name)))
    }

    fn designator(&self, name: &str, body: &str) -> AopResult<Arc<dyn PointcutFilter>> {
        let source = self.cursor.source;
        let argument = body.trim();
        let filter: Arc<dyn PointcutFilter> = match name {
            "class" => Arc::new(ClassNameFilter::new(argument)?),
            "within" => Arc::new(WithinFilter::new(required(source, name, argument)?)),
            "method" => parse_method(source, argument)?,
            "setting" => Arc::new(SettingFilter::new(argument, self.owner.settings)?),
            "classAnnotatedWith" => {
                Arc::new(ClassAnnotatedWithFilter::new(required(source, name, argument)?))
            }
            "methodAnnotatedWith" => {
                Arc::new(MethodAnnotatedWithFilter::new(required(source, name, argument)?))
            }
            "evaluate" => match parse_constraints(argument, source)? {
                Some(condition) => Arc::new(RuntimeEvaluationFilter::new(condition)),
                None => return Err(AopError::invalid_expression(source, "empty evaluate()")),
            },
            "filter" => self
                .owner
                .filters
                .get(argument)
                .cloned()
                .ok_or_else(|| {
                    AopError::invalid_expression(source, format!("unknown filter '{}'", argument))
                })?,
            other => {
                return Err(AopError::invalid_expression(
                    source,
                    format!("unknown designator '{}'", other),
                ))
            }
        };
        Ok(filter)
    }
}

fn combine(
    mut children: Vec<Arc<dyn PointcutFilter>>,
    build: fn(Vec<Arc<dyn PointcutFilter>>) -> CompositeFilter,
) -> Arc<dyn PointcutFilter> {
    if children.len() == 1 {
        if let Some(only) = children.pop() {
            return only;
        }
    }
    Arc::new(build(children))
}

fn required<'b>(expression: &str, designator: &str, argument: &'b str) -> AopResult<&'b str> {
    if argument.is_empty() {
        return Err(AopError::invalid_expression(
            expression,
            format!("{}() needs an argument", designator),
        ));
    }
    Ok(argument)
}

/// `[visibility] ClassPattern->methodPattern(constraints)`
fn parse_method(expression: &str, body: &str) -> AopResult<Arc<dyn PointcutFilter>> {
    let (visibility, signature) = match body.split_once(char::is_whitespace) {
        Some((word, rest)) => match word.parse::<Visibility>() {
            Ok(visibility) => (Some(visibility), rest.trim()),
            Err(_) => (None, body),
        },
        None => (None, body),
    };

    let (class_pattern, method_part) = signature.split_once("->").ok_or_else(|| {
        AopError::invalid_expression(expression, "method() expects Class->method")
    })?;
    let (method_pattern, constraints) = split_trailing_group(method_part.trim());

    let mut method = MethodNameFilter::new(method_pattern)?;
    if let Some(visibility) = visibility {
        method = method.with_visibility(visibility);
    }
    if let Some(constraints) = constraints {
        method = method.with_constraints(parse_constraints(constraints, expression)?);
    }

    Ok(Arc::new(CompositeFilter::And(vec![
        Arc::new(ClassNameFilter::new(class_pattern)?),
        Arc::new(method),
    ])))
}

/// Split `name(inner)` into `name` and `inner`; patterns that are a group themselves stay whole
fn split_trailing_group(source: &str) -> (&str, Option<&str>) {
    if !source.ends_with(')') {
        return (source, None);
    }
    let mut depth = 0usize;
    for (index, c) in source.char_indices().rev() {
        match c {
            ')' => depth += 1,
            '(' => {
                depth -= 1;
                if depth == 0 {
                    let head = source[..index].trim_end();
                    if head.is_empty() {
                        return (source, None);
                    }
                    return (head, Some(&source[index + 1..source.len() - 1]));
                }
            }
            _ => {}
        }
    }
    (source, None)
}

/// Parse comma-separated `operand operator operand` constraints
///
/// Returns `None` when there are no constraints. `expression` is only used
/// in error messages.
pub fn parse_constraints(source: &str, expression: &str) -> AopResult<Option<Condition>> {
    let mut cursor = Cursor::new(source);
    let mut conditions = Vec::new();

    loop {
        cursor.skip_ws();
        if cursor.is_at_end() {
            if conditions.is_empty() {
                break;
            }
            return Err(AopError::invalid_expression(expression, "trailing ',' in constraints"));
        }

        let left = parse_operand(&mut cursor, expression)?;
        let op = parse_operator(&mut cursor, expression)?;
        let right = parse_operand(&mut cursor, expression)?;
        conditions.push(Condition::compare(left, op, right));

        if cursor.eat(",") {
            continue;
        }
        cursor.skip_ws();
        if !cursor.is_at_end() {
            return Err(AopError::invalid_expression(
                expression,
                format!("unexpected '{}' in constraints", cursor.rest()),
            ));
        }
        break;
    }

    Ok(Condition::all(conditions))
}

fn parse_operand(cursor: &mut Cursor<'_>, expression: &str) -> AopResult<Operand> {
    cursor.skip_ws();
    match cursor.peek() {
        Some('\'' | '"') => Ok(Operand::Literal(Value::String(cursor.read_quoted()?))),
        Some('[') => {
            cursor.bump();
            let mut items = Vec::new();
            loop {
                if cursor.eat("]") {
                    break;
                }
                match parse_operand(cursor, expression)? {
                    Operand::Literal(value) => items.push(value),
                    argument => {
                        return Err(AopError::invalid_expression(
                            expression,
                            format!("list items must be literals, found '{}'", argument),
                        ))
                    }
                }
                if !cursor.eat(",") && !cursor.at("]") {
                    return Err(AopError::invalid_expression(expression, "unterminated list"));
                }
            }
            Ok(Operand::Literal(Value::Array(items)))
        }
        Some(c) if c.is_ascii_digit() || c == '-' => {
            let token = cursor.read_while(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'));
            parse_number(token)
                .map(Operand::Literal)
                .ok_or_else(|| AopError::invalid_expression(expression, format!("invalid number '{}'", token)))
        }
        Some(c) if is_word_char(c) => {
            let word = cursor.read_while(|c| is_word_char(c) || c == '.');
            Ok(match word {
                "true" => Operand::Literal(Value::Bool(true)),
                "false" => Operand::Literal(Value::Bool(false)),
                "null" => Operand::Literal(Value::Null),
                path => Operand::argument(path),
            })
        }
        _ => Err(AopError::invalid_expression(expression, "expected an argument or a literal")),
    }
}

fn parse_number(token: &str) -> Option<Value> {
    if let Ok(integer) = token.parse::<i64>() {
        return Some(Value::Number(integer.into()));
    }
    token
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn parse_operator(cursor: &mut Cursor<'_>, expression: &str) -> AopResult<Operator> {
    cursor.skip_ws();
    let mut token = cursor.read_while(|c| matches!(c, '=' | '!' | '<' | '>'));
    if token.is_empty() {
        token = cursor.read_while(|c| c.is_ascii_alphabetic());
    }
    Operator::parse(token).ok_or_else(|| {
        AopError::invalid_expression(expression, format!("unknown operator '{}'", token))
    })
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_name_char(c: char) -> bool {
    is_word_char(c) || c == ':' || c == '\\'
}

struct Cursor<'s> {
    source: &'s str,
    pos: usize,
}

impl<'s> Cursor<'s> {
    fn new(source: &'s str) -> Self {
        Self { source, pos: 0 }
    }

    fn rest(&self) -> &'s str {
        &self.source[self.pos..]
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        self.read_while(char::is_whitespace);
    }

    /// Skip whitespace and consume `token` if it comes next
    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    /// Skip whitespace and check for `token` without consuming it
    fn at(&mut self, token: &str) -> bool {
        self.skip_ws();
        self.rest().starts_with(token)
    }

    fn read_while(&mut self, predicate: impl Fn(char) -> bool) -> &'s str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.source[start..self.pos]
    }

    /// Read a quoted string; `\'`, `\"` and `\\` are unescaped, other escapes are kept
    fn read_quoted(&mut self) -> AopResult<String> {
        let quote = match self.bump() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected a quoted string")),
        };
        let mut value = String::new();
        while let Some(c) = self.bump() {
            match c {
                '\\' => match self.bump() {
                    Some(next @ ('\'' | '"' | '\\')) => value.push(next),
                    Some(next) => {
                        value.push('\\');
                        value.push(next);
                    }
                    None => break,
                },
                c if c == quote => return Ok(value),
                c => value.push(c),
            }
        }
        Err(self.error(format!("unterminated {} quote", quote)))
    }

    /// Read up to the `)` closing an already consumed `(`
    fn read_balanced(&mut self) -> AopResult<&'s str> {
        let start = self.pos;
        let mut depth = 1usize;
        let mut quote: Option<char> = None;

        while let Some(c) = self.bump() {
            match (quote, c) {
                (Some(_), '\\') => {
                    self.bump();
                }
                (Some(open), c) if c == open => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"') => quote = Some(c),
                (None, '(') => depth += 1,
                (None, ')') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(&self.source[start..self.pos - 1]);
                    }
                }
                (None, _) => {}
            }
        }

        match quote {
            Some(open) => Err(self.error(format!("unterminated {} quote", open))),
            None => Err(self.error("unbalanced parentheses")),
        }
    }

    fn error(&self, reason: impl Into<String>) -> AopError {
        AopError::invalid_expression(self.source, reason)
    }
}
