//! Runtime evaluations
//!
//! Some pointcuts can only be decided with the actual call arguments, e.g.
//! `method(acme::Invoice->pay(amount > 100))`. Static matching accepts the
//! join point and attaches a [`Condition`]; the advice chain evaluates it on
//! every call and skips the advice when it does not hold.
//!
//! Conditions are plain data interpreted against a [`JoinPoint`]. Hosts that
//! need logic beyond argument comparisons use [`Condition::custom`].

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use super::joinpoint::JoinPoint;

/// Comparison operator of a constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `in`: left is an element of the right list
    In,
    /// `contains`: left list or string contains right
    Contains,
    /// `matches`: left string matches the right regex
    Matches,
}

impl Operator {
    /// Source form of the operator
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::In => "in",
            Operator::Contains => "contains",
            Operator::Matches => "matches",
        }
    }

    /// Parse a symbolic or keyword operator
    pub fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "==" => Operator::Eq,
            "!=" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            "in" => Operator::In,
            "contains" => Operator::Contains,
            "matches" => Operator::Matches,
            _ => return None,
        })
    }

    fn apply(&self, left: &Value, right: &Value) -> bool {
        match self {
            Operator::Eq => loose_eq(left, right),
            Operator::Ne => !loose_eq(left, right),
            Operator::Lt => compare(left, right) == Some(Ordering::Less),
            Operator::Le => matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal)),
            Operator::Gt => compare(left, right) == Some(Ordering::Greater),
            Operator::Ge => {
                matches!(compare(left, right), Some(Ordering::Greater | Ordering::Equal))
            }
            Operator::In => match right {
                Value::Array(items) => items.iter().any(|item| loose_eq(left, item)),
                Value::String(haystack) => left.as_str().is_some_and(|n| haystack.contains(n)),
                _ => false,
            },
            Operator::Contains => Operator::In.apply(right, left),
            Operator::Matches => match (left.as_str(), right.as_str()) {
                (Some(subject), Some(pattern)) => {
                    Regex::new(pattern).is_ok_and(|re| re.is_match(subject))
                }
                _ => false,
            },
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality that treats `1` and `1.0` as the same number
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// One side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A method argument, optionally followed by a property path (`user.name`)
    Argument {
        /// Parameter name
        name: String,
        /// Object keys or array indices below the argument
        path: Vec<String>,
    },
    /// A constant
    Literal(Value),
}

impl Operand {
    /// Argument operand from a dotted path such as `user.address.city`
    pub fn argument(dotted: &str) -> Self {
        let mut segments = dotted.split('.').map(str::to_string);
        let name = segments.next().unwrap_or_default();
        Operand::Argument {
            name,
            path: segments.collect(),
        }
    }

    /// Name of the argument this operand reads, if any
    pub fn argument_name(&self) -> Option<&str> {
        match self {
            Operand::Argument { name, .. } => Some(name),
            Operand::Literal(_) => None,
        }
    }

    fn resolve(&self, join_point: &JoinPoint<'_>) -> Value {
        match self {
            Operand::Literal(value) => value.clone(),
            Operand::Argument { name, path } => {
                let mut current = match join_point.argument(name) {
                    Some(value) => value,
                    None => return Value::Null,
                };
                for segment in path {
                    let next = match current {
                        Value::Object(map) => map.get(segment),
                        Value::Array(items) => {
                            segment.parse::<usize>().ok().and_then(|i| items.get(i))
                        }
                        _ => None,
                    };
                    match next {
                        Some(value) => current = value,
                        None => return Value::Null,
                    }
                }
                current.clone()
            }
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Argument { name, path } => {
                f.write_str(name)?;
                for segment in path {
                    write!(f, ".{}", segment)?;
                }
                Ok(())
            }
            Operand::Literal(value) => write!(f, "{}", value),
        }
    }
}

/// Predicate evaluated against a live join point
pub type ConditionFn = dyn Fn(&JoinPoint<'_>) -> bool + Send + Sync;

/// A deferred condition attached to a statically matched join point
#[derive(Clone)]
pub enum Condition {
    /// `left op right`
    Compare {
        /// Left operand
        left: Operand,
        /// Operator
        op: Operator,
        /// Right operand
        right: Operand,
    },
    /// Every sub-condition holds
    All(Vec<Condition>),
    /// At least one sub-condition holds
    Any(Vec<Condition>),
    /// The sub-condition does not hold
    Not(Box<Condition>),
    /// Host-provided predicate
    Custom {
        /// Label used in diagnostics and generated source
        label: String,
        /// The predicate
        predicate: Arc<ConditionFn>,
    },
}

impl Condition {
    /// `left op right`
    pub fn compare(left: Operand, op: Operator, right: Operand) -> Self {
        Condition::Compare { left, op, right }
    }

    /// Host-provided predicate
    pub fn custom<F>(label: &str, predicate: F) -> Self
    where
        F: Fn(&JoinPoint<'_>) -> bool + Send + Sync + 'static,
    {
        Condition::Custom {
            label: label.to_string(),
            predicate: Arc::new(predicate),
        }
    }

    /// Conjunction that flattens single-element lists
    pub fn all(mut conditions: Vec<Condition>) -> Option<Self> {
        match conditions.len() {
            0 => None,
            1 => conditions.pop(),
            _ => Some(Condition::All(conditions)),
        }
    }

    /// Disjunction that flattens single-element lists
    pub fn any(mut conditions: Vec<Condition>) -> Option<Self> {
        match conditions.len() {
            0 => None,
            1 => conditions.pop(),
            _ => Some(Condition::Any(conditions)),
        }
    }

    /// Evaluate against the join point's current arguments
    pub fn evaluate(&self, join_point: &JoinPoint<'_>) -> bool {
        match self {
            Condition::Compare { left, op, right } => {
                op.apply(&left.resolve(join_point), &right.resolve(join_point))
            }
            Condition::All(conditions) => conditions.iter().all(|c| c.evaluate(join_point)),
            Condition::Any(conditions) => conditions.iter().any(|c| c.evaluate(join_point)),
            Condition::Not(inner) => !inner.evaluate(join_point),
            Condition::Custom { predicate, .. } => predicate(join_point),
        }
    }

    /// Names of all arguments referenced by comparisons
    pub fn argument_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_argument_names(&mut names);
        names
    }

    fn collect_argument_names<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Condition::Compare { left, right, .. } => {
                names.extend(left.argument_name());
                names.extend(right.argument_name());
            }
            Condition::All(conditions) | Condition::Any(conditions) => {
                for condition in conditions {
                    condition.collect_argument_names(names);
                }
            }
            Condition::Not(inner) => inner.collect_argument_names(names),
            Condition::Custom { .. } => {}
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, items: &[Condition], sep: &str| {
            f.write_str("(")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{}", item)?;
            }
            f.write_str(")")
        };
        match self {
            Condition::Compare { left, op, right } => write!(f, "{} {} {}", left, op, right),
            Condition::All(items) => join(f, items, " && "),
            Condition::Any(items) => join(f, items, " || "),
            Condition::Not(inner) => write!(f, "!({})", inner),
            Condition::Custom { label, .. } => write!(f, "{}(..)", label),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Condition({})", self)
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Condition::Compare { left, op, right },
                Condition::Compare { left: l2, op: o2, right: r2 },
            ) => left == l2 && op == o2 && right == r2,
            (Condition::All(a), Condition::All(b)) | (Condition::Any(a), Condition::Any(b)) => {
                a == b
            }
            (Condition::Not(a), Condition::Not(b)) => a == b,
            (
                Condition::Custom { label, predicate },
                Condition::Custom { label: l2, predicate: p2 },
            ) => label == l2 && Arc::ptr_eq(predicate, p2),
            _ => false,
        }
    }
}
