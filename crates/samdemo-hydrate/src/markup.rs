//! Body markup: `{{NAME}}`, `{{NAME:uniform(MIN, MAX[, DECIMALS])}}` and
//! `{{#if PREDICATE}} … {{else}} … {{/if}}` blocks.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::context::ContextValue;

pub const OPEN: &str = "{{";
pub const CLOSE: &str = "}}";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MarkupError {
    #[error("unclosed marker at byte {0}")]
    UnclosedMarker(usize),
    #[error("invalid marker {{{{{0}}}}}")]
    InvalidMarker(String),
    #[error("unexpected {{{{{0}}}}} without an open #if")]
    UnbalancedBlock(String),
    #[error("{0} #if block(s) left open")]
    UnclosedBlock(usize),
    #[error("invalid predicate `{input}`: {reason}")]
    InvalidPredicate { input: String, reason: String },
    #[error("unknown name in predicate: {0}")]
    UnknownName(String),
    #[error("cannot order {left} and {right}")]
    NotComparable { left: String, right: String },
}

/// Parsed template body.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Placeholder(String),
    Sample {
        name: String,
        min: f64,
        max: f64,
        decimals: Option<u32>,
    },
    Conditional {
        predicate: Predicate,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

struct OpenBlock {
    predicate: Predicate,
    then: Vec<Node>,
    otherwise: Option<Vec<Node>>,
}

impl OpenBlock {
    fn active(&mut self) -> &mut Vec<Node> {
        match self.otherwise.as_mut() {
            Some(otherwise) => otherwise,
            None => &mut self.then,
        }
    }
}

pub fn parse_body(body: &str) -> Result<Vec<Node>, MarkupError> {
    let mut root = Vec::new();
    let mut stack: Vec<OpenBlock> = Vec::new();
    let mut cursor = 0;

    while let Some(found) = body[cursor..].find(OPEN) {
        let start = cursor + found;
        let inner_start = start + OPEN.len();
        let Some(len) = body[inner_start..].find(CLOSE) else {
            return Err(MarkupError::UnclosedMarker(start));
        };
        let inner = body[inner_start..inner_start + len].trim();
        let text = &body[cursor..start];
        cursor = inner_start + len + CLOSE.len();

        let out = match stack.last_mut() {
            Some(block) => block.active(),
            None => &mut root,
        };
        if !text.is_empty() {
            out.push(Node::Text(text.to_string()));
        }

        if let Some(predicate) = inner.strip_prefix("#if ") {
            stack.push(OpenBlock {
                predicate: predicate.parse()?,
                then: Vec::new(),
                otherwise: None,
            });
        } else if inner == "else" {
            match stack.last_mut() {
                Some(block) if block.otherwise.is_none() => block.otherwise = Some(Vec::new()),
                _ => return Err(MarkupError::UnbalancedBlock(inner.to_string())),
            }
        } else if inner == "/if" {
            let block = stack
                .pop()
                .ok_or_else(|| MarkupError::UnbalancedBlock(inner.to_string()))?;
            let node = Node::Conditional {
                predicate: block.predicate,
                then: block.then,
                otherwise: block.otherwise.unwrap_or_default(),
            };
            match stack.last_mut() {
                Some(parent) => parent.active().push(node),
                None => root.push(node),
            }
        } else {
            out.push(parse_marker(inner)?);
        }
    }

    if !stack.is_empty() {
        return Err(MarkupError::UnclosedBlock(stack.len()));
    }
    if cursor < body.len() {
        root.push(Node::Text(body[cursor..].to_string()));
    }
    Ok(root)
}

fn parse_marker(inner: &str) -> Result<Node, MarkupError> {
    let invalid = || MarkupError::InvalidMarker(inner.to_string());
    let Some((name, directive)) = inner.split_once(':') else {
        return if is_name(inner) {
            Ok(Node::Placeholder(inner.to_string()))
        } else {
            Err(invalid())
        };
    };

    let name = name.trim();
    let args = directive
        .trim()
        .strip_prefix("uniform(")
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(invalid)?;
    if !is_name(name) {
        return Err(invalid());
    }
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    let number = |raw: &str| {
        raw.parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(invalid)
    };
    let (min, max, decimals) = match parts.as_slice() {
        [min, max] => (number(min)?, number(max)?, None),
        [min, max, decimals] => (
            number(min)?,
            number(max)?,
            Some(decimals.parse::<u32>().map_err(|_| invalid())?),
        ),
        _ => return Err(invalid()),
    };
    if min > max {
        return Err(invalid());
    }
    Ok(Node::Sample {
        name: name.to_string(),
        min,
        max,
        decimals,
    })
}

pub fn is_name(raw: &str) -> bool {
    let mut chars = raw.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl CompareOp {
    fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            ">" => CompareOp::Gt,
            ">=" => CompareOp::Ge,
            "<" => CompareOp::Lt,
            "<=" => CompareOp::Le,
            "==" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            _ => return None,
        })
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Name(String),
    Number(f64),
    Text(String),
    Bool(bool),
}

/// Resolved operand during evaluation.
enum Resolved {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Resolved {
    fn from_value(value: &ContextValue) -> Self {
        match value {
            ContextValue::Bool(flag) => Resolved::Bool(*flag),
            other => match other.as_f64() {
                Some(number) => Resolved::Number(number),
                None => Resolved::Text(other.to_string()),
            },
        }
    }

    fn describe(&self) -> String {
        match self {
            Resolved::Number(number) => number.to_string(),
            Resolved::Text(text) => format!("'{text}'"),
            Resolved::Bool(flag) => flag.to_string(),
        }
    }
}

/// `OPERAND [OP OPERAND]`; a bare operand tests truthiness.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub left: Operand,
    pub op: Option<(CompareOp, Operand)>,
}

impl Predicate {
    /// Names the predicate reads from the context.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        let right = self.op.as_ref().map(|(_, operand)| operand);
        [Some(&self.left), right]
            .into_iter()
            .flatten()
            .filter_map(|operand| match operand {
                Operand::Name(name) => Some(name.as_str()),
                _ => None,
            })
    }

    pub fn evaluate<'c, F>(&self, lookup: F) -> Result<bool, MarkupError>
    where
        F: Fn(&str) -> Option<&'c ContextValue>,
    {
        let resolve = |operand: &Operand| -> Result<Resolved, MarkupError> {
            Ok(match operand {
                Operand::Name(name) => Resolved::from_value(
                    lookup(name.as_str()).ok_or_else(|| MarkupError::UnknownName(name.clone()))?,
                ),
                Operand::Number(number) => Resolved::Number(*number),
                Operand::Text(text) => Resolved::Text(text.clone()),
                Operand::Bool(flag) => Resolved::Bool(*flag),
            })
        };

        let left = resolve(&self.left)?;
        let Some((op, right)) = &self.op else {
            return Ok(match left {
                Resolved::Number(number) => number != 0.0,
                Resolved::Text(text) => !text.is_empty(),
                Resolved::Bool(flag) => flag,
            });
        };
        let right = resolve(right)?;

        match (&left, &right) {
            (Resolved::Number(a), Resolved::Number(b)) => Ok(match op {
                CompareOp::Gt => a > b,
                CompareOp::Ge => a >= b,
                CompareOp::Lt => a < b,
                CompareOp::Le => a <= b,
                CompareOp::Eq => a == b,
                CompareOp::Ne => a != b,
            }),
            _ => {
                let equal = match (&left, &right) {
                    (Resolved::Bool(a), Resolved::Bool(b)) => a == b,
                    (Resolved::Text(a), Resolved::Text(b)) => a == b,
                    _ => false,
                };
                match op {
                    CompareOp::Eq => Ok(equal),
                    CompareOp::Ne => Ok(!equal),
                    _ => Err(MarkupError::NotComparable {
                        left: left.describe(),
                        right: right.describe(),
                    }),
                }
            }
        }
    }
}

impl FromStr for Predicate {
    type Err = MarkupError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| MarkupError::InvalidPredicate {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        let tokens = tokenize(input).map_err(|reason| invalid(&reason))?;
        match tokens.as_slice() {
            [left] => Ok(Predicate {
                left: operand(left).ok_or_else(|| invalid("expected a name or literal"))?,
                op: None,
            }),
            [left, op, right] => {
                let op = CompareOp::parse(op).ok_or_else(|| invalid("unknown operator"))?;
                Ok(Predicate {
                    left: operand(left).ok_or_else(|| invalid("bad left operand"))?,
                    op: Some((
                        op,
                        operand(right).ok_or_else(|| invalid("bad right operand"))?,
                    )),
                })
            }
            [] => Err(invalid("empty")),
            _ => Err(invalid("expected OPERAND [OP OPERAND]")),
        }
    }
}

fn operand(token: &str) -> Option<Operand> {
    if let Some(text) = unquote(token) {
        return Some(Operand::Text(text.to_string()));
    }
    match token {
        "true" => return Some(Operand::Bool(true)),
        "false" => return Some(Operand::Bool(false)),
        _ => {}
    }
    if let Ok(number) = token.parse::<f64>() {
        return Some(Operand::Number(number));
    }
    is_name(token).then(|| Operand::Name(token.to_string()))
}

fn unquote(token: &str) -> Option<&str> {
    ['\'', '"'].into_iter().find_map(|quote| {
        (token.len() >= 2 && token.starts_with(quote) && token.ends_with(quote))
            .then(|| &token[1..token.len() - 1])
    })
}

fn tokenize(input: &str) -> Result<Vec<String>, String> {
    const OPERATOR_CHARS: [char; 4] = ['<', '>', '=', '!'];
    let mut tokens = Vec::new();
    let mut chars = input.trim().chars().peekable();

    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
        } else if ch == '\'' || ch == '"' {
            chars.next();
            let mut token = String::from(ch);
            loop {
                match chars.next() {
                    Some(next) if next == ch => break,
                    Some(next) => token.push(next),
                    None => return Err("unterminated string".to_string()),
                }
            }
            token.push(ch);
            tokens.push(token);
        } else if OPERATOR_CHARS.contains(&ch) {
            let mut token = String::new();
            while let Some(&next) = chars.peek() {
                if !OPERATOR_CHARS.contains(&next) {
                    break;
                }
                token.push(next);
                chars.next();
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_whitespace() || OPERATOR_CHARS.contains(&next) {
                    break;
                }
                token.push(next);
                chars.next();
            }
            tokens.push(token);
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_splits_operators_without_spaces() {
        let tokens = tokenize("QTD_RETURN_PCT>=-1.5").expect("tokens");
        assert_eq!(tokens, vec!["QTD_RETURN_PCT", ">=", "-1.5"]);
        let tokens = tokenize("RATING == 'Strong Buy'").expect("tokens");
        assert_eq!(tokens, vec!["RATING", "==", "'Strong Buy'"]);
    }

    #[test]
    fn unterminated_string_is_rejected() {
        assert!("RATING == 'Buy".parse::<Predicate>().is_err());
    }
}
