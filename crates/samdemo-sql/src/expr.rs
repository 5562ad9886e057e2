use std::fmt;

use samdemo_core::{ConfigValue, Number, Range, Scalar};

/// Constant value embedded in generated SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(Number),
    Text(String),
    Bool(bool),
}

impl Literal {
    pub fn text(value: impl Into<String>) -> Self {
        Literal::Text(value.into())
    }
}

impl From<&Scalar> for Literal {
    fn from(scalar: &Scalar) -> Self {
        match scalar {
            Scalar::Bool(value) => Literal::Bool(*value),
            Scalar::Number(value) => Literal::Number(*value),
            Scalar::Text(value) => Literal::Text(value.clone()),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(value) => write!(f, "{value}"),
            Literal::Text(value) => write!(f, "'{}'", value.replace('\'', "''")),
            Literal::Bool(true) => f.write_str("TRUE"),
            Literal::Bool(false) => f.write_str("FALSE"),
        }
    }
}

/// Expression tree rendered to warehouse SQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    Null,
    Literal(Literal),
    /// Caller-supplied SQL (a column reference or nested expression),
    /// emitted verbatim.
    Raw(String),
    /// `UNIFORM(min, max, RANDOM())`.
    Uniform { min: Number, max: Number },
    Case {
        branches: Vec<When>,
        otherwise: Box<SqlExpr>,
    },
    /// `(w1*a + w2*b + ...) / divisor`.
    WeightedAverage {
        terms: Vec<(Number, SqlExpr)>,
        divisor: Number,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct When {
    pub condition: Condition,
    pub then: SqlExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(SqlExpr, Literal),
    InList(SqlExpr, Vec<Literal>),
    AtLeast(SqlExpr, Number),
}

impl SqlExpr {
    pub fn raw(sql: impl Into<String>) -> Self {
        SqlExpr::Raw(sql.into())
    }

    pub fn uniform(range: Range) -> Self {
        SqlExpr::Uniform {
            min: range.min(),
            max: range.max(),
        }
    }

    pub fn case(branches: Vec<When>, otherwise: SqlExpr) -> Self {
        SqlExpr::Case {
            branches,
            otherwise: Box::new(otherwise),
        }
    }

    /// Expression for a resolved config value: a range samples uniformly,
    /// a scalar becomes a literal. Lists and maps have no SQL form.
    pub fn from_config(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Range(range) => Some(SqlExpr::uniform(*range)),
            ConfigValue::Scalar(scalar) => Some(SqlExpr::Literal(scalar.into())),
            ConfigValue::List(_) | ConfigValue::Map(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlExpr::Null)
    }
}

impl When {
    pub fn new(condition: Condition, then: SqlExpr) -> Self {
        Self { condition, then }
    }
}

impl fmt::Display for SqlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlExpr::Null => f.write_str("NULL"),
            SqlExpr::Literal(literal) => write!(f, "{literal}"),
            SqlExpr::Raw(sql) => f.write_str(sql),
            SqlExpr::Uniform { min, max } => write!(f, "UNIFORM({min}, {max}, RANDOM())"),
            SqlExpr::Case {
                branches,
                otherwise,
            } => {
                if branches.is_empty() {
                    return write!(f, "{otherwise}");
                }
                f.write_str("CASE")?;
                for branch in branches {
                    write!(f, " WHEN {} THEN {}", branch.condition, branch.then)?;
                }
                write!(f, " ELSE {otherwise} END")
            }
            SqlExpr::WeightedAverage { terms, divisor } => {
                f.write_str("(")?;
                for (idx, (weight, expr)) in terms.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(" + ")?;
                    }
                    write!(f, "{weight}*{expr}")?;
                }
                write!(f, ") / {divisor}")
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Equals(expr, literal) => write!(f, "{expr} = {literal}"),
            Condition::InList(expr, items) => {
                write!(f, "{expr} IN (")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Condition::AtLeast(expr, threshold) => write!(f, "{expr} >= {threshold}"),
        }
    }
}
