use serde::{Deserialize, Serialize};
use std::fmt;

/// The right-hand side of a comparison: a single scalar, or an ordered
/// list of scalars for set-membership operators such as `in`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(String),
    Set(Vec<String>),
}

impl Value {
    pub fn scalar(v: impl Into<String>) -> Self {
        Value::Scalar(v.into())
    }

    pub fn set<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::Set(members.into_iter().map(Into::into).collect())
    }

    /// Scalar payload, or `None` for sets
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => Some(s),
            Value::Set(_) => None,
        }
    }

    /// Number of positional placeholders this value occupies
    pub fn arity(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Set(members) => members.len(),
        }
    }

    /// Render this value in the canonical DSL form: the bare scalar, or
    /// `('a', 'b', 'c')` for sets.
    pub(crate) fn canonical(&self) -> String {
        match self {
            Value::Scalar(s) => s.clone(),
            Value::Set(members) => format!("('{}')", members.join("', '")),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Scalar(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Scalar(v)
    }
}

/// One leaf predicate of a query: `field operator value`.
///
/// The `field` is the physical storage name (the parser maps logical names
/// through the field handlers before constructing comparisons), optionally
/// qualified by a database and/or table prefix for SQL rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub field: String,
    pub operator: String,
    pub value: Value,
    pub db: Option<String>,
    pub table: Option<String>,
    /// When false the field is emitted verbatim, without backtick escaping
    /// (used for computed SQL expressions)
    pub quote: bool,
}

impl Comparison {
    pub fn new(field: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value,
            db: None,
            table: None,
            quote: true,
        }
    }

    pub fn qualified_by(mut self, db: Option<String>, table: Option<String>) -> Self {
        self.db = db;
        self.table = table;
        self
    }

    pub fn unquoted(mut self) -> Self {
        self.quote = false;
        self
    }

    /// Render the parameterized SQL fragment for this comparison:
    /// `` `field` op ? `` for scalars, `` `field` op (?, ?, ...) `` for sets.
    pub(crate) fn sql_fragment(&self) -> String {
        let mut out = String::new();
        if let Some(db) = &self.db {
            out.push_str(&format!("`{db}`."));
        }
        if let Some(table) = &self.table {
            out.push_str(&format!("`{table}`."));
        }
        if self.quote {
            out.push_str(&format!("`{}`", self.field));
        } else {
            out.push_str(&self.field);
        }
        out.push_str(&format!(" {} ", self.operator));
        match &self.value {
            Value::Scalar(_) => out.push('?'),
            Value::Set(members) => {
                let marks = vec!["?"; members.len()].join(", ");
                out.push_str(&format!("({marks})"));
            }
        }
        out
    }
}

// Canonical DSL rendering: `field<op><value>`, no padding around the
// comparison operator (the clause regex tolerates both forms on re-parse).
impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.field, self.operator, self.value.canonical())
    }
}
