use crate::error::{Error, Result};
use crate::query::comparison::{Comparison, Value};
use crate::query::DslQuery;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Default comparison-operator whitelist, longest token first so the
/// alternation in the clause regex prefers `>=` over `>`.
pub const DEFAULT_COMPARISON_OPERATORS: &[&str] = &[">=", "<=", "!=", "=", "like", ">", "<"];

/// Default value pattern: a bare or quoted token with no spaces.
/// Custom patterns must contain exactly one capture group.
pub const DEFAULT_VALUE_PATTERN: &str = r#"['"]?([^ &'"]+)['"]?"#;

/// The logical combinator joining the expressions of one query level.
/// A single level may use only one of these; mixing is a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        }
    }

    /// The token this operator occupies in query text, including the
    /// mandatory surrounding spaces.
    pub(crate) fn token(&self) -> &'static str {
        match self {
            LogicalOp::And => " and ",
            LogicalOp::Or => " or ",
        }
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handler invoked when a parsed clause names this field. Receives the
/// query under construction, the matched comparison operator, and the
/// extracted value.
pub type FieldHandler = Box<dyn Fn(&mut DslQuery, &str, Value) -> Result<()> + Send + Sync>;

pub(crate) struct FieldSpec {
    pub(crate) name: String,
    pub(crate) handler: FieldHandler,
}

/// The static registration table driving the DSL parser for one query
/// class: which fields are acceptable, which handler installs each one,
/// and which comparison/logical operators are legal.
///
/// Built once per datasource via [`QuerySpecBuilder`] and shared behind an
/// `Arc`; every [`DslQuery`] keeps a handle to the spec it was parsed
/// under so its setters can keep enforcing the operator whitelist.
pub struct QuerySpec {
    pub(crate) fields: Vec<FieldSpec>,
    comparison_operators: Vec<String>,
    logical_operators: Vec<LogicalOp>,
    primary_key: String,
    clause_re: Regex,
}

impl QuerySpec {
    /// Start building a spec. The default table knows only the `id` field,
    /// accepts the standard comparison operators, and allows both `and`
    /// and `or` chains.
    pub fn builder() -> QuerySpecBuilder {
        QuerySpecBuilder::new()
    }

    /// A ready-made spec with just the `id` field.
    pub fn generic() -> Arc<QuerySpec> {
        QuerySpec::builder().build()
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn acceptable_fields(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn comparison_operators(&self) -> Vec<&str> {
        self.comparison_operators.iter().map(String::as_str).collect()
    }

    pub fn logical_operators(&self) -> &[LogicalOp] {
        &self.logical_operators
    }

    pub(crate) fn clause_re(&self) -> &Regex {
        &self.clause_re
    }

    /// Field lookup is ASCII-case-insensitive.
    pub(crate) fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub(crate) fn validate_comparison_operator(&self, operator: &str) -> Result<()> {
        if self.comparison_operators.iter().any(|op| op == operator) {
            Ok(())
        } else {
            Err(Error::bad_query_params(
                format!(
                    "The expression you've provided has an illegal comparison operator, \
                     `{operator}`. Legal operators are `{}`.",
                    self.comparison_operators.join("`, `")
                ),
                vec![operator.to_string()],
            ))
        }
    }

    pub(crate) fn validate_logical_operator(&self, operator: LogicalOp) -> Result<()> {
        if self.logical_operators.contains(&operator) {
            Ok(())
        } else {
            Err(Error::bad_query_params(
                format!(
                    "Sorry, `{operator}` is not an acceptable operator. Acceptable operators \
                     for this query are `{}`.",
                    self.logical_operators
                        .iter()
                        .map(LogicalOp::as_str)
                        .collect::<Vec<_>>()
                        .join("`, `")
                ),
                vec![operator.as_str().to_string()],
            ))
        }
    }
}

impl fmt::Debug for QuerySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySpec")
            .field("fields", &self.acceptable_fields())
            .field("comparison_operators", &self.comparison_operators)
            .field("logical_operators", &self.logical_operators)
            .field("primary_key", &self.primary_key)
            .finish()
    }
}

/// Builder for [`QuerySpec`]. Field registration order is preserved and
/// becomes the alternation order of the clause regex.
pub struct QuerySpecBuilder {
    fields: Vec<FieldSpec>,
    comparison_operators: Vec<String>,
    logical_operators: Vec<LogicalOp>,
    primary_key: String,
    value_pattern: String,
}

impl QuerySpecBuilder {
    fn new() -> Self {
        Self {
            fields: vec![FieldSpec {
                name: "id".to_string(),
                handler: Box::new(|q, operator, value| match value.as_scalar() {
                    Some(id) => q.set_id(operator, id),
                    None => Err(Error::bad_query(
                        "The `id` field takes a single scalar value, not a set",
                    )),
                }),
            }],
            comparison_operators: DEFAULT_COMPARISON_OPERATORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            logical_operators: vec![LogicalOp::And, LogicalOp::Or],
            primary_key: "id".to_string(),
            value_pattern: DEFAULT_VALUE_PATTERN.to_string(),
        }
    }

    /// Register a field with the default handler: install a comparison on
    /// the field's own name.
    pub fn field(self, name: impl Into<String>) -> Self {
        let name = name.into();
        let field = name.clone();
        self.field_with(name, move |q, operator, value| {
            let cmp = Comparison::new(field.clone(), operator, value);
            q.set_expression(&field, cmp)
        })
    }

    /// Register a field with a custom handler (the extension point that
    /// replaces per-field setter methods located by name).
    pub fn field_with<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut DslQuery, &str, Value) -> Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        self.fields.retain(|f| !f.name.eq_ignore_ascii_case(&name));
        self.fields.push(FieldSpec {
            name,
            handler: Box::new(handler),
        });
        self
    }

    /// Replace the comparison-operator whitelist. Order matters: list
    /// longer tokens before their prefixes (`>=` before `>`).
    pub fn comparison_operators<I, S>(mut self, operators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.comparison_operators = operators.into_iter().map(Into::into).collect();
        self
    }

    /// Add an operator to the whitelist (e.g. `in` for set membership).
    pub fn comparison_operator(mut self, operator: impl Into<String>) -> Self {
        self.comparison_operators.push(operator.into());
        self
    }

    /// Restrict which logical combinators this query class accepts.
    pub fn logical_operators(mut self, operators: Vec<LogicalOp>) -> Self {
        self.logical_operators = operators;
        self
    }

    /// Physical column the `id` expression binds to.
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Override the value regex fragment. Must contain exactly one capture
    /// group for the extracted value.
    pub fn value_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.value_pattern = pattern.into();
        self
    }

    pub fn build(self) -> Arc<QuerySpec> {
        let field_alt = self
            .fields
            .iter()
            .map(|f| regex::escape(&f.name))
            .collect::<Vec<_>>()
            .join("|");
        let op_alt = self
            .comparison_operators
            .iter()
            .map(|op| regex::escape(op))
            .collect::<Vec<_>>()
            .join("|");
        // Group 1: field, group 2: operator, group 3: parenthesized set
        // body, group 4 (from the value pattern): scalar value.
        let pattern = format!(
            r"(?i)^({field_alt}) ?({op_alt}) ?(?:\(([^)]*)\)|{})$",
            self.value_pattern
        );
        let clause_re = Regex::new(&pattern)
            .unwrap_or_else(|e| panic!("Programmer: invalid query spec pattern `{pattern}`: {e}"));

        Arc::new(QuerySpec {
            fields: self.fields,
            comparison_operators: self.comparison_operators,
            logical_operators: self.logical_operators,
            primary_key: self.primary_key,
            clause_re,
        })
    }
}
