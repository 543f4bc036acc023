//! The persistence query DSL.
//!
//! A query string is a flat chain of `field operator value` clauses joined
//! by a single logical operator, e.g. `name like kael% and age>=21` or
//! `status=active or status=pending`. Parsing is driven entirely by a
//! [`QuerySpec`] registration table, so each datasource declares up front
//! which fields, comparison operators, and logical combinators it accepts;
//! anything else is rejected as a [`Error::BadQuery`] before it can reach
//! a backend.
//!
//! Parsed queries translate themselves for SQL backends: [`DslQuery::where_clause`]
//! emits a parameterized predicate and [`DslQuery::params`] the matching
//! positional bind values, walking the expressions in the same order so the
//! placeholders always line up.

mod comparison;
mod spec;

pub use comparison::{Comparison, Value};
pub use spec::{
    FieldHandler, LogicalOp, QuerySpec, QuerySpecBuilder, DEFAULT_COMPARISON_OPERATORS,
    DEFAULT_VALUE_PATTERN,
};

use crate::error::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A parsed DSL query: an ordered set of named expressions joined by one
/// logical operator.
///
/// Expression order is insertion order and is preserved through
/// [`where_clause`](DslQuery::where_clause), [`params`](DslQuery::params),
/// and the canonical [`Display`](fmt::Display) rendering, so the string
/// form round-trips through [`parse`](DslQuery::parse).
#[derive(Clone)]
pub struct DslQuery {
    spec: Arc<QuerySpec>,
    operator: LogicalOp,
    expressions: Vec<(String, Comparison)>,
}

impl DslQuery {
    /// Parse a query string against a spec. `None` or a blank string yields
    /// the empty (always-true) query, which requests the full collection.
    pub fn parse(spec: &Arc<QuerySpec>, q: Option<&str>) -> Result<DslQuery> {
        let mut query = DslQuery::empty(spec);
        let raw = match q.map(str::trim) {
            None | Some("") => return Ok(query),
            Some(raw) => raw,
        };

        debug!(query = raw, "Parsing DSL query");

        // A single level of the DSL admits exactly one logical operator.
        let lower = raw.to_ascii_lowercase();
        let has_and = lower.contains(LogicalOp::And.token());
        let has_or = lower.contains(LogicalOp::Or.token());
        let operator = match (has_and, has_or) {
            (true, true) => {
                return Err(Error::bad_query_fragment(
                    "Sorry, you can only set one type of logical operator per query",
                    raw,
                ))
            }
            (true, false) => Some(LogicalOp::And),
            (false, true) => Some(LogicalOp::Or),
            // single clause, nothing to combine
            (false, false) => None,
        };
        if let Some(operator) = operator {
            spec.validate_logical_operator(operator)?;
            query.operator = operator;
        }

        for clause in split_on_token(raw, &lower, query.operator.token()) {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }
            query.parse_clause(clause)?;
        }
        Ok(query)
    }

    /// The empty query: no expressions, matches everything.
    pub fn empty(spec: &Arc<QuerySpec>) -> DslQuery {
        DslQuery {
            spec: Arc::clone(spec),
            operator: LogicalOp::And,
            expressions: Vec::new(),
        }
    }

    fn parse_clause(&mut self, clause: &str) -> Result<()> {
        let caps = self.spec.clause_re().captures(clause).ok_or_else(|| {
            Error::bad_query_fragment(
                format!(
                    "Unacceptable fields or operators. Acceptable fields for this query are \
                     `{}`; acceptable comparison operators are `{}`.",
                    self.spec.acceptable_fields().join("`, `"),
                    self.spec.comparison_operators().join("`, `")
                ),
                clause,
            )
        })?;

        let field = caps.get(1).map_or("", |m| m.as_str()).to_string();
        let operator = caps
            .get(2)
            .map_or("", |m| m.as_str())
            .to_ascii_lowercase();
        let value = match caps.get(3) {
            Some(body) => Value::Set(
                body.as_str()
                    .split(',')
                    .map(|m| m.trim().trim_matches(['\'', '"']).to_string())
                    .filter(|m| !m.is_empty())
                    .collect(),
            ),
            None => Value::Scalar(caps.get(4).map_or("", |m| m.as_str()).to_string()),
        };

        // The regex alternation only admits registered fields, so the
        // lookup can fail only under a custom value pattern gone wrong.
        let spec = Arc::clone(&self.spec);
        let handler = spec
            .field(&field)
            .map(|f| &f.handler)
            .ok_or_else(|| Error::bad_query_fragment("Unrecognized query field", clause))?;
        handler(self, &operator, value)
    }

    /// Install (or replace) the expression for a logical field name. The
    /// comparison operator must be on the spec's whitelist.
    pub fn set_expression(&mut self, name: &str, comparison: Comparison) -> Result<()> {
        self.spec.validate_comparison_operator(&comparison.operator)?;
        match self
            .expressions
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some((_, existing)) => *existing = comparison,
            None => self.expressions.push((name.to_string(), comparison)),
        }
        Ok(())
    }

    /// Constrain the query to the resource id. The comparison binds to the
    /// spec's primary key column but renders as `id` in the DSL.
    pub fn set_id(&mut self, operator: &str, id: &str) -> Result<()> {
        let cmp = Comparison::new(self.spec.primary_key(), operator, Value::scalar(id));
        self.set_expression("id", cmp)
    }

    /// The target id, when this query pins one down with an equality test.
    pub fn get_id(&self) -> Option<&str> {
        self.expression("id")
            .filter(|cmp| cmp.operator == "=")
            .and_then(|cmp| cmp.value.as_scalar())
    }

    /// Drop the id constraint, turning a point query back into a
    /// collection query.
    pub fn unset_id(&mut self) {
        self.expressions.retain(|(n, _)| !n.eq_ignore_ascii_case("id"));
    }

    /// The expression registered under a logical field name, if any.
    pub fn expression(&self, name: &str) -> Option<&Comparison> {
        self.expressions
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, cmp)| cmp)
    }

    /// True when the query constrains `name` with an equality test that is
    /// guaranteed to hold for every result. Only `and`-joined equality
    /// expressions qualify; under `or` a clause may not hold for a given
    /// result row.
    pub fn includes(&self, name: &str) -> bool {
        if self.operator != LogicalOp::And {
            return false;
        }
        self.expression(name).is_some_and(|cmp| cmp.operator == "=")
    }

    /// True when the result is a collection rather than a single resource.
    /// A query requests a single resource exactly when it includes an id
    /// equality constraint.
    pub fn requesting_collection(&self) -> bool {
        !self.includes("id")
    }

    /// Number of expressions in the query.
    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }

    pub fn operator(&self) -> LogicalOp {
        self.operator
    }

    pub fn spec(&self) -> &Arc<QuerySpec> {
        &self.spec
    }

    /// The parameterized SQL predicate for this query, or `None` for the
    /// empty query (no `WHERE` clause at all).
    pub fn where_clause(&self) -> Option<String> {
        if self.expressions.is_empty() {
            return None;
        }
        let joiner = format!(" {} ", self.operator.as_str());
        Some(
            self.expressions
                .iter()
                .map(|(_, cmp)| cmp.sql_fragment())
                .collect::<Vec<_>>()
                .join(&joiner),
        )
    }

    /// Positional bind values matching [`where_clause`](Self::where_clause)
    /// placeholder for placeholder.
    pub fn params(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (_, cmp) in &self.expressions {
            match &cmp.value {
                Value::Scalar(v) => out.push(v.clone()),
                Value::Set(members) => out.extend(members.iter().cloned()),
            }
        }
        out
    }
}

impl fmt::Display for DslQuery {
    /// Canonical DSL rendering. Expressions render under their logical
    /// names (`id`, not the physical primary key column), so the output
    /// re-parses under the same spec to an equivalent query.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, cmp) in &self.expressions {
            if !first {
                write!(f, "{}", self.operator.token())?;
            }
            first = false;
            write!(f, "{}{}{}", name, cmp.operator, cmp.value.canonical())?;
        }
        Ok(())
    }
}

impl fmt::Debug for DslQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DslQuery")
            .field("operator", &self.operator)
            .field("query", &self.to_string())
            .finish()
    }
}

/// Split `raw` on every occurrence of `token` in `lower` (its ASCII
/// lowercase), slicing the original so clause text keeps its case.
fn split_on_token<'a>(raw: &'a str, lower: &str, token: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (idx, _) in lower.match_indices(token) {
        out.push(&raw[start..idx]);
        start = idx + token.len();
    }
    out.push(&raw[start..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people_spec() -> Arc<QuerySpec> {
        QuerySpec::builder()
            .field("name")
            .field("age")
            .field_with("status", |q, operator, value| {
                let cmp = Comparison::new("currentStatus", operator, value);
                q.set_expression("status", cmp)
            })
            .comparison_operator("in")
            .primary_key("personId")
            .build()
    }

    #[test]
    fn test_empty_query_matches_everything() {
        let spec = people_spec();
        for q in [None, Some(""), Some("   ")] {
            let query = DslQuery::parse(&spec, q).unwrap();
            assert!(query.is_empty());
            assert!(query.requesting_collection());
            assert_eq!(query.where_clause(), None);
            assert!(query.params().is_empty());
            assert_eq!(query.to_string(), "");
        }
    }

    #[test]
    fn test_id_query_requests_single_resource() {
        let spec = people_spec();
        let query = DslQuery::parse(&spec, Some("id=abc123")).unwrap();
        assert_eq!(query.get_id(), Some("abc123"));
        assert!(!query.requesting_collection());
        assert_eq!(query.where_clause().unwrap(), "`personId` = ?");
        assert_eq!(query.params(), vec!["abc123".to_string()]);
    }

    #[test]
    fn test_unset_id_restores_collection_query() {
        let spec = people_spec();
        let mut query = DslQuery::parse(&spec, Some("id=abc123")).unwrap();
        query.unset_id();
        assert_eq!(query.get_id(), None);
        assert!(query.requesting_collection());
        assert!(query.is_empty());
    }

    #[test]
    fn test_and_chain_parses_in_order() {
        let spec = people_spec();
        let query = DslQuery::parse(&spec, Some("name like kael% and age>=21")).unwrap();
        assert_eq!(query.operator(), LogicalOp::And);
        assert_eq!(
            query.where_clause().unwrap(),
            "`name` like ? and `age` >= ?"
        );
        assert_eq!(
            query.params(),
            vec!["kael%".to_string(), "21".to_string()]
        );
    }

    #[test]
    fn test_or_chain_parses() {
        let spec = people_spec();
        let query = DslQuery::parse(&spec, Some("name=alice or age>=65")).unwrap();
        assert_eq!(query.operator(), LogicalOp::Or);
        assert_eq!(query.where_clause().unwrap(), "`name` = ? or `age` >= ?");
        assert!(query.requesting_collection());
    }

    #[test]
    fn test_mixed_logical_operators_rejected() {
        let spec = people_spec();
        let err = DslQuery::parse(&spec, Some("name=a and age=1 or age=2"))
            .expect_err("mixed operators must fail");
        match err {
            Error::BadQuery { message, fragment, .. } => {
                assert!(message.contains("one type of logical operator"));
                assert_eq!(fragment.as_deref(), Some("name=a and age=1 or age=2"));
            }
            other => panic!("expected BadQuery, got {other:?}"),
        }
    }

    #[test]
    fn test_or_rejected_when_spec_disallows_it() {
        let spec = QuerySpec::builder()
            .field("name")
            .logical_operators(vec![LogicalOp::And])
            .build();
        let err = DslQuery::parse(&spec, Some("name=a or name=b"))
            .expect_err("or must be rejected by this spec");
        assert!(err.to_string().contains("not an acceptable operator"));
    }

    #[test]
    fn test_unknown_field_cites_fragment_and_acceptable_fields() {
        let spec = people_spec();
        let err = DslQuery::parse(&spec, Some("name=a and shoeSize=12"))
            .expect_err("unknown field must fail");
        match err {
            Error::BadQuery { message, fragment, .. } => {
                assert!(message.contains("`id`, `name`, `age`, `status`"));
                assert_eq!(fragment.as_deref(), Some("shoeSize=12"));
            }
            other => panic!("expected BadQuery, got {other:?}"),
        }
    }

    #[test]
    fn test_illegal_comparison_operator_rejected() {
        let spec = QuerySpec::builder()
            .field("age")
            .comparison_operators(["=", "!="])
            .build();
        let err = DslQuery::parse(&spec, Some("age>=21")).expect_err("`>=` must be rejected");
        assert!(matches!(err, Error::BadQuery { .. }));

        // Installed directly, the illegal operator is named in the error.
        let mut query = DslQuery::empty(&spec);
        let err = query
            .set_expression("age", Comparison::new("age", ">=", Value::scalar("21")))
            .expect_err("`>=` must be rejected");
        match err {
            Error::BadQuery { bad_params, .. } => {
                assert_eq!(bad_params, vec![">=".to_string()]);
            }
            other => panic!("expected BadQuery, got {other:?}"),
        }
    }

    #[test]
    fn test_set_values_expand_to_placeholders() {
        let spec = people_spec();
        let query =
            DslQuery::parse(&spec, Some("status in ('one', 'two', 'three') and age>18")).unwrap();
        assert_eq!(
            query.where_clause().unwrap(),
            "`currentStatus` in (?, ?, ?) and `age` > ?"
        );
        assert_eq!(
            query.params(),
            vec![
                "one".to_string(),
                "two".to_string(),
                "three".to_string(),
                "18".to_string()
            ]
        );
    }

    #[test]
    fn test_custom_field_handler_maps_to_storage_column() {
        let spec = people_spec();
        let query = DslQuery::parse(&spec, Some("status=active")).unwrap();
        assert_eq!(query.where_clause().unwrap(), "`currentStatus` = ?");
        // The logical name still drives includes() and rendering.
        assert!(query.includes("status"));
        assert_eq!(query.to_string(), "status=active");
    }

    #[test]
    fn test_quoted_scalar_values_are_unwrapped() {
        let spec = people_spec();
        let query = DslQuery::parse(&spec, Some("name='kael'")).unwrap();
        assert_eq!(query.params(), vec!["kael".to_string()]);
    }

    #[test]
    fn test_field_and_operator_dispatch_is_case_insensitive() {
        let spec = people_spec();
        let query = DslQuery::parse(&spec, Some("Name LIKE kael%")).unwrap();
        assert_eq!(query.where_clause().unwrap(), "`name` like ?");
    }

    #[test]
    fn test_canonical_rendering_round_trips() {
        let spec = people_spec();
        for q in [
            "id=abc123",
            "name like kael% and age>=21",
            "name=alice or age>=65",
            "status in (one, two) and id!=5",
        ] {
            let parsed = DslQuery::parse(&spec, Some(q)).unwrap();
            let reparsed = DslQuery::parse(&spec, Some(&parsed.to_string())).unwrap();
            assert_eq!(parsed.to_string(), reparsed.to_string(), "query `{q}`");
            assert_eq!(parsed.where_clause(), reparsed.where_clause(), "query `{q}`");
            assert_eq!(parsed.params(), reparsed.params(), "query `{q}`");
        }
    }

    #[test]
    fn test_includes_requires_and_with_equality() {
        let spec = people_spec();
        let and_q = DslQuery::parse(&spec, Some("name=kael and age>=21")).unwrap();
        assert!(and_q.includes("name"));
        assert!(!and_q.includes("age"));

        let or_q = DslQuery::parse(&spec, Some("name=kael or age>=21")).unwrap();
        assert!(!or_q.includes("name"));
    }

    #[test]
    fn test_id_under_or_does_not_pin_a_single_resource() {
        let spec = people_spec();
        let query = DslQuery::parse(&spec, Some("id=1 or name=kael")).unwrap();
        assert_eq!(query.get_id(), Some("1"));
        assert!(query.requesting_collection());
    }

    #[test]
    fn test_expression_replacement_keeps_position() {
        let spec = people_spec();
        let mut query = DslQuery::parse(&spec, Some("name=a and age=1")).unwrap();
        query
            .set_expression("name", Comparison::new("name", "like", Value::scalar("b%")))
            .unwrap();
        assert_eq!(query.to_string(), "namelikeb% and age=1");
        assert_eq!(query.params(), vec!["b%".to_string(), "1".to_string()]);
    }
}
