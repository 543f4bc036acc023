use serde_json::Value;
use std::fmt;

/// A parameterized SQL statement assembled from independently-settable
/// parts. `params` line up positionally with the `?` placeholders in the
/// constructed text, head first, then the where clause.
#[derive(Debug, Clone, Default)]
pub struct SqlStatement {
    /// The statement head, e.g. `SELECT * FROM \`people\`` or a full
    /// `INSERT INTO ... VALUES (...)`.
    pub head: String,
    pub where_clause: Option<String>,
    pub order_by: Option<String>,
    pub limit: Option<u64>,
    pub params: Vec<Value>,
}

impl SqlStatement {
    pub fn new(head: impl Into<String>) -> Self {
        Self {
            head: head.into(),
            ..Default::default()
        }
    }

    pub fn with_where(mut self, where_clause: Option<String>) -> Self {
        self.where_clause = where_clause;
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    /// Assemble the final SQL text.
    pub fn construct(&self) -> String {
        let mut sql = self.head.clone();
        if let Some(w) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(w);
        }
        if let Some(o) = &self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(o);
        }
        if let Some(l) = self.limit {
            sql.push_str(&format!(" LIMIT {l}"));
        }
        sql
    }

    /// True when the statement produces a row set rather than a write.
    pub fn is_row_query(&self) -> bool {
        self.head.trim_start().to_ascii_uppercase().starts_with("SELECT")
    }
}

impl fmt::Display for SqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.construct())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_construct_orders_the_parts() {
        let s = SqlStatement::new("SELECT * FROM `people`")
            .with_where(Some("`age` >= ?".to_string()))
            .with_order_by("`name` ASC")
            .with_limit(10)
            .with_params(vec![json!("21")]);
        assert_eq!(
            s.construct(),
            "SELECT * FROM `people` WHERE `age` >= ? ORDER BY `name` ASC LIMIT 10"
        );
    }

    #[test]
    fn test_bare_head_constructs_unchanged() {
        let s = SqlStatement::new("DELETE FROM `people`");
        assert_eq!(s.construct(), "DELETE FROM `people`");
        assert!(!s.is_row_query());
        assert!(SqlStatement::new("select 1").is_row_query());
    }
}
