//! Row stores for tabular sources.
//!
//! A row store executes exactly one filtered read per call: keep the rows
//! whose identifier column is (or is not) in a membership set. Rows are
//! opaque JSON objects; only the identifier column is inspected.

use crate::error::PolicyError;
use crate::tabular::{MembershipMode, MembershipPredicate};
use async_trait::async_trait;
use rootcause::prelude::Report;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::{debug, instrument};

/// An opaque table row.
pub type Row = serde_json::Map<String, JsonValue>;

/// Returns a row's identifier as text, or `None` if the column is missing
/// or holds something other than a string or number.
#[must_use]
pub fn row_identifier(row: &Row, column: &str) -> Option<String> {
    match row.get(column)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A source of table rows supporting one membership-filtered read.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Returns the rows satisfying `predicate`, in the store's order.
    async fn select(
        &self,
        predicate: &MembershipPredicate,
    ) -> Result<Vec<Row>, Report<PolicyError>>;
}

/// Rows held in memory, returned in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryRowStore {
    rows: Vec<Row>,
}

impl MemoryRowStore {
    /// Creates a store over the given rows.
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Parses a JSON array of objects.
    pub fn from_json(json: &str) -> Result<Self, Report<PolicyError>> {
        let rows: Vec<Row> =
            serde_json::from_str(json).map_err(|e| PolicyError::RowStoreFailed {
                details: format!("invalid row data: {e}"),
            })?;
        Ok(Self::new(rows))
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the store holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn select(
        &self,
        predicate: &MembershipPredicate,
    ) -> Result<Vec<Row>, Report<PolicyError>> {
        Ok(self
            .rows
            .iter()
            .filter(|row| predicate.keeps(row_identifier(row, &predicate.column).as_deref()))
            .cloned()
            .collect())
    }
}

fn validate_identifier(kind: &str, name: &str) -> Result<(), Report<PolicyError>> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(PolicyError::RowStoreFailed {
            details: format!("{kind} '{name}' is not a plain SQL identifier"),
        }
        .into())
    }
}

/// Builds the single filtered read. NULL identifiers satisfy neither form.
fn select_sql(table: &str, column: &str, order_by: &str, mode: MembershipMode) -> String {
    let negation = match mode {
        MembershipMode::Include => "",
        MembershipMode::Exclude => "NOT ",
    };
    format!(
        "SELECT row_to_json(t)::text FROM \"{table}\" t \
         WHERE {negation}(t.\"{column}\"::text = ANY($1)) \
         ORDER BY t.\"{order_by}\""
    )
}

/// Rows of one PostgreSQL table.
#[derive(Debug, Clone)]
pub struct PgRowStore {
    pool: PgPool,
    table: String,
    order_by: Option<String>,
}

impl PgRowStore {
    /// Creates a store over `table`, ordered by `order_by` (the identifier
    /// column when absent).
    ///
    /// # Errors
    ///
    /// Returns an error if a name is not a plain SQL identifier.
    pub fn new(
        pool: PgPool,
        table: impl Into<String>,
        order_by: Option<String>,
    ) -> Result<Self, Report<PolicyError>> {
        let table = table.into();
        validate_identifier("table", &table)?;
        if let Some(column) = &order_by {
            validate_identifier("order_by column", column)?;
        }
        Ok(Self {
            pool,
            table,
            order_by,
        })
    }
}

#[async_trait]
impl RowStore for PgRowStore {
    #[instrument(skip(self, predicate), fields(table = %self.table, mode = ?predicate.mode()))]
    async fn select(
        &self,
        predicate: &MembershipPredicate,
    ) -> Result<Vec<Row>, Report<PolicyError>> {
        validate_identifier("identifier column", &predicate.column)?;
        let order_by = self.order_by.as_deref().unwrap_or(&predicate.column);
        let sql = select_sql(&self.table, &predicate.column, order_by, predicate.mode());
        let members: Vec<String> = predicate.members.iter().map(str::to_string).collect();

        let encoded: Vec<String> = sqlx::query_scalar(&sql)
            .bind(members)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PolicyError::RowStoreFailed {
                details: e.to_string(),
            })?;

        debug!(rows = encoded.len(), "filtered read complete");
        encoded
            .iter()
            .map(|text| {
                serde_json::from_str::<Row>(text).map_err(|e| {
                    PolicyError::RowStoreFailed {
                        details: format!("undecodable row: {e}"),
                    }
                    .into()
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posture::Posture;
    use crate::tabular::MembershipSet;
    use crate::test_support::rows;
    use serde_json::json;

    fn predicate(posture: Posture, members: &[&str]) -> MembershipPredicate {
        MembershipPredicate {
            column: "id".to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
            posture,
        }
    }

    #[test]
    fn identifier_accepts_strings_and_numbers() {
        let row: Row =
            serde_json::from_value(json!({"id": 7, "code": "r7", "flag": true})).unwrap();
        assert_eq!(row_identifier(&row, "id").as_deref(), Some("7"));
        assert_eq!(row_identifier(&row, "code").as_deref(), Some("r7"));
        assert_eq!(row_identifier(&row, "flag"), None);
        assert_eq!(row_identifier(&row, "missing"), None);
    }

    #[tokio::test]
    async fn memory_store_includes_members_in_insertion_order() {
        let store = MemoryRowStore::new(rows(&["r3", "r1", "r2"]));
        let kept = store
            .select(&predicate(Posture::DefaultDeny, &["r1", "r3"]))
            .await
            .unwrap();
        let ids: Vec<_> = kept.iter().filter_map(|r| row_identifier(r, "id")).collect();
        assert_eq!(ids, ["r3", "r1"]);
    }

    #[tokio::test]
    async fn rows_without_identifier_never_match() {
        let mut data = rows(&["r1"]);
        data.push(serde_json::from_value(json!({"label": "orphan"})).unwrap());
        let store = MemoryRowStore::new(data);

        for posture in [Posture::DefaultDeny, Posture::DefaultAllowWithExplicitDeny] {
            let kept = store.select(&predicate(posture, &[])).await.unwrap();
            assert!(kept.iter().all(|row| row.contains_key("id")));
        }
    }

    #[test]
    fn memory_store_from_json() {
        let store = MemoryRowStore::from_json(r#"[{"id": "r1"}, {"id": "r2"}]"#).unwrap();
        assert_eq!(store.len(), 2);
        assert!(MemoryRowStore::from_json(r#"{"id": "r1"}"#).is_err());
    }

    #[test]
    fn include_sql() {
        assert_eq!(
            select_sql("hr_data", "employee_id", "employee_id", MembershipMode::Include),
            "SELECT row_to_json(t)::text FROM \"hr_data\" t \
             WHERE (t.\"employee_id\"::text = ANY($1)) ORDER BY t.\"employee_id\""
        );
    }

    #[test]
    fn exclude_sql() {
        let sql = select_sql("financial_data", "id", "created_at", MembershipMode::Exclude);
        assert!(sql.contains("WHERE NOT (t.\"id\"::text = ANY($1))"));
        assert!(sql.ends_with("ORDER BY t.\"created_at\""));
    }

    #[test]
    fn identifiers_are_validated() {
        assert!(validate_identifier("table", "hr_data").is_ok());
        assert!(validate_identifier("table", "_t1").is_ok());
        assert!(validate_identifier("table", "1t").is_err());
        assert!(validate_identifier("table", "data; DROP TABLE x").is_err());
        assert!(validate_identifier("table", "").is_err());
    }

    #[test]
    fn membership_set_feeds_sorted_unique_members() {
        let members: MembershipSet = ["r3", "r1", "r3"].into_iter().map(String::from).collect();
        let listed: Vec<&str> = members.iter().collect();
        assert_eq!(listed, ["r1", "r3"]);
    }
}
