use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Executor, MySql};

use crate::error::AttendanceError;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    U64(u64),
    F64(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Null,
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::U64(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// Binds every `SqlValue` in order onto a `query`/`query_as`/`query_scalar` builder.
macro_rules! bind_values {
    ($query:expr, $values:expr) => {{
        let mut query = $query;
        for value in $values {
            query = match value {
                $crate::utils::db_utils::SqlValue::String(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::U64(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::F64(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::Bool(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::DateTime(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::Date(v) => query.bind(v),
                $crate::utils::db_utils::SqlValue::Null => query.bind(None::<String>),
            };
        }
        query
    }};
}
pub(crate) use bind_values;

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
/// Column names are `'static` so only code, never request input, can name them.
#[derive(Debug)]
pub struct UpdateBuilder {
    table: &'static str,
    sets: Vec<(&'static str, SqlValue)>,
}

impl UpdateBuilder {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            sets: Vec::new(),
        }
    }

    pub fn set(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.sets.push((column, value.into()));
        self
    }

    /// Sets the column only when a value is given; `None` leaves it untouched.
    pub fn set_some<T: Into<SqlValue>>(self, column: &'static str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    pub fn build(self, id_column: &'static str, id_value: u64) -> Result<SqlUpdate, AttendanceError> {
        if self.sets.is_empty() {
            return Err(AttendanceError::validation("No fields provided for update"));
        }

        // Build SET clause
        let set_clause = self
            .sets
            .iter()
            .map(|(column, _)| format!("{} = ?", column))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            self.table, set_clause, id_column
        );

        let mut values: Vec<SqlValue> = self.sets.into_iter().map(|(_, v)| v).collect();

        // WHERE id = ?
        values.push(SqlValue::U64(id_value));

        Ok(SqlUpdate { sql, values })
    }
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update<'e, E>(executor: E, update: SqlUpdate) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let query = bind_values!(sqlx::query(&update.sql), update.values);

    let result = query.execute(executor).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_set_clause_in_call_order() {
        let update = UpdateBuilder::new("locations")
            .set("name", "Annex".to_string())
            .set_some("radius", Some(250.0))
            .set_some::<bool>("is_active", None)
            .set("description", None::<String>)
            .build("id", 9)
            .unwrap();

        assert_eq!(
            update.sql,
            "UPDATE locations SET name = ?, radius = ?, description = ? WHERE id = ?"
        );
        assert_eq!(
            update.values,
            vec![
                SqlValue::String("Annex".into()),
                SqlValue::F64(250.0),
                SqlValue::Null,
                SqlValue::U64(9),
            ]
        );
    }

    #[test]
    fn empty_update_is_a_validation_error() {
        let err = UpdateBuilder::new("locations").build("id", 1).unwrap_err();
        assert!(matches!(err, AttendanceError::Validation(_)));
    }
}
