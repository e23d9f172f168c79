//! SQLite backend with native transactions.

use crate::backend::{BackendKind, DbBackend};
use crate::changes::{ChangeSet, RowChange};
use crate::error::{MetadataError, MetadataResult};
use crate::row::{DbValue, Row};
use crate::schema::{ALL_TABLES, Column, ColumnType, Table};
use async_trait::async_trait;
use sqlx::Row as _;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Relational backend. Every [`apply`](DbBackend::apply) runs in one SQL transaction.
pub struct SqlBackend {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqlBackend {
    /// Open (or create) the database at `path` and create missing tables.
    pub async fn new(path: impl AsRef<Path>, query_timeout_secs: Option<u64>) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout_secs = query_timeout_secs.unwrap_or(60);

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| MetadataError::Config(format!("cannot create {parent:?}: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // One connection: SQLite serializes writers anyway, and a single
            // connection avoids "database is locked" under concurrent commits.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let backend = Self {
            pool,
            query_timeout: Duration::from_secs(query_timeout_secs),
        };
        backend.migrate().await?;
        Ok(backend)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    fn create_table_sql(table: &Table) -> String {
        let mut columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| {
                let null = if c.nullable { "" } else { " NOT NULL" };
                format!("{} {}{null}", c.name, c.ty.sql_type())
            })
            .collect();
        let keys: Vec<&str> = table.primary_key().map(|c| c.name).collect();
        columns.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            table.name,
            columns.join(", ")
        )
    }

    fn key_predicate(table: &Table) -> String {
        table
            .primary_key()
            .map(|c| format!("{} = ?", c.name))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn decode(table: &Table, sql_row: &SqliteRow) -> MetadataResult<Row> {
        let mut row = Row::new();
        for column in table.columns {
            let value = match column.ty {
                ColumnType::Bool => sql_row
                    .try_get::<Option<bool>, _>(column.name)?
                    .map(DbValue::Bool),
                ColumnType::Int => sql_row
                    .try_get::<Option<i64>, _>(column.name)?
                    .map(DbValue::Int),
                ColumnType::Text => sql_row
                    .try_get::<Option<String>, _>(column.name)?
                    .map(DbValue::Text),
            };
            row.set(column.name, value.unwrap_or(DbValue::Null));
        }
        Ok(row)
    }

    async fn apply_change(
        conn: &mut sqlx::SqliteConnection,
        table: &Table,
        key: &str,
        change: &RowChange,
    ) -> MetadataResult<()> {
        let row = change.row();
        let (sql, values): (String, Vec<&Column>) = match change {
            RowChange::Create(_) => {
                let names: Vec<&str> = table.columns.iter().map(|c| c.name).collect();
                let placeholders = vec!["?"; names.len()].join(", ");
                (
                    format!(
                        "INSERT INTO {} ({}) VALUES ({placeholders})",
                        table.name,
                        names.join(", ")
                    ),
                    table.columns.iter().collect(),
                )
            }
            RowChange::Update(_) => {
                let assignments: Vec<String> = table
                    .columns
                    .iter()
                    .map(|c| format!("{} = ?", c.name))
                    .collect();
                (
                    format!(
                        "UPDATE {} SET {} WHERE {}",
                        table.name,
                        assignments.join(", "),
                        Self::key_predicate(table)
                    ),
                    table.columns.iter().chain(table.primary_key()).collect(),
                )
            }
            RowChange::Delete(_) => (
                format!(
                    "DELETE FROM {} WHERE {}",
                    table.name,
                    Self::key_predicate(table)
                ),
                table.primary_key().collect(),
            ),
        };

        let mut query = sqlx::query(&sql);
        for column in values {
            query = bind_value(query, row.get(column.name).unwrap_or(&DbValue::Null));
        }

        let result = query.execute(&mut *conn).await.map_err(|e| {
            let unique = e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation());
            if unique {
                MetadataError::AlreadyExists(format!("{}:{key}", table.name))
            } else {
                MetadataError::Database(e)
            }
        })?;

        if !matches!(change, RowChange::Create(_)) && result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("{}:{key}", table.name)));
        }
        Ok(())
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &DbValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        DbValue::Null => query.bind(Option::<String>::None),
        DbValue::Bool(b) => query.bind(*b),
        DbValue::Int(i) => query.bind(*i),
        DbValue::Text(s) => query.bind(s.clone()),
    }
}

#[async_trait]
impl DbBackend for SqlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sql
    }

    async fn migrate(&self) -> MetadataResult<()> {
        for table in ALL_TABLES {
            sqlx::query(&Self::create_table_sql(table))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(backend = "sql", table = table.name))]
    async fn load_table(&self, table: &'static Table) -> MetadataResult<Vec<Row>> {
        let names: Vec<&str> = table.columns.iter().map(|c| c.name).collect();
        let sql = format!("SELECT {} FROM {}", names.join(", "), table.name);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(|r| Self::decode(table, r)).collect()
    }

    #[tracing::instrument(skip(self, changes), fields(backend = "sql", rows = changes.len()))]
    async fn apply(&self, changes: &ChangeSet) -> MetadataResult<()> {
        let started = Instant::now();
        let mut tx = self.pool.begin().await?;
        for table_changes in changes.tables() {
            for (key, change) in &table_changes.rows {
                // Dropping `tx` on error rolls the whole transaction back.
                Self::apply_change(&mut tx, table_changes.table, key, change).await?;
            }
        }
        tx.commit().await?;

        let elapsed = started.elapsed();
        if elapsed > self.query_timeout {
            tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_secs = self.query_timeout.as_secs(),
                "SQL transaction exceeded the advisory query timeout"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{NODES, REMOTES};

    #[test]
    fn test_generated_ddl() {
        assert_eq!(
            SqlBackend::create_table_sql(&NODES),
            "CREATE TABLE IF NOT EXISTS nodes (node_name TEXT NOT NULL, node_type TEXT NOT NULL, \
             flags INTEGER NOT NULL, PRIMARY KEY (node_name))"
        );
        assert!(SqlBackend::create_table_sql(&REMOTES).contains("port INTEGER,"));
    }
}
