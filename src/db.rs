use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};

/// One cell of a query result. The table renderer only ever sees its `Display` form.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Display for SqlValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Blob(bytes) => write!(f, "<blob {} bytes>", bytes.len()),
        }
    }
}

/// Column names and rows, each row holding one value per column in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// Runs operator-supplied SQL against the host database.
pub trait QueryRunner: Send + Sync {
    /// # Errors
    ///
    /// Returns the driver error when the statement is rejected.
    fn fetch_all(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<QueryResult, sqlx::Error>> + Send;
}

#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Open (or create) the database behind `url`.
    ///
    /// A single connection is kept so `sqlite::memory:` behaves as one database.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed or the database cannot be opened.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        tracing::debug!(url, "database connected");
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl QueryRunner for SqliteDatabase {
    async fn fetch_all(&self, query: &str) -> Result<QueryResult, sqlx::Error> {
        let rows = sqlx::query(query).fetch_all(&self.pool).await?;
        let Some(first) = rows.first() else {
            return Ok(QueryResult::default());
        };

        let columns = first
            .columns()
            .iter()
            .map(|column| column.name().to_owned())
            .collect();
        let rows = rows
            .iter()
            .map(row_values)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(QueryResult { columns, rows })
    }
}

fn row_values(row: &SqliteRow) -> Result<Vec<SqlValue>, sqlx::Error> {
    (0..row.len()).map(|idx| decode_value(row, idx)).collect()
}

// SQLite is dynamically typed, so decode by the storage class of each value
// rather than the declared column type.
fn decode_value(row: &SqliteRow, idx: usize) -> Result<SqlValue, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let storage = raw.type_info().name().to_ascii_uppercase();

    let value = match storage.as_str() {
        "INTEGER" | "BOOLEAN" => SqlValue::Integer(row.try_get_unchecked(idx)?),
        "REAL" => SqlValue::Real(row.try_get_unchecked(idx)?),
        "BLOB" => SqlValue::Blob(row.try_get_unchecked(idx)?),
        _ => SqlValue::Text(row.try_get_unchecked(idx)?),
    };
    Ok(value)
}
