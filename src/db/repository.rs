//! Generic single-table data access.
//!
//! A [`Repository`] performs create/read/update/delete for any type that
//! implements [`Entity`]. Payloads are serialized with serde and filtered
//! through the entity's column list, so only known columns ever reach SQL.

use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite};
use std::marker::PhantomData;

use super::DbPool;

/// A row type stored in a single table with an integer `id` primary key.
pub trait Entity: for<'r> FromRow<'r, SqliteRow> + Send + Sync + Unpin + 'static {
    const TABLE: &'static str;
    /// Writable columns, excluding `id`
    const COLUMNS: &'static [&'static str];
}

pub struct Repository<E> {
    pool: DbPool,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Insert a new row built from the payload's writable fields
    pub async fn create<N: Serialize>(&self, new: &N) -> Result<E, sqlx::Error> {
        let fields = writable_fields::<E>(new)?;
        if fields.is_empty() {
            return Err(sqlx::Error::Protocol(format!(
                "no writable fields supplied for {}",
                E::TABLE
            )));
        }

        let columns: Vec<&str> = fields.iter().map(|(column, _)| *column).collect();
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "INSERT INTO {} ({}) VALUES (",
            E::TABLE,
            columns.join(", ")
        ));
        for (i, (_, value)) in fields.into_iter().enumerate() {
            if i > 0 {
                query.push(", ");
            }
            push_value(&mut query, value);
        }
        query.push(") RETURNING *");

        query.build_query_as::<E>().fetch_one(&self.pool).await
    }

    pub async fn read(&self, id: i64) -> Result<Option<E>, sqlx::Error> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", E::TABLE);
        sqlx::query_as::<_, E>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn read_all(&self, skip: i64, limit: i64) -> Result<Vec<E>, sqlx::Error> {
        let sql = format!("SELECT * FROM {} ORDER BY id LIMIT ? OFFSET ?", E::TABLE);
        sqlx::query_as::<_, E>(&sql)
            .bind(limit)
            .bind(skip)
            .fetch_all(&self.pool)
            .await
    }

    /// Merge the fields present in `patch` onto the stored row.
    ///
    /// Returns `None` when no row has the given id. An empty patch leaves
    /// the row untouched.
    pub async fn update<P: Serialize>(&self, id: i64, patch: &P) -> Result<Option<E>, sqlx::Error> {
        let fields = writable_fields::<E>(patch)?;
        if fields.is_empty() {
            return self.read(id).await;
        }

        let mut query = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET ", E::TABLE));
        for (i, (column, value)) in fields.into_iter().enumerate() {
            if i > 0 {
                query.push(", ");
            }
            query.push(column);
            query.push(" = ");
            push_value(&mut query, value);
        }
        query.push(" WHERE id = ");
        query.push_bind(id);
        query.push(" RETURNING *");

        query.build_query_as::<E>().fetch_optional(&self.pool).await
    }

    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let sql = format!("DELETE FROM {} WHERE id = ?", E::TABLE);
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Serialize a payload and keep only the entity's writable columns, in column order.
fn writable_fields<E: Entity>(payload: &impl Serialize) -> Result<Vec<(&'static str, Value)>, sqlx::Error> {
    let mut map = match serde_json::to_value(payload) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            return Err(sqlx::Error::Protocol(format!(
                "{} payload must serialize to an object",
                E::TABLE
            )))
        }
        Err(e) => return Err(sqlx::Error::Encode(Box::new(e))),
    };

    Ok(E::COLUMNS
        .iter()
        .filter_map(|column| map.remove(*column).map(|value| (*column, value)))
        .collect())
}

fn push_value(query: &mut QueryBuilder<'_, Sqlite>, value: Value) {
    match value {
        Value::Null => {
            query.push_bind(None::<String>);
        }
        Value::Bool(b) => {
            query.push_bind(b);
        }
        Value::Number(n) => match n.as_i64() {
            Some(i) => {
                query.push_bind(i);
            }
            None => {
                query.push_bind(n.as_f64());
            }
        },
        Value::String(s) => {
            query.push_bind(s);
        }
        nested => {
            query.push_bind(nested.to_string());
        }
    }
}
