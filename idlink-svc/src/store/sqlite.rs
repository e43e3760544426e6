//! SQLite-backed contact store

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use idlink_common::{Contact, Error, LinkPrecedence, NewContact, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::ContactStore;

const SELECT_COLUMNS: &str = "SELECT id, phone_number, email, linked_id, link_precedence, \
                              created_at, updated_at, deleted_at FROM contacts";

/// Contact store over a sqlx SQLite pool
#[derive(Clone)]
pub struct SqliteContactStore {
    pool: SqlitePool,
}

impl SqliteContactStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_by_id(&self, id: i64) -> Result<Contact> {
        let sql = format!("{} WHERE id = ? AND deleted_at IS NULL", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("contact {}", id)))?;
        contact_from_row(&row)
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Store(format!("Invalid timestamp '{}': {}", raw, e)))
}

fn contact_from_row(row: &SqliteRow) -> Result<Contact> {
    let precedence: String = row.try_get("link_precedence")?;
    let link_precedence = LinkPrecedence::from_str(&precedence)
        .ok_or_else(|| Error::Store(format!("Unknown link_precedence '{}'", precedence)))?;

    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let deleted_at = row
        .try_get::<Option<String>, _>("deleted_at")?
        .map(|s| decode_timestamp(&s))
        .transpose()?;

    Ok(Contact {
        id: row.try_get("id")?,
        phone_number: row.try_get("phone_number")?,
        email: row.try_get("email")?,
        linked_id: row.try_get("linked_id")?,
        link_precedence,
        created_at: decode_timestamp(&created_at)?,
        updated_at: decode_timestamp(&updated_at)?,
        deleted_at,
    })
}

#[async_trait]
impl ContactStore for SqliteContactStore {
    async fn find_by_value(&self, email: Option<&str>, phone: Option<&str>) -> Result<Vec<Contact>> {
        let rows = match (email, phone) {
            (None, None) => return Ok(Vec::new()),
            (Some(email), Some(phone)) => {
                let sql = format!(
                    "{} WHERE deleted_at IS NULL AND (email = ? OR phone_number = ?) \
                     ORDER BY created_at ASC, id ASC",
                    SELECT_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(email)
                    .bind(phone)
                    .fetch_all(&self.pool)
                    .await?
            }
            (Some(email), None) => {
                let sql = format!(
                    "{} WHERE deleted_at IS NULL AND email = ? ORDER BY created_at ASC, id ASC",
                    SELECT_COLUMNS
                );
                sqlx::query(&sql).bind(email).fetch_all(&self.pool).await?
            }
            (None, Some(phone)) => {
                let sql = format!(
                    "{} WHERE deleted_at IS NULL AND phone_number = ? ORDER BY created_at ASC, id ASC",
                    SELECT_COLUMNS
                );
                sqlx::query(&sql).bind(phone).fetch_all(&self.pool).await?
            }
        };

        rows.iter().map(contact_from_row).collect()
    }

    async fn find_cluster(&self, anchor_id: i64) -> Result<Vec<Contact>> {
        let sql = format!(
            "{} WHERE deleted_at IS NULL AND (id = ? OR linked_id = ?) ORDER BY created_at ASC, id ASC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(anchor_id)
            .bind(anchor_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(contact_from_row).collect()
    }

    async fn create(&self, contact: NewContact) -> Result<Contact> {
        let now = encode_timestamp(Utc::now());

        let result = sqlx::query(
            r#"
            INSERT INTO contacts (phone_number, email, linked_id, link_precedence, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&contact.phone_number)
        .bind(&contact.email)
        .bind(contact.linked_id)
        .bind(contact.link_precedence.to_db_string())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!("Inserted contact {} ({})", id, contact.link_precedence);
        self.fetch_by_id(id).await
    }

    async fn demote(&self, contact_id: i64, new_primary_id: i64) -> Result<Contact> {
        let now = encode_timestamp(Utc::now());

        let result = sqlx::query(
            r#"
            UPDATE contacts
            SET link_precedence = 'secondary', linked_id = ?, updated_at = ?
            WHERE id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(new_primary_id)
        .bind(&now)
        .bind(contact_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("contact {}", contact_id)));
        }

        self.fetch_by_id(contact_id).await
    }

    async fn relink_children(&self, old_primary_id: i64, new_primary_id: i64) -> Result<u64> {
        let now = encode_timestamp(Utc::now());

        let result = sqlx::query(
            r#"
            UPDATE contacts
            SET linked_id = ?, updated_at = ?
            WHERE linked_id = ? AND link_precedence = 'secondary' AND deleted_at IS NULL
            "#,
        )
        .bind(new_primary_id)
        .bind(&now)
        .bind(old_primary_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_encoding_sorts_lexicographically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let late = early + chrono::Duration::microseconds(1);

        let a = encode_timestamp(early);
        let b = encode_timestamp(late);
        assert!(a < b);
        assert_eq!(a.len(), b.len());
        assert_eq!(decode_timestamp(&a).unwrap(), early);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_timestamp("yesterday"), Err(Error::Store(_))));
    }
}
