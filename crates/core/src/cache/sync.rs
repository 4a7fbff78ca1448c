//! Background-sync tag registrations.
//!
//! Tags are only recorded. Nothing is queued for replay.

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::params;

impl CacheDb {
    /// Record a sync tag. Returns false if it was already registered.
    pub async fn register_sync_tag(&self, tag: &str) -> Result<bool, Error> {
        let tag = tag.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count =
                    conn.execute("INSERT OR IGNORE INTO sync_tags (tag, registered_at) VALUES (?1, ?2)", params![tag, now])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn sync_tags(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT tag FROM sync_tags ORDER BY tag")?;
                let tags = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(tags)
            })
            .await
            .map_err(Error::from)
    }
}
