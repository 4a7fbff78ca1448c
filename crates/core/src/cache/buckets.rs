//! Bucket operations: open-on-write, match, put, delete and expiration.
//!
//! A bucket row is created by the first write into it. Deleting a bucket
//! cascades to its entries.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio_rusqlite::{params, rusqlite};

use super::connection::CacheDb;
use super::hash::request_key;
use crate::request::{Request, Response};
use crate::Error;

/// A response read back from a bucket, with its storage metadata.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub method: String,
    pub url: String,
    pub response: Response,
    pub stored_at: DateTime<Utc>,
}

impl CachedEntry {
    /// Whether the entry was stored more than `max_age` ago.
    pub fn is_older_than(&self, max_age: Duration) -> bool {
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => Utc::now() - self.stored_at > max_age,
            Err(_) => false,
        }
    }
}

/// Entry ready for insertion; serialization happens before touching the connection.
struct EntryRow {
    key_hash: String,
    method: String,
    url: String,
    status: i64,
    headers_json: String,
    body: Vec<u8>,
}

impl EntryRow {
    fn new(request: &Request, response: &Response) -> Result<Self, Error> {
        let method = request.method.as_str().to_string();
        let url = request.cache_url();
        Ok(Self {
            key_hash: request_key(&method, &url),
            method,
            url: url.to_string(),
            status: i64::from(response.status),
            headers_json: serde_json::to_string(&response.headers)?,
            body: response.body.to_vec(),
        })
    }
}

/// Raw columns as stored; converted into a [`CachedEntry`] off the connection thread.
struct StoredRow {
    method: String,
    url: String,
    status: i64,
    headers_json: String,
    body: Vec<u8>,
    stored_at: String,
}

impl StoredRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            method: row.get(0)?,
            url: row.get(1)?,
            status: row.get(2)?,
            headers_json: row.get(3)?,
            body: row.get(4)?,
            stored_at: row.get(5)?,
        })
    }

    fn into_entry(self) -> Result<CachedEntry, Error> {
        let headers: Vec<(String, String)> = serde_json::from_str(&self.headers_json)?;
        let stored_at = DateTime::parse_from_rfc3339(&self.stored_at)
            .map_err(|e| Error::Serialization(format!("stored_at: {e}")))?
            .with_timezone(&Utc);
        let status = u16::try_from(self.status).map_err(|_| Error::Serialization(format!("status {}", self.status)))?;

        Ok(CachedEntry {
            method: self.method,
            url: self.url,
            response: Response { status, headers, body: self.body.into() },
            stored_at,
        })
    }
}

/// Timestamps are fixed-width so that lexical order in SQL equals time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

const UPSERT_ENTRY: &str = "INSERT INTO entries (bucket, key_hash, method, url, status, headers_json, body, stored_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
    ON CONFLICT(bucket, key_hash) DO UPDATE SET
        method = excluded.method,
        url = excluded.url,
        status = excluded.status,
        headers_json = excluded.headers_json,
        body = excluded.body,
        stored_at = excluded.stored_at";

const ENSURE_BUCKET: &str = "INSERT OR IGNORE INTO buckets (name, created_at) VALUES (?1, ?2)";

impl CacheDb {
    /// Names of every existing bucket, sorted.
    pub async fn bucket_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM buckets ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn has_bucket(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists =
                    conn.query_row("SELECT EXISTS(SELECT 1 FROM buckets WHERE name = ?1)", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a bucket and all of its entries.
    ///
    /// Returns false if the bucket did not exist.
    pub async fn delete_bucket(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM buckets WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Look up the stored response for a request in one bucket.
    pub async fn match_request(&self, bucket: &str, request: &Request) -> Result<Option<CachedEntry>, Error> {
        let bucket = bucket.to_string();
        let key_hash = request_key(request.method.as_str(), &request.url);
        let row = self
            .conn
            .call(move |conn| -> Result<Option<StoredRow>, Error> {
                let result = conn.query_row(
                    "SELECT method, url, status, headers_json, body, stored_at
                     FROM entries WHERE bucket = ?1 AND key_hash = ?2",
                    params![bucket, key_hash],
                    StoredRow::from_row,
                );

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        row.map(StoredRow::into_entry).transpose()
    }

    /// Look up a request across every bucket, preferring the most recently stored copy.
    pub async fn match_any(&self, request: &Request) -> Result<Option<CachedEntry>, Error> {
        let key_hash = request_key(request.method.as_str(), &request.url);
        let row = self
            .conn
            .call(move |conn| -> Result<Option<StoredRow>, Error> {
                let result = conn.query_row(
                    "SELECT method, url, status, headers_json, body, stored_at
                     FROM entries WHERE key_hash = ?1 ORDER BY stored_at DESC LIMIT 1",
                    params![key_hash],
                    StoredRow::from_row,
                );

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        row.map(StoredRow::into_entry).transpose()
    }

    /// Store a response for a request, creating the bucket on first write.
    pub async fn put(&self, bucket: &str, request: &Request, response: &Response) -> Result<(), Error> {
        self.put_all(bucket, std::slice::from_ref(&(request.clone(), response.clone())))
            .await
    }

    /// Store several responses in one transaction: either all land or none do.
    pub async fn put_all(&self, bucket: &str, entries: &[(Request, Response)]) -> Result<(), Error> {
        let bucket = bucket.to_string();
        let rows = entries
            .iter()
            .map(|(request, response)| EntryRow::new(request, response))
            .collect::<Result<Vec<_>, _>>()?;
        let now = timestamp(Utc::now());

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(ENSURE_BUCKET, params![bucket, now])?;
                {
                    let mut stmt = tx.prepare(UPSERT_ENTRY)?;
                    for row in &rows {
                        stmt.execute(params![
                            bucket,
                            row.key_hash,
                            row.method,
                            row.url,
                            row.status,
                            row.headers_json,
                            row.body,
                            now,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Remove one request's entry, but only if it is still the copy stored at `stored_at`.
    ///
    /// A newer write for the same request (a background refresh, say) is left in
    /// place. Returns false if nothing was deleted.
    pub async fn delete_stale_entry(
        &self, bucket: &str, request: &Request, stored_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let bucket = bucket.to_string();
        let key_hash = request_key(request.method.as_str(), &request.url);
        let stored_at = timestamp(stored_at);
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM entries WHERE bucket = ?1 AND key_hash = ?2 AND stored_at = ?3",
                    params![bucket, key_hash, stored_at],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn entry_count(&self, bucket: &str) -> Result<u64, Error> {
        let bucket = bucket.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE bucket = ?1", params![bucket], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete the oldest entries until the bucket holds at most `max_entries`.
    ///
    /// Returns the number of deleted entries.
    pub async fn trim_bucket(&self, bucket: &str, max_entries: usize) -> Result<u64, Error> {
        let bucket = bucket.to_string();
        let max = i64::try_from(max_entries).unwrap_or(i64::MAX);
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE bucket = ?1", params![bucket], |row| row.get(0))?;
                if count <= max {
                    return Ok(0);
                }

                let deleted = conn.execute(
                    "DELETE FROM entries WHERE bucket = ?1 AND key_hash IN (
                        SELECT key_hash FROM entries WHERE bucket = ?1
                        ORDER BY stored_at ASC, rowid ASC LIMIT ?2
                    )",
                    params![bucket, count - max],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries stored more than `max_age` ago.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_older_than(&self, bucket: &str, max_age: Duration) -> Result<u64, Error> {
        let bucket = bucket.to_string();
        let max_age = chrono::Duration::from_std(max_age).map_err(|e| Error::InvalidInput(e.to_string()))?;
        let cutoff = Utc::now()
            .checked_sub_signed(max_age)
            .map(timestamp)
            .ok_or_else(|| {
                Error::InvalidInput(format!("max age of {}s reaches past the earliest time", max_age.num_seconds()))
            })?;
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count =
                    conn.execute("DELETE FROM entries WHERE bucket = ?1 AND stored_at < ?2", params![bucket, cutoff])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use url::Url;

    fn get(path: &str) -> Request {
        Request::get(Url::parse("https://shop.test").unwrap().join(path).unwrap())
    }

    #[tokio::test]
    async fn test_put_creates_bucket_and_matches() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(!db.has_bucket("images-v1").await.unwrap());

        let response = Response::ok("png-bytes").with_header("content-type", "image/png");
        db.put("images-v1", &get("/logo.png"), &response).await.unwrap();

        assert!(db.has_bucket("images-v1").await.unwrap());
        let entry = db.match_request("images-v1", &get("/logo.png")).await.unwrap().unwrap();
        assert_eq!(entry.response, response);
        assert_eq!(entry.url, "https://shop.test/logo.png");
        assert_eq!(entry.method, "GET");
    }

    #[tokio::test]
    async fn test_match_is_scoped_to_bucket_and_method() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("images-v1", &get("/logo.png"), &Response::ok("a")).await.unwrap();

        assert!(db.match_request("assets-v1", &get("/logo.png")).await.unwrap().is_none());
        let head = Request::new(Method::HEAD, get("/logo.png").url);
        assert!(db.match_request("images-v1", &head).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("api-v1", &get("/api/cart"), &Response::ok("old")).await.unwrap();
        db.put("api-v1", &get("/api/cart"), &Response::ok("new")).await.unwrap();

        let entry = db.match_request("api-v1", &get("/api/cart")).await.unwrap().unwrap();
        assert_eq!(entry.response.text(), "new");
        assert_eq!(db.entry_count("api-v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_bucket_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("assets-v1", &get("/app.js"), &Response::ok("js")).await.unwrap();

        assert!(db.delete_bucket("assets-v1").await.unwrap());
        assert!(!db.delete_bucket("assets-v1").await.unwrap());
        assert!(db.match_any(&get("/app.js")).await.unwrap().is_none());
        assert!(db.bucket_names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_match_any_prefers_latest() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("app-shell-v1", &get("/offline.html"), &Response::ok("v1")).await.unwrap();
        db.put("app-shell-v2", &get("/offline.html"), &Response::ok("v2")).await.unwrap();

        let entry = db.match_any(&get("/offline.html")).await.unwrap().unwrap();
        assert_eq!(entry.response.text(), "v2");
    }

    #[tokio::test]
    async fn test_put_all_is_all_or_nothing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entries = vec![(get("/"), Response::ok("shell")), (get("/app.js"), Response::ok("js"))];
        db.put_all("app-shell-v1", &entries).await.unwrap();

        assert_eq!(db.entry_count("app-shell-v1").await.unwrap(), 2);
        assert!(db.match_request("app-shell-v1", &get("/app.js")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_stale_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("api-v1", &get("/api/cart"), &Response::ok("{}")).await.unwrap();
        let entry = db.match_request("api-v1", &get("/api/cart")).await.unwrap().unwrap();

        assert!(db.delete_stale_entry("api-v1", &get("/api/cart"), entry.stored_at).await.unwrap());
        assert!(!db.delete_stale_entry("api-v1", &get("/api/cart"), entry.stored_at).await.unwrap());
        assert!(db.has_bucket("api-v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_stale_entry_keeps_newer_write() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("images-v1", &get("/logo.png"), &Response::ok("old")).await.unwrap();
        let stale = db.match_request("images-v1", &get("/logo.png")).await.unwrap().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        db.put("images-v1", &get("/logo.png"), &Response::ok("new")).await.unwrap();

        assert!(!db.delete_stale_entry("images-v1", &get("/logo.png"), stale.stored_at).await.unwrap());
        let entry = db.match_request("images-v1", &get("/logo.png")).await.unwrap().unwrap();
        assert_eq!(entry.response.text(), "new");
    }

    #[tokio::test]
    async fn test_trim_bucket_keeps_newest() {
        let db = CacheDb::open_in_memory().await.unwrap();
        for path in ["/a.png", "/b.png", "/c.png"] {
            db.put("images-v1", &get(path), &Response::ok(path)).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let deleted = db.trim_bucket("images-v1", 2).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(db.match_request("images-v1", &get("/a.png")).await.unwrap().is_none());
        assert!(db.match_request("images-v1", &get("/c.png")).await.unwrap().is_some());
        assert_eq!(db.trim_bucket("images-v1", 2).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_trim_bucket_huge_limit_keeps_everything() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("images-v1", &get("/a.png"), &Response::ok("a")).await.unwrap();
        db.put("images-v1", &get("/b.png"), &Response::ok("b")).await.unwrap();

        assert_eq!(db.trim_bucket("images-v1", usize::MAX).await.unwrap(), 0);
        assert_eq!(db.entry_count("images-v1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_purge_older_than() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("api-v1", &get("/api/stale"), &Response::ok("{}")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        db.put("api-v1", &get("/api/fresh"), &Response::ok("{}")).await.unwrap();

        let deleted = db.purge_older_than("api-v1", std::time::Duration::from_millis(25)).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(db.match_request("api-v1", &get("/api/fresh")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_older_than_out_of_range_age() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("api-v1", &get("/api/cart"), &Response::ok("{}")).await.unwrap();

        let result = db.purge_older_than("api-v1", std::time::Duration::from_secs(1_000_000_000_000_000)).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(db.entry_count("api-v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_entry_age() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put("api-v1", &get("/api/cart"), &Response::ok("{}")).await.unwrap();
        let entry = db.match_request("api-v1", &get("/api/cart")).await.unwrap().unwrap();

        assert!(!entry.is_older_than(std::time::Duration::from_secs(60)));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(entry.is_older_than(std::time::Duration::from_millis(5)));
    }
}
