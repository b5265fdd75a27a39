//! Feed fetching and posting persistence for jobfeed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use jobfeed_core::{EmploymentType, Posting};
use reqwest::StatusCode;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Row;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobfeed-storage";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: Some("Mozilla/5.0".to_string()),
            proxy: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("building http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Single-attempt page fetcher. A failed request is reported, never retried.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: String,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy).map_err(FetchError::Client)?);
        }

        let client = builder.build().map_err(FetchError::Client)?;
        Ok(Self { client })
    }

    pub async fn fetch_text(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", url);
        async {
            let resp = self.client.get(url).send().await?;
            let status = resp.status();
            let final_url = resp.url().to_string();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                });
            }
            let body = resp.text().await?;
            debug!(bytes = body.len(), "fetched page");
            Ok(FetchedResponse {
                status,
                final_url,
                body,
            })
        }
        .instrument(span)
        .await
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("posting file is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("stored posting {id} is malformed: {reason}")]
    Decode { id: String, reason: String },
}

impl StoreError {
    fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Upsert-by-id posting persistence.
#[async_trait]
pub trait PostingStore: Send + Sync {
    /// Insert or replace each posting by its `id`. Returns the number written.
    async fn upsert(&self, postings: &[Posting]) -> Result<usize, StoreError>;

    /// All postings dated on or after `cutoff`, newest first.
    async fn recent(&self, cutoff: NaiveDate) -> Result<Vec<Posting>, StoreError>;
}

fn newest_first(postings: &mut [Posting]) {
    postings.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
}

/// JSON file keyed by posting id, rewritten atomically on every upsert.
#[derive(Debug)]
pub struct JsonFilePostingStore {
    path: PathBuf,
    postings: Mutex<BTreeMap<String, Posting>>,
}

impl JsonFilePostingStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let exists = fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io("checking", &path, e))?;
        let postings = if exists {
            let text = fs::read_to_string(&path)
                .await
                .map_err(|e| StoreError::io("reading", &path, e))?;
            let list: Vec<Posting> = serde_json::from_str(&text)?;
            list.into_iter().map(|p| (p.id.clone(), p)).collect()
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), count = postings.len(), "opened posting file");
        Ok(Self {
            path,
            postings: Mutex::new(postings),
        })
    }

    async fn write_atomically(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io("creating directory", parent, e))?;

        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .map_err(|e| StoreError::io("opening temp file", &temp_path, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| StoreError::io("writing temp file", &temp_path, e))?;
        file.flush()
            .await
            .map_err(|e| StoreError::io("flushing temp file", &temp_path, e))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StoreError::io("renaming temp file onto", &self.path, err));
        }
        Ok(())
    }
}

#[async_trait]
impl PostingStore for JsonFilePostingStore {
    async fn upsert(&self, postings: &[Posting]) -> Result<usize, StoreError> {
        let mut map = self.postings.lock().await;
        for posting in postings {
            map.insert(posting.id.clone(), posting.clone());
        }
        let all = map.values().collect::<Vec<_>>();
        let bytes = serde_json::to_vec_pretty(&all)?;
        self.write_atomically(&bytes).await?;
        info!(written = postings.len(), total = map.len(), "upserted postings to file");
        Ok(postings.len())
    }

    async fn recent(&self, cutoff: NaiveDate) -> Result<Vec<Posting>, StoreError> {
        let map = self.postings.lock().await;
        let mut out = map
            .values()
            .filter(|p| p.date >= cutoff)
            .cloned()
            .collect::<Vec<_>>();
        newest_first(&mut out);
        Ok(out)
    }
}

/// Postgres-backed store; schema lives in the workspace `migrations/` directory.
#[derive(Debug, Clone)]
pub struct PgPostingStore {
    pool: PgPool,
}

impl PgPostingStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl PostingStore for PgPostingStore {
    async fn upsert(&self, postings: &[Posting]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        for posting in postings {
            sqlx::query(
                r#"
                INSERT INTO postings
                    (id, date, company, title, salary, email, tags, type, location, raw_content, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
                ON CONFLICT (id) DO UPDATE
                   SET date = EXCLUDED.date,
                       company = EXCLUDED.company,
                       title = EXCLUDED.title,
                       salary = EXCLUDED.salary,
                       email = EXCLUDED.email,
                       tags = EXCLUDED.tags,
                       type = EXCLUDED.type,
                       location = EXCLUDED.location,
                       raw_content = EXCLUDED.raw_content,
                       updated_at = NOW()
                "#,
            )
            .bind(&posting.id)
            .bind(posting.date)
            .bind(&posting.company)
            .bind(&posting.title)
            .bind(&posting.salary)
            .bind(&posting.email)
            .bind(Json(&posting.tags))
            .bind(posting.employment_type.as_str())
            .bind(&posting.location)
            .bind(&posting.raw_content)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        info!(written = postings.len(), "upserted postings to postgres");
        Ok(postings.len())
    }

    async fn recent(&self, cutoff: NaiveDate) -> Result<Vec<Posting>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, date, company, title, salary, email, tags, type, location, raw_content
              FROM postings
             WHERE date >= $1
             ORDER BY date DESC, id DESC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let type_label: String = row.try_get("type")?;
            let employment_type = type_label
                .parse::<EmploymentType>()
                .map_err(|e| StoreError::Decode {
                    id: id.clone(),
                    reason: e.to_string(),
                })?;
            let tags: Json<Vec<String>> = row.try_get("tags")?;
            out.push(Posting {
                date: row.try_get("date")?,
                company: row.try_get("company")?,
                title: row.try_get("title")?,
                salary: row.try_get("salary")?,
                email: row.try_get("email")?,
                tags: tags.0,
                employment_type,
                location: row.try_get("location")?,
                raw_content: row.try_get("raw_content")?,
                id,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobfeed_core::DEFAULT_LOCATION;
    use tempfile::tempdir;

    fn posting(id: &str, date: (i32, u32, u32), title: &str) -> Posting {
        Posting {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            company: "Marisa".to_string(),
            title: title.to_string(),
            salary: "1800U".to_string(),
            email: String::new(),
            tags: vec!["招聘".to_string()],
            employment_type: EmploymentType::FullTime,
            location: DEFAULT_LOCATION.to_string(),
            raw_content: "#招聘".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_by_id_and_survives_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("data").join("postings.json");

        let store = JsonFilePostingStore::open(&path).await.expect("open");
        store
            .upsert(&[posting("a", (2026, 10, 1), "运营"), posting("b", (2026, 10, 3), "设计师")])
            .await
            .expect("first upsert");
        store
            .upsert(&[posting("a", (2026, 10, 1), "运营经理")])
            .await
            .expect("second upsert");

        let reopened = JsonFilePostingStore::open(&path).await.expect("reopen");
        let all = reopened
            .recent(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap())
            .await
            .expect("recent");
        assert_eq!(all.len(), 2);
        let a = all.iter().find(|p| p.id == "a").unwrap();
        assert_eq!(a.title, "运营经理");
    }

    #[tokio::test]
    async fn recent_filters_by_cutoff_and_sorts_newest_first() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFilePostingStore::open(dir.path().join("postings.json"))
            .await
            .expect("open");
        store
            .upsert(&[
                posting("old", (2026, 8, 1), "运营"),
                posting("mid", (2026, 9, 15), "运营"),
                posting("new", (2026, 10, 10), "运营"),
            ])
            .await
            .expect("upsert");

        let recent = store
            .recent(NaiveDate::from_ymd_opt(2026, 9, 15).unwrap())
            .await
            .expect("recent");
        let ids = recent.iter().map(|p| p.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    #[tokio::test]
    async fn atomic_write_leaves_no_temp_files() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFilePostingStore::open(dir.path().join("postings.json"))
            .await
            .expect("open");
        store
            .upsert(&[posting("a", (2026, 10, 1), "运营")])
            .await
            .expect("upsert");
        let names = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["postings.json".to_string()]);
    }
}
