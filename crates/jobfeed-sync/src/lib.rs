//! Crawl orchestration: configuration, the shared posting cache, persistence
//! hand-off and the background refresh schedule.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime, Utc};
use jobfeed_core::Posting;
use jobfeed_extract::{channel_url, KeywordTables, Keywords, PostingAssembler, TelegramChannelFeed};
use jobfeed_storage::{HttpClientConfig, HttpFetcher, JsonFilePostingStore, PgPostingStore, PostingStore};
use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

pub mod crawl;

pub use crawl::{CrawlController, CrawlOutcome, CrawlReport, SkipCounts};

pub const CRATE_NAME: &str = "jobfeed-sync";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub channel: String,
    pub feed_url: String,
    pub lookback_days: i64,
    pub max_pages: usize,
    pub page_delay: Duration,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub proxy: Option<String>,
    pub scheduler_enabled: bool,
    pub refresh_interval: Duration,
    pub keywords_path: Option<PathBuf>,
    pub postings_path: PathBuf,
    pub database_url: Option<String>,
}

fn parse_flag(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "True")
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| get(key).and_then(|v| v.trim().parse::<u64>().ok());
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let channel = non_empty("JOBFEED_CHANNEL").unwrap_or_else(|| "DeJob_official".to_string());
        Self {
            feed_url: non_empty("JOBFEED_FEED_URL").unwrap_or_else(|| channel_url(&channel)),
            channel,
            lookback_days: get("JOBFEED_LOOKBACK_DAYS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(60),
            max_pages: parsed("JOBFEED_MAX_PAGES")
                .map(|v| v as usize)
                .unwrap_or(crawl::DEFAULT_MAX_PAGES),
            page_delay: parsed("JOBFEED_PAGE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(crawl::DEFAULT_PAGE_DELAY),
            http_timeout_secs: parsed("JOBFEED_HTTP_TIMEOUT_SECS").unwrap_or(10),
            user_agent: non_empty("JOBFEED_USER_AGENT").unwrap_or_else(|| "Mozilla/5.0".to_string()),
            proxy: non_empty("JOBFEED_PROXY"),
            scheduler_enabled: get("JOBFEED_SCHEDULER_ENABLED")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
            refresh_interval: Duration::from_secs(
                parsed("JOBFEED_REFRESH_INTERVAL_SECS").unwrap_or(2 * 60 * 60),
            ),
            keywords_path: non_empty("JOBFEED_KEYWORDS_PATH").map(PathBuf::from),
            postings_path: non_empty("JOBFEED_POSTINGS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/postings.json")),
            database_url: non_empty("DATABASE_URL"),
        }
    }

    pub fn keywords(&self) -> Result<Keywords> {
        match &self.keywords_path {
            Some(path) => Ok(KeywordTables::from_yaml_file(path)?.compile()?),
            None => Ok(Keywords::default()),
        }
    }

    pub fn crawl_controller(&self) -> Result<CrawlController> {
        let fetcher = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            proxy: self.proxy.clone(),
        })
        .context("building feed http client")?;
        let feed = TelegramChannelFeed::new(fetcher, self.feed_url.clone());
        let assembler = PostingAssembler::new(self.keywords().context("loading keyword tables")?);
        Ok(CrawlController::new(Arc::new(feed), assembler)
            .with_max_pages(self.max_pages)
            .with_page_delay(self.page_delay))
    }

    /// Postgres when `DATABASE_URL` is set, the JSON file otherwise.
    pub async fn open_store(&self) -> Result<Arc<dyn PostingStore>> {
        match &self.database_url {
            Some(url) => {
                let store = PgPostingStore::connect(url)
                    .await
                    .context("connecting to postings database")?;
                Ok(Arc::new(store))
            }
            None => {
                let store = JsonFilePostingStore::open(&self.postings_path)
                    .await
                    .with_context(|| format!("opening {}", self.postings_path.display()))?;
                Ok(Arc::new(store))
            }
        }
    }
}

/// Last completed crawl result, shared by readers and the refresher.
#[derive(Debug, Default)]
pub struct PostingCache {
    postings: RwLock<Vec<Posting>>,
}

impl PostingCache {
    pub async fn get(&self) -> Vec<Posting> {
        self.postings.read().await.clone()
    }

    pub async fn replace(&self, postings: Vec<Posting>) {
        *self.postings.write().await = postings;
    }

    pub async fn is_empty(&self) -> bool {
        self.postings.read().await.is_empty()
    }
}

pub struct SyncService {
    controller: CrawlController,
    store: Option<Arc<dyn PostingStore>>,
    cache: PostingCache,
    refresh_lock: Mutex<()>,
    lookback_days: i64,
}

impl SyncService {
    pub fn new(controller: CrawlController, lookback_days: i64) -> Self {
        Self {
            controller,
            store: None,
            cache: PostingCache::default(),
            refresh_lock: Mutex::new(()),
            lookback_days,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn PostingStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache(&self) -> &PostingCache {
        &self.cache
    }

    pub fn lookback_days(&self) -> i64 {
        self.lookback_days
    }

    /// Crawl now and replace the cache. Concurrent callers queue behind one another.
    pub async fn refresh(&self) -> CrawlReport {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Cached postings, crawling first when nothing has been cached yet.
    pub async fn postings(&self) -> Vec<Posting> {
        let cached = self.cache.get().await;
        if !cached.is_empty() {
            return cached;
        }
        let _guard = self.refresh_lock.lock().await;
        // A refresh may have finished while we waited for the lock.
        let cached = self.cache.get().await;
        if !cached.is_empty() {
            return cached;
        }
        self.refresh_locked().await.postings
    }

    async fn refresh_locked(&self) -> CrawlReport {
        let report = self.controller.crawl(self.lookback_days).await;
        info!(
            postings = report.postings.len(),
            pages = report.pages,
            outcome = ?report.outcome,
            "crawl finished"
        );
        if let Some(store) = &self.store {
            if let Err(err) = store.upsert(&report.postings).await {
                warn!(error = %err, "persisting crawled postings failed");
            }
        }
        self.cache.replace(report.postings.clone()).await;
        report
    }

    /// Load postings inside the lookback window from the store into the cache.
    pub async fn warm_from_store(&self, today: NaiveDate) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let cutoff =
            crawl::lookback_cutoff(today.and_time(NaiveTime::MIN), self.lookback_days).date();
        let postings = store
            .recent(cutoff)
            .await
            .context("loading recent postings")?;
        let count = postings.len();
        if count > 0 {
            self.cache.replace(postings).await;
        }
        info!(count, %cutoff, "cache warmed from store");
        Ok(count)
    }
}

pub async fn build_service(config: &SyncConfig) -> Result<SyncService> {
    let controller = config.crawl_controller()?;
    let store = config.open_store().await?;
    Ok(SyncService::new(controller, config.lookback_days).with_store(store))
}

/// Periodic refresh job; `None` when the scheduler is disabled.
pub async fn maybe_build_scheduler(
    config: &SyncConfig,
    service: Arc<SyncService>,
) -> Result<Option<JobScheduler>> {
    if !config.scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job = Job::new_repeated_async(config.refresh_interval, move |_uuid, _l| {
        let service = service.clone();
        Box::pin(async move {
            let report = service.refresh().await;
            info!(postings = report.postings.len(), "scheduled refresh done");
        })
    })
    .with_context(|| {
        format!(
            "creating refresh job every {}s",
            config.refresh_interval.as_secs()
        )
    })?;
    sched.add(job).await.context("adding refresh job")?;
    Ok(Some(sched))
}

/// One crawl persisted to the configured store.
pub async fn run_sync_once(config: &SyncConfig) -> Result<CrawlReport> {
    let service = build_service(config).await?;
    let report = service.refresh().await;
    info!(today = %Utc::now().date_naive(), postings = report.postings.len(), "sync run complete");
    Ok(report)
}
