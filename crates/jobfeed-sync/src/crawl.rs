//! Paginated, time-bounded crawl over a [`FeedSource`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime, TimeDelta, Utc};
use jobfeed_core::Posting;
use jobfeed_extract::{Assembly, FeedSource, PostingAssembler, SkipReason};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

pub const DEFAULT_MAX_PAGES: usize = 5;
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(1);
/// Bodies longer than this are kept even without an email address.
const MIN_BODY_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlOutcome {
    /// No further page link, or a page without messages.
    Exhausted,
    /// A posting older than the lookback window was reached.
    Cutoff,
    PageLimit,
    /// A page fetch failed; earlier pages are still in the report.
    FetchFailed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    pub missing_body: usize,
    pub not_recruitment: usize,
    pub low_quality: usize,
    /// Ids already collected earlier in the same crawl.
    pub duplicate: usize,
}

impl SkipCounts {
    fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::MissingBody => self.missing_body += 1,
            SkipReason::NotRecruitment => self.not_recruitment += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub postings: Vec<Posting>,
    pub pages: usize,
    pub skipped: SkipCounts,
    pub outcome: CrawlOutcome,
}

pub struct CrawlController {
    source: Arc<dyn FeedSource>,
    assembler: PostingAssembler,
    max_pages: usize,
    page_delay: Duration,
}

impl CrawlController {
    pub fn new(source: Arc<dyn FeedSource>, assembler: PostingAssembler) -> Self {
        Self {
            source,
            assembler,
            max_pages: DEFAULT_MAX_PAGES,
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }

    /// At least one page is always fetched.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    pub async fn crawl(&self, lookback_days: i64) -> CrawlReport {
        self.crawl_at(lookback_days, Utc::now().naive_utc()).await
    }

    /// Crawl newest-first until the page limit, the end of the feed, a fetch
    /// failure, or the first posting dated before `now - lookback_days`.
    ///
    /// Reaching the cutoff ends the whole crawl at once; postings already
    /// collected from the same page are kept.
    pub async fn crawl_at(&self, lookback_days: i64, now: NaiveDateTime) -> CrawlReport {
        let cutoff = lookback_cutoff(now, lookback_days);
        let today = now.date();
        let mut postings = Vec::new();
        let mut seen = HashSet::new();
        let mut skipped = SkipCounts::default();
        let mut pages = 0usize;
        let mut url = self.source.start_url().to_string();

        let outcome = loop {
            let page_no = pages + 1;
            let span = info_span!("crawl_page", page = page_no, url = %url);
            let page = match self.source.fetch_page(&url).instrument(span).await {
                Ok(page) => page,
                Err(err) => {
                    warn!(page = page_no, url = %url, error = %err, "page fetch failed; ending crawl");
                    break CrawlOutcome::FetchFailed;
                }
            };
            pages = page_no;
            if page.messages.is_empty() {
                break CrawlOutcome::Exhausted;
            }

            let mut page_postings = Vec::new();
            for message in page.messages.iter().rev() {
                let posting = match self.assembler.assemble(message, today) {
                    Assembly::Posting(posting) => posting,
                    Assembly::Skipped(reason) => {
                        debug!(id = ?message.id, ?reason, "message skipped");
                        skipped.record(reason);
                        continue;
                    }
                };
                if posting.date.and_time(NaiveTime::MIN) < cutoff {
                    info!(page = page_no, id = %posting.id, date = %posting.date, "lookback cutoff reached");
                    postings.extend(page_postings);
                    return CrawlReport {
                        postings,
                        pages,
                        skipped,
                        outcome: CrawlOutcome::Cutoff,
                    };
                }
                if seen.contains(&posting.id) {
                    debug!(id = %posting.id, "duplicate posting id");
                    skipped.duplicate += 1;
                } else if is_substantive(&posting) {
                    seen.insert(posting.id.clone());
                    page_postings.push(posting);
                } else {
                    debug!(id = %posting.id, "posting too sparse");
                    skipped.low_quality += 1;
                }
            }
            info!(page = page_no, found = page_postings.len(), "page crawled");
            postings.extend(page_postings);

            let Some(next_url) = page.next_url else {
                break CrawlOutcome::Exhausted;
            };
            if pages >= self.max_pages {
                break CrawlOutcome::PageLimit;
            }
            tokio::time::sleep(self.page_delay).await;
            url = next_url;
        };

        CrawlReport {
            postings,
            pages,
            skipped,
            outcome,
        }
    }
}

/// `now - lookback_days`, or no cutoff at all when the window does not fit
/// the calendar.
pub(crate) fn lookback_cutoff(now: NaiveDateTime, lookback_days: i64) -> NaiveDateTime {
    TimeDelta::try_days(lookback_days)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(if lookback_days < 0 {
            NaiveDateTime::MAX
        } else {
            NaiveDateTime::MIN
        })
}

fn is_substantive(posting: &Posting) -> bool {
    posting.has_email() || posting.raw_content.chars().count() > MIN_BODY_CHARS
}
