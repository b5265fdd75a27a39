//! Paginated channel feed: the `FeedSource` contract and the public Telegram
//! web-preview implementation (`https://t.me/s/<channel>`).

use async_trait::async_trait;
use jobfeed_core::RawMessage;
use jobfeed_storage::{FetchError, HttpFetcher};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};
use thiserror::Error;
use tracing::debug;
use url::Url;

static MESSAGE_WRAP: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.tgme_widget_message_wrap").expect("message wrap selector"));
static MESSAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.tgme_widget_message").expect("message selector"));
static MESSAGE_TEXT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.tgme_widget_message_text").expect("message text selector"));
static MESSAGE_TIME: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a.tgme_widget_message_date time[datetime]").expect("message time selector")
});
static MORE_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.tme_messages_more[href]").expect("more link selector"));

#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid feed url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// One page of the feed in document order (oldest message first).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedPage {
    pub messages: Vec<RawMessage>,
    /// Absolute URL of the next (older) page, if the page links one.
    pub next_url: Option<String>,
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    /// URL of the newest page.
    fn start_url(&self) -> &str;

    async fn fetch_page(&self, url: &str) -> Result<FeedPage, FeedError>;
}

pub struct TelegramChannelFeed {
    fetcher: HttpFetcher,
    base_url: String,
}

impl TelegramChannelFeed {
    pub fn new(fetcher: HttpFetcher, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
        }
    }

    pub fn for_channel(fetcher: HttpFetcher, channel: &str) -> Self {
        Self::new(fetcher, channel_url(channel))
    }
}

pub fn channel_url(channel: &str) -> String {
    format!("https://t.me/s/{}", channel.trim_start_matches('@'))
}

#[async_trait]
impl FeedSource for TelegramChannelFeed {
    fn start_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch_page(&self, url: &str) -> Result<FeedPage, FeedError> {
        let response = self.fetcher.fetch_text(url).await?;
        parse_feed_page(&response.body, &self.base_url)
    }
}

/// Text of an element with `<br>` turned into line breaks.
fn text_with_breaks(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if el.name() == "br" => out.push('\n'),
            _ => {}
        }
    }
    out
}

fn post_id(wrap: ElementRef<'_>) -> Option<String> {
    wrap.select(&MESSAGE)
        .find_map(|m| m.value().attr("data-post"))
        .or_else(|| wrap.value().attr("data-post"))
        .or_else(|| wrap.value().attr("data-post-id"))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ToString::to_string)
}

fn parse_message(wrap: ElementRef<'_>) -> RawMessage {
    RawMessage {
        id: post_id(wrap),
        text: wrap.select(&MESSAGE_TEXT).next().map(text_with_breaks),
        published: wrap
            .select(&MESSAGE_TIME)
            .next()
            .and_then(|t| t.value().attr("datetime"))
            .map(ToString::to_string),
    }
}

/// Parse one feed page; relative "more messages" links resolve against `base_url`.
pub fn parse_feed_page(html: &str, base_url: &str) -> Result<FeedPage, FeedError> {
    let document = Html::parse_document(html);
    let messages = document
        .select(&MESSAGE_WRAP)
        .map(parse_message)
        .collect::<Vec<_>>();

    let next_url = match document
        .select(&MORE_LINK)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
    {
        Some(href) => Some(resolve_link(base_url, href)?),
        None => None,
    };

    debug!(messages = messages.len(), has_next = next_url.is_some(), "parsed feed page");
    Ok(FeedPage { messages, next_url })
}

fn resolve_link(base_url: &str, href: &str) -> Result<String, FeedError> {
    let base = Url::parse(base_url).map_err(|source| FeedError::InvalidUrl {
        url: base_url.to_string(),
        source,
    })?;
    base.join(href)
        .map(String::from)
        .map_err(|source| FeedError::InvalidUrl {
            url: href.to_string(),
            source,
        })
}
