//! Extraction engine: channel feed paging plus the heuristics that turn one
//! free-form message into a [`jobfeed_core::Posting`].

pub mod assemble;
pub mod feed;
pub mod identity;
pub mod keywords;
pub mod normalize;
pub mod salary;
pub mod tags;

pub use assemble::{parse_published_date, Assembly, PostingAssembler, SkipReason};
pub use feed::{channel_url, parse_feed_page, FeedError, FeedPage, FeedSource, TelegramChannelFeed};
pub use identity::{extract_identity, Identity};
pub use keywords::{KeywordError, KeywordTables, Keywords};
pub use normalize::clean;
pub use salary::extract_max_salary;
pub use tags::{classify, Classification};

pub const CRATE_NAME: &str = "jobfeed-extract";
