//! One channel message in, one posting (or a typed skip) out.

use chrono::{NaiveDate, Utc};
use jobfeed_core::{Posting, RawMessage, DEFAULT_LOCATION};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use crate::identity::extract_identity;
use crate::keywords::Keywords;
use crate::salary::extract_max_salary;
use crate::tags::classify;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\w.\-]+@[\w.\-]+\.[a-zA-Z]+").expect("email pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The container had no message text region.
    MissingBody,
    /// The body lacks the recruitment hashtag; not a job posting.
    NotRecruitment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembly {
    Posting(Posting),
    Skipped(SkipReason),
}

impl Assembly {
    pub fn posting(self) -> Option<Posting> {
        match self {
            Assembly::Posting(p) => Some(p),
            Assembly::Skipped(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostingAssembler {
    keywords: Keywords,
}

impl PostingAssembler {
    pub fn new(keywords: Keywords) -> Self {
        Self { keywords }
    }

    /// `today` stands in for a missing or unparseable publication date.
    pub fn assemble(&self, message: &RawMessage, today: NaiveDate) -> Assembly {
        let Some(body) = message.text.as_deref() else {
            return Assembly::Skipped(SkipReason::MissingBody);
        };
        if !self.keywords.has_recruitment_tag(body) {
            return Assembly::Skipped(SkipReason::NotRecruitment);
        }

        let date = message
            .published
            .as_deref()
            .and_then(parse_published_date)
            .unwrap_or(today);
        let id = message
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ToString::to_string)
            .unwrap_or_else(synthesize_id);

        let lines = body
            .split('\n')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>();
        let classification = classify(body, &self.keywords);
        let identity = extract_identity(&lines, &classification.tags, &self.keywords);
        let salary = extract_max_salary(body, &self.keywords);
        let email = EMAIL
            .find(body)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        Assembly::Posting(Posting {
            id,
            date,
            company: identity.company,
            title: identity.title,
            salary,
            email,
            tags: classification.tags,
            employment_type: classification.employment_type,
            location: DEFAULT_LOCATION.to_string(),
            raw_content: body.to_string(),
        })
    }
}

/// Date part of `2026-10-01T08:15:00+00:00` (or a bare `2026-10-01`).
pub fn parse_published_date(value: &str) -> Option<NaiveDate> {
    let date_part = value.trim().split('T').next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Millisecond timestamp plus a random suffix, so two ids minted in the
/// same millisecond still differ.
fn synthesize_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..6])
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobfeed_core::{EmploymentType, NEGOTIABLE_SALARY, UNCATEGORIZED_TITLE, UNSPECIFIED_COMPANY};

    const POSTING_BODY: &str = "#招聘 #后端工程师 #Web3 #实习\n\
        🏢 项目：Marisa\n\
        💰 薪资：1400-1800U\n\
        📮 简历投递：hr@marisa.io\n\
        岗位职责：\n\
        1. 维护撮合引擎";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    fn message(id: Option<&str>, text: Option<&str>, published: Option<&str>) -> RawMessage {
        RawMessage::new(
            id.map(String::from),
            text.map(String::from),
            published.map(String::from),
        )
    }

    #[test]
    fn assembles_every_field_from_a_typical_post() {
        let assembler = PostingAssembler::default();
        let msg = message(
            Some("DeJob_official/4512"),
            Some(POSTING_BODY),
            Some("2026-10-01T08:15:00+00:00"),
        );
        let posting = assembler.assemble(&msg, today()).posting().expect("posting");
        assert_eq!(posting.id, "DeJob_official/4512");
        assert_eq!(posting.date, NaiveDate::from_ymd_opt(2026, 10, 1).unwrap());
        assert_eq!(posting.company, "Marisa");
        assert_eq!(posting.title, "后端工程师");
        assert_eq!(posting.salary, "1800U");
        assert_eq!(posting.email, "hr@marisa.io");
        assert_eq!(posting.tags, vec!["招聘", "后端工程师", "Web3", "实习"]);
        assert_eq!(posting.employment_type, EmploymentType::Internship);
        assert_eq!(posting.location, DEFAULT_LOCATION);
        assert_eq!(posting.raw_content, POSTING_BODY);
    }

    #[test]
    fn message_without_recruitment_tag_is_skipped() {
        let assembler = PostingAssembler::default();
        for body in ["Weekly digest #news", "招聘运营，欢迎投递", "#招 聘"] {
            let msg = message(Some("x/1"), Some(body), None);
            assert_eq!(
                assembler.assemble(&msg, today()),
                Assembly::Skipped(SkipReason::NotRecruitment)
            );
        }
    }

    #[test]
    fn message_without_body_is_skipped() {
        let msg = message(Some("x/1"), None, Some("2026-10-01"));
        assert_eq!(
            PostingAssembler::default().assemble(&msg, today()),
            Assembly::Skipped(SkipReason::MissingBody)
        );
    }

    #[test]
    fn sparse_post_gets_sentinels() {
        let msg = message(Some("x/2"), Some("＃招聘"), None);
        let posting = PostingAssembler::default()
            .assemble(&msg, today())
            .posting()
            .unwrap();
        assert_eq!(posting.company, UNSPECIFIED_COMPANY);
        assert_eq!(posting.title, UNCATEGORIZED_TITLE);
        assert_eq!(posting.salary, NEGOTIABLE_SALARY);
        assert_eq!(posting.email, "");
        assert_eq!(posting.employment_type, EmploymentType::FullTime);
    }

    #[test]
    fn missing_or_malformed_date_falls_back_to_today() {
        let assembler = PostingAssembler::default();
        for published in [None, Some("yesterday"), Some("2026-13-45T00:00:00")] {
            let msg = message(Some("x/3"), Some("#招聘"), published);
            let posting = assembler.assemble(&msg, today()).posting().unwrap();
            assert_eq!(posting.date, today());
        }
    }

    #[test]
    fn missing_id_is_synthesized_uniquely() {
        let assembler = PostingAssembler::default();
        let msg = message(None, Some("#招聘"), None);
        let a = assembler.assemble(&msg, today()).posting().unwrap();
        let b = assembler.assemble(&msg, today()).posting().unwrap();
        assert_ne!(a.id, b.id);
        let (millis, suffix) = a.id.split_once('-').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), 6);
    }

    #[test]
    fn assembly_is_deterministic_given_a_feed_id() {
        let assembler = PostingAssembler::default();
        let msg = message(Some("DeJob_official/9"), Some(POSTING_BODY), None);
        let first = assembler.assemble(&msg, today());
        let second = assembler.assemble(&msg, today());
        assert_eq!(first, second);
    }
}
