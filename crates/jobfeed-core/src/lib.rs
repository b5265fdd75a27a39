//! Core domain model for jobfeed: raw feed messages and extracted postings.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "jobfeed-core";

/// Company fallback when no line yields an organization name ("unspecified project").
pub const UNSPECIFIED_COMPANY: &str = "未知项目";
/// Title fallback when no hashtag names a job function ("uncategorized").
pub const UNCATEGORIZED_TITLE: &str = "未分类";
/// Salary fallback when no salary line is found ("negotiable").
pub const NEGOTIABLE_SALARY: &str = "面议";
/// Every posting is remote; nothing in the feed assigns another value.
pub const DEFAULT_LOCATION: &str = "远程";

/// One scraped feed entry, before any extraction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawMessage {
    /// Feed-provided post identifier, e.g. `DeJob_official/4512`.
    pub id: Option<String>,
    /// Body text with line breaks restored; `None` when the container has no body region.
    pub text: Option<String>,
    /// Publication timestamp as found in the markup (`2026-10-01T08:15:00+00:00`).
    pub published: Option<String>,
}

impl RawMessage {
    pub fn new(id: Option<String>, text: Option<String>, published: Option<String>) -> Self {
        Self {
            id,
            text,
            published,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EmploymentType {
    #[default]
    #[serde(rename = "全职")]
    FullTime,
    #[serde(rename = "兼职")]
    PartTime,
    #[serde(rename = "实习")]
    Internship,
    #[serde(rename = "项目制")]
    ProjectBased,
}

impl EmploymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentType::FullTime => "全职",
            EmploymentType::PartTime => "兼职",
            EmploymentType::Internship => "实习",
            EmploymentType::ProjectBased => "项目制",
        }
    }
}

impl fmt::Display for EmploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEmploymentType(pub String);

impl fmt::Display for UnknownEmploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown employment type: {}", self.0)
    }
}

impl std::error::Error for UnknownEmploymentType {}

impl FromStr for EmploymentType {
    type Err = UnknownEmploymentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "全职" => Ok(EmploymentType::FullTime),
            "兼职" => Ok(EmploymentType::PartTime),
            "实习" => Ok(EmploymentType::Internship),
            "项目制" => Ok(EmploymentType::ProjectBased),
            other => Err(UnknownEmploymentType(other.to_string())),
        }
    }
}

/// Structured job posting extracted from one channel message.
///
/// Created once by the assembler and never mutated afterwards; `company`, `title`
/// and `salary` always hold a value (possibly one of the sentinels above).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub id: String,
    pub date: NaiveDate,
    pub company: String,
    pub title: String,
    pub salary: String,
    pub email: String,
    pub tags: Vec<String>,
    #[serde(rename = "type")]
    pub employment_type: EmploymentType,
    pub location: String,
    pub raw_content: String,
}

impl Posting {
    pub fn has_email(&self) -> bool {
        !self.email.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Posting {
        Posting {
            id: "DeJob_official/1".into(),
            date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            company: "Marisa".into(),
            title: "后端工程师".into(),
            salary: "1800U".into(),
            email: "hr@marisa.io".into(),
            tags: vec!["招聘".into(), "后端工程师".into()],
            employment_type: EmploymentType::Internship,
            location: DEFAULT_LOCATION.into(),
            raw_content: "#招聘 #后端工程师".into(),
        }
    }

    #[test]
    fn posting_serializes_with_api_field_names() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["date"], "2026-10-01");
        assert_eq!(value["type"], "实习");
        assert_eq!(value["location"], "远程");
        assert!(value.get("employment_type").is_none());
    }

    #[test]
    fn employment_type_round_trips_through_its_label() {
        for ty in [
            EmploymentType::FullTime,
            EmploymentType::PartTime,
            EmploymentType::Internship,
            EmploymentType::ProjectBased,
        ] {
            assert_eq!(ty.as_str().parse::<EmploymentType>().unwrap(), ty);
        }
        assert!("contract".parse::<EmploymentType>().is_err());
    }
}
