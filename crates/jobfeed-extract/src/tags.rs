//! Hashtag extraction and employment-type classification.

use jobfeed_core::EmploymentType;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::keywords::Keywords;

// `\w` is Unicode-aware, so CJK ideographs are covered.
static HASHTAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[#＃]([\w\-.+]+)").expect("hashtag pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub tags: Vec<String>,
    pub employment_type: EmploymentType,
}

/// Every hashtag token left to right, duplicates kept.
pub fn hashtags(raw_text: &str) -> Vec<String> {
    HASHTAG
        .captures_iter(raw_text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Each matching tag overwrites the type in turn, so the last match wins.
pub fn employment_type(tags: &[String], keywords: &Keywords) -> EmploymentType {
    let mut ty = EmploymentType::FullTime;
    for tag in tags {
        let lower = tag.to_lowercase();
        if keywords.is_part_time(&lower) {
            ty = EmploymentType::PartTime;
        }
        if keywords.is_internship(&lower) {
            ty = EmploymentType::Internship;
        }
        if keywords.is_project_based(&lower) {
            ty = EmploymentType::ProjectBased;
        }
    }
    ty
}

pub fn classify(raw_text: &str, keywords: &Keywords) -> Classification {
    let tags = hashtags(raw_text);
    let employment_type = employment_type(&tags, keywords);
    Classification {
        tags,
        employment_type,
    }
}
