//! Company and title heuristics.
//!
//! The company comes from body lines: an explicit "公司：…" style label if there
//! is one, otherwise the first short line that reads like a name. The title comes
//! only from hashtags, which are far more regular than the free-form body.

use jobfeed_core::{UNCATEGORIZED_TITLE, UNSPECIFIED_COMPANY};

use crate::keywords::{Keywords, TAG_MARKERS};
use crate::normalize::clean;

const COMPANY_LINE_MAX_CHARS: usize = 40;
const COMPANY_MIN_CHARS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub company: String,
    pub title: String,
}

pub fn extract_identity(lines: &[&str], hashtags: &[String], keywords: &Keywords) -> Identity {
    Identity {
        company: labelled_company(lines, keywords)
            .or_else(|| first_name_like_line(lines, keywords))
            .unwrap_or_else(|| UNSPECIFIED_COMPANY.to_string()),
        title: title_from_hashtags(hashtags, keywords)
            .unwrap_or_else(|| UNCATEGORIZED_TITLE.to_string()),
    }
}

fn labelled_company(lines: &[&str], keywords: &Keywords) -> Option<String> {
    lines.iter().find_map(|line| {
        let content = keywords.company_label_content(line)?;
        let cleaned = clean(content, keywords);
        (!cleaned.is_empty()).then_some(cleaned)
    })
}

fn first_name_like_line(lines: &[&str], keywords: &Keywords) -> Option<String> {
    lines.iter().find_map(|line| {
        if line.starts_with(&TAG_MARKERS[..])
            || line.chars().count() >= COMPANY_LINE_MAX_CHARS
            || line.contains(keywords.recruitment_word())
        {
            return None;
        }
        let cleaned = clean(line, keywords);
        let key = cleaned.trim_end_matches(&[':', '：'][..]).trim().to_lowercase();
        if key.chars().count() < COMPANY_MIN_CHARS || keywords.is_section_header(&key) {
            return None;
        }
        Some(cleaned)
    })
}

fn title_from_hashtags(hashtags: &[String], keywords: &Keywords) -> Option<String> {
    hashtags
        .iter()
        .filter(|tag| !keywords.is_blacklisted_tag(&tag.to_lowercase()))
        .find(|tag| keywords.is_job_function_tag(&tag.to_lowercase()))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    fn identity(lines: &[&str], hashtags: &[&str]) -> Identity {
        extract_identity(lines, &tags(hashtags), &Keywords::default())
    }

    #[test]
    fn title_skips_blacklisted_tags_and_takes_first_job_function() {
        let id = identity(&[], &["Web3", "后端工程师", "Hiring"]);
        assert_eq!(id.title, "后端工程师");
    }

    #[test]
    fn blacklisted_tag_is_skipped_even_when_it_names_a_function() {
        let id = identity(&[], &["DeFi运营", "Marketing_Lead"]);
        assert_eq!(id.title, "Marketing_Lead");
    }

    #[test]
    fn title_falls_back_to_sentinel() {
        let id = identity(&["Marisa"], &["招聘", "远程", "Solana"]);
        assert_eq!(id.title, UNCATEGORIZED_TITLE);
    }

    #[test]
    fn labelled_company_wins_over_earlier_lines() {
        let id = identity(
            &["🔥 急招！", "项目：Marisa #DeFi", "公司：Other"],
            &["招聘"],
        );
        assert_eq!(id.company, "Marisa");
    }

    #[test]
    fn empty_label_content_moves_on_to_the_next_label() {
        let id = identity(&["公司：🚀", "Project: Orbit Labs"], &[]);
        assert_eq!(id.company, "Orbit Labs");
    }

    #[test]
    fn fallback_skips_tags_headers_recruitment_and_long_lines() {
        let long = "很长的团队描述".repeat(6);
        let id = identity(
            &[
                "#招聘 #运营",
                "招聘运营一名",
                "岗位职责：",
                "Requirements",
                "🚀",
                long.as_str(),
                "Orbit Labs 🚀",
            ],
            &[],
        );
        assert_eq!(id.company, "Orbit Labs");
    }

    #[test]
    fn company_falls_back_to_sentinel() {
        let id = identity(&["#招聘", "About us", "X"], &[]);
        assert_eq!(id.company, UNSPECIFIED_COMPANY);
    }
}
