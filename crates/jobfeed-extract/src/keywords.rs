//! Keyword tables driving the extraction heuristics.
//!
//! The tables are plain ordered lists. [`KeywordTables::default`] carries the
//! built-in Chinese/English set; a YAML file with the same field names can
//! replace any subset of them for another channel or locale.

use std::cmp::Reverse;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// ASCII and full-width hashtag markers.
pub const TAG_MARKERS: [char; 2] = ['#', '＃'];

#[derive(Debug, Error)]
pub enum KeywordError {
    #[error("reading keyword file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing keyword file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("building keyword pattern: {0}")]
    Pattern(#[from] regex::Error),
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordTables {
    /// Hashtag body that admits a message as a job posting.
    pub recruitment_tag: String,
    /// Labels stripped from the front of a normalized value ("岗位：", "Role:").
    pub label_prefixes: Vec<String>,
    /// A line must contain one of these to be considered the salary line.
    pub salary_keywords: Vec<String>,
    /// Labels introducing the organization name ("公司：", "Project:").
    pub company_labels: Vec<String>,
    /// Section headings that are never a company name.
    pub section_headers: Vec<String>,
    /// Hashtags containing any of these are never a title.
    pub title_blacklist: Vec<String>,
    /// Hashtags containing any of these name a job function.
    pub title_whitelist: Vec<String>,
    pub part_time: Vec<String>,
    pub internship: Vec<String>,
    pub project_based: Vec<String>,
}

impl Default for KeywordTables {
    fn default() -> Self {
        Self {
            recruitment_tag: "招聘".to_string(),
            label_prefixes: words(&[
                "招聘岗位", "岗位名称", "职位名称", "岗位", "职位", "职务", "job title", "job",
                "role", "position", "posting", "title",
            ]),
            salary_keywords: words(&["薪资", "待遇", "薪酬", "Salary", "Pay", "U", "$"]),
            company_labels: words(&[
                "项目名称", "项目方", "项目", "公司名称", "公司", "团队名称", "团队",
                "project name", "project", "company name", "company", "team",
            ]),
            section_headers: words(&[
                "简介", "项目简介", "公司简介", "团队简介", "介绍", "岗位职责", "工作职责", "职责",
                "工作内容", "任职要求", "岗位要求", "要求", "福利", "福利待遇", "关于我们",
                "introduction", "about", "about us", "responsibilities", "requirements",
                "qualifications", "benefits",
            ]),
            title_blacklist: words(&[
                "defi", "web3", "remote", "hiring", "exchange", "crypto", "blockchain", "nft",
                "dao", "gamefi", "招聘", "远程", "全职", "兼职", "区块链", "交易所", "加密",
            ]),
            title_whitelist: words(&[
                "工程师", "engineer", "运营", "operation", "市场", "marketing", "实习", "intern",
                "bd", "商务", "专员", "specialist", "经理", "manager", "设计", "designer",
                "交易员", "trader", "负责人", "lead",
            ]),
            part_time: words(&["兼职", "part-time"]),
            internship: words(&["实习", "internship"]),
            project_based: words(&["外包", "项目", "project", "outsourcing"]),
        }
    }
}

impl KeywordTables {
    pub fn from_yaml_str(text: &str, origin: &str) -> Result<Self, KeywordError> {
        serde_yaml::from_str(text).map_err(|source| KeywordError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, KeywordError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| KeywordError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text, &path.display().to_string())
    }

    pub fn compile(self) -> Result<Keywords, KeywordError> {
        let label_prefix = match alternation(&self.label_prefixes) {
            Some(alt) => Some(Regex::new(&format!(
                r"(?i)^\(?\s*(?:{alt})\s*\)?\s*[:：]?\s*"
            ))?),
            None => None,
        };
        let company_label = match alternation(&self.company_labels) {
            Some(alt) => Some(Regex::new(&format!(
                r"(?i)^[^\p{{L}}\p{{N}}]*(?:{alt})\s*[:：]\s*(\S.*)$"
            ))?),
            None => None,
        };
        let lower = |list: &[String]| list.iter().map(|w| w.to_lowercase()).collect::<Vec<_>>();
        Ok(Keywords {
            recruitment_gate: TAG_MARKERS
                .iter()
                .map(|m| format!("{m}{}", self.recruitment_tag))
                .collect(),
            section_headers: lower(&self.section_headers),
            title_blacklist: lower(&self.title_blacklist),
            title_whitelist: lower(&self.title_whitelist),
            part_time: lower(&self.part_time),
            internship: lower(&self.internship),
            project_based: lower(&self.project_based),
            label_prefix,
            company_label,
            tables: self,
        })
    }
}

/// Longest-first alternation; ASCII words must end on a word boundary so
/// "role" does not eat the front of "roleplay".
fn alternation(list: &[String]) -> Option<String> {
    let mut sorted = list
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by_key(|w| Reverse(w.chars().count()));
    Some(
        sorted
            .iter()
            .map(|w| {
                let escaped = regex::escape(w);
                if w.is_ascii() {
                    format!(r"{escaped}\b")
                } else {
                    escaped
                }
            })
            .collect::<Vec<_>>()
            .join("|"),
    )
}

/// Compiled, lookup-ready form of [`KeywordTables`].
#[derive(Debug, Clone)]
pub struct Keywords {
    tables: KeywordTables,
    recruitment_gate: Vec<String>,
    section_headers: Vec<String>,
    title_blacklist: Vec<String>,
    title_whitelist: Vec<String>,
    part_time: Vec<String>,
    internship: Vec<String>,
    project_based: Vec<String>,
    label_prefix: Option<Regex>,
    company_label: Option<Regex>,
}

impl Default for Keywords {
    fn default() -> Self {
        KeywordTables::default()
            .compile()
            .expect("built-in keyword tables compile")
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| haystack.contains(n.as_str()))
}

impl Keywords {
    pub fn recruitment_word(&self) -> &str {
        &self.tables.recruitment_tag
    }

    /// True when the body carries the recruitment hashtag with either marker.
    pub fn has_recruitment_tag(&self, body: &str) -> bool {
        contains_any(body, &self.recruitment_gate)
    }

    pub fn is_salary_line(&self, line: &str) -> bool {
        contains_any(line, &self.tables.salary_keywords)
    }

    pub fn strip_label<'a>(&self, text: &'a str) -> std::borrow::Cow<'a, str> {
        match &self.label_prefix {
            Some(re) => re.replace(text, ""),
            None => std::borrow::Cow::Borrowed(text),
        }
    }

    /// Content after a "公司：" style label, if the line starts with one.
    pub fn company_label_content<'a>(&self, line: &'a str) -> Option<&'a str> {
        let re = self.company_label.as_ref()?;
        re.captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    pub fn is_section_header(&self, lowercase: &str) -> bool {
        self.section_headers.iter().any(|h| h == lowercase)
    }

    pub fn is_blacklisted_tag(&self, lowercase: &str) -> bool {
        contains_any(lowercase, &self.title_blacklist)
    }

    pub fn is_job_function_tag(&self, lowercase: &str) -> bool {
        contains_any(lowercase, &self.title_whitelist)
    }

    pub fn is_part_time(&self, lowercase: &str) -> bool {
        contains_any(lowercase, &self.part_time)
    }

    pub fn is_internship(&self, lowercase: &str) -> bool {
        contains_any(lowercase, &self.internship)
    }

    pub fn is_project_based(&self, lowercase: &str) -> bool {
        contains_any(lowercase, &self.project_based)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults_for_missing_tables() {
        let tables = KeywordTables::from_yaml_str(
            "title_whitelist: [\"developer\", \"开发\"]\n",
            "inline",
        )
        .unwrap();
        assert_eq!(tables.title_whitelist, vec!["developer", "开发"]);
        assert_eq!(tables.recruitment_tag, "招聘");
        assert_eq!(tables.salary_keywords, KeywordTables::default().salary_keywords);
    }

    #[test]
    fn yaml_file_replaces_recruitment_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keywords.yaml");
        std::fs::write(&path, "recruitment_tag: hiring\n").unwrap();
        let keywords = KeywordTables::from_yaml_file(&path).unwrap().compile().unwrap();
        assert!(keywords.has_recruitment_tag("we are #hiring now"));
        assert!(!keywords.has_recruitment_tag("#招聘"));
    }

    #[test]
    fn malformed_yaml_reports_origin() {
        let err = KeywordTables::from_yaml_str("title_whitelist: {", "bad.yaml").unwrap_err();
        assert!(err.to_string().contains("bad.yaml"));
    }

    #[test]
    fn recruitment_gate_accepts_both_markers() {
        let keywords = Keywords::default();
        assert!(keywords.has_recruitment_tag("#招聘 #运营"));
        assert!(keywords.has_recruitment_tag("＃招聘"));
        assert!(!keywords.has_recruitment_tag("招聘运营，欢迎投递"));
    }

    #[test]
    fn company_label_requires_line_start_and_content() {
        let keywords = Keywords::default();
        assert_eq!(keywords.company_label_content("🏢 公司：Marisa"), Some("Marisa"));
        assert_eq!(keywords.company_label_content("Project Name: Orbit"), Some("Orbit"));
        assert_eq!(keywords.company_label_content("项目名称：Marisa Labs"), Some("Marisa Labs"));
        assert_eq!(keywords.company_label_content("公司："), None);
        assert_eq!(keywords.company_label_content("我们公司：很好"), None);
        assert_eq!(keywords.company_label_content("Teamwork: daily"), None);
    }

    #[test]
    fn empty_label_tables_disable_patterns() {
        let keywords = KeywordTables {
            label_prefixes: vec![],
            company_labels: vec![],
            ..KeywordTables::default()
        }
        .compile()
        .unwrap();
        assert_eq!(keywords.strip_label("岗位：运营"), "岗位：运营");
        assert_eq!(keywords.company_label_content("公司：Marisa"), None);
    }
}
