//! Salary line selection and max-figure rendering.

use jobfeed_core::NEGOTIABLE_SALARY;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::keywords::Keywords;

/// Lines this long or longer are prose, not a salary line.
const SALARY_LINE_MAX_CHARS: usize = 50;
const MIN_FIGURE: u64 = 100;
const MAX_FIGURE: u64 = 100_000;

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("digit pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Usdt,
    Dollar,
    Thousands,
    None,
}

impl Unit {
    fn detect(line: &str, lower: &str) -> Self {
        if lower.contains('u') {
            Unit::Usdt
        } else if line.contains('$') {
            Unit::Dollar
        } else if lower.contains('k') {
            Unit::Thousands
        } else {
            Unit::None
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Unit::Usdt => "U",
            Unit::Dollar => "$",
            Unit::Thousands => "k",
            Unit::None => "",
        }
    }
}

fn select_salary_line<'a>(raw_text: &'a str, keywords: &Keywords) -> Option<&'a str> {
    raw_text.split('\n').find(|line| {
        keywords.is_salary_line(line)
            && line.chars().count() < SALARY_LINE_MAX_CHARS
            && line.chars().any(|c| c.is_ascii_digit())
    })
}

/// Render the largest plausible pay figure of the first salary-looking line.
///
/// Only the larger bound of a range survives. Figures under 100 count only
/// when the line uses `k` notation ("20k-30k"), since otherwise they are
/// usually years of experience or headcounts.
pub fn extract_max_salary(raw_text: &str, keywords: &Keywords) -> String {
    let Some(line) = select_salary_line(raw_text, keywords) else {
        return NEGOTIABLE_SALARY.to_string();
    };
    let lower = line.to_lowercase();
    let thousands_notation = lower.contains('k');

    let max = DIGIT_RUN
        .find_iter(line)
        .filter_map(|m| m.as_str().parse::<u64>().ok())
        .filter(|v| (*v > MIN_FIGURE && *v < MAX_FIGURE) || (*v < MIN_FIGURE && thousands_notation))
        .max();

    match max {
        Some(value) => format!("{value}{}", Unit::detect(line, &lower).suffix()),
        None => line.trim().to_string(),
    }
}
