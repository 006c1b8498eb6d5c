//! Post-processing of backend drafts into the micro-turn reply shape.
//!
//! Steps run in a fixed order: strip bullet markers, strip inline formatting,
//! split into trimmed non-empty lines, cut after the first question line, cap
//! at the line budget, join. The question cut runs before the budget cap, so
//! a question that lands past the budget is dropped along with the overflow.

use std::sync::LazyLock;

use regex::Regex;

pub const DEFAULT_LINE_BUDGET: usize = 5;
pub const DETAILED_LINE_BUDGET: usize = 12;
pub const DETAIL_MARKER: &str = "[detail:high]";

pub const FIXED_SECTIONS: [&str; 3] = ["Direct answer", "Why it matters", "How to apply"];

// Leading formatting characters are consumed with the bullets so that removing
// inline markers afterwards can never expose a fresh bullet. The whitespace class
// matches what `str::trim` removes in step 3, minus line breaks.
static LEADING_MARKERS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[\s&&[^\r\n]]*(?:[-*#`_]+[\s&&[^\r\n]]*)+")
        .expect("valid leading marker regex")
});
static INLINE_MARKERS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[*`_]").expect("valid inline marker regex"));
static QUESTION_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:q|question)\s*:").expect("valid question line regex"));
static SECTION_RE: [LazyLock<Regex>; 3] = [
    LazyLock::new(|| section_regex(1, FIXED_SECTIONS[0])),
    LazyLock::new(|| section_regex(2, FIXED_SECTIONS[1])),
    LazyLock::new(|| section_regex(3, FIXED_SECTIONS[2])),
];

fn section_regex(number: usize, title: &str) -> Regex {
    Regex::new(&format!(r"(?im)^[ \t]*{number}\s*[).:-]?\s*{}", regex::escape(title)))
        .expect("valid section header regex")
}

/// Maximum number of lines a reply may keep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineBudget(usize);

impl LineBudget {
    /// Budget implied by the caller's latest message.
    pub fn for_user_text(last_user_text: &str) -> Self {
        if last_user_text.to_ascii_lowercase().contains(DETAIL_MARKER) {
            Self(DETAILED_LINE_BUDGET)
        } else {
            Self(DEFAULT_LINE_BUDGET)
        }
    }

    pub fn lines(&self) -> usize {
        self.0
    }
}

impl Default for LineBudget {
    fn default() -> Self {
        Self(DEFAULT_LINE_BUDGET)
    }
}

/// Steps 1-2: bullet and inline-formatting removal. The reviewer sees text at this stage.
pub fn strip_formatting(draft: &str) -> String {
    let without_bullets = LEADING_MARKERS_RE.replace_all(draft, "");
    INLINE_MARKERS_RE.replace_all(&without_bullets, "").into_owned()
}

/// Step 3.
pub fn content_lines(text: &str) -> Vec<&str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty()).collect()
}

pub fn is_question_line(line: &str) -> bool {
    QUESTION_LINE_RE.is_match(line.trim_start())
}

/// Step 4: everything after the first question line is dropped.
pub fn cut_after_question<'a>(lines: &[&'a str]) -> Vec<&'a str> {
    match lines.iter().position(|line| is_question_line(line)) {
        Some(index) => lines[..=index].to_vec(),
        None => lines.to_vec(),
    }
}

/// Full enforcement of the micro-turn contract on a draft.
pub fn enforce(draft: &str, budget: LineBudget) -> String {
    let cleaned = strip_formatting(draft);
    let lines = content_lines(&cleaned);
    let mut kept = cut_after_question(&lines);
    kept.truncate(budget.lines());
    kept.join("\n")
}

/// True when every line up to and including the first question line fits the budget,
/// i.e. enforcing the budget would not cut any content.
pub fn fits_budget(text: &str, budget: LineBudget) -> bool {
    let lines = content_lines(text);
    cut_after_question(&lines).len() <= budget.lines()
}

pub fn has_question_line(text: &str) -> bool {
    content_lines(text).into_iter().any(is_question_line)
}

/// True when all three numbered section headers are present.
pub fn has_fixed_sections(text: &str) -> bool {
    SECTION_RE.iter().all(|pattern| pattern.is_match(text))
}
