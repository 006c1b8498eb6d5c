//! The fixed coaching profile: system instructions, worked exemplars and the
//! reviewer's instructions. Loaded once at startup and shared read-only.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::domain::conversation::{Role, Turn};

const BUILTIN_SYSTEM: &str = "\
You are a plainspoken leadership coach for small-business owners.
Anchor every reply in people-first leadership: clear expectations, ownership over excuses, \
regular follow-through, and kind but direct communication.

Clarity gate:
- If the latest message is vague (no role, metric or timeframe), ask exactly one specific \
clarifying question on a line starting with `Q:` and stop.
- If a clarifier was already asked earlier in the conversation, do not ask again; answer with \
one or two stated assumptions.

When answering:
1) Direct answer: the stance to take
2) Why it matters: the principle behind it
3) How to apply: two to four concrete steps for this week
Optionally finish with one follow-up question on a line starting with `Q:`.

Style: plain text, no markdown, no lists with bullets, at most five short lines unless the user \
asks for [detail:high]. Never describe yourself as an AI. For tax, legal or payroll specifics, \
point to a qualified professional and give one leadership action the owner can take now.";

const BUILTIN_EXEMPLARS: &[(Role, &str)] = &[
    (Role::User, "Employee is difficult."),
    (Role::Assistant, "Q: What specific behavior are you seeing, and how long has it been going on?"),
    (
        Role::User,
        "My sales manager has hit 70% of quota two quarters running and the team of six follows \
         his lead. How do I hold him accountable without killing morale?",
    ),
    (
        Role::Assistant,
        "1) Direct answer: Meet one-on-one this week and name the gap plainly and kindly.\n\
         2) Why it matters: Unclear expectations breed excuses; clarity is respect.\n\
         3) How to apply: Agree on one weekly number he owns, review it every Monday, and write \
         down the next step together before you leave the room.\n\
         Q: What does his weekly activity look like right now?",
    ),
];

const BUILTIN_MICRO_TURN_REVIEW: &str = "\
You are an editor enforcing a strict reply contract. Rewrite the draft so it is plain text, \
at most five short lines, keeps the coach's stance, and asks at most one clarifying question on \
a final line starting with `Q:`. Remove filler and corporate speak. Return only the rewritten \
reply.";

const BUILTIN_FIXED_SECTION_REVIEW: &str = "\
You are an editor enforcing a strict reply contract. Rewrite the draft so it keeps exactly \
three numbered sections, `1) Direct answer`, `2) Why it matters`, `3) How to apply`, in plain \
text and under 300 words. Keep the coach's stance. Return only the rewritten reply.";

const BUILTIN_REVIEW_REQUEST: &str = "\
Question:
{{ question }}

Draft:
{{ draft }}";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewInstructions {
    pub micro_turn: String,
    pub fixed_section: String,
    /// Tera template for the reviewer's user turn; receives `question` and `draft`.
    pub request_template: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoachingProfile {
    fixed: Vec<Turn>,
    review: ReviewInstructions,
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("could not read coaching profile `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse coaching profile `{path}`: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("invalid coaching profile: {0}")]
    Invalid(String),
}

impl CoachingProfile {
    pub fn builtin() -> Self {
        let mut fixed = Vec::with_capacity(BUILTIN_EXEMPLARS.len() + 1);
        fixed.push(Turn { role: Role::System, content: BUILTIN_SYSTEM.to_string() });
        fixed.extend(
            BUILTIN_EXEMPLARS
                .iter()
                .map(|(role, content)| Turn { role: *role, content: (*content).to_string() }),
        );

        Self {
            fixed,
            review: ReviewInstructions {
                micro_turn: BUILTIN_MICRO_TURN_REVIEW.to_string(),
                fixed_section: BUILTIN_FIXED_SECTION_REVIEW.to_string(),
                request_template: BUILTIN_REVIEW_REQUEST.to_string(),
            },
        }
    }

    /// Reads a TOML profile. Review instructions fall back to the built-in text when omitted.
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ProfileError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml(&raw).map_err(|error| match error {
            ProfileParseError::Toml(source) => {
                ProfileError::Parse { path: path.to_path_buf(), source }
            }
            ProfileParseError::Invalid(message) => ProfileError::Invalid(message),
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ProfileError> {
        Self::from_toml(raw).map_err(|error| match error {
            ProfileParseError::Toml(source) => {
                ProfileError::Parse { path: PathBuf::from("<inline>"), source }
            }
            ProfileParseError::Invalid(message) => ProfileError::Invalid(message),
        })
    }

    fn from_toml(raw: &str) -> Result<Self, ProfileParseError> {
        let file = toml::from_str::<ProfileFile>(raw).map_err(ProfileParseError::Toml)?;
        let builtin = Self::builtin();

        let system = Turn::system(file.system)
            .map_err(|_| ProfileParseError::Invalid("`system` must not be empty".to_string()))?;
        let mut fixed = vec![system];
        for (index, exemplar) in file.exemplars.into_iter().enumerate() {
            if exemplar.role == Role::System {
                return Err(ProfileParseError::Invalid(format!(
                    "exemplars[{index}] must be a user or assistant turn"
                )));
            }
            let turn = Turn::new(exemplar.role, exemplar.content).map_err(|_| {
                ProfileParseError::Invalid(format!("exemplars[{index}].content must not be empty"))
            })?;
            fixed.push(turn);
        }

        let review = file.review.unwrap_or_default();
        Ok(Self {
            fixed,
            review: ReviewInstructions {
                micro_turn: non_blank(review.micro_turn).unwrap_or(builtin.review.micro_turn),
                fixed_section: non_blank(review.fixed_section)
                    .unwrap_or(builtin.review.fixed_section),
                request_template: non_blank(review.request_template)
                    .unwrap_or(builtin.review.request_template),
            },
        })
    }

    pub fn system(&self) -> &Turn {
        &self.fixed[0]
    }

    pub fn exemplars(&self) -> &[Turn] {
        &self.fixed[1..]
    }

    /// System turn followed by exemplars, in prompt order.
    pub fn fixed_turns(&self) -> &[Turn] {
        &self.fixed
    }

    pub fn review(&self) -> &ReviewInstructions {
        &self.review
    }
}

impl Default for CoachingProfile {
    fn default() -> Self {
        Self::builtin()
    }
}

enum ProfileParseError {
    Toml(toml::de::Error),
    Invalid(String),
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[derive(Debug, Deserialize)]
struct ProfileFile {
    system: String,
    #[serde(default)]
    exemplars: Vec<ExemplarEntry>,
    review: Option<ReviewPatch>,
}

#[derive(Debug, Deserialize)]
struct ExemplarEntry {
    role: Role,
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct ReviewPatch {
    micro_turn: Option<String>,
    fixed_section: Option<String>,
    request_template: Option<String>,
}
