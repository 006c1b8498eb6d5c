use std::sync::LazyLock;

use regex::Regex;

pub const CARD_TOKEN: &str = "[REDACTED_CARD]";
pub const NATIONAL_ID_TOKEN: &str = "[REDACTED_SSN]";
pub const PHONE_TOKEN: &str = "[REDACTED_PHONE]";

// Card runs first: its 13-19 digit shape would otherwise be split by the phone pattern.
static CARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d[ -]?){12,18}\d\b").expect("valid card regex"));
static NATIONAL_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("valid national id regex"));
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?1[ .-]?)?(?:\(\d{3}\)|\b\d{3})[ .-]?\d{3}[ .-]?\d{4}\b")
        .expect("valid phone regex")
});

/// Replaces payment-card, national-ID and phone-number digit shapes with fixed tokens.
/// Expects unescaped text; a JSON `\n` escape would glue its `n` to the digits.
pub fn redact_pii(text: &str) -> String {
    let text = CARD_RE.replace_all(text, CARD_TOKEN);
    let text = NATIONAL_ID_RE.replace_all(&text, NATIONAL_ID_TOKEN);
    PHONE_RE.replace_all(&text, PHONE_TOKEN).into_owned()
}
