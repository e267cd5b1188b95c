//! Candidate statement extraction from generated text

use regex::Regex;

lazy_static::lazy_static! {
    // A `sql`-tagged fence; an unclosed fence runs to the end of the text.
    static ref SQL_FENCE: Regex = Regex::new(r"(?is)```\s*sql\b[ \t]*\r?\n?(.*?)(?:```|\z)").unwrap();
    // Any other fence, with an optional language tag on the opening line.
    static ref GENERIC_FENCE: Regex = Regex::new(r"(?s)```(?:[A-Za-z0-9_+-]*[ \t]*\r?\n)?(.*?)```").unwrap();
}

/// Strip code fences from generator output, returning the statement inside.
///
/// Best effort only: text without fences is returned trimmed, and malformed
/// fencing is passed through for the database to reject.
pub fn extract_sql(generated: &str) -> String {
    if let Some(caps) = SQL_FENCE.captures(generated) {
        return caps[1].trim().to_string();
    }
    if let Some(caps) = GENERIC_FENCE.captures(generated) {
        return caps[1].trim().to_string();
    }
    generated.trim().to_string()
}
