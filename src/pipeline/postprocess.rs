//! Post-processing: deterministic cleanup of provider text before JSON parsing.
//!
//! Prompt-engineered providers are asked for a bare JSON object but often
//! wrap it in a ` ```json ` fence, prefix a byte-order mark, or use CRLF line
//! endings. These rules remove exactly that and nothing else; there is no
//! attempt to repair invalid JSON.
//!
//! ## Rule Order
//!
//! Invisible characters go first so a BOM in front of the fence does not hide
//! it; fences are stripped before the final trim.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to raw provider output.
///
/// Rules (applied in order):
/// 1. Strip invisible Unicode (zero-width spaces, BOM, word joiners)
/// 2. Normalise line endings (CRLF → LF)
/// 3. Remove Markdown code fences, with or without a `json` language tag
/// 4. Trim surrounding whitespace
pub fn clean_json_response(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = normalise_line_endings(&s);
    let s = strip_code_fences(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip invisible Unicode ──────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}'))
        .collect()
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Strip code fences ────────────────────────────────────────────────

static RE_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json|JSON)?[ \t]*\n?").expect("valid fence regex"));

fn strip_code_fences(input: &str) -> String {
    RE_FENCES.replace_all(input, "").into_owned()
}
