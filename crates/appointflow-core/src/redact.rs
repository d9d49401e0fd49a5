//! Masking for identifier-like tokens before text is kept or displayed.

use std::sync::OnceLock;

use regex::{Captures, Regex};

pub const MASK: &str = "***";

/// `meta` key holding free-text debug output that must stay masked.
pub const DEBUG_META_KEY: &str = "debug";

fn appointment_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:appt|appointment)\s*(?:id)?\s*[:#]?\s*([A-Za-z0-9\-]{3,})\b")
            .expect("appointment id pattern is valid")
    })
}

fn digit_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{3,}\b").expect("digit pattern is valid"))
}

/// Mask appointment-id tokens and any run of three or more digits.
pub fn mask_pii(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let masked = appointment_id_re().replace_all(text, |caps: &Captures| {
        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        match (caps.get(0), caps.get(1)) {
            (Some(m), Some(id)) => {
                let start = id.start() - m.start();
                let end = id.end() - m.start();
                format!("{}{}{}", &whole[..start], MASK, &whole[end..])
            }
            _ => whole.to_string(),
        }
    });

    digit_run_re().replace_all(&masked, MASK).into_owned()
}

/// Mask an id for display, keeping only the last `keep` characters.
pub fn mask_id(value: &str, keep: usize) -> String {
    let v = value.trim();
    let len = v.chars().count();
    if len <= keep {
        return "*".repeat(len);
    }
    let tail: String = v.chars().skip(len - keep).collect();
    format!("{}{}", "*".repeat(len - keep), tail)
}
