//! Requested-time extraction and the slot availability rule.

use std::sync::OnceLock;

use regex::Regex;

use appointflow_core::config::SlotsConfig;

/// Result of checking the slot named in a reschedule request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable { alternative: String },
}

fn twelve_hour_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})\s*(:\s*\d{2})?\s*(am|pm)\b").expect("12h pattern is valid")
    })
}

fn twenty_four_hour_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:[01]?\d|2[0-3]):[0-5]\d\b").expect("24h pattern is valid"))
}

fn normalize(slot: &str) -> String {
    slot.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Find a time like `2pm`, `2 pm`, `2:30pm` or `14:00` in free text.
///
/// Twelve-hour times come back without inner spaces (`2 pm` -> `2pm`).
pub fn extract_requested_timeslot(text: &str) -> Option<String> {
    let t = text.to_lowercase();
    if let Some(caps) = twelve_hour_re().captures(&t) {
        let hour = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let mins = caps.get(2).map(|m| normalize(m.as_str())).unwrap_or_default();
        let meridiem = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
        return Some(format!("{hour}{mins}{meridiem}"));
    }
    twenty_four_hour_re()
        .find(&t)
        .map(|m| m.as_str().to_string())
}

/// A request is unavailable when its slot matches a configured booked slot.
/// Requests without a recognizable time are treated as available.
pub fn check_availability(text: &str, config: &SlotsConfig) -> Availability {
    let Some(slot) = extract_requested_timeslot(text) else {
        return Availability::Available;
    };
    let slot = normalize(&slot);
    if config.unavailable.iter().any(|booked| normalize(booked) == slot) {
        Availability::Unavailable {
            alternative: config.alternative.clone(),
        }
    } else {
        Availability::Available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_common_shapes() {
        assert_eq!(extract_requested_timeslot("move it to 2pm").as_deref(), Some("2pm"));
        assert_eq!(extract_requested_timeslot("at 2 PM please").as_deref(), Some("2pm"));
        assert_eq!(extract_requested_timeslot("2:30pm works").as_deref(), Some("2:30pm"));
        assert_eq!(extract_requested_timeslot("14:00 tomorrow").as_deref(), Some("14:00"));
        assert_eq!(extract_requested_timeslot("sometime next week"), None);
    }

    #[test]
    fn booked_slots_are_unavailable() {
        let config = SlotsConfig::default();
        for text in ["reschedule to 2pm", "reschedule to 2:00 pm", "reschedule to 14:00"] {
            assert_eq!(
                check_availability(text, &config),
                Availability::Unavailable {
                    alternative: "3:00pm".into()
                },
                "{text}"
            );
        }
    }

    #[test]
    fn other_slots_are_available() {
        let config = SlotsConfig::default();
        assert_eq!(check_availability("reschedule to 4pm", &config), Availability::Available);
        assert_eq!(check_availability("reschedule please", &config), Availability::Available);
    }

    #[test]
    fn custom_booked_list() {
        let config = SlotsConfig {
            unavailable: vec!["9 AM".into()],
            alternative: "10am".into(),
        };
        assert_eq!(
            check_availability("can we do 9am", &config),
            Availability::Unavailable {
                alternative: "10am".into()
            }
        );
    }
}
