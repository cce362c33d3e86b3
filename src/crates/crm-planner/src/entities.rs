//! Entity extraction: `{type ∈ {person, date, duration, location, subject}, value}`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractedEntityType {
    Person,
    Date,
    Duration,
    Location,
    Subject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    #[serde(rename = "type")]
    pub entity_type: ExtractedEntityType,
    pub value: String,
}

const STOPWORDS: &[&str] = &[
    "I", "The", "A", "An", "Can", "Could", "Would", "Please", "Monday", "Tuesday", "Wednesday",
    "Thursday", "Friday", "Saturday", "Sunday",
];

fn is_self_word(word: &str) -> bool {
    matches!(word.to_lowercase().as_str(), "me" | "myself" | "i")
}

/// One name, or a self-reference (`me`/`myself`).
const NAME_ALTERNATION: &str = r"(?:me|myself|[A-Z][a-zA-Z]*(?:\s+[A-Z][a-zA-Z]*)?)";

/// Separator between chained names: a bare comma, an " and ", or the
/// "Oxford comma" combination ", and " before the last name in the list.
const NAME_SEPARATOR: &str = r"(?:,\s*(?:and\s+)?|\s+and\s+)";

/// Extracts `person` mentions from a `with X` / `for X` phrase — including a
/// `,`/`and`-joined chain of names after it ("with John and Jane", "with
/// John, Jane, and Sam") — plus bare capitalized names that aren't
/// sentence-leading stopwords.
pub fn extract_persons(query: &str) -> Vec<String> {
    let re = regex::Regex::new(&format!(
        r"(?i)\b(?:with|for)\s+({NAME_ALTERNATION}(?:{NAME_SEPARATOR}{NAME_ALTERNATION})*)"
    ))
    .expect("valid regex");
    let splitter = regex::Regex::new(&format!(r"(?i){NAME_SEPARATOR}")).expect("valid regex");

    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for cap in re.captures_iter(query) {
        for name in splitter.split(cap[1].trim()) {
            let name = name.trim().to_string();
            if name.is_empty() {
                continue;
            }
            if is_self_word(&name) {
                if seen.insert("me".to_string()) {
                    out.push("me".to_string());
                }
                continue;
            }
            if STOPWORDS.contains(&name.as_str()) {
                continue;
            }
            if seen.insert(name.clone()) {
                out.push(name);
            }
        }
    }
    out
}

fn date_regex() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(
            r"(?i)\b(today|tomorrow|yesterday|next week|this week|monday|tuesday|wednesday|thursday|friday|saturday|sunday|\d{1,2}(?::\d{2})?\s?(?:am|pm))\b",
        )
        .expect("valid regex")
    })
}

fn duration_regex() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"(?i)\b(\d+\s?(?:minutes?|mins?|hours?|hrs?))\b").expect("valid regex")
    })
}

fn location_regex() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"(?i)\bin\s+([A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+)?)\b").expect("valid regex")
    })
}

fn subject_regex() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"(?i)\b(?:about|regarding|to discuss)\s+(.+?)(?:[.!?]|$)")
            .expect("valid regex")
    })
}

/// Extract every recognized entity from a free-text query. Best-effort and
/// non-exhaustive: the planner only needs enough signal to decide
/// dependency ordering, not a full NLU pipeline.
pub fn extract_entities(query: &str) -> Vec<ExtractedEntity> {
    let mut entities = Vec::new();

    for person in extract_persons(query) {
        entities.push(ExtractedEntity {
            entity_type: ExtractedEntityType::Person,
            value: person,
        });
    }
    for cap in date_regex().captures_iter(query) {
        entities.push(ExtractedEntity {
            entity_type: ExtractedEntityType::Date,
            value: cap[1].to_string(),
        });
    }
    for cap in duration_regex().captures_iter(query) {
        entities.push(ExtractedEntity {
            entity_type: ExtractedEntityType::Duration,
            value: cap[1].to_string(),
        });
    }
    for cap in location_regex().captures_iter(query) {
        entities.push(ExtractedEntity {
            entity_type: ExtractedEntityType::Location,
            value: cap[1].to_string(),
        });
    }
    if let Some(cap) = subject_regex().captures(query) {
        entities.push(ExtractedEntity {
            entity_type: ExtractedEntityType::Subject,
            value: cap[1].trim().to_string(),
        });
    }

    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_person_after_with() {
        let persons = extract_persons("create an appointment with John for 8am tomorrow");
        assert_eq!(persons, vec!["John".to_string()]);
    }

    #[test]
    fn extracts_self_reference() {
        let persons = extract_persons("schedule a meeting for me tomorrow");
        assert_eq!(persons, vec!["me".to_string()]);
    }

    #[test]
    fn extracts_conjunction_joined_persons() {
        let persons = extract_persons("schedule a meeting with John and Jane tomorrow");
        assert_eq!(persons, vec!["John".to_string(), "Jane".to_string()]);
    }

    #[test]
    fn extracts_oxford_comma_joined_persons() {
        let persons = extract_persons("schedule a meeting with John, Jane, and Sam tomorrow");
        assert_eq!(
            persons,
            vec!["John".to_string(), "Jane".to_string(), "Sam".to_string()]
        );
    }

    #[test]
    fn extracts_date_and_duration() {
        let entities = extract_entities("meet for 30 minutes tomorrow at 8am");
        assert!(entities
            .iter()
            .any(|e| e.entity_type == ExtractedEntityType::Duration && e.value.contains("30")));
        assert!(entities
            .iter()
            .any(|e| e.entity_type == ExtractedEntityType::Date));
    }
}
