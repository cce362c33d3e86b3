//! Keyword-based domain detection (§4.H).

use crm_domain::Domain;

struct DomainRule {
    domain: Domain,
    pattern: &'static str,
}

fn rules() -> &'static [DomainRule] {
    static RULES: std::sync::OnceLock<Vec<DomainRule>> = std::sync::OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            DomainRule {
                domain: Domain::Calendar,
                pattern: r"(?i)\b(meeting|appointment|calendar|schedule)\b",
            },
            DomainRule {
                domain: Domain::Task,
                pattern: r"(?i)\b(task|todo|to-do)\b",
            },
            DomainRule {
                domain: Domain::Workflow,
                pattern: r"(?i)\b(workflow|process|playbook)\b",
            },
            DomainRule {
                domain: Domain::Contact,
                pattern: r"(?i)\b(contact|lookup|look up)\b",
            },
        ]
    })
}

/// Detect domains mentioned in the query by keyword, preserving the fixed
/// rule order (calendar, task, workflow, contact) rather than text order —
/// ties between simultaneously-mentioned domains resolve deterministically.
pub fn detect_domains(query: &str) -> Vec<Domain> {
    let mut found = Vec::new();
    for rule in rules() {
        let re = regex::Regex::new(rule.pattern).expect("valid regex");
        if re.is_match(query) && !found.contains(&rule.domain) {
            found.push(rule.domain);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_calendar_keyword() {
        assert_eq!(detect_domains("What's on my calendar today?"), vec![Domain::Calendar]);
    }

    #[test]
    fn detects_multiple_domains() {
        let domains = detect_domains("Create a planning workflow and schedule a meeting to discuss it");
        assert_eq!(domains, vec![Domain::Calendar, Domain::Workflow]);
    }

    #[test]
    fn detects_no_domain_for_unrelated_query() {
        assert!(detect_domains("hello there").is_empty());
    }
}
