//! Per-kind rule matching semantics (§4.2).

use super::behavioral::BehavioralState;
use super::rule::{Rule, RuleKind};
use super::threat_intel::ThreatIntelCache;
use crate::event::Event;

const THREAT_INTEL_FIELDS: &[&str] = &["src_ip", "dst_ip", "domain", "url", "file_hash"];
const BEHAVIORAL_CATEGORIES: &[&str] = &["privilege", "escalation", "sudo"];

pub struct MatchContext<'a> {
    pub threat_intel: &'a ThreatIntelCache,
    pub behavioral: &'a BehavioralState,
}

pub fn matches(rule: &Rule, event: &Event, ctx: &MatchContext<'_>) -> bool {
    if !rule.enabled {
        return false;
    }
    match rule.kind {
        RuleKind::Exact => match_exact(rule, event),
        RuleKind::Regex => match_regex(rule, event),
        RuleKind::Exists => match_exists(rule, event),
        RuleKind::ThreatIntel => match_threat_intel(rule, event, ctx.threat_intel),
        RuleKind::Behavioral => match_behavioral(rule, event, ctx.behavioral),
        RuleKind::Compliance => match_compliance(rule, event),
    }
}

fn match_exact(rule: &Rule, event: &Event) -> bool {
    if rule.is_wildcard_field() {
        return false;
    }
    event
        .get_str(&rule.field)
        .map(|v| v == rule.pattern)
        .unwrap_or(false)
}

/// Uses the pattern precompiled once at rule construction
/// (`Rule::regex`) rather than recompiling on every event. Falls back to
/// a substring search when the pattern failed to compile; that failure
/// was already logged once, at rule-load time, not here (§4.2).
fn match_regex(rule: &Rule, event: &Event) -> bool {
    if rule.is_wildcard_field() {
        return false;
    }
    let Some(value) = event.get_str(&rule.field) else {
        return false;
    };
    match rule.regex() {
        Some(re) => re.is_match(value),
        None => value.contains(&rule.pattern),
    }
}

fn match_exists(rule: &Rule, event: &Event) -> bool {
    if rule.is_wildcard_field() {
        return false;
    }
    event.contains(&rule.field)
}

fn match_threat_intel(rule: &Rule, event: &Event, cache: &ThreatIntelCache) -> bool {
    let fields: Vec<&str> = if rule.is_wildcard_field() {
        THREAT_INTEL_FIELDS.to_vec()
    } else {
        vec![rule.field.as_str()]
    };

    fields.iter().any(|field| {
        event
            .get_str(field)
            .map(|value| cache.lookup(value))
            .unwrap_or(false)
    })
}

fn match_behavioral(_rule: &Rule, event: &Event, behavioral: &BehavioralState) -> bool {
    let Some(event_type) = event.get_str("event_type") else {
        return false;
    };
    let category_hit = BEHAVIORAL_CATEGORIES.iter().any(|c| event_type.contains(c));
    if !category_hit {
        return false;
    }

    // Wire category hits to session/process observation updates so the
    // behavioral maps accumulate state even when this rule alone drives
    // the match (§4.2).
    if let (Some(user), Some(source_ip)) = (event.get_str("user"), event.get_str("source_ip")) {
        behavioral.observe_login(user, source_ip);
    }
    if let Some(user) = event.get_str("user") {
        if let Some(process) = event.get_str("process") {
            let command_line = event.get_str("command_line").unwrap_or_default();
            behavioral.observe_process(user, process, command_line);
        }
    }

    true
}

fn match_compliance(rule: &Rule, event: &Event) -> bool {
    use crate::discovery::Compliance;

    let keywords: Vec<&str> = {
        let mut all = Vec::new();
        if rule.compliance_mask.contains(Compliance::PCI_DSS) {
            all.extend(["payment", "card", "transaction"]);
        }
        if rule.compliance_mask.contains(Compliance::HIPAA) {
            all.extend(["patient", "medical", "health", "phi"]);
        }
        all
    };
    if keywords.is_empty() {
        return false;
    }

    let field_matches = |value: &str| {
        let lower = value.to_lowercase();
        keywords.iter().any(|k| lower.contains(k))
    };

    if rule.is_wildcard_field() {
        event.string_values().any(field_matches)
    } else {
        event.get_str(&rule.field).map(field_matches).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::rule::{default_rules, RuleKind};

    fn ctx<'a>(ti: &'a ThreatIntelCache, bh: &'a BehavioralState) -> MatchContext<'a> {
        MatchContext { threat_intel: ti, behavioral: bh }
    }

    #[test]
    fn empty_event_matches_nothing() {
        let ti = ThreatIntelCache::new();
        let bh = BehavioralState::new();
        let c = ctx(&ti, &bh);
        let event = Event::new();
        for rule in default_rules() {
            assert!(!matches(&rule, &event, &c), "{:?} unexpectedly matched empty event", rule.kind);
        }
    }

    #[test]
    fn exact_rule_matches_equal_value() {
        let ti = ThreatIntelCache::new();
        let bh = BehavioralState::new();
        let c = ctx(&ti, &bh);
        let rule = default_rules().into_iter().find(|r| r.id == 1).unwrap();
        let event = Event::new().with_field("event_type", "login_failed");
        assert!(matches(&rule, &event, &c));
    }

    #[test]
    fn regex_rule_matches_substring_keyword() {
        let ti = ThreatIntelCache::new();
        let bh = BehavioralState::new();
        let c = ctx(&ti, &bh);
        let rule = default_rules().into_iter().find(|r| r.id == 3).unwrap();
        assert_eq!(rule.kind, RuleKind::Regex);
        let event = Event::new().with_field("message", "detected a trojan payload");
        assert!(matches(&rule, &event, &c));
    }

    #[test]
    fn noise_rule_drops_heartbeat() {
        let ti = ThreatIntelCache::new();
        let bh = BehavioralState::new();
        let c = ctx(&ti, &bh);
        let rule = default_rules().into_iter().find(|r| r.id == 8).unwrap();
        let event = Event::new().with_field("message", "heartbeat");
        assert!(matches(&rule, &event, &c));
    }
}
