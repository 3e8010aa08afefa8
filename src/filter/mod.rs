//! Rule-Based Filter / Enricher.

mod behavioral;
mod matcher;
mod rule;
mod threat_intel;

pub use behavioral::BehavioralState;
pub use rule::{default_rules, emit_rules_file, parse_rules_file, Rule, RuleKind};
pub use threat_intel::ThreatIntelCache;

use crate::event::{Action, Event, FilterOutcome};
use matcher::MatchContext;
use parking_lot::RwLock;
use std::path::Path;

pub const AGENT_NAME: &str = "ThreatGuard-Agent";
pub const AGENT_VERSION: &str = "2.0.1";

pub struct FilterEngineConfig {
    pub enable_threat_intel: bool,
    pub enable_behavioral_analysis: bool,
}

impl Default for FilterEngineConfig {
    fn default() -> Self {
        Self {
            enable_threat_intel: true,
            enable_behavioral_analysis: true,
        }
    }
}

/// Owns the rule store and behavioral/threat-intel side-state. Rule
/// storage favors many-readers/rare-writer (§5): the `Vec<Rule>` behind
/// a `parking_lot::RwLock` is swapped wholesale on reload rather than
/// mutated rule-by-rule.
pub struct FilterEngine {
    rules: RwLock<Vec<Rule>>,
    threat_intel: ThreatIntelCache,
    behavioral: BehavioralState,
    config: FilterEngineConfig,
}

impl FilterEngine {
    pub fn new(config: FilterEngineConfig) -> Self {
        Self {
            rules: RwLock::new(default_rules()),
            threat_intel: ThreatIntelCache::new(),
            behavioral: BehavioralState::new(),
            config,
        }
    }

    /// Loads rules from a file if present, falling back to the default
    /// set on a missing path or a file that yields zero rules (§4.2,
    /// §7: "complete file failure falls back to default rules").
    pub fn load_rules_file(&self, path: &Path) {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let parsed = parse_rules_file(&content);
                if parsed.is_empty() {
                    tracing::warn!(path = %path.display(), "rules file yielded no rules, keeping defaults");
                } else {
                    tracing::info!(path = %path.display(), count = parsed.len(), "loaded rules file");
                    *self.rules.write() = parsed;
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "rules file not readable, keeping defaults");
            }
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    pub fn clear_rules(&self) {
        self.rules.write().clear();
    }

    /// Enables/disables `compliance`-kind rules to match the active
    /// organization's compliance bitset from the latest `DiscoveryResult`
    /// (§2: discovery "publishes derived settings that influence ...
    /// Filter (active compliance profile)"). Non-compliance rules are
    /// untouched.
    pub fn apply_compliance_profile(&self, active: crate::discovery::Compliance) {
        let mut rules = self.rules.write();
        for rule in rules.iter_mut() {
            if rule.kind == RuleKind::Compliance {
                rule.enabled = active.intersects(rule.compliance_mask);
            }
        }
    }

    pub fn behavioral(&self) -> &BehavioralState {
        &self.behavioral
    }

    pub fn threat_intel(&self) -> &ThreatIntelCache {
        &self.threat_intel
    }

    /// Evaluates every enabled rule against `event` in one pass and
    /// resolves to the single action of the highest-priority matching
    /// rule (ties broken by lowest rule id). Absent a match, the action
    /// is `pass`.
    pub fn process(&self, event: Event) -> FilterOutcome {
        let rules = self.rules.read();
        let ctx = MatchContext {
            threat_intel: &self.threat_intel,
            behavioral: &self.behavioral,
        };

        let mut winner: Option<&Rule> = None;
        for rule in rules.iter() {
            if !rule.enabled {
                continue;
            }
            let kind_enabled = match rule.kind {
                RuleKind::ThreatIntel => self.config.enable_threat_intel,
                RuleKind::Behavioral => self.config.enable_behavioral_analysis,
                _ => true,
            };
            if !kind_enabled {
                continue;
            }

            if matcher::matches(rule, &event, &ctx) {
                rule.record_match();
                winner = match winner {
                    None => Some(rule),
                    Some(current) if rule.priority > current.priority => Some(rule),
                    Some(current) if rule.priority == current.priority && rule.id < current.id => Some(rule),
                    Some(current) => Some(current),
                };
            }
        }

        match winner {
            None => FilterOutcome::Pass(event),
            Some(rule) => match rule.action {
                Action::Pass => FilterOutcome::Pass(event),
                Action::Drop => FilterOutcome::Drop,
                Action::Flag => FilterOutcome::Flag(enrich(event, rule.priority)),
                Action::Enrich => FilterOutcome::Enrich(enrich(event, rule.priority)),
            },
        }
    }
}

/// Adds the `tg_`-prefixed enrichment fields described in §4.2.
/// Idempotent on `tg_security_tag`: re-running this on an already
/// enriched event leaves the tag's value ("flagged") unchanged, which is
/// the only stability the spec requires of repeated enrichment.
fn enrich(mut event: Event, rule_priority: u8) -> Event {
    event.set("tg_security_tag", "flagged");
    event.set("tg_detection_time", chrono::Utc::now().timestamp());
    event.set("tg_threat_score", (rule_priority as u32).min(100));
    event.set("tg_agent_id", AGENT_NAME);
    event
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_rule_matches_passes_through() {
        let engine = FilterEngine::new(FilterEngineConfig::default());
        engine.clear_rules();
        let event = Event::new().with_field("message", "anything");
        match engine.process(event) {
            FilterOutcome::Pass(_) => {}
            other => panic!("expected pass, got {:?}", other.action()),
        }
    }

    #[test]
    fn priority_tie_resolves_to_highest_priority_flag() {
        // Concrete scenario 2: priorities 90 and 95 both flag, plus a
        // priority-50 drop rule matching too -> outcome flag.
        let engine = FilterEngine::new(FilterEngineConfig::default());
        engine.clear_rules();
        {
            let mut rules = engine.rules.write();
            rules.push(Rule::new(1, "r90", RuleKind::Exact, 90, Action::Flag, "a", "x"));
            rules.push(Rule::new(2, "r95", RuleKind::Exact, 95, Action::Flag, "b", "y"));
            rules.push(Rule::new(3, "r50", RuleKind::Exact, 50, Action::Drop, "c", "z"));
        }
        let event = Event::new()
            .with_field("a", "x")
            .with_field("b", "y")
            .with_field("c", "z");
        match engine.process(event) {
            FilterOutcome::Flag(_) => {}
            other => panic!("expected flag, got {:?}", other.action()),
        }
    }

    #[test]
    fn noise_drop_scenario() {
        let engine = FilterEngine::new(FilterEngineConfig::default());
        let event = Event::new().with_field("message", "heartbeat");
        match engine.process(event) {
            FilterOutcome::Drop => {}
            other => panic!("expected drop, got {:?}", other.action()),
        }
    }

    #[test]
    fn enrichment_is_idempotent_on_security_tag() {
        let engine = FilterEngine::new(FilterEngineConfig::default());
        let event = Event::new().with_field("severity", "critical");
        let once = match engine.process(event) {
            FilterOutcome::Flag(e) => e,
            other => panic!("expected flag, got {:?}", other.action()),
        };
        let tag_after_first = once.get_str("tg_security_tag").unwrap().to_string();

        let twice = match engine.process(once) {
            FilterOutcome::Flag(e) => e,
            other => panic!("expected flag, got {:?}", other.action()),
        };
        assert_eq!(twice.get_str("tg_security_tag").unwrap(), tag_after_first);
    }

    #[test]
    fn zero_rules_and_defaults_disabled_passes_everything() {
        let engine = FilterEngine::new(FilterEngineConfig::default());
        engine.clear_rules();
        assert_eq!(engine.rule_count(), 0);
        let event = Event::new().with_field("whatever", "value");
        match engine.process(event) {
            FilterOutcome::Pass(_) => {}
            other => panic!("expected pass, got {:?}", other.action()),
        }
    }

    #[test]
    fn compliance_profile_disables_non_applicable_compliance_rules() {
        use crate::discovery::Compliance;

        let engine = FilterEngine::new(FilterEngineConfig::default());
        // No PCI-DSS in the active profile: the PCI compliance rule (id 6)
        // should no longer match even a payment-flavored event.
        engine.apply_compliance_profile(Compliance::HIPAA);
        let event = Event::new().with_field("message", "card payment transaction");
        match engine.process(event) {
            FilterOutcome::Pass(_) => {}
            other => panic!("expected pass once PCI rule disabled, got {:?}", other.action()),
        }

        engine.apply_compliance_profile(Compliance::PCI_DSS);
        let event = Event::new().with_field("message", "card payment transaction");
        match engine.process(event) {
            FilterOutcome::Flag(_) => {}
            other => panic!("expected flag once PCI rule re-enabled, got {:?}", other.action()),
        }
    }
}
