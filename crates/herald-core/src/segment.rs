//! Segmentation: turning a declarative targeting rule into recipients.
//!
//! A campaign stores a rule set in the wire format
//! `{ "rules": [ { "type": "...", "values": [...] } ] }`. Only the first
//! rule is authoritative; rule conjunction is not supported and extra rules
//! are ignored. Unknown or malformed rule types degrade to `all` so a typo
//! in the console widens rather than silently drops a send.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Participant, ParticipantId};

/// Targeting rule set as stored on jobs, automations, and follow-ups.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentationConfig {
    /// Ordered rules; only the first is evaluated.
    #[serde(default)]
    pub rules: Vec<SegmentRule>,
}

impl SegmentationConfig {
    /// Rule set targeting every participant of the event.
    pub fn all() -> Self {
        Self {
            rules: vec![SegmentRule::untyped("all")],
        }
    }

    /// Rule set targeting an explicit participant list.
    ///
    /// Used by the scheduler when a follow-up resolves its recipients from
    /// the base job's delivery logs.
    pub fn custom(ids: &[ParticipantId]) -> Self {
        Self {
            rules: vec![SegmentRule {
                kind: "custom".to_string(),
                values: ids.iter().map(|id| id.0.to_string()).collect(),
            }],
        }
    }

    /// The authoritative rule, if any. An empty rule list targets everyone.
    pub fn first_rule(&self) -> Option<&SegmentRule> {
        self.rules.first()
    }
}

/// One targeting rule in the wire format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentRule {
    /// Rule discriminator: `all`, `registered_only`, `invited_only`,
    /// `vip_only`, `company`, `language`, or `custom`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Rule operands; meaning depends on `kind`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl SegmentRule {
    fn untyped(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            values: Vec::new(),
        }
    }
}

/// Filters an event's participants down to the recipients a rule set
/// selects.
///
/// Pure over the already-loaded participant list; the caller scopes the
/// input to one event. Order of the input is preserved.
pub fn resolve(participants: Vec<Participant>, config: &SegmentationConfig) -> Vec<Participant> {
    let Some(rule) = config.first_rule() else {
        return participants;
    };

    match rule.kind.as_str() {
        "registered_only" => participants
            .into_iter()
            .filter(|p| p.status.is_registered())
            .collect(),
        "invited_only" => participants
            .into_iter()
            .filter(|p| !p.status.is_registered())
            .collect(),
        "vip_only" => participants.into_iter().filter(|p| p.is_vip).collect(),
        "company" => {
            let wanted: HashSet<&str> = rule.values.iter().map(String::as_str).collect();
            participants
                .into_iter()
                .filter(|p| p.company.as_deref().is_some_and(|c| wanted.contains(c)))
                .collect()
        },
        "language" => {
            let wanted: HashSet<&str> = rule.values.iter().map(String::as_str).collect();
            participants
                .into_iter()
                .filter(|p| p.language.as_deref().is_some_and(|l| wanted.contains(l)))
                .collect()
        },
        "custom" => {
            // Unparseable ids are dropped rather than widening the set.
            let wanted: HashSet<Uuid> = rule
                .values
                .iter()
                .filter_map(|v| v.parse::<Uuid>().ok())
                .collect();
            participants
                .into_iter()
                .filter(|p| wanted.contains(&p.id.0))
                .collect()
        },
        // "all" and anything unrecognized.
        _ => participants,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventId, ParticipantStatus};

    fn participant(name: &str) -> Participant {
        Participant {
            id: ParticipantId::new(),
            event_id: EventId::new(),
            name: name.to_string(),
            email: Some(format!("{name}@example.com")),
            phone: None,
            company: None,
            language: None,
            is_vip: false,
            status: ParticipantStatus::Invited,
        }
    }

    fn rule_set(kind: &str, values: &[&str]) -> SegmentationConfig {
        SegmentationConfig {
            rules: vec![SegmentRule {
                kind: kind.to_string(),
                values: values.iter().map(|v| v.to_string()).collect(),
            }],
        }
    }

    #[test]
    fn vip_only_selects_exactly_the_vips() {
        let mut all = Vec::new();
        for i in 0..5 {
            let mut p = participant(&format!("vip{i}"));
            p.is_vip = true;
            all.push(p);
        }
        for i in 0..10 {
            all.push(participant(&format!("regular{i}")));
        }

        let resolved = resolve(all, &rule_set("vip_only", &[]));

        assert_eq!(resolved.len(), 5);
        assert!(resolved.iter().all(|p| p.is_vip));
    }

    #[test]
    fn registered_includes_checked_in() {
        let mut registered = participant("reg");
        registered.status = ParticipantStatus::Registered;
        let mut checked_in = participant("checkin");
        checked_in.status = ParticipantStatus::CheckedIn;
        let invited = participant("invited");

        let resolved = resolve(
            vec![registered, checked_in, invited],
            &rule_set("registered_only", &[]),
        );

        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn company_rule_matches_listed_companies() {
        let mut acme = participant("acme");
        acme.company = Some("Acme".to_string());
        let mut globex = participant("globex");
        globex.company = Some("Globex".to_string());
        let unaffiliated = participant("solo");

        let resolved = resolve(
            vec![acme, globex, unaffiliated],
            &rule_set("company", &["Acme"]),
        );

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name, "acme");
    }

    #[test]
    fn custom_rule_keeps_only_listed_ids_and_skips_garbage() {
        let a = participant("a");
        let b = participant("b");
        let a_id = a.id.to_string();

        let resolved = resolve(
            vec![a, b],
            &rule_set("custom", &[&a_id, "not-a-uuid"]),
        );

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name, "a");
    }

    #[test]
    fn unknown_rule_falls_back_to_all() {
        let all = vec![participant("a"), participant("b")];

        let resolved = resolve(all, &rule_set("frequent_flyers", &[]));

        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn only_the_first_rule_applies() {
        let mut vip = participant("vip");
        vip.is_vip = true;
        let regular = participant("regular");

        let config = SegmentationConfig {
            rules: vec![
                SegmentRule {
                    kind: "all".to_string(),
                    values: Vec::new(),
                },
                SegmentRule {
                    kind: "vip_only".to_string(),
                    values: Vec::new(),
                },
            ],
        };

        let resolved = resolve(vec![vip, regular], &config);

        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn wire_format_round_trips() {
        let json = r#"{"rules":[{"type":"company","values":["Acme"]}]}"#;
        let config: SegmentationConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.first_rule().unwrap().kind, "company");
        assert_eq!(serde_json::to_string(&config).unwrap(), json);
    }
}
