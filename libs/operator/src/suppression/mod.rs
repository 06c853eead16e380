//! Component I: active silences and maintenance windows, and the
//! `isSuppressed` gate the delivery path consults (§4.I).

pub mod rrule;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::cache::ObjectKey;
use rrule::Rrule;
use yuptime_crd::{MatchSubject, Selector};

#[derive(Clone, Debug)]
pub struct SilenceEntry {
    pub expires_at: DateTime<Utc>,
    pub selector: Selector,
    pub reason: Option<String>,
}

#[derive(Clone, Debug)]
pub struct WindowEntry {
    pub selector: Selector,
    pub rrule: Option<Rrule>,
    pub dtstart: DateTime<Utc>,
    pub duration: chrono::Duration,
    /// Cached next occurrence start; advanced lazily when stale (§4.I, §9).
    pub next_occurrence: DateTime<Utc>,
}

#[derive(Default)]
pub struct SuppressionIndex {
    silences: HashMap<ObjectKey, SilenceEntry>,
    windows: HashMap<ObjectKey, WindowEntry>,
}

pub struct SuppressionResult {
    pub suppressed: bool,
    pub reason: Option<String>,
}

impl SuppressionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_silence(&mut self, key: ObjectKey, entry: SilenceEntry) {
        self.silences.insert(key, entry);
    }

    pub fn remove_silence(&mut self, key: &ObjectKey) {
        self.silences.remove(key);
    }

    pub fn upsert_window(&mut self, key: ObjectKey, entry: WindowEntry) {
        self.windows.insert(key, entry);
    }

    pub fn remove_window(&mut self, key: &ObjectKey) {
        self.windows.remove(key);
    }

    /// Drops expired silences; not load-bearing for correctness (every
    /// `is_suppressed` call re-checks expiry), purely a memory hygiene pass.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) {
        self.silences.retain(|_, s| now <= s.expires_at);
    }

    pub fn is_suppressed(&mut self, subject: &MatchSubject<'_>, now: DateTime<Utc>) -> SuppressionResult {
        for entry in self.silences.values() {
            if now <= entry.expires_at && entry.selector.matches(subject) {
                let reason = match &entry.reason {
                    Some(r) => format!("Silenced by: {r}"),
                    None => "Silenced by: silence".to_string(),
                };
                return SuppressionResult {
                    suppressed: true,
                    reason: Some(reason),
                };
            }
        }

        for entry in self.windows.values_mut() {
            if !entry.selector.matches(subject) {
                continue;
            }
            if let Some(rrule) = &entry.rrule {
                while entry.next_occurrence + entry.duration <= now {
                    match rrule.next_occurrence(entry.dtstart, entry.next_occurrence + entry.duration) {
                        Some(next) => entry.next_occurrence = next,
                        None => break,
                    }
                }
            }
            if now >= entry.next_occurrence && now < entry.next_occurrence + entry.duration {
                return SuppressionResult {
                    suppressed: true,
                    reason: Some("In maintenance window: recurring".to_string()),
                };
            }
        }

        SuppressionResult {
            suppressed: false,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::BTreeMap;

    fn subject<'a>(ns: &'a str, name: &'a str, labels: &'a BTreeMap<String, String>) -> MatchSubject<'a> {
        MatchSubject {
            namespace: ns,
            name,
            labels,
            tags: &[],
        }
    }

    #[test]
    fn active_silence_suppresses_matching_subject() {
        let mut index = SuppressionIndex::new();
        let mut labels = BTreeMap::new();
        labels.insert("service".to_string(), "db".to_string());
        index.upsert_silence(
            ObjectKey::new(crate::cache::Kind::Silence, "default", "sil1"),
            SilenceEntry {
                expires_at: Utc::now() + Duration::hours(1),
                selector: Selector {
                    match_namespaces: None,
                    match_names: None,
                    match_labels: Some(labels.clone()),
                    match_expressions: None,
                    match_tags: None,
                },
                reason: Some("maintenance".into()),
            },
        );
        let result = index.is_suppressed(&subject("default", "m1", &labels), Utc::now());
        assert!(result.suppressed);
        assert!(result.reason.unwrap().starts_with("Silenced by:"));
    }

    #[test]
    fn expired_silence_does_not_suppress() {
        let mut index = SuppressionIndex::new();
        let labels = BTreeMap::new();
        index.upsert_silence(
            ObjectKey::new(crate::cache::Kind::Silence, "default", "sil1"),
            SilenceEntry {
                expires_at: Utc::now() - Duration::seconds(1),
                selector: Selector {
                    match_namespaces: None,
                    match_names: None,
                    match_labels: None,
                    match_expressions: None,
                    match_tags: None,
                },
                reason: None,
            },
        );
        let result = index.is_suppressed(&subject("default", "m1", &labels), Utc::now());
        assert!(!result.suppressed);
    }

    #[test]
    fn window_suppresses_during_occurrence() {
        let mut index = SuppressionIndex::new();
        let labels = BTreeMap::new();
        let now = Utc::now();
        index.upsert_window(
            ObjectKey::new(crate::cache::Kind::MaintenanceWindow, "default", "mw1"),
            WindowEntry {
                selector: Selector {
                    match_namespaces: None,
                    match_names: None,
                    match_labels: None,
                    match_expressions: None,
                    match_tags: None,
                },
                rrule: None,
                dtstart: now - Duration::minutes(5),
                duration: Duration::hours(2),
                next_occurrence: now - Duration::minutes(5),
            },
        );
        let result = index.is_suppressed(&subject("default", "m1", &labels), now);
        assert!(result.suppressed);
        assert!(result.reason.unwrap().starts_with("In maintenance window:"));
    }
}
