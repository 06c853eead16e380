//! The policy/provider view the alert engine reads (§4.B "refresh the
//! policy view", §9 "cyclic references ... resolved by name at use").

use std::collections::HashMap;

use yuptime_crd::{NotificationPolicySpec, NotificationProviderSpec};

#[derive(Clone)]
pub struct NamedPolicy {
    pub name: String,
    pub spec: NotificationPolicySpec,
}

#[derive(Default)]
pub struct PolicyView {
    policies: HashMap<String, NotificationPolicySpec>,
    providers: HashMap<String, NotificationProviderSpec>,
}

impl PolicyView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_policy(&mut self, name: String, spec: NotificationPolicySpec) {
        self.policies.insert(name, spec);
    }

    pub fn remove_policy(&mut self, name: &str) {
        self.policies.remove(name);
    }

    pub fn upsert_provider(&mut self, name: String, spec: NotificationProviderSpec) {
        self.providers.insert(name, spec);
    }

    pub fn remove_provider(&mut self, name: &str) {
        self.providers.remove(name);
    }

    pub fn provider(&self, name: &str) -> Option<&NotificationProviderSpec> {
        self.providers.get(name)
    }

    /// Matching policies ordered by descending priority, ties broken by name
    /// for determinism.
    pub fn matching(&self, subject: &yuptime_crd::MatchSubject<'_>) -> Vec<NamedPolicy> {
        let mut matched: Vec<NamedPolicy> = self
            .policies
            .iter()
            .filter(|(_, spec)| spec.match_.matches(subject))
            .map(|(name, spec)| NamedPolicy {
                name: name.clone(),
                spec: spec.clone(),
            })
            .collect();
        matched.sort_by(|a, b| b.spec.priority.cmp(&a.spec.priority).then(a.name.cmp(&b.name)));
        matched
    }
}
