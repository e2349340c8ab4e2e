//! Routing: who receives the reply.
//!
//! The reply always goes to the original sender. Stakeholders are CC'd
//! per category from the policy table; categories without an entry get no
//! CC at all.

use std::collections::{BTreeMap, HashSet};

use crate::pipeline::policy::TriagePolicy;
use crate::pipeline::types::{RequestCategory, RoutingDecision};

#[derive(Debug, Clone)]
pub struct RoutingResolver {
    cc: BTreeMap<RequestCategory, Vec<String>>,
}

impl RoutingResolver {
    pub fn new(policy: &TriagePolicy) -> Self {
        Self {
            cc: policy.cc.clone(),
        }
    }

    /// Resolve recipients. CC keeps table order, drops blanks and
    /// case-insensitive duplicates, and never includes the sender.
    pub fn resolve(&self, category: RequestCategory, sender: &str) -> RoutingDecision {
        let sender_key = sender.trim().to_lowercase();
        let mut seen = HashSet::new();
        seen.insert(sender_key);

        let cc = self
            .cc
            .get(&category)
            .map(|list| {
                list.iter()
                    .map(|addr| addr.trim())
                    .filter(|addr| !addr.is_empty())
                    .filter(|addr| seen.insert(addr.to_lowercase()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        RoutingDecision {
            to: sender.trim().to_string(),
            cc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maintenance_cc_matches_table() {
        let r = RoutingResolver::new(&TriagePolicy::default());
        let d = r.resolve(RequestCategory::Maintenance, "jdoe@example.com");
        assert_eq!(d.to, "jdoe@example.com");
        assert_eq!(d.cc, vec!["maintenance@propertymanager.com"]);
    }

    #[test]
    fn rent_cc_keeps_order() {
        let r = RoutingResolver::new(&TriagePolicy::default());
        let d = r.resolve(RequestCategory::RentInquiry, "t@x.com");
        assert_eq!(
            d.cc,
            vec!["accounting@propertymanager.com", "leasing@propertymanager.com"]
        );
    }

    #[test]
    fn unmapped_category_has_empty_cc() {
        let r = RoutingResolver::new(&TriagePolicy::default());
        let d = r.resolve(RequestCategory::Unclassified, "t@x.com");
        assert_eq!(d.to, "t@x.com");
        assert!(d.cc.is_empty());
    }

    #[test]
    fn duplicates_and_sender_are_removed() {
        let mut policy = TriagePolicy::default();
        policy.cc.insert(
            RequestCategory::General,
            vec![
                "Support@PM.com".into(),
                "support@pm.com".into(),
                "  ".into(),
                "t@x.com".into(),
                "ops@pm.com".into(),
            ],
        );
        let r = RoutingResolver::new(&policy);
        let d = r.resolve(RequestCategory::General, "T@x.com");
        assert_eq!(d.cc, vec!["Support@PM.com", "ops@pm.com"]);
    }

    #[test]
    fn every_category_resolves() {
        let r = RoutingResolver::new(&TriagePolicy::default());
        for category in RequestCategory::ALL {
            let d = r.resolve(category, "t@x.com");
            assert_eq!(d.to, "t@x.com");
            assert!(!d.cc.iter().any(|c| c == "t@x.com"));
        }
    }
}
