//! Triage policy: keyword lists, issue rules and the CC routing table.
//!
//! These are policy, not mechanism: the defaults below can be replaced
//! wholesale by a JSON file with the same shape.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pipeline::types::RequestCategory;

/// A keyword rule that labels the specific issue inside a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRule {
    pub category: RequestCategory,
    pub issue: String,
    pub keywords: Vec<String>,
}

/// All configurable triage data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriagePolicy {
    /// Keywords per category. Whole-word, case-insensitive; a trailing `*`
    /// matches any word starting with the stem.
    pub keywords: BTreeMap<RequestCategory, Vec<String>>,
    /// Stakeholder addresses CC'd per category.
    pub cc: BTreeMap<RequestCategory, Vec<String>>,
    /// Words that raise an action item to high priority.
    pub urgency_keywords: Vec<String>,
    /// Rooms recognised as the location of an issue, in match order.
    pub locations: Vec<String>,
    /// Ordered issue rules; the first rule of the item's category that
    /// matches wins.
    pub issue_rules: Vec<IssueRule>,
}

impl TriagePolicy {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(format!("triage policy: {e}")))
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for TriagePolicy {
    fn default() -> Self {
        let mut keywords = BTreeMap::new();
        keywords.insert(
            RequestCategory::Maintenance,
            words(&[
                "maintenance",
                "repair*",
                "broken",
                "not working",
                "leak*",
                "pipe*",
                "plumbing",
                "flood*",
                "sink*",
                "toilet*",
                "clog*",
                "drain*",
                "faucet*",
                "water heater",
                "window*",
                "glass",
                "crack*",
                "ac",
                "a/c",
                "air conditioner",
                "air conditioning",
                "heat",
                "heater",
                "heating",
                "hvac",
                "mold",
                "mouse",
                "mice",
                "rat",
                "rats",
                "roach*",
                "cockroach*",
                "pest*",
                "bug*",
                "infestation",
                "light fixture",
                "outlet*",
            ]),
        );
        keywords.insert(
            RequestCategory::AccessRequest,
            words(&[
                "lock*",
                "lockout",
                "locked out",
                "key",
                "keys",
                "key fob",
                "fob",
                "access",
                "let me in",
                "gate code",
                "door code",
            ]),
        );
        keywords.insert(
            RequestCategory::RentInquiry,
            words(&[
                "rent",
                "monthly rent",
                "payment*",
                "pay",
                "paid",
                "balance",
                "invoice*",
                "money order",
                "not paying",
                "late fee*",
                "deposit",
                "lease*",
                "contract",
                "how much",
            ]),
        );
        keywords.insert(
            RequestCategory::General,
            words(&[
                "call me",
                "call back",
                "callback",
                "available",
                "availability",
                "tomorrow",
                "question*",
                "follow up",
                "contact",
                "schedule",
                "parking",
                "package*",
                "noise",
            ]),
        );

        let mut cc = BTreeMap::new();
        cc.insert(
            RequestCategory::Maintenance,
            words(&["maintenance@propertymanager.com"]),
        );
        cc.insert(
            RequestCategory::RentInquiry,
            words(&[
                "accounting@propertymanager.com",
                "leasing@propertymanager.com",
            ]),
        );
        cc.insert(
            RequestCategory::AccessRequest,
            words(&["security@propertymanager.com"]),
        );
        cc.insert(
            RequestCategory::General,
            words(&["support@propertymanager.com"]),
        );

        let issue_rules = vec![
            IssueRule {
                category: RequestCategory::Maintenance,
                issue: "payment withheld due to maintenance".into(),
                keywords: words(&["money order", "not paying", "withhold*"]),
            },
            IssueRule {
                category: RequestCategory::Maintenance,
                issue: "plumbing leak".into(),
                keywords: words(&[
                    "leak*", "pipe*", "plumbing", "flood*", "sink*", "toilet*", "clog*", "drain*",
                    "faucet*",
                ]),
            },
            IssueRule {
                category: RequestCategory::Maintenance,
                issue: "window damage".into(),
                keywords: words(&["window*", "glass", "crack*"]),
            },
            IssueRule {
                category: RequestCategory::Maintenance,
                issue: "hvac issue".into(),
                keywords: words(&[
                    "ac",
                    "a/c",
                    "air conditioner",
                    "air conditioning",
                    "heat",
                    "heater",
                    "heating",
                    "hvac",
                ]),
            },
            IssueRule {
                category: RequestCategory::Maintenance,
                issue: "pest report".into(),
                keywords: words(&[
                    "mouse", "mice", "rat", "rats", "roach*", "cockroach*", "pest*", "bug*",
                    "infestation",
                ]),
            },
            IssueRule {
                category: RequestCategory::AccessRequest,
                issue: "lockout".into(),
                keywords: words(&["lock*", "lockout", "locked out"]),
            },
            IssueRule {
                category: RequestCategory::RentInquiry,
                issue: "rent inquiry".into(),
                keywords: words(&["how much", "monthly rent", "lease*", "contract"]),
            },
            IssueRule {
                category: RequestCategory::RentInquiry,
                issue: "rent confirmation".into(),
                keywords: words(&["rent", "payment*", "paid", "balance"]),
            },
            IssueRule {
                category: RequestCategory::General,
                issue: "tenant requested a phone call".into(),
                keywords: words(&["call me", "call back", "callback", "available"]),
            },
        ];

        Self {
            keywords,
            cc,
            urgency_keywords: words(&["urgent", "emergency", "asap", "immediately"]),
            locations: words(&[
                "kitchen",
                "bathroom",
                "living room",
                "bedroom",
                "garage",
                "hallway",
                "balcony",
                "basement",
            ]),
            issue_rules,
        }
    }
}
