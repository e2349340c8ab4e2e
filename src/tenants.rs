//! Tenant directory: what we know about each sender.
//!
//! The directory is read-only and injected into the dispatcher. The built-in
//! sample data stands in for a property-management database; a JSON file
//! with the same shape can replace it.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Lease start and end dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseTerm {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStatus {
    Open,
    Scheduled,
    Completed,
}

/// A past maintenance request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceEvent {
    pub date: NaiveDate,
    pub description: String,
    pub status: MaintenanceStatus,
}

/// What we know about a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub name: String,
    pub unit: String,
    #[serde(default)]
    pub lease: Option<LeaseTerm>,
    /// Positive means the tenant owes money; negative is a credit.
    #[serde(default)]
    pub balance_due: Option<Decimal>,
    /// Most recent first.
    #[serde(default)]
    pub recent_maintenance: Vec<MaintenanceEvent>,
}

/// Lookup of tenant records by sender address.
pub trait TenantDirectory: Send + Sync {
    /// `None` means the sender is not a known tenant.
    fn lookup(&self, sender: &str) -> Option<TenantContext>;
}

/// In-memory directory keyed by lower-cased email address.
#[derive(Debug, Clone, Default)]
pub struct StaticTenantDirectory {
    tenants: HashMap<String, TenantContext>,
}

impl StaticTenantDirectory {
    pub fn new(tenants: HashMap<String, TenantContext>) -> Self {
        let tenants = tenants
            .into_iter()
            .map(|(email, ctx)| (email.trim().to_lowercase(), ctx))
            .collect();
        Self { tenants }
    }

    /// Load a directory from a JSON object of `address -> TenantContext`.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let tenants: HashMap<String, TenantContext> = serde_json::from_str(raw)
            .map_err(|e| ConfigError::ParseError(format!("tenant directory: {e}")))?;
        Ok(Self::new(tenants))
    }

    /// Built-in sample tenants.
    pub fn sample() -> Self {
        let mut tenants = HashMap::new();
        tenants.insert(
            "schaudhry216@gmail.com".to_string(),
            TenantContext {
                name: "Shane Chaudhry".into(),
                unit: "2A".into(),
                lease: lease(2024, 5, 1, 2025, 4, 30),
                balance_due: Some(Decimal::ZERO),
                recent_maintenance: vec![
                    event(2025, 4, 10, "AC repair", MaintenanceStatus::Completed),
                    event(2025, 3, 18, "Plumbing issue", MaintenanceStatus::Completed),
                ],
            },
        );
        tenants.insert(
            "janedoe@example.com".to_string(),
            TenantContext {
                name: "Jane Doe".into(),
                unit: "3B".into(),
                lease: lease(2023, 10, 1, 2024, 9, 30),
                balance_due: Some(Decimal::new(15000, 2)),
                recent_maintenance: Vec::new(),
            },
        );
        tenants.insert(
            "david.smith@renters.net".to_string(),
            TenantContext {
                name: "David Smith".into(),
                unit: "1C".into(),
                lease: lease(2024, 1, 15, 2024, 12, 31),
                balance_due: Some(Decimal::new(7500, 2)),
                recent_maintenance: vec![event(
                    2024,
                    1,
                    22,
                    "Broken heater",
                    MaintenanceStatus::Completed,
                )],
            },
        );
        tenants.insert(
            "maria.lopez@samplemail.com".to_string(),
            TenantContext {
                name: "Maria Lopez".into(),
                unit: "4D".into(),
                lease: lease(2023, 8, 1, 2024, 7, 31),
                balance_due: Some(Decimal::ZERO),
                recent_maintenance: vec![
                    event(2024, 3, 2, "Light fixture flickering", MaintenanceStatus::Open),
                    event(2024, 2, 12, "Window jammed", MaintenanceStatus::Scheduled),
                ],
            },
        );
        Self::new(tenants)
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

impl TenantDirectory for StaticTenantDirectory {
    fn lookup(&self, sender: &str) -> Option<TenantContext> {
        self.tenants.get(&sender.trim().to_lowercase()).cloned()
    }
}

fn lease(sy: i32, sm: u32, sd: u32, ey: i32, em: u32, ed: u32) -> Option<LeaseTerm> {
    Some(LeaseTerm {
        start: NaiveDate::from_ymd_opt(sy, sm, sd)?,
        end: NaiveDate::from_ymd_opt(ey, em, ed)?,
    })
}

fn event(y: i32, m: u32, d: u32, description: &str, status: MaintenanceStatus) -> MaintenanceEvent {
    MaintenanceEvent {
        date: NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default(),
        description: description.to_string(),
        status,
    }
}
