//! Tenant Triage: answers tenant email and records the work it implies.

pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod store;
pub mod tenants;
