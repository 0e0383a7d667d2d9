//! Revenue attribution and cross-event relationship records.

use serde::{Deserialize, Serialize};

/// Canonical relationship type linking a purchase back to its lead.
pub const RELATIONSHIP_LEAD_TO_PURCHASE: &str = "lead_to_purchase";

/// Settlement state of a revenue record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RevenueStatus {
    Pending,
    Confirmed,
    Paid,
    Rejected,
    Refunded,
}

impl RevenueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevenueStatus::Pending => "pending",
            RevenueStatus::Confirmed => "confirmed",
            RevenueStatus::Paid => "paid",
            RevenueStatus::Rejected => "rejected",
            RevenueStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RevenueStatus::Pending),
            "confirmed" => Some(RevenueStatus::Confirmed),
            "paid" => Some(RevenueStatus::Paid),
            "rejected" => Some(RevenueStatus::Rejected),
            "refunded" => Some(RevenueStatus::Refunded),
            _ => None,
        }
    }
}

/// Revenue attributed to one (event, platform) delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueRecord {
    pub id: i64,
    pub event_id: i64,
    pub platform_id: i64,
    pub gross_amount: f64,
    pub net_amount: f64,
    pub currency: String,
    pub status: RevenueStatus,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A directed edge between two events (parent → child).
///
/// Only `lead → purchase` edges are ever created, which keeps the
/// relationship graph acyclic without a traversal check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRelationship {
    pub id: i64,
    pub parent_event_id: i64,
    pub child_event_id: i64,
    pub relationship_type: String,
    /// Structured matching criteria, e.g. `{"email": true, "ip": false}`.
    pub match_criteria: serde_json::Value,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revenue_status_round_trip() {
        for st in [
            RevenueStatus::Pending,
            RevenueStatus::Confirmed,
            RevenueStatus::Paid,
            RevenueStatus::Rejected,
            RevenueStatus::Refunded,
        ] {
            assert_eq!(RevenueStatus::parse(st.as_str()).unwrap(), st);
        }
        assert!(RevenueStatus::parse("chargeback").is_none());
    }
}
