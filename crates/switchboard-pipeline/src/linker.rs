//! Cross-event relationship linking: purchase → prior lead.
//!
//! When a purchase arrives with an email we have seen on an earlier lead,
//! the purchase inherits the lead's acquisition block (first touch) if its
//! own is empty, and a directed `lead_to_purchase` edge is recorded exactly
//! once. Linking is an enrichment: every failure here is logged and
//! swallowed so it can never block the fanout.

use std::sync::Arc;

use serde_json::json;
use switchboard_core::{Event, EventType, RELATIONSHIP_LEAD_TO_PURCHASE};

use crate::error::Result;
use crate::store::Store;

/// Purchase → lead attribution carry-over.
pub struct Linker {
    store: Arc<Store>,
}

impl Linker {
    pub fn new(store: Arc<Store>) -> Self {
        Linker { store }
    }

    /// Link a just-persisted purchase to its most recent prior lead.
    ///
    /// Swallows errors by design; returns whether a link was made (for
    /// tests and logging).
    pub fn link_purchase(&self, purchase: &Event) -> bool {
        match self.try_link(purchase) {
            Ok(linked) => linked,
            Err(e) => {
                tracing::warn!(
                    event_id = purchase.id,
                    error = %e,
                    "purchase linking failed; continuing"
                );
                false
            }
        }
    }

    fn try_link(&self, purchase: &Event) -> Result<bool> {
        if purchase.event_type != EventType::Purchase {
            return Ok(false);
        }
        let Some(email) = purchase.email.as_deref().filter(|e| !e.is_empty()) else {
            return Ok(false);
        };

        // Newest first; the first lead that isn't this event wins.
        let candidates = self.store.find_events_by_email(email)?;
        let Some(lead) = candidates
            .iter()
            .find(|e| e.event_type == EventType::Lead && e.id != purchase.id)
        else {
            return Ok(false);
        };

        // Carry the first touch over only when the purchase brought none of
        // its own; purchase-supplied fields are trusted as-is.
        if purchase.acquisition_is_empty() && !lead.acquisition_is_empty() {
            self.store.update_event_acquisition(purchase.id, lead)?;
        }

        let criteria = json!({
            "email": true,
            "ip": lead.ip_address.is_some() && lead.ip_address == purchase.ip_address,
        });
        let inserted = self.store.insert_relationship(
            lead.id,
            purchase.id,
            RELATIONSHIP_LEAD_TO_PURCHASE,
            &criteria,
        )?;
        if inserted {
            tracing::info!(
                lead_id = lead.id,
                purchase_id = purchase.id,
                "linked purchase to prior lead"
            );
        }
        Ok(inserted)
    }
}
