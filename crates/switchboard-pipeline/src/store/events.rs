//! Event repository operations.

use rusqlite::{params, Row};
use serde_json::Map;
use switchboard_core::{EmailValidationStatus, Event, EventStatus, EventType};

use crate::error::{Error, Result};

use super::Store;

/// Column list shared by every event SELECT, in [`event_from_row`] order.
const EVENT_COLUMNS: &str = "id, event_id, event_type, email, email_md5, phone, \
     first_name, last_name, ip_address, \
     acq_source, acq_campaign, acq_term, acq_date, acq_form_title, \
     cur_source, cur_medium, cur_campaign, cur_content, cur_term, gclid, ga_client_id, \
     purchase_offer, purchase_publisher, purchase_amount, traffic_source, \
     email_validation_status, zb_last_active, event_data, status, blocked_reason, \
     created_at, updated_at";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let event_type: String = row.get(2)?;
    let validation: Option<String> = row.get(25)?;
    let event_data: String = row.get(27)?;
    let status: String = row.get(28)?;

    Ok(Event {
        id: row.get(0)?,
        event_id: row.get(1)?,
        event_type: EventType::parse(&event_type).unwrap_or(EventType::Lead),
        email: row.get(3)?,
        email_md5: row.get(4)?,
        phone: row.get(5)?,
        first_name: row.get(6)?,
        last_name: row.get(7)?,
        ip_address: row.get(8)?,
        acq_source: row.get(9)?,
        acq_campaign: row.get(10)?,
        acq_term: row.get(11)?,
        acq_date: row.get(12)?,
        acq_form_title: row.get(13)?,
        cur_source: row.get(14)?,
        cur_medium: row.get(15)?,
        cur_campaign: row.get(16)?,
        cur_content: row.get(17)?,
        cur_term: row.get(18)?,
        gclid: row.get(19)?,
        ga_client_id: row.get(20)?,
        purchase_offer: row.get(21)?,
        purchase_publisher: row.get(22)?,
        purchase_amount: row.get(23)?,
        traffic_source: row.get(24)?,
        email_validation_status: validation.as_deref().and_then(EmailValidationStatus::parse),
        zb_last_active: row.get(26)?,
        event_data: serde_json::from_str(&event_data).unwrap_or_default(),
        status: EventStatus::parse(&status).unwrap_or(EventStatus::Pending),
        blocked_reason: row.get(29)?,
        created_at: row.get(30)?,
        updated_at: row.get(31)?,
    })
}

impl Store {
    /// Persist a freshly built event, filling in its row id.
    pub fn insert_event(&self, event: &mut Event) -> Result<i64> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO events (event_id, event_type, email, email_md5, phone, \
                 first_name, last_name, ip_address, \
                 acq_source, acq_campaign, acq_term, acq_date, acq_form_title, \
                 cur_source, cur_medium, cur_campaign, cur_content, cur_term, gclid, ga_client_id, \
                 purchase_offer, purchase_publisher, purchase_amount, traffic_source, \
                 email_validation_status, zb_last_active, event_data, status, blocked_reason, \
                 created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
                 ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31)",
            params![
                event.event_id,
                event.event_type.as_str(),
                event.email,
                event.email_md5,
                event.phone,
                event.first_name,
                event.last_name,
                event.ip_address,
                event.acq_source,
                event.acq_campaign,
                event.acq_term,
                event.acq_date,
                event.acq_form_title,
                event.cur_source,
                event.cur_medium,
                event.cur_campaign,
                event.cur_content,
                event.cur_term,
                event.gclid,
                event.ga_client_id,
                event.purchase_offer,
                event.purchase_publisher,
                event.purchase_amount,
                event.traffic_source,
                event.email_validation_status.map(|s| s.as_str()),
                event.zb_last_active,
                serde_json::to_string(&event.event_data)?,
                event.status.as_str(),
                event.blocked_reason,
                event.created_at,
                event.updated_at,
            ],
        )?;
        event.id = conn.last_insert_rowid();
        Ok(event.id)
    }

    /// Fetch an event by row id.
    pub fn get_event(&self, id: i64) -> Result<Option<Event>> {
        let conn = self.lock_conn();
        let mut stmt =
            conn.prepare(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"))?;
        match stmt.query_row([id], event_from_row) {
            Ok(event) => Ok(Some(event)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::Store(e)),
        }
    }

    /// Fetch an event by its external UUID.
    pub fn get_event_by_uuid(&self, event_uuid: &str) -> Result<Option<Event>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE event_id = ?1"
        ))?;
        match stmt.query_row([event_uuid], event_from_row) {
            Ok(event) => Ok(Some(event)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::Store(e)),
        }
    }

    /// All events sharing an email, newest first.
    pub fn find_events_by_email(&self, email: &str) -> Result<Vec<Event>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE email = ?1 \
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map([email], event_from_row)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Update an event's lifecycle status (and blocked reason, if any).
    pub fn update_event_status(
        &self,
        id: i64,
        status: EventStatus,
        blocked_reason: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "UPDATE events SET status = ?1, blocked_reason = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.as_str(), blocked_reason, Self::now(), id],
        )?;
        Ok(())
    }

    /// Persist the validation verdict onto an event.
    pub fn set_event_email_validation(
        &self,
        id: i64,
        status: EmailValidationStatus,
        zb_last_active: Option<i64>,
    ) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "UPDATE events SET email_validation_status = ?1, zb_last_active = ?2, \
             updated_at = ?3 WHERE id = ?4",
            params![status.as_str(), zb_last_active, Self::now(), id],
        )?;
        Ok(())
    }

    /// Copy acquisition fields onto an event (linker carry-over).
    pub fn update_event_acquisition(&self, id: i64, source: &Event) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "UPDATE events SET acq_source = ?1, acq_campaign = ?2, acq_term = ?3, \
             acq_date = ?4, acq_form_title = ?5, updated_at = ?6 WHERE id = ?7",
            params![
                source.acq_source,
                source.acq_campaign,
                source.acq_term,
                source.acq_date,
                source.acq_form_title,
                Self::now(),
                id,
            ],
        )?;
        Ok(())
    }

    /// Replace an event's opaque `event_data` map.
    pub fn update_event_data(
        &self,
        id: i64,
        event_data: &Map<String, serde_json::Value>,
    ) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "UPDATE events SET event_data = ?1, updated_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(event_data)?, Self::now(), id],
        )?;
        Ok(())
    }

    /// Event counts by status since a timestamp, for stats reporting.
    pub fn count_events_by_status(&self, since: i64) -> Result<Vec<(String, i64)>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM events WHERE created_at >= ?1 GROUP BY status",
        )?;
        let rows = stmt.query_map([since], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_lead(email: &str) -> Event {
        let raw: Map<String, serde_json::Value> = [
            ("email".to_string(), json!(email)),
            ("phone".to_string(), json!("8005550100")),
            ("source".to_string(), json!("ads")),
            ("campaign".to_string(), json!("q3")),
        ]
        .into_iter()
        .collect();
        Event::from_submission(EventType::Lead, &raw)
    }

    #[test]
    fn test_insert_and_get_round_trip() {
        let store = Store::in_memory().unwrap();
        let mut event = sample_lead("a@b.com");
        event.event_data.insert("widget".into(), json!("blue"));

        let id = store.insert_event(&mut event).unwrap();
        assert!(id > 0);
        assert_eq!(event.id, id);

        let loaded = store.get_event(id).unwrap().unwrap();
        assert_eq!(loaded.event_id, event.event_id);
        assert_eq!(loaded.email.as_deref(), Some("a@b.com"));
        assert_eq!(loaded.phone.as_deref(), Some("18005550100"));
        assert_eq!(loaded.acq_source.as_deref(), Some("ads"));
        assert_eq!(loaded.event_data.get("widget"), Some(&json!("blue")));
        assert_eq!(loaded.status, EventStatus::Pending);
    }

    #[test]
    fn test_get_by_uuid() {
        let store = Store::in_memory().unwrap();
        let mut event = sample_lead("a@b.com");
        store.insert_event(&mut event).unwrap();

        let loaded = store.get_event_by_uuid(&event.event_id).unwrap().unwrap();
        assert_eq!(loaded.id, event.id);
        assert!(store.get_event_by_uuid("missing").unwrap().is_none());
    }

    #[test]
    fn test_find_by_email_newest_first() {
        let store = Store::in_memory().unwrap();
        let mut first = sample_lead("same@b.com");
        first.created_at = 1000;
        let mut second = sample_lead("same@b.com");
        second.created_at = 2000;
        let mut other = sample_lead("other@b.com");
        store.insert_event(&mut first).unwrap();
        store.insert_event(&mut second).unwrap();
        store.insert_event(&mut other).unwrap();

        let found = store.find_events_by_email("same@b.com").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, second.id);
        assert_eq!(found[1].id, first.id);
    }

    #[test]
    fn test_update_status_blocked() {
        let store = Store::in_memory().unwrap();
        let mut event = sample_lead("a@b.com");
        store.insert_event(&mut event).unwrap();

        store
            .update_event_status(
                event.id,
                EventStatus::Blocked,
                Some("bot_detected:honeypot_triggered"),
            )
            .unwrap();

        let loaded = store.get_event(event.id).unwrap().unwrap();
        assert_eq!(loaded.status, EventStatus::Blocked);
        assert_eq!(
            loaded.blocked_reason.as_deref(),
            Some("bot_detected:honeypot_triggered")
        );
    }

    #[test]
    fn test_set_email_validation() {
        let store = Store::in_memory().unwrap();
        let mut event = sample_lead("a@b.com");
        store.insert_event(&mut event).unwrap();

        store
            .set_event_email_validation(event.id, EmailValidationStatus::Invalid, Some(90))
            .unwrap();

        let loaded = store.get_event(event.id).unwrap().unwrap();
        assert_eq!(
            loaded.email_validation_status,
            Some(EmailValidationStatus::Invalid)
        );
        assert_eq!(loaded.zb_last_active, Some(90));
    }

    #[test]
    fn test_update_acquisition() {
        let store = Store::in_memory().unwrap();
        let mut lead = sample_lead("a@b.com");
        store.insert_event(&mut lead).unwrap();

        let raw = Map::new();
        let mut purchase = Event::from_submission(EventType::Purchase, &raw);
        store.insert_event(&mut purchase).unwrap();
        assert!(purchase.acquisition_is_empty());

        store.update_event_acquisition(purchase.id, &lead).unwrap();
        let loaded = store.get_event(purchase.id).unwrap().unwrap();
        assert_eq!(loaded.acq_source.as_deref(), Some("ads"));
        assert_eq!(loaded.acq_campaign.as_deref(), Some("q3"));
    }

    #[test]
    fn test_count_by_status() {
        let store = Store::in_memory().unwrap();
        let mut a = sample_lead("a@b.com");
        let mut b = sample_lead("b@b.com");
        store.insert_event(&mut a).unwrap();
        store.insert_event(&mut b).unwrap();
        store
            .update_event_status(b.id, EventStatus::Blocked, Some("bot"))
            .unwrap();

        let counts = store.count_events_by_status(0).unwrap();
        let get = |status: &str| {
            counts
                .iter()
                .find(|(s, _)| s == status)
                .map(|(_, n)| *n)
                .unwrap_or(0)
        };
        assert_eq!(get("pending"), 1);
        assert_eq!(get("blocked"), 1);
    }
}
