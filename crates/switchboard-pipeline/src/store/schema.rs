//! Idempotent DDL for the Switchboard store.
//!
//! No migration tooling: every statement is `IF NOT EXISTS` and executed at
//! open. Timestamps are Unix epoch seconds so queue scheduling stays integer
//! arithmetic.

/// All tables and indices, executed as one batch at open.
pub const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id TEXT NOT NULL UNIQUE,
    event_type TEXT NOT NULL,
    email TEXT,
    email_md5 TEXT,
    phone TEXT,
    first_name TEXT,
    last_name TEXT,
    ip_address TEXT,
    acq_source TEXT,
    acq_campaign TEXT,
    acq_term TEXT,
    acq_date TEXT,
    acq_form_title TEXT,
    cur_source TEXT,
    cur_medium TEXT,
    cur_campaign TEXT,
    cur_content TEXT,
    cur_term TEXT,
    gclid TEXT,
    ga_client_id TEXT,
    purchase_offer TEXT,
    purchase_publisher TEXT,
    purchase_amount REAL,
    traffic_source TEXT,
    email_validation_status TEXT,
    zb_last_active INTEGER,
    event_data TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL DEFAULT 'pending',
    blocked_reason TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_email ON events (email);
CREATE INDEX IF NOT EXISTS idx_events_email_md5 ON events (email_md5);
CREATE INDEX IF NOT EXISTS idx_events_status ON events (status);

CREATE TABLE IF NOT EXISTS platforms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    platform_code TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    platform_type TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 0,
    api_config TEXT NOT NULL DEFAULT '{}',
    timeout_secs INTEGER NOT NULL DEFAULT 30,
    max_retries INTEGER NOT NULL DEFAULT 3,
    retry_delay_secs INTEGER NOT NULL DEFAULT 2,
    requires_valid_email INTEGER NOT NULL DEFAULT 1,
    priority INTEGER NOT NULL DEFAULT 100
);

CREATE TABLE IF NOT EXISTS routing_rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type TEXT NOT NULL,
    platform_id INTEGER NOT NULL REFERENCES platforms(id) ON DELETE CASCADE,
    conditions TEXT,
    priority INTEGER NOT NULL DEFAULT 100,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_rules_event_type ON routing_rules (event_type, priority);

CREATE TABLE IF NOT EXISTS processing_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    platform_id INTEGER NOT NULL REFERENCES platforms(id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'pending',
    attempts INTEGER NOT NULL DEFAULT 0,
    max_retries INTEGER NOT NULL DEFAULT 3,
    process_after INTEGER NOT NULL,
    locked_until INTEGER,
    locked_by TEXT,
    response_code INTEGER,
    response_body TEXT,
    revenue_amount REAL,
    revenue_status TEXT,
    skip_reason TEXT,
    created_at INTEGER NOT NULL,
    processed_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_queue_status_after ON processing_queue (status, process_after);
CREATE INDEX IF NOT EXISTS idx_queue_event_platform ON processing_queue (event_id, platform_id);
CREATE INDEX IF NOT EXISTS idx_queue_locked_until ON processing_queue (locked_until);

CREATE TABLE IF NOT EXISTS processing_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL,
    platform_id INTEGER NOT NULL,
    job_id INTEGER,
    action TEXT NOT NULL,
    request_fields TEXT,
    response_code INTEGER,
    response_body TEXT,
    success INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_log_created ON processing_log (created_at);

CREATE TABLE IF NOT EXISTS event_relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    child_event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    relationship_type TEXT NOT NULL,
    match_criteria TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    UNIQUE (parent_event_id, child_event_id, relationship_type)
);

CREATE TABLE IF NOT EXISTS revenue_tracking (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    platform_id INTEGER NOT NULL REFERENCES platforms(id) ON DELETE CASCADE,
    gross_amount REAL NOT NULL,
    net_amount REAL NOT NULL,
    currency TEXT NOT NULL DEFAULT 'USD',
    status TEXT NOT NULL DEFAULT 'pending',
    notes TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_revenue_event ON revenue_tracking (event_id, platform_id);

CREATE TABLE IF NOT EXISTS bot_registry (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identifier_type TEXT NOT NULL,
    identifier_value TEXT NOT NULL,
    detection_method TEXT NOT NULL,
    honeypot_fields TEXT NOT NULL DEFAULT '[]',
    attempt_count INTEGER NOT NULL DEFAULT 1,
    severity TEXT NOT NULL DEFAULT 'low',
    associated_emails TEXT NOT NULL DEFAULT '[]',
    associated_phones TEXT NOT NULL DEFAULT '[]',
    associated_ips TEXT NOT NULL DEFAULT '[]',
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,
    UNIQUE (identifier_type, identifier_value)
);

CREATE TABLE IF NOT EXISTS email_validation_registry (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    email_md5 TEXT NOT NULL,
    status TEXT NOT NULL,
    substatus TEXT,
    raw_status TEXT,
    raw_substatus TEXT,
    active_in_days INTEGER,
    free_email INTEGER,
    mx_found INTEGER,
    validation_count INTEGER NOT NULL DEFAULT 1,
    first_validated_at INTEGER NOT NULL,
    last_validated_at INTEGER NOT NULL,
    first_seen_valid_at INTEGER,
    first_seen_invalid_at INTEGER,
    status_history TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_email_validation_md5 ON email_validation_registry (email_md5);

CREATE TABLE IF NOT EXISTS validation_usage (
    day TEXT PRIMARY KEY,
    count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS analytics_daily (
    day TEXT PRIMARY KEY,
    events_accepted INTEGER NOT NULL DEFAULT 0,
    events_blocked INTEGER NOT NULL DEFAULT 0,
    jobs_completed INTEGER NOT NULL DEFAULT 0,
    jobs_failed INTEGER NOT NULL DEFAULT 0,
    jobs_skipped INTEGER NOT NULL DEFAULT 0,
    revenue_gross REAL NOT NULL DEFAULT 0,
    computed_at INTEGER NOT NULL
);
";
