//! The processor: intake orchestration and job execution.
//!
//! Intake path: build → validate → (block or) persist → link → route →
//! enqueue fanout. The event is accepted once persisted; enqueue failures
//! after that are logged and skipped (at-least-once fanout), never rolled
//! back.
//!
//! Job execution path: load event and platform (fatal if missing), run the
//! platform's adapter, and translate the outcome into a queue transition.
//! The validation platform takes a distinguished path whose verdict can
//! cancel the event's still-pending siblings.

use std::sync::Arc;

use metrics::counter;
use serde_json::{json, Map, Value};
use switchboard_core::{
    map_zerobounce_status, EmailValidationStatus, Event, EventStatus, EventType,
    PlatformDefinition, PlatformType, QueueJob,
};

use crate::adapters::{AdapterError, AdapterFactory, PlatformAdapter, SendOutcome};
use crate::error::Result;
use crate::linker::Linker;
use crate::queue::Queue;
use crate::router::Router;
use crate::store::{ProcessingLogEntry, Store};
use crate::validator::{Validator, ValidatorConfig};

/// Processor knobs.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub validator: ValidatorConfig,
    /// Daily budget of outbound validation calls.
    pub validation_daily_limit: u32,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            validator: ValidatorConfig::default(),
            validation_daily_limit: switchboard_core::DEFAULT_VALIDATION_DAILY_LIMIT,
        }
    }
}

/// What intake decided about one submission.
#[derive(Debug, Clone)]
pub struct IntakeOutcome {
    pub success: bool,
    /// External event UUID handed back to the submitter.
    pub event_id: String,
    pub status: EventStatus,
    pub blocked_reason: Option<String>,
    pub queued_platforms: usize,
    pub errors: Vec<String>,
}

/// The queue transition a job execution ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Retried,
    Failed,
    Skipped,
}

/// Orchestrates intake and job execution.
pub struct Processor {
    store: Arc<Store>,
    router: Arc<Router>,
    queue: Arc<Queue>,
    validator: Validator,
    linker: Linker,
    adapters: Arc<AdapterFactory>,
    config: ProcessorConfig,
}

impl Processor {
    pub fn new(
        store: Arc<Store>,
        router: Arc<Router>,
        queue: Arc<Queue>,
        adapters: Arc<AdapterFactory>,
        config: ProcessorConfig,
    ) -> Self {
        let validator = Validator::new(Arc::clone(&store), config.validator.clone());
        let linker = Linker::new(Arc::clone(&store));
        Processor {
            store,
            router,
            queue,
            validator,
            linker,
            adapters,
            config,
        }
    }

    // =========================================================================
    // Intake path
    // =========================================================================

    /// Accept one raw submission: validate, persist, link, fan out.
    pub fn intake(&self, event_type: EventType, raw: &Map<String, Value>) -> Result<IntakeOutcome> {
        counter!("intake_events_total").increment(1);
        let mut event = Event::from_submission(event_type, raw);
        let verdict = self.validator.validate(&event, raw);

        if !verdict.valid {
            let reason = match &verdict.bot_reason {
                Some(bot_reason) => format!("bot_detected:{bot_reason}"),
                None => format!("validation_failed:{}", verdict.errors.join(",")),
            };
            event.status = EventStatus::Blocked;
            event.blocked_reason = Some(reason.clone());
            self.store.insert_event(&mut event)?;
            counter!("intake_events_blocked_total").increment(1);
            tracing::info!(event_id = %event.event_id, reason = %reason, "submission blocked");
            return Ok(IntakeOutcome {
                success: false,
                event_id: event.event_id,
                status: EventStatus::Blocked,
                blocked_reason: Some(reason),
                queued_platforms: 0,
                errors: verdict.errors,
            });
        }

        // Carry a cached verdict onto the event so skip checks see it
        // before any fresh validation lands.
        event.email_validation_status = verdict.email_status;
        self.store.insert_event(&mut event)?;
        counter!("intake_events_accepted_total").increment(1);

        if event.event_type == EventType::Purchase {
            self.linker.link_purchase(&event);
        }

        // Fan out. Failures past this point are logged, not rolled back.
        let targets = self.router.routes_for_event(&event);
        let mut queued = 0usize;
        let mut target_ids = Vec::with_capacity(targets.len());
        for platform in &targets {
            target_ids.push(platform.id);
            match self
                .queue
                .enqueue(event.id, platform.id, 0, platform.max_retries)
            {
                Ok(_) => queued += 1,
                Err(e) => {
                    tracing::error!(
                        event_id = %event.event_id,
                        platform = %platform.platform_code,
                        error = %e,
                        "fanout enqueue failed; continuing"
                    );
                }
            }
        }

        // Validation-first job when the email verdict is missing or stale.
        if verdict.needs_revalidation && event.email.is_some() {
            if let Some(validation) = self.router.validation_platform() {
                if !target_ids.contains(&validation.id) {
                    match self
                        .queue
                        .enqueue(event.id, validation.id, 0, validation.max_retries)
                    {
                        Ok(_) => queued += 1,
                        Err(e) => {
                            tracing::error!(
                                event_id = %event.event_id,
                                error = %e,
                                "validation enqueue failed; continuing"
                            );
                        }
                    }
                }
            }
        }

        let status = if queued > 0 {
            EventStatus::Processing
        } else {
            // Nothing to deliver: the event is already done.
            EventStatus::Completed
        };
        self.store.update_event_status(event.id, status, None)?;

        tracing::info!(
            event_id = %event.event_id,
            event_type = event_type.as_str(),
            queued,
            "submission accepted"
        );
        Ok(IntakeOutcome {
            success: true,
            event_id: event.event_id,
            status,
            blocked_reason: None,
            queued_platforms: queued,
            errors: verdict.errors,
        })
    }

    // =========================================================================
    // Job execution path
    // =========================================================================

    /// Execute one leased job to a terminal or retried state.
    pub async fn execute_job(&self, job: &QueueJob, worker_id: &str) -> Result<JobOutcome> {
        let Some(event) = self.store.get_event(job.event_id)? else {
            tracing::error!(job_id = job.id, event_id = job.event_id, "event missing");
            self.queue.fail(job, worker_id, "event not found")?;
            return Ok(JobOutcome::Failed);
        };

        // Active cache first; a platform deactivated after enqueue is a
        // skip, one that vanished entirely is a failure.
        let platform = match self.router.platform_by_id(job.platform_id) {
            Some(platform) => platform,
            None => match self.store.get_platform(job.platform_id)? {
                Some(inactive) => {
                    tracing::info!(
                        job_id = job.id,
                        platform = %inactive.platform_code,
                        "platform deactivated; skipping"
                    );
                    self.queue.skip(job, worker_id, "Platform not active")?;
                    return Ok(JobOutcome::Skipped);
                }
                None => {
                    tracing::error!(job_id = job.id, platform_id = job.platform_id, "platform missing");
                    self.queue.fail(job, worker_id, "platform not found")?;
                    return Ok(JobOutcome::Failed);
                }
            },
        };

        let adapter = match self.adapters.build(&platform) {
            Ok(adapter) => adapter,
            Err(e) => {
                // ConfigInvalid is fatal for this platform until an operator
                // fixes it; burning retries would not help.
                tracing::error!(
                    job_id = job.id,
                    platform = %platform.platform_code,
                    error = %e,
                    "adapter construction failed"
                );
                self.queue.fail(job, worker_id, &e.to_string())?;
                return Ok(JobOutcome::Failed);
            }
        };

        if platform.platform_type == PlatformType::Validation {
            return self
                .validation_path(&event, &platform, adapter.as_ref(), job, worker_id)
                .await;
        }

        if let Some(reason) = should_skip(&event, &platform) {
            tracing::debug!(job_id = job.id, platform = %platform.platform_code, reason, "skipping");
            self.queue.skip(job, worker_id, "Platform conditions not met")?;
            self.maybe_finalize_event(event.id)?;
            return Ok(JobOutcome::Skipped);
        }

        counter!("adapter_sends_total", "platform" => platform.platform_code.clone()).increment(1);
        let result = adapter.send(&event).await;
        self.log_send(&event, &platform, job, adapter.as_ref(), &result);

        match result {
            Ok(outcome) if outcome.success => {
                self.queue.complete(
                    job,
                    worker_id,
                    outcome.response_code,
                    outcome.platform_response.as_deref(),
                )?;
                if let Some(revenue) = outcome.revenue.filter(|r| *r > 0.0) {
                    self.store.record_revenue(
                        event.id,
                        platform.id,
                        revenue,
                        Some(&format!("{} delivery", platform.platform_code)),
                    )?;
                    self.store.set_job_revenue(job.id, revenue, "pending")?;
                    counter!("adapter_revenue_cents_total")
                        .increment((revenue * 100.0).round() as u64);
                }
                self.apply_post_response_updates(&event, &platform, &outcome)?;
                self.maybe_finalize_event(event.id)?;
                Ok(JobOutcome::Completed)
            }
            Ok(outcome) => {
                let error = outcome
                    .error
                    .unwrap_or_else(|| "platform rejected the delivery".to_string());
                self.retry_or_fail(job, worker_id, &error, true).await
            }
            Err(e) => {
                counter!("adapter_send_errors_total", "platform" => platform.platform_code.clone())
                    .increment(1);
                self.retry_or_fail(job, worker_id, &e.to_string(), e.is_retryable())
                    .await
            }
        }
    }

    /// The distinguished validation-first path (its verdict gates siblings).
    async fn validation_path(
        &self,
        event: &Event,
        platform: &PlatformDefinition,
        adapter: &dyn PlatformAdapter,
        job: &QueueJob,
        worker_id: &str,
    ) -> Result<JobOutcome> {
        // Persistent daily budget; exhaustion behaves like a rate limit.
        let day = Store::budget_day();
        if !self
            .store
            .try_consume_validation_budget(&day, self.config.validation_daily_limit)?
        {
            tracing::warn!(job_id = job.id, day = %day, "validation daily budget exhausted");
            return self
                .retry_or_fail(job, worker_id, "validation daily limit reached", true)
                .await;
        }

        counter!("adapter_sends_total", "platform" => platform.platform_code.clone()).increment(1);
        let result = adapter.send(event).await;
        self.log_send(event, platform, job, adapter, &result);

        let outcome = match result {
            Ok(outcome) if outcome.success => outcome,
            Ok(outcome) => {
                let error = outcome
                    .error
                    .unwrap_or_else(|| "validation rejected".to_string());
                return self.retry_or_fail(job, worker_id, &error, true).await;
            }
            Err(e) => {
                counter!("adapter_send_errors_total", "platform" => platform.platform_code.clone())
                    .increment(1);
                return self
                    .retry_or_fail(job, worker_id, &e.to_string(), e.is_retryable())
                    .await;
            }
        };

        let verdict = outcome.validation_data.clone().unwrap_or_default();
        let status = map_zerobounce_status(&verdict.status);
        // The sibling gate is stricter than per-event deliverability: role
        // accounts pass intake but do not count as a fresh valid verdict.
        let is_valid = matches!(
            status,
            EmailValidationStatus::Valid
                | EmailValidationStatus::CatchAll
                | EmailValidationStatus::Unknown
        );

        self.store.set_event_email_validation(
            event.id,
            if is_valid {
                EmailValidationStatus::Valid
            } else {
                EmailValidationStatus::Invalid
            },
            verdict.active_in_days,
        )?;
        if let Some(email) = event.email.as_deref() {
            self.store.record_email_validation(
                email,
                status,
                verdict.substatus.as_deref(),
                Some(verdict.status.as_str()),
                verdict.substatus.as_deref(),
                verdict.active_in_days,
                verdict.free_email,
                verdict.mx_found,
            )?;
        }

        if !is_valid {
            self.queue.cancel_siblings(event.id, "email_invalid")?;
        }

        self.queue.complete(
            job,
            worker_id,
            outcome.response_code,
            outcome.platform_response.as_deref(),
        )?;
        self.maybe_finalize_event(event.id)?;
        Ok(JobOutcome::Completed)
    }

    async fn retry_or_fail(
        &self,
        job: &QueueJob,
        worker_id: &str,
        error: &str,
        retryable: bool,
    ) -> Result<JobOutcome> {
        if retryable && job.attempts < job.max_retries && self.queue.retry(job, worker_id)? {
            tracing::info!(job_id = job.id, attempts = job.attempts + 1, error, "job retried");
            return Ok(JobOutcome::Retried);
        }
        self.queue.fail(job, worker_id, error)?;
        tracing::warn!(job_id = job.id, error, "job failed");
        self.maybe_finalize_event(job.event_id)?;
        Ok(JobOutcome::Failed)
    }

    /// Append the processing-log row for one send.
    fn log_send(
        &self,
        event: &Event,
        platform: &PlatformDefinition,
        job: &QueueJob,
        adapter: &dyn PlatformAdapter,
        result: &std::result::Result<SendOutcome, AdapterError>,
    ) {
        let (code, body, success) = match result {
            Ok(outcome) => (
                outcome.response_code,
                outcome
                    .platform_response
                    .clone()
                    .or_else(|| outcome.error.clone()),
                outcome.success,
            ),
            Err(e) => (e.status_code(), Some(e.to_string()), false),
        };
        let entry = ProcessingLogEntry {
            event_id: event.id,
            platform_id: platform.id,
            job_id: Some(job.id),
            action: "send".to_string(),
            request_fields: Some(Value::Object(adapter.map_fields(event))),
            response_code: code,
            response_body: body,
            success,
        };
        if let Err(e) = self.store.append_processing_log(&entry) {
            tracing::warn!(job_id = job.id, error = %e, "failed to append processing log");
        }
    }

    /// Stash platform capability outputs into the event's opaque data.
    fn apply_post_response_updates(
        &self,
        event: &Event,
        platform: &PlatformDefinition,
        outcome: &SendOutcome,
    ) -> Result<()> {
        let Some(contact_id) = &outcome.contact_id else {
            return Ok(());
        };
        let mut event_data = event.event_data.clone();
        event_data.insert(
            format!("{}_contact_id", platform.platform_code),
            json!(contact_id),
        );
        self.store.update_event_data(event.id, &event_data)
    }

    /// Finalize an event whose jobs have all reached a terminal state.
    fn maybe_finalize_event(&self, event_id: i64) -> Result<()> {
        let jobs = self.store.jobs_for_event(event_id)?;
        if jobs.is_empty() || !jobs.iter().all(|j| j.status.is_terminal()) {
            return Ok(());
        }
        let any_delivered = jobs
            .iter()
            .any(|j| j.status == switchboard_core::JobStatus::Completed);
        let status = if any_delivered {
            EventStatus::Completed
        } else {
            EventStatus::Failed
        };
        self.store.update_event_status(event_id, status, None)
    }
}

/// Platform-level skip conditions evaluated before the adapter runs.
fn should_skip(event: &Event, platform: &PlatformDefinition) -> Option<&'static str> {
    if platform.requires_valid_email
        && event.email_validation_status == Some(EmailValidationStatus::Invalid)
    {
        return Some("email invalid");
    }
    if platform.platform_type == PlatformType::Sms
        && event.phone.as_deref().is_none_or(str::is_empty)
    {
        return Some("no phone");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AdapterBuilder, ValidationData};
    use crate::index::ReadyIndex;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use switchboard_core::JobStatus;

    // =========================================================================
    // Harness: a scripted adapter registered in the factory
    // =========================================================================

    type Script = Arc<Mutex<VecDeque<std::result::Result<SendOutcome, AdapterError>>>>;

    struct ScriptedAdapter {
        script: Script,
    }

    #[async_trait]
    impl PlatformAdapter for ScriptedAdapter {
        async fn send(&self, _event: &Event) -> std::result::Result<SendOutcome, AdapterError> {
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(SendOutcome::ok(200, "ok")))
        }

        fn map_fields(&self, event: &Event) -> Map<String, Value> {
            let mut fields = Map::new();
            fields.insert("email".into(), json!(event.email));
            fields
        }

        fn validate_config(&self) -> std::result::Result<(), AdapterError> {
            Ok(())
        }

        async fn test_connection(&self) -> bool {
            true
        }
    }

    struct Harness {
        store: Arc<Store>,
        processor: Processor,
        queue: Arc<Queue>,
        router: Arc<Router>,
        crm_script: Script,
        validation_script: Script,
    }

    fn scripted_builder(script: &Script) -> AdapterBuilder {
        let script = Arc::clone(script);
        Arc::new(move |_platform, _config| {
            Ok(Box::new(ScriptedAdapter {
                script: Arc::clone(&script),
            }) as Box<dyn PlatformAdapter>)
        })
    }

    /// Store with an active CRM and validation platform, routing every lead
    /// and purchase to the CRM, with scripted adapters.
    fn harness() -> Harness {
        let store = Arc::new(Store::in_memory().unwrap());
        let crm_id = store
            .insert_platform_raw("leadcrm", "CRM", "crm", true, "{}", 20)
            .unwrap();
        store
            .insert_platform_raw("zerobounce", "ZeroBounce", "validation", true, "{}", 10)
            .unwrap();
        store.insert_routing_rule("lead", crm_id, None, 10, true).unwrap();
        store
            .insert_routing_rule("purchase", crm_id, None, 10, true)
            .unwrap();

        let router = Arc::new(Router::new(Arc::clone(&store)).unwrap());
        let queue = Arc::new(Queue::new(
            Arc::clone(&store),
            Some(Arc::new(ReadyIndex::new())),
        ));

        let crm_script: Script = Arc::new(Mutex::new(VecDeque::new()));
        let validation_script: Script = Arc::new(Mutex::new(VecDeque::new()));
        let mut factory = AdapterFactory::with_defaults();
        factory.register("leadcrm", scripted_builder(&crm_script));
        factory.register("zerobounce", scripted_builder(&validation_script));

        let processor = Processor::new(
            Arc::clone(&store),
            Arc::clone(&router),
            Arc::clone(&queue),
            Arc::new(factory),
            ProcessorConfig::default(),
        );
        Harness {
            store,
            processor,
            queue,
            router,
            crm_script,
            validation_script,
        }
    }

    fn submission(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn lease_one(h: &Harness, platform_code: &str) -> QueueJob {
        let platform = h.router.platform_by_code(platform_code).unwrap();
        let leased = h.queue.lease_batch("w1", 10, 300).unwrap();
        leased
            .into_iter()
            .find(|j| j.platform_id == platform.id)
            .expect("job for platform")
    }

    // =========================================================================
    // Intake: blocking
    // =========================================================================

    #[test]
    fn test_honeypot_submission_blocked_no_jobs() {
        let h = harness();
        let raw = submission(&[("email", json!("a@b.com")), ("zipcode", json!("90210"))]);
        let outcome = h.processor.intake(EventType::Lead, &raw).unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.status, EventStatus::Blocked);
        assert!(outcome
            .blocked_reason
            .as_deref()
            .unwrap()
            .contains("honeypot_triggered"));
        assert_eq!(outcome.queued_platforms, 0);

        let event = h.store.get_event_by_uuid(&outcome.event_id).unwrap().unwrap();
        assert_eq!(event.status, EventStatus::Blocked);
        // Blocked events never fan out.
        assert!(h.store.jobs_for_event(event.id).unwrap().is_empty());
        // The bot registry recorded the side effect.
        assert!(h.store.is_known_bot(Some("a@b.com"), None, None).unwrap());
    }

    #[test]
    fn test_format_invalid_blocked_with_reason_csv() {
        let h = harness();
        let raw = submission(&[("email", json!("garbage"))]);
        let outcome = h.processor.intake(EventType::Lead, &raw).unwrap();
        assert!(!outcome.success);
        assert!(outcome
            .blocked_reason
            .as_deref()
            .unwrap()
            .starts_with("validation_failed:"));
    }

    // =========================================================================
    // Intake: fanout
    // =========================================================================

    #[test]
    fn test_valid_lead_fans_out_with_validation_job() {
        let h = harness();
        let raw = submission(&[
            ("email", json!("new@example.com")),
            ("phone", json!("8005550100")),
            ("campaign", json!("c1")),
        ]);
        let outcome = h.processor.intake(EventType::Lead, &raw).unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.status, EventStatus::Processing);
        // CRM route + validation-first job for the uncached email.
        assert_eq!(outcome.queued_platforms, 2);

        let event = h.store.get_event_by_uuid(&outcome.event_id).unwrap().unwrap();
        assert_eq!(event.phone.as_deref(), Some("18005550100"));
        let jobs = h.store.jobs_for_event(event.id).unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.status == JobStatus::Pending));
    }

    #[test]
    fn test_cached_valid_email_skips_validation_job() {
        let h = harness();
        h.store
            .record_email_validation(
                "known@example.com",
                EmailValidationStatus::Valid,
                None,
                None,
                None,
                None,
                None,
                None,
            )
            .unwrap();
        let raw = submission(&[("email", json!("known@example.com"))]);
        let outcome = h.processor.intake(EventType::Lead, &raw).unwrap();
        // Only the CRM route; the fresh cache suppresses revalidation.
        assert_eq!(outcome.queued_platforms, 1);

        let event = h.store.get_event_by_uuid(&outcome.event_id).unwrap().unwrap();
        assert_eq!(
            event.email_validation_status,
            Some(EmailValidationStatus::Valid)
        );
    }

    #[test]
    fn test_no_routes_completes_immediately() {
        let h = harness();
        // email_open has no routing rules and no email to validate.
        let outcome = h
            .processor
            .intake(EventType::EmailOpen, &submission(&[]))
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.queued_platforms, 0);
        assert_eq!(outcome.status, EventStatus::Completed);
    }

    #[test]
    fn test_purchase_intake_links_to_lead() {
        let h = harness();
        let lead_raw = submission(&[
            ("email", json!("u@x.com")),
            ("source", json!("ads")),
            ("campaign", json!("Q")),
        ]);
        h.processor.intake(EventType::Lead, &lead_raw).unwrap();

        let purchase_raw = submission(&[("email", json!("u@x.com")), ("amount", json!(10))]);
        let outcome = h.processor.intake(EventType::Purchase, &purchase_raw).unwrap();

        let purchase = h.store.get_event_by_uuid(&outcome.event_id).unwrap().unwrap();
        assert_eq!(purchase.acq_source.as_deref(), Some("ads"));
        assert_eq!(purchase.acq_campaign.as_deref(), Some("Q"));
        assert_eq!(h.store.relationships_for_child(purchase.id).unwrap().len(), 1);
    }

    // =========================================================================
    // Job execution
    // =========================================================================

    #[tokio::test]
    async fn test_successful_send_completes_job() {
        let h = harness();
        h.store
            .record_email_validation(
                "a@b.com",
                EmailValidationStatus::Valid,
                None,
                None,
                None,
                None,
                None,
                None,
            )
            .unwrap();
        let raw = submission(&[("email", json!("a@b.com"))]);
        let outcome = h.processor.intake(EventType::Lead, &raw).unwrap();
        let event = h.store.get_event_by_uuid(&outcome.event_id).unwrap().unwrap();

        h.crm_script.lock().push_back(Ok(SendOutcome::ok(200, "created")));
        let job = lease_one(&h, "leadcrm");
        let result = h.processor.execute_job(&job, "w1").await.unwrap();
        assert_eq!(result, JobOutcome::Completed);

        let job = h.store.get_job(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.response_code, Some(200));
        // All jobs terminal: the event is finalized.
        assert_eq!(
            h.store.get_event(event.id).unwrap().unwrap().status,
            EventStatus::Completed
        );
        // The send was logged.
        assert_eq!(h.store.processing_failure_rate(300).unwrap(), (0, 1));
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let h = harness();
        h.store
            .record_email_validation(
                "a@b.com",
                EmailValidationStatus::Valid,
                None, None, None, None, None, None,
            )
            .unwrap();
        let raw = submission(&[("email", json!("a@b.com"))]);
        h.processor.intake(EventType::Lead, &raw).unwrap();

        // HTTP 502 twice, then success.
        h.crm_script.lock().push_back(Err(AdapterError::Http {
            status: 502,
            body: "bad gateway".into(),
        }));
        h.crm_script.lock().push_back(Err(AdapterError::Http {
            status: 502,
            body: "bad gateway".into(),
        }));
        h.crm_script.lock().push_back(Ok(SendOutcome::ok(200, "ok")));

        let job = lease_one(&h, "leadcrm");
        assert_eq!(
            h.processor.execute_job(&job, "w1").await.unwrap(),
            JobOutcome::Retried
        );
        h.store.make_job_due_for_test(job.id);
        let job = lease_one(&h, "leadcrm");
        assert_eq!(
            h.processor.execute_job(&job, "w1").await.unwrap(),
            JobOutcome::Retried
        );
        h.store.make_job_due_for_test(job.id);
        let job = lease_one(&h, "leadcrm");
        assert_eq!(
            h.processor.execute_job(&job, "w1").await.unwrap(),
            JobOutcome::Completed
        );

        let job = h.store.get_job(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempts, 3);
        assert_eq!(job.response_code, Some(200));
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let h = harness();
        h.store
            .record_email_validation(
                "a@b.com",
                EmailValidationStatus::Valid,
                None, None, None, None, None, None,
            )
            .unwrap();
        h.processor
            .intake(EventType::Lead, &submission(&[("email", json!("a@b.com"))]))
            .unwrap();

        h.crm_script.lock().push_back(Err(AdapterError::Auth));
        let job = lease_one(&h, "leadcrm");
        assert_eq!(
            h.processor.execute_job(&job, "w1").await.unwrap(),
            JobOutcome::Failed
        );
        let job = h.store.get_job(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 0, "no retry was burned");
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_fails() {
        let h = harness();
        h.store
            .record_email_validation(
                "a@b.com",
                EmailValidationStatus::Valid,
                None, None, None, None, None, None,
            )
            .unwrap();
        h.processor
            .intake(EventType::Lead, &submission(&[("email", json!("a@b.com"))]))
            .unwrap();

        let mut job = lease_one(&h, "leadcrm");
        for round in 0..4 {
            h.crm_script.lock().push_back(Err(AdapterError::Timeout));
            let outcome = h.processor.execute_job(&job, "w1").await.unwrap();
            if round < 3 {
                assert_eq!(outcome, JobOutcome::Retried);
                h.store.make_job_due_for_test(job.id);
                job = lease_one(&h, "leadcrm");
            } else {
                assert_eq!(outcome, JobOutcome::Failed);
            }
        }
        let job = h.store.get_job(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.attempts <= job.max_retries);
    }

    // =========================================================================
    // Skip conditions
    // =========================================================================

    #[tokio::test]
    async fn test_invalid_email_skips_requiring_platform() {
        let h = harness();
        h.store
            .record_email_validation(
                "a@b.com",
                EmailValidationStatus::Valid,
                None, None, None, None, None, None,
            )
            .unwrap();
        let outcome = h
            .processor
            .intake(EventType::Lead, &submission(&[("email", json!("a@b.com"))]))
            .unwrap();
        let event = h.store.get_event_by_uuid(&outcome.event_id).unwrap().unwrap();
        // The verdict flips to invalid after enqueue (e.g. a fresh
        // validation landed in between).
        h.store
            .set_event_email_validation(event.id, EmailValidationStatus::Invalid, None)
            .unwrap();

        let job = lease_one(&h, "leadcrm");
        assert_eq!(
            h.processor.execute_job(&job, "w1").await.unwrap(),
            JobOutcome::Skipped
        );
        let job = h.store.get_job(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Skipped);
        assert_eq!(job.skip_reason.as_deref(), Some("Platform conditions not met"));
    }

    #[test]
    fn test_should_skip_sms_without_phone() {
        let crm = crate::adapters::test_platform(
            "leadcrm",
            PlatformType::Crm,
            json!({}),
        );
        let sms = crate::adapters::test_platform("smsoptin", PlatformType::Sms, json!({}));
        let event = Event::from_submission(EventType::Lead, &Map::new());
        assert!(should_skip(&event, &crm).is_none());
        assert_eq!(should_skip(&event, &sms), Some("no phone"));
    }

    // =========================================================================
    // Validation path
    // =========================================================================

    /// Drive intake for an uncached email and return (event, validation job,
    /// crm job) with the validation verdict scripted.
    fn validation_fixture(
        h: &Harness,
        verdict: ValidationData,
    ) -> (Event, QueueJob, QueueJob) {
        let raw = submission(&[("email", json!("fresh@example.com"))]);
        let outcome = h.processor.intake(EventType::Lead, &raw).unwrap();
        let event = h.store.get_event_by_uuid(&outcome.event_id).unwrap().unwrap();

        let mut reply = SendOutcome::ok(200, "{}");
        reply.validation_data = Some(verdict);
        h.validation_script.lock().push_back(Ok(reply));

        let validation_platform = h.router.platform_by_code("zerobounce").unwrap();
        let jobs = h.store.jobs_for_event(event.id).unwrap();
        let validation_job = jobs
            .iter()
            .find(|j| j.platform_id == validation_platform.id)
            .unwrap()
            .clone();
        let crm_job = jobs
            .iter()
            .find(|j| j.platform_id != validation_platform.id)
            .unwrap()
            .clone();
        (event, validation_job, crm_job)
    }

    #[tokio::test]
    async fn test_invalid_verdict_cancels_pending_siblings() {
        let h = harness();
        let (event, validation_job, crm_job) = validation_fixture(
            &h,
            ValidationData {
                status: "invalid".into(),
                substatus: Some("mailbox_not_found".into()),
                active_in_days: None,
                free_email: None,
                mx_found: Some(false),
            },
        );

        // Lease only the validation job; the CRM sibling stays pending.
        let leased = h.queue.lease_batch("w1", 10, 300).unwrap();
        let job = leased.iter().find(|j| j.id == validation_job.id).unwrap();
        for other in leased.iter().filter(|j| j.id != validation_job.id) {
            h.queue.release(other, "w1").unwrap();
        }

        assert_eq!(
            h.processor.execute_job(job, "w1").await.unwrap(),
            JobOutcome::Completed
        );

        // Verdict persisted on the event and in the registry.
        let event = h.store.get_event(event.id).unwrap().unwrap();
        assert_eq!(
            event.email_validation_status,
            Some(EmailValidationStatus::Invalid)
        );
        let cached = h
            .store
            .find_email_validation("fresh@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(cached.status, EmailValidationStatus::Invalid);
        assert_eq!(cached.substatus.as_deref(), Some("mailbox_not_found"));

        // The pending sibling was skipped with the canonical reason.
        let crm_job = h.store.get_job(crm_job.id).unwrap().unwrap();
        assert_eq!(crm_job.status, JobStatus::Skipped);
        assert_eq!(crm_job.skip_reason.as_deref(), Some("email_invalid"));
    }

    #[tokio::test]
    async fn test_valid_verdict_leaves_siblings_alone() {
        let h = harness();
        let (event, validation_job, crm_job) = validation_fixture(
            &h,
            ValidationData {
                status: "valid".into(),
                substatus: None,
                active_in_days: Some(14),
                free_email: Some(false),
                mx_found: Some(true),
            },
        );

        let leased = h.queue.lease_batch("w1", 10, 300).unwrap();
        let job = leased.iter().find(|j| j.id == validation_job.id).unwrap();
        for other in leased.iter().filter(|j| j.id != validation_job.id) {
            h.queue.release(other, "w1").unwrap();
        }

        h.processor.execute_job(job, "w1").await.unwrap();

        let event = h.store.get_event(event.id).unwrap().unwrap();
        assert_eq!(
            event.email_validation_status,
            Some(EmailValidationStatus::Valid)
        );
        assert_eq!(event.zb_last_active, Some(14));
        assert_eq!(
            h.store.get_job(crm_job.id).unwrap().unwrap().status,
            JobStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_validation_budget_exhausted_retries() {
        let h = harness();
        // Burn the entire day's budget.
        let day = Store::budget_day();
        h.store.try_consume_validation_budget(&day, 1).unwrap();

        let processor = Processor::new(
            Arc::clone(&h.store),
            Arc::clone(&h.router),
            Arc::clone(&h.queue),
            Arc::new(AdapterFactory::with_defaults()),
            ProcessorConfig {
                validation_daily_limit: 1,
                ..ProcessorConfig::default()
            },
        );

        let raw = submission(&[("email", json!("fresh@example.com"))]);
        let outcome = processor.intake(EventType::Lead, &raw).unwrap();
        let event = h.store.get_event_by_uuid(&outcome.event_id).unwrap().unwrap();
        let validation_platform = h.router.platform_by_code("zerobounce").unwrap();
        let jobs = h.store.jobs_for_event(event.id).unwrap();
        let validation_job = jobs
            .iter()
            .find(|j| j.platform_id == validation_platform.id)
            .unwrap();

        let leased = h.queue.lease_batch("w1", 10, 300).unwrap();
        let job = leased.iter().find(|j| j.id == validation_job.id).unwrap();
        assert_eq!(
            processor.execute_job(job, "w1").await.unwrap(),
            JobOutcome::Retried
        );
    }

    // =========================================================================
    // Revenue and post-response updates
    // =========================================================================

    #[tokio::test]
    async fn test_revenue_recorded_on_success() {
        let h = harness();
        h.store
            .record_email_validation(
                "a@b.com",
                EmailValidationStatus::Valid,
                None, None, None, None, None, None,
            )
            .unwrap();
        let outcome = h
            .processor
            .intake(EventType::Lead, &submission(&[("email", json!("a@b.com"))]))
            .unwrap();
        let event = h.store.get_event_by_uuid(&outcome.event_id).unwrap().unwrap();

        let mut reply = SendOutcome::ok(200, "Success");
        reply.revenue = Some(2.0);
        h.crm_script.lock().push_back(Ok(reply));

        let job = lease_one(&h, "leadcrm");
        h.processor.execute_job(&job, "w1").await.unwrap();

        let records = h.store.revenue_for_event(event.id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].gross_amount, 2.0);
        let job = h.store.get_job(job.id).unwrap().unwrap();
        assert_eq!(job.revenue_amount, Some(2.0));
    }

    #[tokio::test]
    async fn test_contact_id_stashed_in_event_data() {
        let h = harness();
        h.store
            .record_email_validation(
                "a@b.com",
                EmailValidationStatus::Valid,
                None, None, None, None, None, None,
            )
            .unwrap();
        let outcome = h
            .processor
            .intake(EventType::Lead, &submission(&[("email", json!("a@b.com"))]))
            .unwrap();
        let event = h.store.get_event_by_uuid(&outcome.event_id).unwrap().unwrap();

        let mut reply = SendOutcome::ok(200, "{}");
        reply.contact_id = Some("C-42".into());
        h.crm_script.lock().push_back(Ok(reply));

        let job = lease_one(&h, "leadcrm");
        h.processor.execute_job(&job, "w1").await.unwrap();

        let event = h.store.get_event(event.id).unwrap().unwrap();
        assert_eq!(
            event.event_data.get("leadcrm_contact_id"),
            Some(&json!("C-42"))
        );
    }

    // =========================================================================
    // Fatal references
    // =========================================================================

    #[tokio::test]
    async fn test_missing_event_fails_job() {
        let h = harness();
        let mut event = Event::from_submission(EventType::Lead, &Map::new());
        h.store.insert_event(&mut event).unwrap();
        let crm = h.router.platform_by_code("leadcrm").unwrap();
        h.queue.enqueue(event.id, crm.id, 0, 3).unwrap();

        let job = lease_one(&h, "leadcrm");
        // Simulate the referenced event vanishing.
        {
            let conn = h.store.lock_conn();
            conn.execute("PRAGMA foreign_keys = OFF", []).unwrap();
            conn.execute("DELETE FROM events WHERE id = ?1", [event.id])
                .unwrap();
        }
        assert_eq!(
            h.processor.execute_job(&job, "w1").await.unwrap(),
            JobOutcome::Failed
        );
        let job = h.store.get_job(job.id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.response_body.as_deref().unwrap().contains("event not found"));
    }
}
