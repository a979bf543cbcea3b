//! Retry executor: wraps a fallible async operation with classified
//! retries, exponential backoff, and dead-letter capture.
//!
//! The executor is the only writer of persisted retry counters, so the
//! counter always reflects the attempt that is actually in flight. An
//! operation gets `max_retries + 1` attempts in total; when a retryable
//! error survives the last one, exactly one dead-letter entry is
//! written and the failure is final.

use std::future::Future;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use cocho_core::backoff::{delay_for_attempt, RetryConfig};
use cocho_core::classify::{classify_error, ErrorKind};
use cocho_core::types::DbId;
use cocho_db::models::dead_letter::CreateDeadLetterEntry;

use crate::error::EtlError;
use crate::store::{DeadLetterStore, RetryStateStore};

/// Identifies the entity whose retry counters are being driven.
#[derive(Debug, Clone, Copy)]
pub struct EntityRef<'a> {
    pub entity_type: &'a str,
    pub entity_id: DbId,
    pub organization_id: DbId,
}

/// Outcome of a retried operation.
#[derive(Debug)]
pub enum RetryResult<T> {
    /// The operation succeeded on attempt `attempts`.
    Success { value: T, attempts: u32 },
    /// All attempts failed, or the error was not retryable.
    Failure {
        error: EtlError,
        kind: ErrorKind,
        attempts: u32,
        sent_to_dead_letter: bool,
    },
    /// Cancelled while waiting between attempts.
    Cancelled { attempts: u32 },
}

impl<T> RetryResult<T> {
    /// Collapse into a `Result`, mapping cancellation to a storage error.
    pub fn into_result(self) -> Result<T, EtlError> {
        match self {
            RetryResult::Success { value, .. } => Ok(value),
            RetryResult::Failure { error, .. } => Err(error),
            RetryResult::Cancelled { .. } => {
                Err(EtlError::Storage("operation cancelled".to_string()))
            }
        }
    }
}

/// Drives retries for one kind of store.
pub struct RetryExecutor<S> {
    store: Arc<S>,
    config: RetryConfig,
}

impl<S> RetryExecutor<S>
where
    S: RetryStateStore + DeadLetterStore,
{
    pub fn new(store: Arc<S>, config: RetryConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds, exhausts the retry budget, or
    /// fails with a non-retryable error.
    ///
    /// Execution resumes from the entity's persisted retry counter, so
    /// a worker restarted mid-backoff burns the remaining budget
    /// instead of getting a fresh one. Counters are persisted before
    /// each backoff sleep; on success after at least one retry the
    /// counter is reset to zero.
    pub async fn execute<T, F, Fut>(
        &self,
        entity: EntityRef<'_>,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EtlError>>,
    {
        let max_attempts = self.config.max_retries + 1;

        let prior_retries = match self
            .store
            .get_retry_count(entity.entity_type, entity.entity_id)
            .await
        {
            Ok(count) => count.max(0) as u32,
            Err(err) => {
                warn!(
                    entity_type = entity.entity_type,
                    entity_id = entity.entity_id,
                    error = %err,
                    "failed to load persisted retry counter, starting fresh"
                );
                0
            }
        };
        // A counter at or past the budget still gets one final attempt.
        let first_attempt = (prior_retries + 1).min(max_attempts);

        for attempt in first_attempt..=max_attempts {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        if let Err(err) = self
                            .store
                            .reset_retry_state(entity.entity_type, entity.entity_id)
                            .await
                        {
                            warn!(
                                entity_type = entity.entity_type,
                                entity_id = entity.entity_id,
                                error = %err,
                                "failed to reset retry counter after recovery"
                            );
                        }
                    }
                    return RetryResult::Success { value, attempts: attempt };
                }
                Err(error) => {
                    let kind = classify_error(&error.to_string());

                    if !self.config.is_retryable(kind) {
                        debug!(
                            entity_type = entity.entity_type,
                            entity_id = entity.entity_id,
                            error_kind = kind.as_str(),
                            attempt,
                            "error is not retryable, failing immediately"
                        );
                        return RetryResult::Failure {
                            error,
                            kind,
                            attempts: attempt,
                            sent_to_dead_letter: false,
                        };
                    }

                    if attempt >= max_attempts {
                        let sent = self.enqueue_dead_letter(entity, kind, &error).await;
                        return RetryResult::Failure {
                            error,
                            kind,
                            attempts: attempt,
                            sent_to_dead_letter: sent,
                        };
                    }

                    let delay_ms = delay_for_attempt(attempt, &self.config);
                    let next_retry_at = Utc::now() + Duration::milliseconds(delay_ms as i64);
                    if let Err(err) = self
                        .store
                        .set_retry_state(
                            entity.entity_type,
                            entity.entity_id,
                            attempt as i32,
                            Some(next_retry_at),
                        )
                        .await
                    {
                        warn!(
                            entity_type = entity.entity_type,
                            entity_id = entity.entity_id,
                            error = %err,
                            "failed to persist retry counter"
                        );
                    }

                    debug!(
                        entity_type = entity.entity_type,
                        entity_id = entity.entity_id,
                        error_kind = kind.as_str(),
                        attempt,
                        delay_ms,
                        error = %error,
                        "attempt failed, backing off"
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return RetryResult::Cancelled { attempts: attempt };
                        }
                        _ = tokio::time::sleep(std::time::Duration::from_millis(delay_ms)) => {}
                    }
                }
            }
        }

        unreachable!("retry loop returns from within");
    }

    async fn enqueue_dead_letter(
        &self,
        entity: EntityRef<'_>,
        kind: ErrorKind,
        error: &EtlError,
    ) -> bool {
        warn!(
            entity_type = entity.entity_type,
            entity_id = entity.entity_id,
            error_kind = kind.as_str(),
            error = %error,
            "retry budget exhausted, writing dead-letter entry"
        );
        let input = CreateDeadLetterEntry {
            entity_type: entity.entity_type.to_string(),
            entity_id: entity.entity_id,
            organization_id: entity.organization_id,
            error_type: kind.as_str().to_string(),
            error_message: error.to_string(),
            total_retries: self.config.max_retries as i32,
        };
        match self.store.create_dead_letter(input).await {
            Ok(_) => true,
            Err(err) => {
                warn!(
                    entity_type = entity.entity_type,
                    entity_id = entity.entity_id,
                    error = %err,
                    "failed to write dead-letter entry"
                );
                false
            }
        }
    }
}
