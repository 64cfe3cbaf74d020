//! Drives one face-swap job from detection to a terminal result.
//!
//! The sequence is strictly ordered: detect the source face, detect the
//! target face, submit the swap, then check the job status at a fixed
//! interval until it succeeds, fails, or the attempt budget runs out.
//! Every network call and every pause is raced against the caller's
//! cancellation token.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::outcome::{ImageSide, PollResult, SwapError, SwapSuccess};
use super::policy::PollPolicy;
use super::request::SwapRequest;
use crate::auth::{AuthError, Credential, TokenCache};
use crate::server::metrics;
use crate::store::{FailureRecord, ResultSink, SwapRecord};
use crate::vendor::{
    ClientError, DetectedImage, FaceSwapClient, JobHandle, JobStatus, CODE_TOKEN_INVALID,
};

pub struct JobPoller {
    client: Arc<dyn FaceSwapClient>,
    tokens: Arc<TokenCache>,
    sink: Arc<dyn ResultSink>,
    policy: PollPolicy,
}

/// Races `fut` against cancellation.
async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, SwapError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SwapError::Cancelled),
        output = fut => Ok(output),
    }
}

/// The vendor turned down a token that was minted for this very call.
fn token_rejected_after_refresh() -> SwapError {
    SwapError::Auth(AuthError::Rejected {
        code: CODE_TOKEN_INVALID,
        message: "Vendor rejected a freshly minted token".to_string(),
    })
}

fn client_reason(err: ClientError) -> String {
    match err {
        ClientError::Detection { reason }
        | ClientError::Submission { reason }
        | ClientError::Poll { reason } => reason,
        other => other.to_string(),
    }
}

impl JobPoller {
    pub fn new(
        client: Arc<dyn FaceSwapClient>,
        tokens: Arc<TokenCache>,
        sink: Arc<dyn ResultSink>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            client,
            tokens,
            sink,
            policy,
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Runs the whole sequence for `request`.
    ///
    /// The outcome is handed to the sink in the background, unless the run
    /// was cancelled; the sink cannot delay or change the returned value.
    pub async fn run(&self, request: &SwapRequest, cancel: &CancellationToken) -> PollResult {
        let started = Instant::now();
        let mut job_id = None;
        let result = self.run_sequence(request, cancel, &mut job_id).await;

        let kind = match &result {
            Ok(_) => "succeeded",
            Err(err) => err.kind(),
        };
        metrics::record_swap_outcome(kind, started.elapsed());

        match &result {
            Ok(success) => {
                info!(
                    user_id = %request.metadata.user_id,
                    attempts = success.attempts,
                    elapsed_ms = success.elapsed.as_millis() as u64,
                    "Face swap succeeded"
                );
                self.hand_to_sink(request, success);
            }
            Err(SwapError::Cancelled) => {
                info!(user_id = %request.metadata.user_id, "Face swap cancelled");
            }
            Err(err) => {
                warn!(user_id = %request.metadata.user_id, kind, "Face swap ended without result: {}", err);
                self.hand_failure_to_sink(request, err, job_id);
            }
        }
        result
    }

    /// `job_id` is filled in as soon as the vendor accepts the job.
    async fn run_sequence(
        &self,
        request: &SwapRequest,
        cancel: &CancellationToken,
        job_id: &mut Option<String>,
    ) -> PollResult {
        let source = self
            .detect(ImageSide::Source, &request.source, cancel)
            .await?;
        let target = self
            .detect(ImageSide::Target, &request.target, cancel)
            .await?;

        let handle = self.submit(&source, &target, request, cancel).await?;
        *job_id = Some(handle.job_id.clone());
        info!(
            job_id = %handle.job_id,
            result_id = %handle.result_id,
            "Swap job submitted, polling for result"
        );

        self.poll_until_done(&handle, cancel).await
    }

    async fn credential(&self, cancel: &CancellationToken) -> Result<Arc<Credential>, SwapError> {
        Ok(cancellable(cancel, self.tokens.get_token()).await??)
    }

    async fn detect(
        &self,
        side: ImageSide,
        locator: &str,
        cancel: &CancellationToken,
    ) -> Result<DetectedImage, SwapError> {
        let mut retries_left = self.policy.detect_retries;
        loop {
            let credential = self.credential(cancel).await?;
            let result = cancellable(cancel, self.client.detect(credential.token(), locator)).await?;

            let err = match result {
                Ok(detection) => {
                    debug!(%side, "Face detected");
                    return Ok(DetectedImage {
                        locator: locator.to_string(),
                        detection,
                    });
                }
                Err(err) => err,
            };

            match err {
                ClientError::Unauthorized => {
                    self.tokens.invalidate(&credential);
                    if retries_left == 0 {
                        return Err(token_rejected_after_refresh());
                    }
                }
                ClientError::Transient(ref reason) if retries_left > 0 => {
                    warn!(%side, "Transient detection failure, retrying: {}", reason);
                    let wake = Instant::now() + self.policy.retry_delay;
                    cancellable(cancel, sleep_until(wake)).await?;
                }
                ClientError::Transient(reason) => {
                    return Err(SwapError::VendorUnavailable { side, reason });
                }
                err => {
                    return Err(SwapError::DetectionFailed {
                        side,
                        reason: client_reason(err),
                    })
                }
            }
            retries_left -= 1;
        }
    }

    /// Submission is only repeated when the vendor rejected the token, since
    /// then no job was created. Anything else could start a second job.
    async fn submit(
        &self,
        source: &DetectedImage,
        target: &DetectedImage,
        request: &SwapRequest,
        cancel: &CancellationToken,
    ) -> Result<JobHandle, SwapError> {
        let mut token_retry_used = false;
        loop {
            let credential = self.credential(cancel).await?;
            let result = cancellable(
                cancel,
                self.client
                    .submit_swap(credential.token(), source, target, &request.options),
            )
            .await?;

            match result {
                Ok(handle) => return Ok(handle),
                Err(ClientError::Unauthorized) => {
                    self.tokens.invalidate(&credential);
                    if token_retry_used {
                        return Err(token_rejected_after_refresh());
                    }
                    token_retry_used = true;
                }
                Err(err) => {
                    return Err(SwapError::SubmissionFailed {
                        reason: client_reason(err),
                    })
                }
            }
        }
    }

    async fn poll_until_done(&self, handle: &JobHandle, cancel: &CancellationToken) -> PollResult {
        let submitted_at = Instant::now();
        let deadline = self.policy.deadline.map(|d| submitted_at + d);
        let mut vendor_record_seen = false;
        let mut attempts_made = 0;

        for attempt in 1..=self.policy.max_attempts {
            if attempt > 1 {
                let wake = Instant::now() + self.policy.interval;
                if deadline.is_some_and(|d| wake >= d) {
                    debug!("Next status check would pass the deadline");
                    break;
                }
                cancellable(cancel, sleep_until(wake)).await?;
            }

            let credential = self.credential(cancel).await?;
            let poll = self.client.poll(credential.token(), &handle.result_id);
            let result = match deadline {
                Some(d) => match cancellable(cancel, timeout_at(d, poll)).await? {
                    Ok(result) => result,
                    Err(_) => {
                        debug!(attempt, "Status check cut off by the deadline");
                        attempts_made = attempt;
                        break;
                    }
                },
                None => cancellable(cancel, poll).await?,
            };
            attempts_made = attempt;

            match result {
                Ok(JobStatus::Succeeded { output_url }) => {
                    return Ok(SwapSuccess {
                        output_url,
                        elapsed: submitted_at.elapsed(),
                        attempts: attempt,
                        job_id: handle.job_id.clone(),
                    });
                }
                Ok(JobStatus::Failed) => {
                    return Err(SwapError::ProcessingFailed { attempt });
                }
                Ok(JobStatus::Unknown) => {
                    debug!(attempt, "No job record yet");
                }
                Ok(status) => {
                    vendor_record_seen = true;
                    debug!(attempt, status = status.label(), "Job still running");
                }
                Err(ClientError::Unauthorized) => {
                    warn!(attempt, "Vendor rejected token during polling");
                    self.tokens.invalidate(&credential);
                }
                Err(err) => {
                    warn!(attempt, "Status check failed: {}", err);
                }
            }
        }

        Err(SwapError::TimedOut {
            attempts: attempts_made,
            vendor_record_seen,
        })
    }

    fn hand_to_sink(&self, request: &SwapRequest, success: &SwapSuccess) {
        let record = SwapRecord {
            output_url: success.output_url.clone(),
            elapsed: success.elapsed,
            source_image: request.source.clone(),
            target_image: request.target.clone(),
            job_id: success.job_id.clone(),
            metadata: request.metadata.clone(),
            completed_at: Utc::now(),
        };
        let sink = self.sink.clone();
        tokio::spawn(async move {
            if let Err(err) = sink.record_success(record).await {
                error!("Failed to record swap result: {:#}", err);
                metrics::record_sink_failure();
            }
        });
    }

    fn hand_failure_to_sink(
        &self,
        request: &SwapRequest,
        err: &SwapError,
        job_id: Option<String>,
    ) {
        let record = FailureRecord {
            error_kind: err.kind().to_string(),
            message: err.to_string(),
            job_id,
            source_image: request.source.clone(),
            target_image: request.target.clone(),
            metadata: request.metadata.clone(),
            failed_at: Utc::now(),
        };
        let sink = self.sink.clone();
        tokio::spawn(async move {
            if let Err(err) = sink.record_failure(record).await {
                error!("Failed to record swap failure: {:#}", err);
                metrics::record_sink_failure();
            }
        });
    }
}
