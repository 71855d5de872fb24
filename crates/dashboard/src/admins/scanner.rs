//! Chunked historical log scan that tolerates providers with an unknown
//! maximum block range.
//!
//! The scan walks the requested range in chunks of `initial_step` blocks. A
//! failed chunk is split into chunks of half the size and queued again, down
//! to single blocks. A failed single block is retried with exponential
//! backoff and skipped if it keeps failing. Every request is paced and the
//! whole scan stops early once the request or failure budget is exhausted or
//! the caller cancels it; the events collected until then are returned.

use {
    super::{
        RoleEvent,
        cancellation::CancellationHandle,
        pacing::{Backoff, Pacer},
    },
    crate::traits::LogQuerying,
    alloy::primitives::{Address, B256},
    ethrpc::BlockRange,
    std::{fmt, time::Duration},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Number of most recent blocks that get scanned.
    pub window: u64,
    /// Size of the first chunks requested from the provider.
    pub initial_step: u64,
    /// Minimum time between the starts of two requests.
    pub request_interval: Duration,
    /// Total number of log requests a scan may issue.
    pub max_requests: u32,
    /// Number of failed requests in a row after which the scan gives up.
    pub max_consecutive_failures: u32,
    /// Retries of a single block before it is skipped.
    pub block_retries: u32,
    pub backoff: Backoff,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            window: 50_000,
            initial_step: 2_000,
            request_interval: Duration::from_secs(1),
            max_requests: 500,
            max_consecutive_failures: 10,
            block_retries: 3,
            backoff: Backoff {
                initial: Duration::from_millis(200),
                max: Duration::from_millis(2_000),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    RequestCap { issued: u32 },
    ConsecutiveFailures { failures: u32 },
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::RequestCap { issued } => write!(f, "request limit of {issued} reached"),
            AbortReason::ConsecutiveFailures { failures } => {
                write!(f, "{failures} requests failed in a row")
            }
            AbortReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Request counters of one scan. Threaded through the scan by value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanBudget {
    pub requests: u32,
    pub succeeded: u32,
    pub consecutive_failures: u32,
}

impl ScanBudget {
    /// Whether the scan has to stop before issuing another request.
    pub fn abort_reason(&self, config: &ScanConfig) -> Option<AbortReason> {
        if self.requests >= config.max_requests {
            Some(AbortReason::RequestCap {
                issued: self.requests,
            })
        } else if self.consecutive_failures >= config.max_consecutive_failures {
            Some(AbortReason::ConsecutiveFailures {
                failures: self.consecutive_failures,
            })
        } else {
            None
        }
    }

    pub fn after_request(self, succeeded: bool) -> Self {
        if succeeded {
            Self {
                requests: self.requests.saturating_add(1),
                succeeded: self.succeeded.saturating_add(1),
                consecutive_failures: 0,
            }
        } else {
            Self {
                requests: self.requests.saturating_add(1),
                succeeded: self.succeeded,
                consecutive_failures: self.consecutive_failures.saturating_add(1),
            }
        }
    }
}

/// A pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Fetch `range`, a chunk of at most `step` blocks.
    Fetch { range: BlockRange, step: u64 },
    /// Retry number `retry` (counting from 1) of a block that failed.
    SingleBlock { block: u64, retry: u32 },
}

impl Task {
    pub fn range(&self) -> BlockRange {
        match self {
            Task::Fetch { range, .. } => *range,
            Task::SingleBlock { block, .. } => BlockRange::single(*block),
        }
    }
}

/// What happens after a request for a task failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Fetch the same blocks again in chunks of `step`.
    Retrying { step: u64, chunks: Vec<BlockRange> },
    /// Retry a lone block after a backoff delay.
    SingleBlockFallback { block: u64, retry: u32 },
    /// Give up on the block and leave a gap in the scan.
    Skip { block: u64 },
}

pub fn after_failure(task: Task, config: &ScanConfig) -> Transition {
    match task {
        Task::Fetch { range, step } if !range.is_single_block() => {
            // Tail chunks can be shorter than `step`; halve what was
            // actually requested so every retry uses a smaller range.
            let step = (range.len().min(step) / 2).max(1);
            Transition::Retrying {
                step,
                chunks: range.chunks(step).collect(),
            }
        }
        Task::Fetch { range, .. } => single_block_retry(range.start(), 1, config),
        Task::SingleBlock { block, retry } => single_block_retry(block, retry + 1, config),
    }
}

fn single_block_retry(block: u64, retry: u32, config: &ScanConfig) -> Transition {
    if retry <= config.block_retries {
        Transition::SingleBlockFallback { block, retry }
    } else {
        Transition::Skip { block }
    }
}

/// Result of a scan. `aborted` is set if the scan stopped before covering
/// the whole range, in which case `events` is incomplete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub range: BlockRange,
    pub events: Vec<RoleEvent>,
    /// Blocks whose events could not be fetched.
    pub skipped_blocks: Vec<u64>,
    pub budget: ScanBudget,
    pub aborted: Option<AbortReason>,
}

/// Fetches all role events of `contract` for `role` within `range`.
pub async fn scan(
    logs: &dyn LogQuerying,
    contract: Address,
    role: B256,
    range: BlockRange,
    config: &ScanConfig,
    cancel: &CancellationHandle,
) -> ScanReport {
    let initial_step = config.initial_step.max(1);
    // Stack of pending work; chunks are pushed in reverse so blocks are
    // fetched in ascending order.
    let mut pending: Vec<Task> = range
        .chunks(initial_step)
        .rev()
        .map(|range| Task::Fetch {
            range,
            step: initial_step,
        })
        .collect();
    let mut pacer = Pacer::new(config.request_interval);
    let mut budget = ScanBudget::default();
    let mut events = Vec::new();
    let mut skipped_blocks = Vec::new();
    let mut aborted = None;

    while let Some(task) = pending.pop() {
        if let Some(reason) = budget.abort_reason(config) {
            aborted = Some(reason);
            break;
        }

        if let Task::SingleBlock { retry, .. } = task {
            tokio::select! {
                _ = tokio::time::sleep(config.backoff.delay(retry)) => {}
                _ = cancel.cancelled() => {}
            }
        }
        tokio::select! {
            _ = pacer.wait() => {}
            _ = cancel.cancelled() => {}
        }
        if cancel.is_cancelled() {
            aborted = Some(AbortReason::Cancelled);
            break;
        }

        let chunk = task.range();
        let result = logs.role_events(contract, role, chunk).await;
        budget = budget.after_request(result.is_ok());
        let err = match result {
            Ok(batch) => {
                tracing::debug!(%chunk, events = batch.len(), "fetched role events");
                events.extend(batch);
                continue;
            }
            Err(err) => err,
        };

        match after_failure(task, config) {
            Transition::Retrying { step, chunks } => {
                tracing::debug!(%chunk, step, ?err, "retrying range in smaller chunks");
                pending.extend(
                    chunks
                        .into_iter()
                        .rev()
                        .map(|range| Task::Fetch { range, step }),
                );
            }
            Transition::SingleBlockFallback { block, retry } => {
                tracing::debug!(block, retry, ?err, "retrying single block");
                pending.push(Task::SingleBlock { block, retry });
            }
            Transition::Skip { block } => {
                tracing::warn!(block, ?err, "skipping block, its events are missing");
                skipped_blocks.push(block);
            }
        }
    }

    if let Some(reason) = aborted {
        tracing::warn!(%range, %reason, requests = budget.requests, "role event scan aborted");
    }

    ScanReport {
        range,
        events,
        skipped_blocks,
        budget,
        aborted,
    }
}
