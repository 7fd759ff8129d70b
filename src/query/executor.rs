//! Query Executor - range query orchestration
//!
//! This module turns a [`QueryRequest`] into datapoints:
//!
//! ```text
//! ┌──────────────────┐
//! │  QueryResponse   │  ← datapoints + contributing sources
//! └────────▲─────────┘
//!          │ leading-edge filtered aggregate per offset
//! ┌────────┴─────────┐
//! │ AggregatingMerge │  ← one interpolating cursor per source
//! └────────▲─────────┘
//!          │ spans (one per source, shared origin)
//! ┌────────┴─────────┐
//! │   Span builder   │  ← decode blocks, charge local memory account
//! └────────▲─────────┘
//!          │ encoded blocks
//! ┌────────┴─────────┐
//! │   SampleStore    │  ← one scan, or one batch of point reads
//! └──────────────────┘
//! ```
//!
//! # Memory-Constrained Execution
//!
//! Spans for a long range can be large. [`QueryExecutor::query_memory_constrained`]
//! asks the planner how long a single pass may be for the given budget and,
//! if the requested range is longer, runs one pass per sub-range in order
//! and concatenates the results. Only one pass holds spans at a time.

use crate::clock::{Clock, SystemClock};
use crate::engine::traits::{KeyValue, SampleStore};
use crate::error::StorageError;
use crate::memory::{BoundAccount, MemoryMonitor};
use crate::metrics;
use crate::query::error::{QueryError, QueryResult};
use crate::query::interpolate::InterpolatingCursor;
use crate::query::merge::{AggregatingMerge, LeadingEdgeFilter};
use crate::query::planner;
use crate::query::request::{QueryOptions, QueryRequest};
use crate::query::result::{QueryResponse, ResponseAccumulator};
use crate::query::span::{Span, SIZE_OF_CALIBRATED_BLOCK, SIZE_OF_SPAN};
use crate::storage::{decode_block, DataKey};
use crate::types::{DataPoint, Resolution, Sample, NANOS_PER_SECOND};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const SIZE_OF_SAMPLE: i64 = std::mem::size_of::<Sample>() as i64;
const SIZE_OF_DATAPOINT: i64 = std::mem::size_of::<DataPoint>() as i64;

// ============================================================================
// Executor Configuration
// ============================================================================

/// Configuration for query execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Worker memory budget used by [`QueryExecutor::execute`] (default: 64MB)
    pub worker_memory_budget: i64,

    /// Expected sources per metric used to size chunks (default: 8)
    pub estimated_source_count: i64,

    /// Interpolation limit used by [`QueryExecutor::options`] (default: unlimited)
    pub interpolation_limit_nanos: i64,

    /// Deadline for a single store read (default: 30 seconds)
    pub read_timeout: Option<Duration>,

    /// Record Prometheus metrics (default: true)
    pub metrics_enabled: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_memory_budget: 64 * 1024 * 1024, // 64 MB
            estimated_source_count: 8,
            interpolation_limit_nanos: 0,
            read_timeout: Some(Duration::from_secs(30)),
            metrics_enabled: true,
        }
    }
}

impl ExecutorConfig {
    /// Create a new executor config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker memory budget in bytes
    pub fn with_worker_memory_budget(mut self, bytes: i64) -> Self {
        self.worker_memory_budget = bytes;
        self
    }

    /// Set the estimated source count
    pub fn with_estimated_source_count(mut self, count: i64) -> Self {
        self.estimated_source_count = count.max(1);
        self
    }

    /// Set the default interpolation limit
    pub fn with_interpolation_limit(mut self, nanos: i64) -> Self {
        self.interpolation_limit_nanos = nanos;
        self
    }

    /// Set the store read deadline
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Disable the store read deadline
    pub fn without_read_timeout(mut self) -> Self {
        self.read_timeout = None;
        self
    }

    /// Disable metric recording
    pub fn without_metrics(mut self) -> Self {
        self.metrics_enabled = false;
        self
    }
}

// ============================================================================
// Execution Context
// ============================================================================

/// Per-query cancellation and read deadline
///
/// Cancellation is only observed at store reads; the in-memory pipeline runs
/// to completion once its data is loaded.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    cancel: CancellationToken,
    read_timeout: Option<Duration>,
}

impl ExecutionContext {
    /// Create a context that is never cancelled and has no read deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Fail store reads that take longer than `timeout`
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Cancel the query
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true once the query has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token observed by this context
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run a store read, observing cancellation and the read deadline
    pub async fn guard<T, F>(&self, operation: &str, read: F) -> QueryResult<T>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(QueryError::cancelled(format!(
                "query cancelled before {}",
                operation
            )));
        }

        let timed = async {
            let result = match self.read_timeout {
                Some(deadline) => tokio::time::timeout(deadline, read).await.map_err(|_| {
                    QueryError::timeout(format!(
                        "{} exceeded read timeout of {:?}",
                        operation, deadline
                    ))
                })?,
                None => read.await,
            };
            result.map_err(|e| {
                warn!(operation, error = %e, "Store read failed");
                QueryError::from(e)
            })
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(QueryError::cancelled(format!(
                "query cancelled during {}",
                operation
            ))),
            result = timed => result,
        }
    }
}

// ============================================================================
// Execution Statistics
// ============================================================================

/// Execution counters, updated atomically
#[derive(Debug, Default)]
pub struct ExecutionStats {
    /// Queries started (a chunked query counts once)
    pub queries: AtomicU64,
    /// Queries that failed
    pub failures: AtomicU64,
    /// Queries split into several passes
    pub chunked_queries: AtomicU64,
    /// Passes executed
    pub passes: AtomicU64,
    /// Blocks decoded from the store
    pub blocks_read: AtomicU64,
    /// Datapoints returned
    pub datapoints_returned: AtomicU64,
}

impl ExecutionStats {
    /// Get a snapshot of current statistics
    pub fn snapshot(&self) -> ExecutionStatsSnapshot {
        ExecutionStatsSnapshot {
            queries: self.queries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            chunked_queries: self.chunked_queries.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
            blocks_read: self.blocks_read.load(Ordering::Relaxed),
            datapoints_returned: self.datapoints_returned.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of execution statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStatsSnapshot {
    /// Queries started
    pub queries: u64,
    /// Queries that failed
    pub failures: u64,
    /// Queries split into several passes
    pub chunked_queries: u64,
    /// Passes executed
    pub passes: u64,
    /// Blocks decoded from the store
    pub blocks_read: u64,
    /// Datapoints returned
    pub datapoints_returned: u64,
}

// ============================================================================
// Query Executor
// ============================================================================

/// Range query orchestrator over a [`SampleStore`]
///
/// # Example
///
/// ```rust
/// use rollup_tsdb::engine::InMemorySampleStore;
/// use rollup_tsdb::query::{QueryExecutor, QueryOptions, QueryRequest};
/// use rollup_tsdb::types::{Resolution, Sample, SampleBlock};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let res = Resolution::TenSeconds;
/// let store = Arc::new(InMemorySampleStore::new());
/// store.put_block(
///     "cpu.user",
///     "node-1",
///     res,
///     &SampleBlock::new(0, res.sample_duration_nanos(), vec![Sample::single(0, 1.0)]),
/// );
///
/// let executor = QueryExecutor::new(store);
/// let response = executor
///     .execute(&QueryRequest::new("cpu.user"), &QueryOptions::new(res, 0, 60_000_000_000))
///     .await?;
/// assert_eq!(response.sources, vec!["node-1"]);
/// # Ok(())
/// # }
/// ```
pub struct QueryExecutor<S: SampleStore> {
    /// Store holding encoded blocks
    store: Arc<S>,

    /// Source of "now" for clamping and the leading edge
    clock: Arc<dyn Clock>,

    /// Executor configuration
    config: ExecutorConfig,

    /// Execution statistics for monitoring
    stats: ExecutionStats,
}

impl<S: SampleStore> QueryExecutor<S> {
    /// Create an executor with default configuration and the system clock
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, ExecutorConfig::default())
    }

    /// Create an executor with custom configuration
    pub fn with_config(store: Arc<S>, config: ExecutorConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config,
            stats: ExecutionStats::default(),
        }
    }

    /// Replace the clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Executor configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Snapshot of execution statistics
    pub fn stats(&self) -> ExecutionStatsSnapshot {
        self.stats.snapshot()
    }

    /// Query options at the native sample duration using the configured
    /// interpolation limit
    pub fn options(&self, resolution: Resolution, start_nanos: i64, end_nanos: i64) -> QueryOptions {
        QueryOptions::new(resolution, start_nanos, end_nanos)
            .with_interpolation_limit(self.config.interpolation_limit_nanos)
    }

    /// Run a query with the configured budget, source estimate and read
    /// deadline
    ///
    /// Results are charged to a fresh, unbounded account.
    pub async fn execute(
        &self,
        request: &QueryRequest,
        options: &QueryOptions,
    ) -> QueryResult<QueryResponse> {
        let mut ctx = ExecutionContext::new();
        if let Some(timeout) = self.config.read_timeout {
            ctx = ctx.with_read_timeout(timeout);
        }

        let result_monitor = Arc::new(MemoryMonitor::unbounded("query-result"));
        let mut result_account = result_monitor.make_account();
        let worker_monitor = Arc::new(MemoryMonitor::new(
            "query-worker",
            self.config.worker_memory_budget,
        ));

        self.query_memory_constrained(
            &ctx,
            request,
            options,
            &mut result_account,
            &worker_monitor,
            self.config.worker_memory_budget,
            self.config.estimated_source_count,
        )
        .await
    }

    /// Run a query as a single pass
    ///
    /// Decoded spans are charged to a local account on `worker_monitor` that
    /// is released before returning; source names and datapoints are charged
    /// to `result_account` and stay charged.
    ///
    /// # Errors
    ///
    /// - validation error for a sample duration that is not a positive
    ///   multiple of the resolution's
    /// - resource limit error if either account cannot grow
    /// - data integrity error for undecodable or out-of-order blocks
    /// - upstream, timeout or cancellation errors from store reads
    #[tracing::instrument(level = "debug", skip_all, fields(metric = %request.name))]
    pub async fn query(
        &self,
        ctx: &ExecutionContext,
        request: &QueryRequest,
        options: &QueryOptions,
        result_account: &mut BoundAccount,
        worker_monitor: &Arc<MemoryMonitor>,
    ) -> QueryResult<QueryResponse> {
        let started = Instant::now();
        self.stats.queries.fetch_add(1, Ordering::Relaxed);

        let result = self
            .run_pass(ctx, request, options, result_account, worker_monitor)
            .await;

        self.finish("single", started, &result);
        result
    }

    /// Run a query in as many sequential passes as `budget` requires
    ///
    /// Each pass reads only its own sub-range padded by the interpolation
    /// limit. With a limit of zero (unlimited) a pass cannot see real samples
    /// beyond its sub-range, so a gap that crosses a pass boundary is not
    /// interpolated and the result can differ from a single pass. Set a
    /// positive limit to get identical results.
    ///
    /// # Errors
    ///
    /// Everything [`query`](Self::query) reports, plus a resource limit error
    /// if the budget cannot cover even one output sample per pass.
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(level = "debug", skip_all, fields(metric = %request.name))]
    pub async fn query_memory_constrained(
        &self,
        ctx: &ExecutionContext,
        request: &QueryRequest,
        options: &QueryOptions,
        result_account: &mut BoundAccount,
        worker_monitor: &Arc<MemoryMonitor>,
        budget: i64,
        estimated_source_count: i64,
    ) -> QueryResult<QueryResponse> {
        let started = Instant::now();
        self.stats.queries.fetch_add(1, Ordering::Relaxed);

        let result = self
            .run_chunked(
                ctx,
                request,
                options,
                result_account,
                worker_monitor,
                budget,
                estimated_source_count,
            )
            .await;

        self.finish("constrained", started, &result);
        result
    }

    fn finish(&self, mode: &str, started: Instant, result: &QueryResult<QueryResponse>) {
        match result {
            Ok(response) => {
                self.stats
                    .datapoints_returned
                    .fetch_add(response.len() as u64, Ordering::Relaxed);
                if self.config.metrics_enabled {
                    metrics::record_datapoints(response.len());
                }
            }
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                debug!(kind = %e.kind, error = %e, "Query failed");
            }
        }
        if self.config.metrics_enabled {
            metrics::record_query(mode, started.elapsed().as_secs_f64(), result.is_ok());
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_chunked(
        &self,
        ctx: &ExecutionContext,
        request: &QueryRequest,
        options: &QueryOptions,
        result_account: &mut BoundAccount,
        worker_monitor: &Arc<MemoryMonitor>,
        budget: i64,
        estimated_source_count: i64,
    ) -> QueryResult<QueryResponse> {
        options.validate()?;

        let max_timespan = planner::max_timespan(
            options.resolution,
            budget,
            estimated_source_count,
            options.interpolation_limit_nanos,
        )?;

        let total_timespan = options.end_nanos.saturating_sub(options.start_nanos);
        if max_timespan >= total_timespan {
            return self
                .run_pass(ctx, request, options, result_account, worker_monitor)
                .await;
        }

        // Sub-ranges must start on output sample boundaries so that every
        // output bucket lands in exactly one pass.
        let sample_duration = options.sample_duration_nanos;
        let chunk_timespan = max_timespan - max_timespan % sample_duration;
        if chunk_timespan <= 0 {
            return Err(QueryError::resource_limit(format!(
                "memory budget allows {}ns per pass, shorter than sample duration {}ns",
                max_timespan, sample_duration
            )));
        }

        let start = floor_to(options.start_nanos, sample_duration);
        let end = options.end_nanos;
        debug!(
            start,
            end,
            chunk_timespan,
            "Splitting query into sub-ranges to fit memory budget"
        );
        self.stats.chunked_queries.fetch_add(1, Ordering::Relaxed);
        if options.interpolation_limit_nanos == 0 {
            warn!(
                metric = %request.name,
                "Unlimited interpolation does not bridge gaps across sub-range boundaries"
            );
        }

        let mut accumulator = ResponseAccumulator::new();
        let mut passes = 0usize;
        let mut chunk_start = start;
        while chunk_start < end {
            let chunk_end = chunk_start.saturating_add(chunk_timespan);
            // Sub-range ends are inclusive; stop just short of the next
            // sub-range's first bucket.
            let adjusted_end = (chunk_end - 1).min(end);

            let chunk_options = QueryOptions {
                start_nanos: chunk_start,
                end_nanos: adjusted_end,
                ..*options
            };
            let response = self
                .run_pass(ctx, request, &chunk_options, result_account, worker_monitor)
                .await?;
            accumulator.push(response);

            passes += 1;
            if self.config.metrics_enabled {
                metrics::record_chunk();
            }
            chunk_start = chunk_end;
        }

        let response = accumulator.finish();
        info!(
            metric = %request.name,
            passes,
            datapoints = response.len(),
            sources = response.sources.len(),
            "Chunked query completed"
        );
        Ok(response)
    }

    async fn run_pass(
        &self,
        ctx: &ExecutionContext,
        request: &QueryRequest,
        options: &QueryOptions,
        result_account: &mut BoundAccount,
        worker_monitor: &Arc<MemoryMonitor>,
    ) -> QueryResult<QueryResponse> {
        if let Err(e) = options.validate() {
            debug!(error = %e, "Rejecting query");
            return Err(e);
        }
        self.stats.passes.fetch_add(1, Ordering::Relaxed);

        let resolution = options.resolution;
        let native_duration = resolution.sample_duration_nanos();
        let sample_duration = options.sample_duration_nanos;
        let gap = options.interpolation_limit_nanos;

        // Disallow queries in the future
        let now = self.clock.now_nanos();
        if options.start_nanos > now {
            debug!(start = options.start_nanos, now, "Query starts in the future");
            return Ok(QueryResponse::default());
        }
        let mut end = options.end_nanos.min(now);
        let start = floor_to(options.start_nanos, sample_duration);

        // Near the present a downsampled bucket may still be filling up
        if sample_duration > native_duration && end > now - native_duration {
            end -= end.rem_euclid(sample_duration);
        }

        let rows = self.fetch(ctx, request, resolution, start, end, gap).await?;

        let mut local_account = worker_monitor.make_account();
        let spans = self.build_spans(&rows, start, &mut local_account)?;
        drop(rows);
        if self.config.metrics_enabled {
            metrics::update_memory(worker_monitor.name(), worker_monitor.high_water());
        }

        let max_distance = i32::try_from(gap / sample_duration).unwrap_or(i32::MAX);
        let extractor = request.downsampler.extractor();
        let downsampler = request.downsampler.downsampler();

        let mut sources = Vec::with_capacity(spans.len());
        let mut cursors = Vec::with_capacity(spans.len());
        for (source, span) in &spans {
            result_account.grow(source.len() as i64)?;
            sources.push(source.clone());
            cursors.push(InterpolatingCursor::new(
                span,
                0,
                sample_duration,
                max_distance,
                extractor,
                downsampler,
                request.derivative,
            ));
        }

        let filter = LeadingEdgeFilter::new(request.source_aggregator, now - native_duration);
        let mut merge = AggregatingMerge::new(cursors);
        merge.init();

        let mut datapoints = Vec::new();
        while let Some(timestamp) = merge.timestamp() {
            if timestamp > end {
                break;
            }
            if let Some(mut value) = filter.value(&merge) {
                result_account.grow(SIZE_OF_DATAPOINT)?;
                if request.derivative.is_derivative() {
                    value = value / sample_duration as f64 * NANOS_PER_SECOND as f64;
                }
                datapoints.push(DataPoint::new(timestamp, value));
            }
            merge.advance();
        }

        debug!(
            sources = sources.len(),
            datapoints = datapoints.len(),
            local_bytes = local_account.used(),
            "Query pass completed"
        );
        Ok(QueryResponse::new(datapoints, sources))
    }

    /// Read every block that may hold data for `[start - gap, end + gap]`
    async fn fetch(
        &self,
        ctx: &ExecutionContext,
        request: &QueryRequest,
        resolution: Resolution,
        start: i64,
        end: i64,
        gap: i64,
    ) -> QueryResult<Vec<KeyValue>> {
        let first = start.saturating_sub(gap);
        let last = end.saturating_add(gap);

        if request.sources.is_empty() {
            let range = DataKey::scan_range(&request.name, resolution, first, last);
            return ctx.guard("scan", self.store.scan(range)).await;
        }

        let mut seen = HashSet::with_capacity(request.sources.len());
        let sources: Vec<&String> = request
            .sources
            .iter()
            .filter(|source| seen.insert(source.as_str()))
            .collect();

        let slab = resolution.slab_duration_nanos();
        let mut keys = Vec::new();
        let mut timestamp = resolution.slab_start(first);
        while timestamp <= last {
            for source in &sources {
                keys.push(DataKey::new(&request.name, source.as_str(), resolution, timestamp).encode());
            }
            timestamp = match timestamp.checked_add(slab) {
                Some(t) => t,
                None => break,
            };
        }

        let values = ctx.guard("get_many", self.store.get_many(keys.clone())).await?;
        if values.len() != keys.len() {
            return Err(QueryError::upstream(format!(
                "store returned {} values for {} keys",
                values.len(),
                keys.len()
            )));
        }

        Ok(keys
            .into_iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|value| KeyValue::new(key, value)))
            .collect())
    }

    /// Group decoded blocks into one span per source
    fn build_spans(
        &self,
        rows: &[KeyValue],
        start: i64,
        account: &mut BoundAccount,
    ) -> QueryResult<BTreeMap<String, Span>> {
        let mut spans: BTreeMap<String, Span> = BTreeMap::new();

        for row in rows {
            let key = DataKey::decode(&row.key)?;
            let block = decode_block(&row.value)?;

            let span = match spans.entry(key.source) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    account.grow(entry.key().len() as i64 + SIZE_OF_SPAN)?;
                    entry.insert(Span::new(start, block.sample_duration_nanos))
                }
            };

            account.grow(block.samples.len() as i64 * SIZE_OF_SAMPLE + SIZE_OF_CALIBRATED_BLOCK)?;
            span.add_block(block)?;
        }

        self.stats
            .blocks_read
            .fetch_add(rows.len() as u64, Ordering::Relaxed);
        if self.config.metrics_enabled {
            metrics::record_blocks_read(rows.len());
        }
        Ok(spans)
    }
}

/// Floor `timestamp` to a multiple of `step`, saturating at `i64::MIN`
fn floor_to(timestamp: i64, step: i64) -> i64 {
    timestamp.saturating_sub(timestamp.rem_euclid(step))
}
