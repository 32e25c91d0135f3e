// Metrics tracking for flush operations
// Thread-local storage: a queue is only ever driven by its session's thread
thread_local! {
    static METRICS: std::cell::RefCell<FlushMetrics> = const { std::cell::RefCell::new(FlushMetrics::new_const()) };
}

/// Counters accumulated across flushes on the current thread
#[derive(Debug, Default, Clone)]
struct FlushMetrics {
    /// Action effects run by `execute_actions`/`execute`
    actions_executed: u64,
    /// Non-empty categories executed
    categories_executed: u64,
    /// Insert sorter invocations
    insert_sorts: u64,
    /// Insert batches left (partly) in original order because of a cycle
    unsortable_batches: u64,
    /// Storage spaces handed to the query cache for invalidation
    spaces_invalidated: u64,
    /// Total time spent executing categories (nanoseconds)
    total_timing_ns: u128,
}

impl FlushMetrics {
    const fn new_const() -> Self {
        Self {
            actions_executed: 0,
            categories_executed: 0,
            insert_sorts: 0,
            unsortable_batches: 0,
            spaces_invalidated: 0,
            total_timing_ns: 0,
        }
    }
}

/// Public interface for metrics tracking
pub mod metrics_api {
    use super::*;

    /// Start timing a category execution
    pub fn record_execution_start() -> ExecutionTimer {
        ExecutionTimer::new()
    }

    /// Record one executed category
    pub fn record_category_complete(action_count: usize, timer: ExecutionTimer) {
        METRICS.with(|m| {
            let mut metrics = m.borrow_mut();
            metrics.categories_executed += 1;
            metrics.actions_executed += action_count as u64;
            metrics.total_timing_ns += timer.elapsed_ns();
        });
    }

    /// Record an action executed outside a category run
    pub fn record_single_execution() {
        METRICS.with(|m| {
            m.borrow_mut().actions_executed += 1;
        });
    }

    /// Record an insert sort
    pub fn record_insert_sort(unsortable: bool) {
        METRICS.with(|m| {
            let mut metrics = m.borrow_mut();
            metrics.insert_sorts += 1;
            if unsortable {
                metrics.unsortable_batches += 1;
            }
        });
    }

    /// Record spaces handed to the query cache
    pub fn record_spaces_invalidated(count: usize) {
        METRICS.with(|m| {
            m.borrow_mut().spaces_invalidated += count as u64;
        });
    }

    /// Get current flush statistics
    pub fn get_flush_stats() -> FlushStats {
        METRICS.with(|m| {
            let metrics = m.borrow();
            FlushStats {
                actions_executed: metrics.actions_executed,
                categories_executed: metrics.categories_executed,
                insert_sorts: metrics.insert_sorts,
                unsortable_batches: metrics.unsortable_batches,
                spaces_invalidated: metrics.spaces_invalidated,
                total_timing_ns: metrics.total_timing_ns,
            }
        })
    }

    /// Reset metrics
    pub fn reset_metrics() {
        METRICS.with(|m| {
            *m.borrow_mut() = FlushMetrics::default();
        });
    }
}

/// Timer for measuring category execution duration
pub struct ExecutionTimer {
    start: std::time::Instant,
}

impl ExecutionTimer {
    fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    fn elapsed_ns(&self) -> u128 {
        self.start.elapsed().as_nanos()
    }
}

/// Statistics returned by metrics functions
#[derive(Debug, Clone)]
pub struct FlushStats {
    pub actions_executed: u64,
    pub categories_executed: u64,
    pub insert_sorts: u64,
    pub unsortable_batches: u64,
    pub spaces_invalidated: u64,
    pub total_timing_ns: u128,
}

impl FlushStats {
    /// Convert timing to milliseconds
    pub fn total_timing_ms(&self) -> f64 {
        self.total_timing_ns as f64 / 1_000_000.0
    }

    /// Share of insert sorts that could not fully regroup their batch
    pub fn unsortable_rate(&self) -> f64 {
        if self.insert_sorts == 0 {
            0.0
        } else {
            self.unsortable_batches as f64 / self.insert_sorts as f64
        }
    }
}
