use futures::stream::{self, StreamExt};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::core::types::{AbandonReason, DateTask, TaskOutcome};
use crate::features::sink::RecordSink;
use crate::scraping::driver::SessionFactory;
use crate::tools::executor::TaskExecutor;

/// Aggregate of one sweep.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Records of accepted batches that reached the sink.
    pub total_records: usize,
    pub accepted: usize,
    pub abandoned: Vec<(DateTask, AbandonReason)>,
    /// Accepted batches the sink refused, with the error text.
    pub sink_failures: Vec<(DateTask, String)>,
}

enum SlotResult {
    Written(usize),
    Abandoned(DateTask, AbandonReason),
    SinkFailed(DateTask, String),
}

/// Run every task with at most `pool_size` retry loops in flight.
///
/// A slot owns its task until it is accepted or abandoned; accepted batches
/// go to `sink` as one append each. Returns once every task has finished.
pub async fn dispatch<F, S>(
    tasks: Vec<DateTask>,
    pool_size: usize,
    executor: &TaskExecutor<F>,
    sink: &S,
) -> DispatchReport
where
    F: SessionFactory,
    S: RecordSink + ?Sized,
{
    let start_time = Instant::now();
    let total_tasks = tasks.len();
    let pool_size = pool_size.max(1);

    info!(
        "Starting sweep of {} date tasks (pool size: {})",
        total_tasks, pool_size
    );

    let results: Vec<SlotResult> = stream::iter(tasks)
        .map(|task| async move {
            match executor.run(&task).await {
                TaskOutcome::Accepted { records, attempts } => match sink.append(&records).await {
                    Ok(written) => {
                        info!(
                            "Wrote {} records for {} (accepted after {} attempt(s))",
                            written, task, attempts
                        );
                        SlotResult::Written(written)
                    }
                    Err(e) => {
                        error!("Failed to write records for {}: {}", task, e);
                        SlotResult::SinkFailed(task, e.to_string())
                    }
                },
                TaskOutcome::Abandoned(reason) => {
                    warn!("Task {} abandoned: {}", task, reason);
                    SlotResult::Abandoned(task, reason)
                }
            }
        })
        .buffer_unordered(pool_size)
        .collect()
        .await;

    let mut report = DispatchReport::default();
    for result in results {
        match result {
            SlotResult::Written(n) => {
                report.total_records += n;
                report.accepted += 1;
            }
            SlotResult::Abandoned(task, reason) => report.abandoned.push((task, reason)),
            SlotResult::SinkFailed(task, e) => report.sink_failures.push((task, e)),
        }
    }

    info!(
        "Sweep finished in {:.1}s: {} accepted, {} abandoned, {} sink failures, {} records",
        start_time.elapsed().as_secs_f64(),
        report.accepted,
        report.abandoned.len(),
        report.sink_failures.len(),
        report.total_records
    );
    report
}
