//! Joining transfer units, cancellation and the final report.

use super::RunShared;
use crate::error::Error;
use crate::types::{Event, RunReport, TransferState};
use crate::utils::format_bytes;
use std::path::PathBuf;
use std::sync::PoisonError;
use tokio::task::JoinSet;

/// Wait for every submitted unit, then settle the run
///
/// If cancellation is requested while waiting, in-flight units get
/// `mirror.shutdown_grace` to wind down before the rest are aborted.
pub(super) async fn finish(
    shared: &RunShared,
    run_dir: PathBuf,
    mut units: JoinSet<()>,
) -> RunReport {
    loop {
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => {
                shutdown(shared, &mut units).await;
                break;
            }
            joined = units.join_next() => match joined {
                Some(Ok(())) => {}
                Some(Err(e)) if e.is_panic() => {
                    tracing::error!(error = %e, "Transfer task panicked");
                }
                Some(Err(_)) => {}
                None => break,
            }
        }
    }

    settle_stragglers(shared);
    shared.publish_progress();

    let report = build_report(shared, run_dir);
    tracing::info!(
        succeeded = report.succeeded,
        failed = report.failed,
        cancelled = report.cancelled,
        bytes = report.bytes_processed,
        "Mirror run finished"
    );
    shared.status(format!(
        "Finished: {} succeeded, {} failed, {} written",
        report.succeeded,
        report.failed,
        format_bytes(report.bytes_processed)
    ));
    shared.emit(Event::RunFinished {
        succeeded: report.succeeded,
        failed: report.failed,
        cancelled: report.cancelled,
    });
    report
}

/// Give in-flight units the grace period, then abort what is left
async fn shutdown(shared: &RunShared, units: &mut JoinSet<()>) {
    shared.status("Cancelling...");
    let grace = shared.config.mirror.shutdown_grace;
    tracing::info!(in_flight = units.len(), grace_secs = grace.as_secs(), "Cancelling run");

    let drained = tokio::time::timeout(grace, async {
        while units.join_next().await.is_some() {}
    })
    .await;

    match drained {
        Ok(()) => {
            tracing::info!("All transfers stopped within the grace period");
        }
        Err(_) => {
            tracing::warn!(
                remaining = units.len(),
                "Grace period elapsed, aborting remaining transfers"
            );
            units.abort_all();
            while units.join_next().await.is_some() {}
        }
    }
}

/// Units that never reached a terminal state (aborted or panicked)
fn settle_stragglers(shared: &RunShared) {
    let handles = shared
        .transfers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();

    for handle in handles.iter().filter(|h| !h.state().is_terminal()) {
        if shared.cancel.is_cancelled() {
            handle.set_state(TransferState::Cancelled, "cancelled");
        } else {
            let error = Error::Other("transfer task ended unexpectedly".to_string());
            handle.set_state(TransferState::Failed, error.to_string());
            shared.record_failure(handle.name(), &error);
        }
    }
}

fn build_report(shared: &RunShared, run_dir: PathBuf) -> RunReport {
    let handles = shared
        .transfers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    let count = |state: TransferState| handles.iter().filter(|h| h.state() == state).count();
    let failures = shared.failures_snapshot();

    RunReport {
        run_dir,
        succeeded: count(TransferState::Succeeded),
        failed: failures.len(),
        cancelled: count(TransferState::Cancelled),
        failures,
        bytes_processed: shared.progress.processed(),
        bytes_known: shared.progress.known(),
    }
}
