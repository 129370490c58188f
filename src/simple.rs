use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::bench::Coordinator;
use crate::config::LoadConfig;
use crate::map::KeyedMap;
use crate::models::{ProgressReport, RunSummary};
use crate::Result;

/// Write each progress line to `out` as it arrives.
pub async fn print_progress<W: AsyncWrite + Unpin>(mut rx: mpsc::Receiver<ProgressReport>, mut out: W) {
    while let Some(report) = rx.recv().await {
        let line = format!("{}\n", report);
        if out.write_all(line.as_bytes()).await.is_err() || out.flush().await.is_err() {
            break;
        }
    }
}

/// Connect to the map with `connect`, then run a load test against it,
/// printing progress to stdout.
///
/// Ctrl+C raises the termination flag and drains the pool early.
pub async fn run_load_test<F, Fut>(config: LoadConfig, connect: F) -> Result<RunSummary>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Arc<dyn KeyedMap>>>,
{
    let mut coordinator = Coordinator::connect(config, connect).await?;
    let (tx, rx) = mpsc::channel(100);

    let printer = tokio::spawn(print_progress(rx, tokio::io::stdout()));

    let stop = coordinator.stop_handle();
    let interrupt = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl+C, draining workers");
                stop.stop();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    let result = coordinator.run(tx).await;
    interrupt.abort();
    printer.await.ok();

    let summary = result?;
    println!("{}", summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::{HealthMonitor, LivenessTable, MetricsSnapshot};
    use std::time::Duration;

    #[tokio::test]
    async fn test_print_progress_writes_one_line_per_report() {
        let (tx, rx) = mpsc::channel(4);
        let table = LivenessTable::new(2);
        let health = HealthMonitor::new(Duration::from_secs(1)).report_at(Duration::ZERO, &table);

        for (ms, successes) in [(1000, 10), (2000, 1500)] {
            tx.send(ProgressReport {
                elapsed: Duration::from_millis(ms),
                counts: MetricsSnapshot { successes, errors: 0 },
                health: health.clone(),
            })
            .await
            .unwrap();
        }
        drop(tx);

        let mut out = Vec::new();
        print_progress(rx, &mut out).await;

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "1,000ms: Success: 10  Failed: 0  Thread Health: ..\n\
             2,000ms: Success: 1,500  Failed: 0  Thread Health: ..\n"
        );
    }
}
