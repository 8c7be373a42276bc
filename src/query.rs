//! Balance query execution for the TUI dashboard.

use std::time::Instant;

use multi_provider_balance::{ProviderAttempt, ProviderReport, QueryContext};
use tokio::sync::mpsc;

use crate::app::{App, AppEvent, Mode, ProviderSample, QueryReport, Verdict};

/// Spawns a balance query based on the current app configuration.
///
/// The query runs in a background task; progress lines and the final report are sent
/// over `tx` tagged with the query id, so the app can ignore a query it has cancelled.
pub fn spawn_balance_query(app: &mut App, tx: mpsc::UnboundedSender<AppEvent>) {
    let Some((query, token)) = app.begin_query() else {
        return;
    };

    let mode = app.mode;
    let selected_idx = app.selected_idx;
    let resolver = app.resolver.clone();
    let address = app.address.clone();

    let progress_tx = tx.clone();
    let ctx = QueryContext::new()
        .with_cancellation(token)
        .with_progress(move |line| {
            let _ = progress_tx.send(AppEvent::Progress {
                query,
                line: line.to_string(),
            });
        });

    tokio::spawn(async move {
        let start = Instant::now();

        let (samples, balance) = match mode {
            Mode::Fallback => {
                let resolution = resolver.resolve(&address, &ctx).await;
                let mut samples: Vec<_> = resolution
                    .attempts
                    .iter()
                    .map(|a| sample(a, None))
                    .collect();
                let balance = resolution.into_result();
                // Fallback stops at the first answer, so it is the last attempt.
                if let (Some(result), Some(last)) = (&balance, samples.last_mut()) {
                    last.source = Some(result.provider.clone());
                }
                (samples, balance)
            }
            Mode::CompareAll => {
                let reports = resolver.compare_reports(&address, &ctx).await;
                let samples: Vec<_> = reports.iter().map(sample_of_report).collect();
                let fastest = reports
                    .into_iter()
                    .filter_map(|r| r.result)
                    .min_by_key(|r| r.response_time_ms);
                (samples, fastest)
            }
            Mode::SingleProvider => {
                match resolver.report_provider(selected_idx, &address, &ctx).await {
                    Some(report) => (vec![sample_of_report(&report)], report.result),
                    None => (Vec::new(), None),
                }
            }
        };

        let verdict = Verdict::of(&samples);
        let message = match (&balance, verdict) {
            (Some(r), _) => format!("{} {} via {}", r.total, r.token, r.provider),
            (None, Verdict::NotFound) => "account unknown to every provider asked".to_string(),
            (None, _) if samples.is_empty() => "no provider selected".to_string(),
            (None, _) => format!("no balance from {} providers", samples.len()),
        };

        let report = QueryReport {
            verdict,
            samples,
            balance,
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            message,
        };
        let _ = tx.send(AppEvent::QueryFinished { query, report });
    });
}

fn sample(attempt: &ProviderAttempt, source: Option<String>) -> ProviderSample {
    ProviderSample {
        provider: attempt.provider.clone(),
        latency_ms: attempt.elapsed.as_secs_f64() * 1000.0,
        failure: attempt.error.as_ref().map(|e| e.kind),
        source,
    }
}

fn sample_of_report(report: &ProviderReport) -> ProviderSample {
    sample(
        &report.attempt,
        report.result.as_ref().map(|r| r.provider.clone()),
    )
}
