//! Frame layout and the dashboard panels.

use std::time::Duration;

use multi_provider_balance::FailureKind;
use ratatui::{
    prelude::*,
    widgets::{Cell, Gauge, Paragraph, Row, Table, Wrap},
};

use super::styles;
use crate::app::{App, Mode, ProviderSample, Verdict};

const KEYS: &[(&str, &str)] = &[
    ("r", "run query"),
    ("c", "cancel"),
    ("Tab", "cycle mode"),
    ("p", "RPC strategy"),
    ("↑/↓", "select provider"),
    ("Space", "query selected"),
    ("b", "batch"),
    (",/.", "batch size"),
    ("s", "reset stats"),
    ("q", "quit"),
];

pub fn draw_ui(frame: &mut Frame, app: &App) {
    let [header, overview, body, keys] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(5),
        Constraint::Min(0),
        Constraint::Length(5),
    ])
    .areas(frame.area());

    let [table, detail] =
        Layout::horizontal([Constraint::Percentage(55), Constraint::Percentage(45)]).areas(body);

    draw_header(frame, header, app);
    draw_overview(frame, overview, app);
    draw_provider_table(frame, table, app);
    draw_detail(frame, detail, app);
    draw_keys(frame, keys);
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let chain = app.settings.chain;
    let line = Line::from(vec![
        Span::styled(format!(" {} ", chain.name), styles::banner()),
        Span::styled(format!(" {}  ", chain.token), styles::text()),
        Span::styled(app.address.as_str(), styles::label()),
    ]);

    frame.render_widget(
        Paragraph::new(line).block(styles::panel(" Multi-Provider Balance ")),
        area,
    );
}

fn draw_overview(frame: &mut Frame, area: Rect, app: &App) {
    let q = app.queries;
    let sep = || Span::styled("  │  ", styles::label());

    let queries = Line::from(vec![
        Span::styled(format!("{} queries ", q.total()), styles::text()),
        Span::styled(format!("in {}", age(app.stats_age())), styles::label()),
        sep(),
        Span::styled(format!("found {}", q.found), styles::count(q.found, styles::good())),
        Span::raw("  "),
        Span::styled(
            format!("not found {}", q.not_found),
            styles::count(q.not_found, styles::caution()),
        ),
        Span::raw("  "),
        Span::styled(format!("failed {}", q.failed), styles::count(q.failed, styles::bad())),
        Span::raw("  "),
        Span::styled(format!("cancelled {}", q.cancelled), styles::label()),
    ]);

    let backlog = app.indexer_backlog();
    let limiter = Line::from(vec![
        Span::styled("Indexer limiter ", styles::label()),
        Span::styled(
            format!("{}/s", app.settings.indexer_requests_per_second),
            styles::text(),
        ),
        Span::styled(", backlog ", styles::label()),
        Span::styled(
            backlog.to_string(),
            if backlog > 0 { styles::caution() } else { styles::text() },
        ),
        sep(),
        Span::styled("RPC ", styles::label()),
        Span::styled(
            format!(
                "{} over {} endpoints",
                app.strategy_string(),
                app.settings.chain_rpc_endpoint_list.len()
            ),
            styles::caution(),
        ),
    ]);

    let target = match app.mode {
        Mode::SingleProvider => app.selected_provider().unwrap_or("-").to_string(),
        _ => "all providers".to_string(),
    };
    let batch = if app.batch_mode {
        format!("batch {}/{}", app.batch_current, app.batch_count)
    } else {
        format!("batch off ({})", app.batch_count)
    };
    let mode = Line::from(vec![
        Span::styled("Mode ", styles::label()),
        Span::styled(app.mode_string(), styles::text()),
        Span::styled(" on ", styles::label()),
        Span::styled(target, styles::text()),
        sep(),
        Span::styled(
            batch,
            if app.batch_mode { styles::good() } else { styles::label() },
        ),
    ]);

    frame.render_widget(
        Paragraph::new(vec![queries, limiter, mode]).block(styles::panel(" Session ")),
        area,
    );
}

fn draw_provider_table(frame: &mut Frame, area: Rect, app: &App) {
    let header = Row::new(
        ["Provider", "Found", "No data", "Unconfig", "Faults", "Avg ms", "Last source"]
            .map(|h| Cell::from(h).style(styles::column_header())),
    )
    .bottom_margin(1);

    let rows = app.providers.iter().enumerate().map(|(idx, name)| {
        let tally = app.tallies.get(name).cloned().unwrap_or_default();
        let avg = tally
            .avg_found_ms()
            .map(|ms| format!("{ms:.0}"))
            .unwrap_or_else(|| "-".into());

        let row = Row::new(vec![
            Cell::from(name.as_str()),
            Cell::from(tally.found.to_string()).style(styles::count(tally.found, styles::good())),
            Cell::from(tally.no_data.to_string())
                .style(styles::count(tally.no_data, styles::caution())),
            Cell::from(tally.not_configured.to_string()).style(styles::label()),
            Cell::from(tally.faults.to_string()).style(styles::count(tally.faults, styles::bad())),
            Cell::from(avg),
            Cell::from(tally.last_source.unwrap_or_else(|| "-".into())),
        ]);

        if idx == app.selected_idx {
            row.style(styles::selected_row())
        } else {
            row
        }
    });

    let widths = [
        Constraint::Length(15),
        Constraint::Length(6),
        Constraint::Length(8),
        Constraint::Length(9),
        Constraint::Length(7),
        Constraint::Length(7),
        Constraint::Min(12),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(styles::panel(" Providers "));

    frame.render_widget(table, area);
}

fn draw_detail(frame: &mut Frame, area: Rect, app: &App) {
    let last_height = 5 + app.providers.len() as u16;
    let gauge_height = if app.batch_mode { 3 } else { 0 };

    let [last, gauge, log] = Layout::vertical([
        Constraint::Length(last_height),
        Constraint::Length(gauge_height),
        Constraint::Min(0),
    ])
    .areas(area);

    draw_last_query(frame, last, app);
    if app.batch_mode {
        draw_batch_gauge(frame, gauge, app);
    }
    draw_progress_log(frame, log, app);
}

fn draw_last_query(frame: &mut Frame, area: Rect, app: &App) {
    let status = if app.is_busy() {
        Span::styled("querying... (c to cancel)", styles::caution())
    } else {
        let style = app
            .last
            .as_ref()
            .map(|r| styles::verdict(r.verdict))
            .unwrap_or_else(styles::text);
        Span::styled(app.status.as_str(), style)
    };

    let mut lines = vec![Line::from(status)];

    match app.last.as_ref() {
        Some(report) => {
            let balance = match &report.balance {
                Some(b) => format!(
                    "{} {}  (free {}, reserved {})",
                    b.total, b.token, b.free, b.reserved
                ),
                None if report.verdict == Verdict::NotFound => "account not known".into(),
                None => "-".into(),
            };
            lines.push(Line::from(vec![
                Span::styled("Balance ", styles::label()),
                Span::styled(balance, styles::good()),
            ]));
            lines.push(Line::styled(
                format!(
                    "Asked {} providers in {:.0} ms",
                    report.samples.len(),
                    report.latency_ms
                ),
                styles::label(),
            ));
            lines.extend(report.samples.iter().map(attempt_line));
        }
        None => lines.push(Line::styled("No query yet", styles::label())),
    }

    frame.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(styles::panel(" Last Query ")),
        area,
    );
}

fn attempt_line(sample: &ProviderSample) -> Line<'_> {
    let outcome = match (sample.failure, &sample.source) {
        (None, Some(source)) => format!("answered via {source}"),
        (None, None) => "answered".to_string(),
        (Some(FailureKind::NoData), _) => "no data".to_string(),
        (Some(FailureKind::NotConfigured), _) => "not configured".to_string(),
        (Some(FailureKind::Fault), _) => "fault".to_string(),
        (Some(FailureKind::Cancelled), _) => "cancelled".to_string(),
    };

    Line::from(vec![
        Span::styled(format!("  {:<15}", sample.provider), styles::text()),
        Span::styled(format!("{:>6.0} ms  ", sample.latency_ms), styles::label()),
        Span::styled(outcome, styles::failure(sample.failure)),
    ])
}

fn draw_batch_gauge(frame: &mut Frame, area: Rect, app: &App) {
    let ratio = if app.batch_count == 0 {
        0.0
    } else {
        (app.batch_current as f64 / app.batch_count as f64).min(1.0)
    };

    let gauge = Gauge::default()
        .block(styles::panel(" Batch "))
        .gauge_style(styles::good())
        .ratio(ratio)
        .label(format!("{}/{}", app.batch_current, app.batch_count));

    frame.render_widget(gauge, area);
}

fn draw_progress_log(frame: &mut Frame, area: Rect, app: &App) {
    let visible = area.height.saturating_sub(2) as usize;
    let skip = app.progress_log.len().saturating_sub(visible);

    let lines: Vec<Line> = app
        .progress_log
        .iter()
        .skip(skip)
        .map(|line| Line::styled(line.as_str(), styles::progress_line(line)))
        .collect();

    frame.render_widget(Paragraph::new(lines).block(styles::panel(" Progress ")), area);
}

fn draw_keys(frame: &mut Frame, area: Rect) {
    let lines: Vec<Line> = KEYS
        .chunks(4)
        .map(|row| {
            let spans = row.iter().flat_map(|(key, action)| {
                [
                    Span::styled(format!(" {key}"), styles::caution()),
                    Span::styled(format!(" {action:<16}"), styles::label()),
                ]
            });
            Line::from(spans.collect::<Vec<_>>())
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(styles::panel(" Keys ")), area);
}

fn age(elapsed: Duration) -> String {
    match elapsed.as_secs() {
        s @ 0..=59 => format!("{s}s"),
        s @ 60..=3599 => format!("{}m{:02}s", s / 60, s % 60),
        s => format!("{}h{:02}m", s / 3600, (s % 3600) / 60),
    }
}
