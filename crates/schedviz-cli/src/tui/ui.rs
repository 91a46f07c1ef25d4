//! TUI rendering.
//!
//! ┌──────────────────────────────────────────────────────┐
//! │  schedviz  go run ./cmd/server   running  t=12000ms  │
//! ├──────────────────────┬───────────────────────────────┤
//! │  Scheduler           │  Local run queues per P       │
//! │  gomaxprocs    8     │   ▆  ▂     █                  │
//! │  idle Ps       2     │   ▆  ▂  ▁  █  ▃               │
//! │  ...                 │  P0 P1 P2 P3 P4 ...           │
//! ├────────┬────────┬────┴───┬────────┬──────────────────┤
//! │  GRQ   │  LRQ   │threads │ idle P │  goroutines      │
//! ├────────┴────────┴────────┴────────┴──────────────────┤
//! │  history (linear | log10)                            │
//! ├──────────────────────────────────────────────────────┤
//! │  q: quit   l: log scale   p: pause   s: export       │
//! └──────────────────────────────────────────────────────┘

use super::app::App;
use ratatui::{prelude::*, widgets::*};
use schedviz_core::{DashboardData, GaugeValue, HistoryPoint};

pub fn draw(f: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),  // title
            Constraint::Length(12), // values + per-P queues
            Constraint::Length(3),  // gauges
            Constraint::Min(8),     // history
            Constraint::Length(1),  // keys
        ])
        .split(f.area());

    draw_title(f, rows[0], app);
    draw_top(f, rows[1], app);
    draw_gauges(f, rows[2], app.frame());
    draw_history(f, rows[3], app);
    draw_keys(f, rows[4]);
}

fn draw_title(f: &mut Frame, area: Rect, app: &App) {
    let frame = app.frame();
    let stats = app.stats();
    let state = app
        .state()
        .map_or_else(|| "starting".to_string(), |s| s.to_string());
    let state = match app.exit() {
        Some(_) => "finished".to_string(),
        None => state,
    };

    let mut spans = vec![
        Span::styled(" schedviz ", Style::default().bold().fg(Color::Cyan)),
        Span::raw("  "),
        Span::styled(app.title(), Style::default().bold().fg(Color::Yellow)),
        Span::styled(format!("  {state}"), Style::default().fg(Color::Green)),
        Span::styled(
            format!(
                "  t={}ms  #{}  lines {}  dropped {} ",
                frame.current.time_ms,
                app.frames(),
                stats.lines,
                stats.rejected
            ),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if app.is_paused() {
        spans.push(Span::styled(" PAUSED ", Style::default().bold().fg(Color::Red)));
    }
    if let Some(path) = app.last_export() {
        spans.push(Span::styled(
            format!(" saved {} ", path.display()),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Line::from(spans));

    f.render_widget(block, area);
}

fn draw_top(f: &mut Frame, area: Rect, app: &App) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(34), Constraint::Min(20)])
        .split(area);

    draw_values(f, cols[0], app.frame());
    draw_local_queues(f, cols[1], app.frame());
}

fn draw_values(f: &mut Frame, area: Rect, data: &DashboardData) {
    let c = &data.current;
    let rows: Vec<Row> = [
        ("gomaxprocs", c.max_procs),
        ("idle Ps", c.idle_procs),
        ("threads", c.threads),
        ("spinning threads", c.spinning_threads),
        ("need spinning", c.need_spinning),
        ("idle threads", c.idle_threads),
        ("global run queue", c.global_queue),
        ("local run queues", c.local_queue_sum),
        ("goroutines", c.goroutines),
    ]
    .into_iter()
    .map(|(name, value)| {
        Row::new(vec![
            Cell::from(name),
            Cell::from(value.to_string()).style(Style::default().fg(Color::Yellow)),
        ])
    })
    .collect();

    let table = Table::new(rows, [Constraint::Length(18), Constraint::Length(12)])
        .block(Block::default().borders(Borders::ALL).title(" Scheduler "));

    f.render_widget(table, area);
}

fn draw_local_queues(f: &mut Frame, area: Rect, data: &DashboardData) {
    let queues = &data.current.local_queues;
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Local run queues ({} Ps) ", data.current.num_p));

    if queues.is_empty() {
        let p = Paragraph::new("Waiting for scheduler trace…")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(p, area);
        return;
    }

    let bars: Vec<Bar> = queues
        .iter()
        .enumerate()
        .map(|(i, &len)| {
            Bar::default()
                .value(len)
                .label(Line::from(format!("P{i}")))
                .style(Style::default().fg(queue_color(len)))
        })
        .collect();

    // Shrink bars so every P fits on screen.
    let inner = area.width.saturating_sub(2) as usize;
    let width = (inner / queues.len()).saturating_sub(1).clamp(1, 5) as u16;

    let chart = BarChart::default()
        .block(block)
        .bar_width(width)
        .bar_gap(1)
        .data(BarGroup::default().bars(&bars));

    f.render_widget(chart, area);
}

fn queue_color(len: u64) -> Color {
    match len {
        0 => Color::DarkGray,
        1..=8 => Color::Green,
        9..=64 => Color::Yellow,
        _ => Color::Red,
    }
}

fn draw_gauges(f: &mut Frame, area: Rect, data: &DashboardData) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 5); 5])
        .split(area);

    let g = &data.gauges;
    let gauges = [
        ("GRQ", g.global_queue, Color::Magenta),
        ("LRQ", g.local_queue, Color::Cyan),
        ("threads", g.threads, Color::Blue),
        ("idle Ps", g.idle_procs, Color::Green),
        ("goroutines", g.goroutines, Color::Yellow),
    ];

    for ((name, value, color), col) in gauges.into_iter().zip(cols.iter()) {
        f.render_widget(gauge(name, value, color), *col);
    }
}

fn gauge(name: &str, value: GaugeValue, color: Color) -> Gauge<'static> {
    Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(format!(" {name} ")))
        .gauge_style(Style::default().fg(color))
        .ratio(value.ratio())
        .label(format!("{}/{}", value.current, value.max))
}

/// `(seconds, value)` pairs for one series.
fn series<T>(points: &[HistoryPoint<T>], pick: impl Fn(&HistoryPoint<T>) -> f64) -> Vec<(f64, f64)> {
    points
        .iter()
        .map(|p| (p.time_ms as f64 / 1000.0, pick(p)))
        .collect()
}

fn draw_history(f: &mut Frame, area: Rect, app: &App) {
    let data = app.frame();
    let log = app.is_log_scale();
    let scale = if log { "log10" } else { "linear" };
    let title = format!(" History, last {} snapshots ({scale}) ", data.history.len());

    if data.history.is_empty() {
        let p = Paragraph::new("No snapshots yet")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).title(title));
        f.render_widget(p, area);
        return;
    }

    let (grq, lrq, threads, goroutines) = if log {
        let h = &data.log_history;
        (
            series(h, |p| p.global_queue),
            series(h, |p| p.local_queue_sum),
            series(h, |p| p.threads),
            series(h, |p| p.goroutines),
        )
    } else {
        let h = &data.history;
        (
            series(h, |p| p.global_queue as f64),
            series(h, |p| p.local_queue_sum as f64),
            series(h, |p| p.threads as f64),
            series(h, |p| p.goroutines as f64),
        )
    };

    let datasets = vec![
        dataset("GRQ", &grq, Color::Magenta),
        dataset("LRQ", &lrq, Color::Cyan),
        dataset("threads", &threads, Color::Blue),
        dataset("goroutines", &goroutines, Color::Yellow),
    ];

    let (x_min, x_max) = x_bounds(&grq);
    let y_max = [&grq, &lrq, &threads, &goroutines]
        .iter()
        .flat_map(|s| s.iter().map(|&(_, y)| y))
        .fold(0.0_f64, f64::max)
        .max(1.0)
        * 1.1;

    let chart = Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title(title))
        .x_axis(Axis::default().bounds([x_min, x_max]).labels(vec![
            Line::from(format!("{x_min:.0}s")),
            Line::from(format!("{x_max:.0}s")),
        ]))
        .y_axis(Axis::default().bounds([0.0, y_max]).labels(vec![
            Line::from("0"),
            Line::from(format!("{y_max:.1}")),
        ]));

    f.render_widget(chart, area);
}

fn dataset<'a>(name: &'a str, data: &'a [(f64, f64)], color: Color) -> Dataset<'a> {
    Dataset::default()
        .name(name)
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(data)
}

fn x_bounds(points: &[(f64, f64)]) -> (f64, f64) {
    let first = points.first().map_or(0.0, |p| p.0);
    let last = points.last().map_or(0.0, |p| p.0);
    if last > first {
        (first, last)
    } else {
        (first, first + 1.0)
    }
}

fn draw_keys(f: &mut Frame, area: Rect) {
    let bar = Paragraph::new(" q: quit   l: toggle log scale   p: pause   s: export JSON")
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(bar, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use schedviz_core::{Presenter, SchedulerSnapshot};
    use tokio_util::sync::CancellationToken;

    #[test]
    fn x_bounds_never_collapse() {
        assert_eq!(x_bounds(&[]), (0.0, 1.0));
        assert_eq!(x_bounds(&[(3.0, 1.0)]), (3.0, 4.0));
        assert_eq!(x_bounds(&[(1.0, 0.0), (5.0, 2.0)]), (1.0, 5.0));
    }

    #[test]
    fn queue_colors_by_length() {
        assert_eq!(queue_color(0), Color::DarkGray);
        assert_eq!(queue_color(3), Color::Green);
        assert_eq!(queue_color(500), Color::Red);
    }

    #[test]
    fn draws_empty_and_populated_frames() {
        let mut app = App::new("replay trace.log".into(), CancellationToken::new());
        let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
        terminal.draw(|f| draw(f, &app)).unwrap();

        let s = SchedulerSnapshot {
            time_ms: 4000,
            max_procs: 4,
            idle_procs: 1,
            threads: 9,
            global_queue_len: 12,
            local_queues: vec![3, 0, 7, 1],
            local_queue_sum: 11,
            secondary_count: 42,
            ..Default::default()
        };
        let mut presenter = app.presenter();
        presenter.update(DashboardData::from_window(Some(&s), std::slice::from_ref(&s)));
        app.sync();
        terminal.draw(|f| draw(f, &app)).unwrap();

        let text: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect();
        assert!(text.contains("schedviz"));
        assert!(text.contains("P3"));
        assert!(text.contains("12/12"));
    }

    #[test]
    fn log_scale_history_draws() {
        let mut app = App::new("stdin".into(), CancellationToken::new());
        let history: Vec<SchedulerSnapshot> = (0..5)
            .map(|i| SchedulerSnapshot {
                time_ms: i * 1000,
                max_procs: 1,
                threads: 2,
                global_queue_len: 10u64.pow(i as u32),
                local_queues: vec![1],
                local_queue_sum: 1,
                ..Default::default()
            })
            .collect();
        let mut presenter = app.presenter();
        presenter.update(DashboardData::from_window(history.last(), &history));
        app.sync();
        app.toggle_log_scale();

        let mut terminal = Terminal::new(TestBackend::new(80, 30)).unwrap();
        terminal.draw(|f| draw(f, &app)).unwrap();
        let text: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect();
        assert!(text.contains("log10"));
    }
}
