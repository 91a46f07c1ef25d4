//! Line-oriented presenter for `--headless`: one summary line per refresh,
//! easy to pipe into grep or a log file.

use std::io::Write;

use schedviz_core::{DashboardData, PipelineExit, Presenter};

pub struct HeadlessPresenter<W: Write> {
    out: W,
    last_time_ms: Option<u64>,
}

impl<W: Write> HeadlessPresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_time_ms: None,
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{line}").and_then(|()| self.out.flush()) {
            log::debug!("headless output failed: {e}");
        }
    }
}

impl<W: Write> Presenter for HeadlessPresenter<W> {
    fn update(&mut self, data: DashboardData) {
        if data.is_empty() {
            return;
        }
        // Ticks faster than the trace period would repeat the same snapshot.
        if self.last_time_ms == Some(data.current.time_ms) {
            return;
        }
        self.last_time_ms = Some(data.current.time_ms);
        self.emit(&summary_line(&data));
    }

    fn finish(&mut self, exit: &PipelineExit) {
        self.emit(&format!("# {}", super::exit_summary(exit)));
    }
}

/// `t=2000ms procs=4 idle=0 threads=8 spin=0 grq=17 lrq=17 [4 6 2 5] goroutines=3`
pub fn summary_line(data: &DashboardData) -> String {
    let c = &data.current;
    let queues = c
        .local_queues
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "t={}ms procs={} idle={} threads={} spin={} grq={} lrq={} [{}] goroutines={}",
        c.time_ms,
        c.max_procs,
        c.idle_procs,
        c.threads,
        c.spinning_threads,
        c.global_queue,
        c.local_queue_sum,
        queues,
        c.goroutines
    )
}
