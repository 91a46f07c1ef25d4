use std::path::PathBuf;
use std::time::Duration;

use schedviz_core::ReaderCollector;

use crate::ViewArgs;

pub fn run(file: PathBuf, pace_ms: u64, view: &ViewArgs) {
    super::init_logging(view);

    if !file.is_file() {
        eprintln!("Error: no such trace file: {}", file.display());
        std::process::exit(2);
    }

    let title = format!("replay {}", file.display());
    let collector = ReaderCollector::replay(file).with_pace(Duration::from_millis(pace_ms));
    super::run_dashboard(Box::new(collector), view, title);
}
