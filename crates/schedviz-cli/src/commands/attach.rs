use schedviz_core::ReaderCollector;

use crate::ViewArgs;

pub fn run(view: &ViewArgs) {
    super::init_logging(view);
    log::info!("reading schedtrace lines from stdin");
    super::run_dashboard(
        Box::new(ReaderCollector::attach_stdin()),
        view,
        "stdin".to_string(),
    );
}
