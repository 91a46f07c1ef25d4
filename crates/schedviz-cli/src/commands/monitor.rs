use std::path::PathBuf;

use schedviz_core::{CollectorConfig, ProcessCollector};

use crate::ViewArgs;

pub fn run(
    target: PathBuf,
    args: Vec<String>,
    period: u64,
    launcher: Option<&str>,
    view: &ViewArgs,
) {
    super::init_logging(view);

    let mut config = CollectorConfig::new(target, period);
    config.args = args;
    config.launcher = launcher.map(split_launcher);

    // Fail fast, before the terminal is taken over.
    let plan = match config.validate() {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };
    log::info!("monitoring `{}` every {period}ms", plan.display());

    let title = plan.display();
    super::run_dashboard(Box::new(ProcessCollector::new(config)), view, title);
}

/// `"go run -race"` → `["go", "run", "-race"]`.
fn split_launcher(launcher: &str) -> Vec<String> {
    launcher.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launcher_is_split_on_whitespace() {
        assert_eq!(split_launcher("go  run -race"), vec!["go", "run", "-race"]);
        assert!(split_launcher("   ").is_empty());
    }
}
