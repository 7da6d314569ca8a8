use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress bar counting the tests of one model.
///
/// Hidden when progress output is disabled, so callers can drive it unconditionally.
pub fn model_progress(
    position: usize,
    total: usize,
    model: &str,
    test_count: usize,
    enabled: bool,
) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(test_count as u64);
    let style = ProgressStyle::with_template(
        "{spinner:.green} {prefix} [{wide_bar:.cyan/blue}] {pos}/{len} [{elapsed_precise}] {msg}",
    )
    .map(|style| style.progress_chars("#>-"))
    .unwrap_or_else(|e| {
        log::debug!("Invalid progress template: {e}");
        ProgressStyle::default_bar()
    });

    pb.set_style(style);
    pb.set_prefix(format!("[{position}/{total}] {model}"));
    pb.enable_steady_tick(Duration::from_millis(250));
    pb
}
