use dyno_summary_model::{run_fragment, telemetry_sink_name_for};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A result sink and the telemetry sink recorded alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunSinks {
    /// Result sink file name, used as the run key in the payload
    pub run_key: String,
    pub results: PathBuf,
    /// Present only if the telemetry sink exists
    pub telemetry: Option<PathBuf>,
}

/// Find every result sink directly inside `results_dir`, sorted by file name, and pair it with its
/// telemetry sink in `telemetry_dir`.
pub(crate) fn discover_runs(results_dir: &Path, telemetry_dir: &Path) -> Vec<RunSinks> {
    let mut runs = WalkDir::new(results_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry in {}: {e}", results_dir.display());
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let run_key = entry.file_name().to_str()?.to_string();
            let fragment = run_fragment(&run_key)?;

            let telemetry = telemetry_dir.join(telemetry_sink_name_for(fragment));
            let telemetry = telemetry.is_file().then_some(telemetry);
            if telemetry.is_none() {
                log::debug!("No telemetry sink recorded for {run_key}");
            }

            Some(RunSinks {
                results: entry.into_path(),
                run_key,
                telemetry,
            })
        })
        .collect::<Vec<_>>();

    runs.sort_by(|a, b| a.run_key.cmp(&b.run_key));
    runs
}
