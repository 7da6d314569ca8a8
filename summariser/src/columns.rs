/// Candidates for the GPU utilization column, most specific first.
pub(crate) const UTIL_CANDIDATES: [&str; 4] = ["util_gpu", "utilization.gpu", "util", "utilization"];
/// Candidates for the GPU temperature column.
pub(crate) const TEMP_CANDIDATES: [&str; 4] = ["temp_c", "temperature.gpu", "temp", "temperature"];
/// Candidates for the power draw column.
pub(crate) const POWER_CANDIDATES: [&str; 3] = ["power_w", "power.draw", "power"];

/// Pick the first column whose lowercased name contains a candidate, trying candidates in order.
pub(crate) fn resolve_column<'a>(columns: &[&'a str], candidates: &[&str]) -> Option<&'a str> {
    candidates.iter().find_map(|candidate| {
        columns
            .iter()
            .find(|column| column.to_lowercase().contains(candidate))
            .copied()
    })
}
