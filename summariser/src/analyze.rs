use crate::columns::{resolve_column, POWER_CANDIDATES, TEMP_CANDIDATES, UTIL_CANDIDATES};
use dyno_summary_model::TelemetryAggregate;
use itertools::Itertools;
use polars::prelude::*;

/// Columns a result sink must have to be aggregated.
const REQUIRED_RESULT_COLUMNS: [&str; 4] = ["timestamp", "model", "test_case", "duration_s"];

/// Statistics for one (test case, model) pair within a run.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResultGroup {
    pub test_case: String,
    pub model: String,
    pub duration_s: f64,
    pub start_time: Option<String>,
    pub count: u64,
}

/// Group the rows of one result sink by test case and model.
///
/// Rows with an unreadable duration are dropped. Groups are ordered by test case, then model.
pub(crate) fn summarise_results(frame: DataFrame) -> anyhow::Result<Vec<ResultGroup>> {
    let names = frame
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .collect::<Vec<_>>();
    if let Some(missing) = REQUIRED_RESULT_COLUMNS
        .iter()
        .find(|required| !names.contains(required))
    {
        anyhow::bail!("Missing column `{missing}`");
    }

    let total = frame.height();
    let cleaned = frame
        .lazy()
        .select([
            col("test_case").cast(DataType::String),
            col("model").cast(DataType::String),
            col("timestamp").cast(DataType::String),
            col("duration_s").cast(DataType::Float64),
        ])
        .filter(
            col("duration_s")
                .is_not_null()
                .and(col("test_case").is_not_null())
                .and(col("model").is_not_null()),
        )
        .collect()?;

    let dropped = total - cleaned.height();
    if dropped > 0 {
        log::warn!("Dropped {dropped} row(s) without a readable duration");
    }

    let grouped = cleaned
        .lazy()
        .group_by([col("test_case"), col("model")])
        .agg([
            col("duration_s").mean().alias("duration_s"),
            col("timestamp").min().alias("start_time"),
            col("duration_s").count().cast(DataType::UInt64).alias("count"),
        ])
        .collect()?;

    let groups = itertools::izip!(
        grouped.column("test_case")?.str()?,
        grouped.column("model")?.str()?,
        grouped.column("duration_s")?.f64()?,
        grouped.column("start_time")?.str()?,
        grouped.column("count")?.u64()?
    )
    .filter_map(|(test_case, model, duration_s, start_time, count)| {
        Some(ResultGroup {
            test_case: test_case?.to_string(),
            model: model?.to_string(),
            duration_s: duration_s?,
            start_time: start_time.map(str::to_string),
            count: count.unwrap_or_default(),
        })
    })
    .sorted_by(|a, b| {
        a.test_case
            .cmp(&b.test_case)
            .then_with(|| a.model.cmp(&b.model))
    })
    .collect();

    Ok(groups)
}

/// Summarise one telemetry sink, whichever backend wrote it.
pub(crate) fn telemetry_aggregate(frame: &DataFrame) -> anyhow::Result<TelemetryAggregate> {
    let names = frame
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .collect::<Vec<_>>();

    let numeric = |candidates: &[&str]| -> anyhow::Result<Option<Column>> {
        match resolve_column(&names, candidates) {
            Some(name) => {
                log::debug!("Using telemetry column `{name}`");
                Ok(Some(frame.column(name)?.cast(&DataType::Float64)?))
            }
            None => Ok(None),
        }
    };

    Ok(TelemetryAggregate {
        avg_util: numeric(&UTIL_CANDIDATES)?.and_then(|c| finite(c.as_materialized_series().mean())),
        max_temp: match numeric(&TEMP_CANDIDATES)? {
            Some(c) => finite(c.as_materialized_series().max::<f64>()?),
            None => None,
        },
        avg_power: numeric(&POWER_CANDIDATES)?.and_then(|c| finite(c.as_materialized_series().mean())),
    })
}

#[inline]
fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}
