use dyno_summary_model::AggregatePayload;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct DurationRow {
    test_case: String,
    model: String,
    #[tabled(display = "float2")]
    mean_duration_s: f64,
    count: u64,
    #[tabled(display = "or_dash")]
    start_time: Option<String>,
}

fn float2(n: &f64) -> String {
    format!("{:.2}", n)
}

fn or_dash(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "-".to_string())
}

fn opt_float2(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| float2(&v))
}

/// Render the mean durations of one run as a table, followed by its telemetry summary.
pub fn run_summary_table(payload: &AggregatePayload, run_key: &str) -> Option<String> {
    let tests = payload.runs.get(run_key)?;

    let rows = tests
        .iter()
        .flat_map(|(test_case, models)| {
            models.iter().map(move |summary| DurationRow {
                test_case: test_case.clone(),
                model: summary.model.clone(),
                mean_duration_s: summary.duration_s,
                count: summary.count,
                start_time: summary.start_time.clone(),
            })
        })
        .collect::<Vec<_>>();

    let mut table = Table::new(&rows);
    table.with(Style::modern());

    let telemetry = match payload.telemetry.get(run_key).cloned().flatten() {
        Some(t) => format!(
            "avg util {}%, max temp {}C, avg power {}W",
            opt_float2(t.avg_util),
            opt_float2(t.max_temp),
            opt_float2(t.avg_power)
        ),
        None => "no telemetry".to_string(),
    };

    Some(format!("{run_key}\n{table}\n{telemetry}"))
}

/// Print the summary table of one run to stdout.
pub fn print_run_summary(payload: &AggregatePayload, run_key: &str) {
    match run_summary_table(payload, run_key) {
        Some(table) => println!("{table}"),
        None => log::warn!("No results to summarise for {run_key}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dyno_summary_model::{ModelSummary, TelemetryAggregate};

    #[test]
    fn table_lists_every_model() {
        let mut payload = AggregatePayload::default();
        payload.runs.entry("run.csv".to_string()).or_default().insert(
            "t1.txt".to_string(),
            vec![
                ModelSummary {
                    model: "m1".to_string(),
                    duration_s: 2.0,
                    start_time: None,
                    count: 1,
                    telemetry: None,
                },
                ModelSummary {
                    model: "m2".to_string(),
                    duration_s: 180.0,
                    start_time: None,
                    count: 1,
                    telemetry: None,
                },
            ],
        );
        payload.telemetry.insert(
            "run.csv".to_string(),
            Some(TelemetryAggregate {
                avg_util: Some(50.0),
                max_temp: None,
                avg_power: Some(100.0),
            }),
        );

        let table = run_summary_table(&payload, "run.csv").unwrap();
        assert!(table.contains("m1"));
        assert!(table.contains("180.00"));
        assert!(table.contains("avg util 50.00%, max temp -C, avg power 100.00W"));
        assert!(run_summary_table(&payload, "other.csv").is_none());
    }
}
