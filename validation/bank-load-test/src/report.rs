//! Results reporting and formatting.

use crate::metrics::{EndpointResults, TestResults};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};

/// Formats test results for output.
pub struct ResultsReport;

/// Distinct errors listed in the table output.
const MAX_FAILURE_ROWS: usize = 5;

impl ResultsReport {
    /// Format results as a console table.
    pub fn format_table(results: &TestResults) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                "Name", "Requests", "Fails", "Success", "Req/s", "p50", "p90", "p99", "Max",
                "Avg size",
            ]);

        for endpoint in results.endpoints.iter().chain(std::iter::once(&results.total)) {
            table.add_row(Self::endpoint_row(endpoint));
        }

        let stats = &results.run_stats;
        let mut summary = Table::new();
        summary
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![format!("Load Test Results: {}", results.scenario_name)]);
        summary.add_row(vec!["Duration:", &format!("{:.1}s", results.duration_secs)]);
        summary.add_row(vec![
            "Virtual users:",
            &format!("{} spawned / {} ready", stats.users_spawned, stats.users_ready),
        ]);
        summary.add_row(vec![
            "Bootstrap failures:",
            &format!(
                "{} users / {} accounts",
                stats.user_creation_failures, stats.account_creation_failures
            ),
        ]);
        summary.add_row(vec![
            "Unseeded accounts:",
            &format!("{}", stats.unseeded_accounts),
        ]);
        summary.add_row(vec![
            "Transport faults:",
            &format!("{}", stats.transfer_transport_faults),
        ]);

        let mut output = format!("{}\n{}", summary, table);

        if !results.total.failures.is_empty() {
            let mut failures = Table::new();
            failures
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Count", "Error"]);
            for failure in results.total.failures.iter().take(MAX_FAILURE_ROWS) {
                failures.add_row(vec![failure.count.to_string(), failure.error.clone()]);
            }
            output = format!("{}\n{}", output, failures);
        }

        output
    }

    fn endpoint_row(endpoint: &EndpointResults) -> Vec<String> {
        let name = if endpoint.request_type.is_empty() {
            endpoint.name.clone()
        } else {
            format!("{} {}", endpoint.request_type, endpoint.name)
        };

        vec![
            name,
            endpoint.total_requests.to_string(),
            endpoint.failed_requests.to_string(),
            format!("{:.1}%", endpoint.success_rate()),
            format!("{:.1}", endpoint.requests_per_second),
            format!("{:.1}", endpoint.latency_p50),
            format!("{:.1}", endpoint.latency_p90),
            format!("{:.1}", endpoint.latency_p99),
            format!("{:.1}", endpoint.latency_max),
            format!("{:.0}", endpoint.avg_size_bytes),
        ]
    }

    /// Format results as JSON.
    pub fn format_json(results: &TestResults) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(results)?)
    }

    /// Format results as CSV, one row per endpoint plus the total.
    pub fn format_csv(results: &TestResults) -> String {
        results
            .endpoints
            .iter()
            .chain(std::iter::once(&results.total))
            .map(|e| {
                format!(
                    "{},{},{},{},{},{},{:.1},{:.1},{:.1},{:.1},{:.1}",
                    results.timestamp,
                    csv_field(&results.scenario_name),
                    csv_field(&e.request_type),
                    csv_field(&e.name),
                    e.total_requests,
                    e.failed_requests,
                    e.requests_per_second,
                    e.latency_p50,
                    e.latency_p90,
                    e.latency_p99,
                    e.latency_max
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// CSV header row.
    pub fn csv_header() -> &'static str {
        "timestamp,scenario,type,name,requests,failures,rps,p50,p90,p99,max"
    }
}

/// Quote a CSV field when it contains a delimiter, quote, or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
