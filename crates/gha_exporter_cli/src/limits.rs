use clap::ValueEnum;
use gha_exporter::ActionsApi;
use gha_exporter::github::types::{RateLimitResource, RateLimitResources};

/// Output format for rate limit display.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

/// Fetch and print the current quota of every resource GitHub reports.
pub(crate) async fn handle_limits(
    api: &dyn ActionsApi,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let limits = api.rate_limit().await?;
    let now = chrono::Utc::now();
    let items = rate_limits_to_display(&limits.resources, now);
    RateLimitDisplay::print_many(items, output)?;
    Ok(())
}

/// Rate limit information for display.
#[derive(Debug, Clone, serde::Serialize, tabled::Tabled)]
pub(crate) struct RateLimitDisplay {
    #[tabled(rename = "Resource")]
    pub resource: String,
    #[tabled(rename = "Limit")]
    pub limit: String,
    #[tabled(rename = "Used")]
    pub used: String,
    #[tabled(rename = "Remaining")]
    pub remaining: String,
    #[tabled(rename = "Usage %")]
    pub usage_percent: String,
    #[tabled(rename = "Resets At")]
    pub reset_at: String,
    #[tabled(rename = "Resets In")]
    pub reset_in: String,
}

impl RateLimitDisplay {
    fn from_resource(
        name: &str,
        resource: &RateLimitResource,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let usage_percent = if resource.limit > 0 {
            (resource.used as f64 / resource.limit as f64) * 100.0
        } else {
            0.0
        };
        let reset_at = resource.reset_at();
        let until_reset = reset_at.signed_duration_since(now);
        let reset_in = if until_reset.num_seconds() > 0 {
            format_duration(until_reset)
        } else {
            "now".to_string()
        };

        Self {
            resource: name.to_string(),
            limit: resource.limit.to_string(),
            used: resource.used.to_string(),
            remaining: resource.remaining.to_string(),
            usage_percent: format!("{:.1}%", usage_percent),
            reset_at: reset_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            reset_in,
        }
    }

    fn print_many(items: Vec<Self>, format: OutputFormat) -> Result<(), serde_json::Error> {
        match format {
            OutputFormat::Table => {
                let mut table = tabled::Table::new(items);
                table.with(tabled::settings::Style::rounded());
                println!("{}", table);
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&items)?);
            }
        }
        Ok(())
    }
}

/// Core first, then whichever optional resources the server reported.
fn rate_limits_to_display(
    limits: &RateLimitResources,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<RateLimitDisplay> {
    let mut items = vec![RateLimitDisplay::from_resource("core", &limits.core, now)];
    let optional = [
        ("search", &limits.search),
        ("graphql", &limits.graphql),
        (
            "actions_runner_registration",
            &limits.actions_runner_registration,
        ),
    ];
    for (name, resource) in optional {
        if let Some(r) = resource {
            items.push(RateLimitDisplay::from_resource(name, r, now));
        }
    }
    items
}

/// Format a duration in a human-readable way.
fn format_duration(duration: chrono::Duration) -> String {
    let total_secs = duration.num_seconds();
    if total_secs < 60 {
        return format!("{}s", total_secs);
    }
    if total_secs < 3600 {
        let (mins, secs) = (total_secs / 60, total_secs % 60);
        return match secs {
            0 => format!("{}m", mins),
            _ => format!("{}m {}s", mins, secs),
        };
    }
    let (hours, mins) = (total_secs / 3600, (total_secs % 3600) / 60);
    match mins {
        0 => format!("{}h", hours),
        _ => format!("{}h {}m", hours, mins),
    }
}
