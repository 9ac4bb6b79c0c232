use std::{
    fs::{create_dir_all, write},
    path::PathBuf,
    time::Duration,
};

use anyhow::{anyhow, Context};
use clap::{ArgGroup, Parser};
use config::DashboardConfig;
use correlation::{averages_per_customer, CoefficientMap, Metric, AVERAGE_FIELDS};
use groups::{
    heatmap::CorrelationHeatmap,
    scatter::{Feature, ScatterWidget, RESULT_FIELDS},
    tickets::TicketDashboard,
    Widget,
};
use navigation::{Condition, Domain, ListAction, Operator};
use rank::SortOrder;
use source::{load_coefficients, RecordSource, Source};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;
use watchers::{refresh, run_watch};

mod config;
mod correlation;
mod fields;
mod groups;
mod navigation;
mod rank;
mod source;
mod stat;
mod watchers;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(group(
    ArgGroup::new("dashboards")
        .args(&["tickets", "correlation", "averages", "correlate", "scatter"]) // every dashboard needs to be listed here
        .multiple(true)
        .required(true)
))]
#[clap(group(
    ArgGroup::new("coefficients")
        .required(false)
        .args(&["correlation", "averages", "correlate"]),
))]
pub struct Cli {
    /// where ticket records come from: a URL serving JSON, or a JSON / ndjson file
    #[arg(default_value_t = default_endpoint())]
    pub endpoint: String,

    /// render the ticket dashboard
    #[arg(long)]
    pub tickets: bool,

    /// render the correlation heatmap from a precomputed coefficient map (file or URL)
    #[arg(long)]
    pub correlation: Option<String>,

    /// compute the correlation heatmap from per-customer average rows (file or URL)
    #[arg(long)]
    pub averages: Option<String>,

    /// compute the correlation heatmap from the ticket records at ENDPOINT
    #[arg(long)]
    pub correlate: bool,

    /// heatmap axes, comma separated (ticket, priority, complexity, response, resolution, rating, point). Defaults to all
    #[arg(long, value_delimiter = ',')]
    pub metrics: Vec<Metric>,

    /// plot the cluster results of a k-means run (file or URL)
    #[arg(long, requires = "run")]
    pub scatter: Option<String>,

    /// the k-means run to plot
    #[arg(long)]
    pub run: Option<i64>,

    /// scatter plot x axis
    #[arg(long, value_enum, default_value_t = Feature::Point)]
    pub x_feature: Feature,

    /// scatter plot y axis
    #[arg(long, value_enum, default_value_t = Feature::Rating)]
    pub y_feature: Feature,

    /// first day of the date range, YYYY-MM-DD. Defaults to 2020-01-01
    #[arg(long)]
    pub start: Option<String>,

    /// last day of the date range, YYYY-MM-DD. Defaults to today
    #[arg(long)]
    pub end: Option<String>,

    /// order of the customer point ranking
    #[arg(long, value_enum, default_value_t = SortOrder::Descending)]
    pub sort: SortOrder,

    /// how many customers to rank
    #[arg(long, default_value_t = 20)]
    pub top: usize,

    /// directory the SVG charts are written to
    #[arg(long, short, default_value = ".")]
    pub out_dir: PathBuf,

    /// How often to re-render in watch mode, in seconds.
    #[arg(long, short, default_value_t = 5)]
    pub interval: u64,

    /// keep re-rendering the ticket dashboard until ctrl-c
    #[arg(long, short)]
    pub watch: bool,

    /// Debug logging
    #[arg(long, short)]
    pub verbose: bool,

    /// print the list action behind element INDEX of chart NAME, given as NAME:INDEX
    #[arg(long)]
    pub click: Option<String>,
}

fn default_endpoint() -> String {
    "http://localhost:8069/tickets.json".to_string()
}

/// split a NAME:INDEX click target
fn parse_click(raw: &str) -> anyhow::Result<(&str, usize)> {
    let (name, idx) = raw.split_once(':').ok_or_else(|| anyhow!("click target must look like NAME:INDEX, got {}", raw))?;
    let idx = idx.trim().parse().with_context(|| format!("invalid element index {}", idx))?;
    Ok((name.trim(), idx))
}

/// The click target, if there is one and it names one of `charts`
fn click_for<'a>(args: &'a Cli, charts: &[&str]) -> anyhow::Result<Option<(&'a str, usize)>> {
    let Some(raw) = &args.click else {
        return Ok(None);
    };
    let (name, idx) = parse_click(raw)?;
    if charts.contains(&name) {
        Ok(Some((name, idx)))
    } else {
        debug!("{} is not one of {:?}", name, charts);
        Ok(None)
    }
}

fn print_action(action: Option<&ListAction>, name: &str, idx: usize) -> anyhow::Result<()> {
    let action = action.ok_or_else(|| anyhow!("nothing to open for {}:{}", name, idx))?;
    println!("{}", serde_json::to_string_pretty(action)?);
    Ok(())
}

async fn tickets(args: &Cli, config: &DashboardConfig) -> anyhow::Result<()> {
    let source = Source::from(args.endpoint.as_str());
    let mut dashboard = TicketDashboard::new(config);
    let domain = config.base_domain();
    info!("using ticket source {}", args.endpoint);

    if args.watch {
        let token = CancellationToken::new();
        let cloned_token = token.clone();
        tokio::spawn(async move {
            if let Err(e) = signal::ctrl_c().await {
                error!("failed to listen for ctrl-c: {}", e);
            }
            token.cancel();
        });
        run_watch(&source, &mut dashboard, &domain, Duration::from_secs(args.interval), cloned_token).await?;
    } else {
        refresh(&source, &mut dashboard, &domain).await.context("is the ticket source correct?")?;
    }

    for name in dashboard.names() {
        match dashboard.handle(name) {
            Some(handle) => info!("{}: {} [{}]", handle.title(), handle.path().display(), handle.labels().join(", ")),
            None => info!("{}: no data", name),
        }
    }

    if let Some((name, idx)) = click_for(args, &dashboard.names())? {
        print_action(dashboard.click(name, idx), name, idx)?;
    }
    Ok(())
}

async fn correlation(args: &Cli, config: &DashboardConfig) -> anyhow::Result<()> {
    let heatmap = if let Some(location) = &args.correlation {
        CorrelationHeatmap::new(load_coefficients(location).await?)
    } else if args.averages.is_some() || args.correlate {
        let rows = match &args.averages {
            Some(location) => Source::from(location.as_str()).fetch(&Domain::default(), &[]).await?,
            None => {
                let tickets = Source::from(args.endpoint.as_str())
                    .fetch(&Domain::default(), &AVERAGE_FIELDS)
                    .await
                    .context("is the ticket source correct?")?;
                averages_per_customer(&tickets)
            }
        };
        info!("computing correlations from {} rows", rows.len());
        let mut heatmap = CorrelationHeatmap::new(CoefficientMap::default());
        heatmap.update(&rows);
        if heatmap.coefficients().is_empty() {
            return Err(anyhow!("no per-customer averages found, cannot compute correlation"));
        }

        // keep the computed run around so it can be fed back in with --correlation
        let saved = config.out_dir.join("correlation.json");
        let json = serde_json::to_string_pretty(&heatmap.coefficients().to_json())?;
        write(&saved, json).with_context(|| format!("could not write {}", saved.display()))?;
        info!("saved coefficients to {}", saved.display());
        heatmap
    } else {
        return Ok(());
    };

    let heatmap = if args.metrics.is_empty() { heatmap } else { heatmap.with_alphabet(&args.metrics) };
    println!("{}", heatmap.table());
    match heatmap.plot(&config.out_dir)? {
        Some(handle) => info!("{}: {}", handle.title(), handle.path().display()),
        None => info!("no correlation data, heatmap skipped"),
    }
    Ok(())
}

async fn scatter(args: &Cli, config: &DashboardConfig) -> anyhow::Result<()> {
    let (Some(location), Some(run)) = (&args.scatter, args.run) else {
        return Ok(());
    };
    let domain = Domain::from(vec![Condition::new("run_id", Operator::Eq, run)]);
    let rows = Source::from(location.as_str())
        .fetch(&domain, &RESULT_FIELDS)
        .await
        .context("could not fetch cluster results")?;
    if rows.is_empty() {
        return Err(anyhow!("no cluster results found for k-means run {}", run));
    }

    let mut widget = ScatterWidget::new(run, args.x_feature, args.y_feature);
    widget.update(&rows);
    print!("{}", widget.summary());

    let Some(handle) = widget.plot(&config.out_dir)? else {
        info!("no cluster results with {} and {}, scatter plot skipped", args.x_feature.label(), args.y_feature.label());
        return Ok(());
    };
    info!("{}: {}", handle.title(), handle.path().display());
    if let Some((name, idx)) = click_for(args, &[widget.name()])? {
        print_action(handle.click(idx), name, idx)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let mut level = LevelFilter::INFO;
    if args.verbose {
        level = LevelFilter::DEBUG;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::builder().with_default_directive(level.into()).from_env_lossy())
        .init();

    let config = DashboardConfig::try_from(&args)?;
    create_dir_all(&config.out_dir).with_context(|| format!("could not create {}", config.out_dir.display()))?;

    if args.tickets {
        tickets(&args, &config).await?;
    }
    correlation(&args, &config).await?;
    scatter(&args, &config).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_click() -> anyhow::Result<()> {
        assert_eq!(parse_click("customer:3")?, ("customer", 3));
        assert!(parse_click("customer").is_err());
        assert!(parse_click("customer:first").is_err());
        Ok(())
    }

    #[test]
    fn test_dashboard_group_is_required() {
        assert!(Cli::try_parse_from(["ticketdash"]).is_err());
        assert!(Cli::try_parse_from(["ticketdash", "--correlation", "a.json", "--averages", "b.json"]).is_err());
        assert!(Cli::try_parse_from(["ticketdash", "--tickets", "--correlation", "a.json"]).is_ok());
        assert!(Cli::try_parse_from(["ticketdash", "--correlate", "--averages", "b.json"]).is_err());
    }

    #[test]
    fn test_scatter_needs_a_run() -> anyhow::Result<()> {
        assert!(Cli::try_parse_from(["ticketdash", "--scatter", "results.json"]).is_err());

        let args = Cli::try_parse_from(["ticketdash", "--scatter", "results.json", "--run", "3", "--x-feature", "priority"])?;
        assert_eq!(args.run, Some(3));
        assert_eq!(args.x_feature, Feature::Priority);
        assert_eq!(args.y_feature, Feature::Rating);
        Ok(())
    }

    #[test]
    fn test_metrics_and_click_routing() -> anyhow::Result<()> {
        let args = Cli::try_parse_from(["ticketdash", "--correlate", "--metrics", "ticket,point", "--click", "scatter:1"])?;
        assert_eq!(args.metrics, vec![Metric::Ticket, Metric::Point]);
        assert_eq!(click_for(&args, &["scatter"])?, Some(("scatter", 1)));
        assert_eq!(click_for(&args, &["problem", "customer"])?, None);

        assert!(Cli::try_parse_from(["ticketdash", "--correlate", "--metrics", "ticket,mood"]).is_err());
        Ok(())
    }
}
