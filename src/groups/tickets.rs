use std::{collections::HashMap, path::PathBuf};

use plotters::style::RGBColor;
use tracing::{debug, error, info};

use crate::{
    config::DashboardConfig,
    fields::Record,
    navigation::ListAction,
    stat::{Aggregation, Buckets, ValueSource},
};
use super::{
    bar::{BarWidget, ClickMatch},
    distribution::BucketWidget,
    ChartHandle, Widget,
};

/// Fields the ticket dashboard reads; everything else is dropped at the source.
pub const TICKET_FIELDS: [&str; 11] = [
    "category",
    "definition",
    "priority",
    "customer_rating",
    "submitted_date",
    "progress_date",
    "finish_date",
    "sales_person_id",
    "technician",
    "customer_name_id",
    "min_point",
];

const PROBLEM_COLOR: RGBColor = RGBColor(0xFF, 0x63, 0x84);
const DEFINITION_COLOR: RGBColor = RGBColor(0xFF, 0xCD, 0x56);
const PRIORITY_COLOR: RGBColor = RGBColor(0x9E, 0x9E, 0x9E);
const SALES_COLOR: RGBColor = RGBColor(0x4B, 0xC0, 0xC0);
const TECH_COLOR: RGBColor = RGBColor(0x99, 0x66, 0xFF);

/// The ticket overview: problem, definition, priority and rating distributions, response and
/// resolution performance, and the customer point ranking.
///
/// The dashboard owns the handle of every chart it has drawn. A chart whose data disappears
/// on a later render is disposed rather than left stale.
pub struct TicketDashboard {
    out_dir: PathBuf,
    widgets: Vec<Box<dyn Widget + Send>>,
    handles: HashMap<String, ChartHandle>,
}

impl TicketDashboard {
    pub fn new(config: &DashboardConfig) -> Self {
        let base = config.base_domain();

        let widgets: Vec<Box<dyn Widget + Send>> = vec![
            Box::new(
                BarWidget::new(
                    "problem",
                    "Problem Distribution (Ticket Count)",
                    Aggregation::count("category").with_fallback("Uncategorized"),
                    base.clone(),
                )
                .color(PROBLEM_COLOR),
            ),
            Box::new(
                BarWidget::new(
                    "definition",
                    "Problem Definition Distribution (Ticket Count)",
                    Aggregation::count("definition").with_fallback("Undefined"),
                    base.clone(),
                )
                .color(DEFINITION_COLOR),
            ),
            Box::new(
                BarWidget::new(
                    "priority",
                    "Priority Distribution",
                    Aggregation::count("priority").with_fallback("None"),
                    base.clone(),
                )
                .ranked(None, None)
                .click_match(ClickMatch::Exact)
                .color(PRIORITY_COLOR),
            ),
            Box::new(BucketWidget::new(
                "rating",
                "Customer Ratings",
                "customer_rating",
                Buckets::ratings(),
                base.clone(),
            )),
            Box::new(
                BarWidget::new(
                    "sales",
                    "Sales Response Performance (Avg Hours)",
                    Aggregation::average("sales_person_id", ValueSource::elapsed_hours("submitted_date", "progress_date")),
                    base.clone(),
                )
                .color(SALES_COLOR),
            ),
            Box::new(
                BarWidget::new(
                    "technician",
                    "Technician Resolution Performance (Avg Hours)",
                    Aggregation::average("technician", ValueSource::elapsed_hours("progress_date", "finish_date")),
                    base.clone(),
                )
                .color(TECH_COLOR),
            ),
            Box::new(
                BarWidget::new(
                    "customer",
                    format!("Top {} Customers by Point Usage", config.top),
                    Aggregation::sum("customer_name_id", "min_point").with_fallback("Unknown"),
                    base,
                )
                .ranked(Some(config.sort), Some(config.top)),
            ),
        ];

        TicketDashboard { out_dir: config.out_dir.clone(), widgets, handles: HashMap::new() }
    }

    /// Rebuild every chart from `records`. Returns how many charts were drawn.
    ///
    /// Either every chart is redrawn or none are kept: if any chart fails to render, the
    /// charts from this run and the previous one are all disposed and the error is returned.
    pub fn render(&mut self, records: &[Record]) -> anyhow::Result<usize> {
        for widget in &mut self.widgets {
            widget.update(records);
        }

        let mut fresh = HashMap::new();
        let mut failure = None;
        for widget in &self.widgets {
            match widget.plot(&self.out_dir) {
                Ok(Some(handle)) => {
                    debug!("rendered {} to {}", handle.title(), handle.path().display());
                    fresh.insert(widget.name().to_string(), handle);
                }
                Ok(None) => debug!("no data for {}", widget.name()),
                Err(e) => {
                    failure = Some(e.context(format!("could not render the {} chart", widget.name())));
                    break;
                }
            }
        }

        if let Some(err) = failure {
            discard(self.handles.drain().chain(fresh).map(|(_, h)| h));
            return Err(err);
        }

        // had data last run, nothing this run
        let stale: Vec<String> = self.handles.keys().filter(|name| !fresh.contains_key(*name)).cloned().collect();
        for name in stale {
            if let Some(handle) = self.handles.remove(&name) {
                handle.dispose()?;
            }
        }

        let drawn = fresh.len();
        self.handles = fresh;
        info!("rendered {} of {} charts from {} records", drawn, self.widgets.len(), records.len());
        Ok(drawn)
    }

    pub fn handle(&self, name: &str) -> Option<&ChartHandle> {
        self.handles.get(name)
    }

    /// What clicking element `idx` of chart `name` opens
    pub fn click(&self, name: &str, idx: usize) -> Option<&ListAction> {
        self.handle(name)?.click(idx)
    }

    /// Names of all charts, in drawing order
    pub fn names(&self) -> Vec<&str> {
        self.widgets.iter().map(|w| w.name()).collect()
    }
}

/// Dispose charts after a failed render, logging rather than masking the render error
fn discard(handles: impl Iterator<Item = ChartHandle>) {
    for handle in handles {
        if let Err(e) = handle.dispose() {
            error!("{:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::json;

    use super::*;
    use crate::rank::SortOrder;

    fn config(out_dir: &Path) -> DashboardConfig {
        DashboardConfig { out_dir: out_dir.to_path_buf(), top: 2, sort: SortOrder::Descending, ..Default::default() }
    }

    fn tickets() -> Vec<Record> {
        serde_json::from_value(json!([
            {
                "category": [1, "Network"], "definition": [1, "Outage"], "priority": "high", "customer_rating": "good",
                "submitted_date": "2024-01-01 08:00:00", "progress_date": "2024-01-01 09:00:00", "finish_date": "2024-01-01 12:00:00",
                "sales_person_id": [3, "Sam"], "technician": [4, "Tia"], "customer_name_id": [5, "Acme"], "min_point": 10
            },
            {
                "category": false, "definition": false, "priority": false, "customer_rating": false,
                "submitted_date": "2024-01-02 08:00:00", "progress_date": false, "finish_date": false,
                "sales_person_id": [3, "Sam"], "technician": false, "customer_name_id": [6, "Globex"], "min_point": 30
            },
            {
                "category": [1, "Network"], "definition": [2, "Slow"], "priority": "low", "customer_rating": "bad",
                "submitted_date": "2024-01-03 08:00:00", "progress_date": "2024-01-03 11:00:00", "finish_date": false,
                "sales_person_id": [3, "Sam"], "technician": [4, "Tia"], "customer_name_id": [7, "Initech"], "min_point": 5
            }
        ]))
        .unwrap_or_default()
    }

    #[test]
    fn test_render_all_charts() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut dash = TicketDashboard::new(&config(dir.path()));
        assert_eq!(dash.render(&tickets())?, 7);

        let problem = dash.handle("problem").ok_or_else(|| anyhow::anyhow!("no problem chart"))?;
        assert_eq!(problem.labels(), &["Network".to_string(), "Uncategorized".to_string()]);

        // sales: (1h + 3h) / 2, the record without progress_date is excluded
        let sales = dash.click("sales", 0).ok_or_else(|| anyhow::anyhow!("no sales action"))?;
        assert_eq!(sales.name, "Sales Response Performance (Avg Hours): Sam");

        let customers = dash.handle("customer").ok_or_else(|| anyhow::anyhow!("no customer chart"))?;
        assert_eq!(customers.title(), "Top 2 Customers by Point Usage");
        assert_eq!(customers.labels(), &["Globex".to_string(), "Acme".to_string()]);

        let priority = dash.handle("priority").ok_or_else(|| anyhow::anyhow!("no priority chart"))?;
        assert_eq!(priority.labels(), &["high".to_string(), "None".to_string(), "low".to_string()]);
        let none = dash.click("priority", 1).ok_or_else(|| anyhow::anyhow!("no priority action"))?;
        let domain = serde_json::to_value(&none.domain)?;
        assert_eq!(domain[2], json!(["priority", "=", "None"]));
        Ok(())
    }

    #[test]
    fn test_stale_charts_are_disposed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut dash = TicketDashboard::new(&config(dir.path()));
        dash.render(&tickets())?;
        let technician = dash.handle("technician").map(|h| h.path().to_path_buf()).ok_or_else(|| anyhow::anyhow!("no chart"))?;
        assert!(technician.exists());

        // nobody has finished a ticket in this batch
        let unfinished: Vec<Record> = tickets().into_iter().skip(1).collect();
        dash.render(&unfinished)?;
        assert!(dash.handle("technician").is_none());
        assert!(!technician.exists());
        assert!(dash.handle("problem").is_some());

        assert_eq!(dash.render(&[])?, 0);
        assert!(dash.names().iter().all(|n| dash.handle(n).is_none()));
        Ok(())
    }

    #[test]
    fn test_failed_render_keeps_nothing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut dash = TicketDashboard::new(&config(dir.path()));
        dash.render(&tickets())?;
        let problem = dash.handle("problem").map(|h| h.path().to_path_buf()).ok_or_else(|| anyhow::anyhow!("no chart"))?;

        // nowhere to write the charts
        dash.out_dir = dir.path().join("missing");
        assert!(dash.render(&tickets()).is_err());
        assert!(dash.names().iter().all(|n| dash.handle(n).is_none()));
        assert!(!problem.exists());

        dash.out_dir = dir.path().to_path_buf();
        assert_eq!(dash.render(&tickets())?, 7);
        Ok(())
    }
}
