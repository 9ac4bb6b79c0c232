use std::path::Path;

use plotters::style::RGBColor;
use tracing::debug;

use crate::{
    fields::Record,
    navigation::{click_domain, exact_domain, Domain, ListAction},
    rank::{self, SortOrder},
    stat::{aggregate, Aggregation},
};
use super::{average_label, gen_bar_graph, plot_path, share_label, ChartHandle, Widget, DEFAULT_BAR_COLOR};

/// How a clicked bar turns its label into a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMatch {
    /// exact for numeric-looking labels, substring otherwise
    Heuristic,
    /// always exact
    Exact,
}

/// A bar chart over one aggregation, optionally ranked and cut to a top-N window.
pub struct BarWidget {
    fname: String,
    title: String,
    aggregation: Aggregation,
    /// None keeps the order groups were first seen in
    order: Option<SortOrder>,
    limit: Option<usize>,
    click: ClickMatch,
    color: RGBColor,
    base_domain: Domain,
    bars: Vec<(String, f64)>,
}

impl BarWidget {
    pub fn new(fname: impl Into<String>, title: impl Into<String>, aggregation: Aggregation, base_domain: Domain) -> Self {
        BarWidget {
            fname: fname.into(),
            title: title.into(),
            aggregation,
            order: Some(SortOrder::Descending),
            limit: None,
            click: ClickMatch::Heuristic,
            color: DEFAULT_BAR_COLOR,
            base_domain,
            bars: Vec::new(),
        }
    }

    pub fn ranked(mut self, order: Option<SortOrder>, limit: Option<usize>) -> Self {
        self.order = order;
        self.limit = limit;
        self
    }

    pub fn click_match(mut self, click: ClickMatch) -> Self {
        self.click = click;
        self
    }

    pub fn color(mut self, color: RGBColor) -> Self {
        self.color = color;
        self
    }

    /// the bars as they'll be drawn
    #[cfg(test)]
    pub fn bars(&self) -> &[(String, f64)] {
        &self.bars
    }

    fn y_desc(&self) -> &'static str {
        if self.aggregation.is_average() {
            "Average Time (Hours)"
        } else if self.title.to_lowercase().contains("point") {
            "Total Points"
        } else {
            "Ticket Count"
        }
    }

    fn target(&self, label: &str) -> ListAction {
        let field = &self.aggregation.key_field;
        let clicked = match self.click {
            ClickMatch::Heuristic => click_domain(field, label),
            ClickMatch::Exact => exact_domain(field, label),
        };
        ListAction::new(format!("{}: {}", self.title, label), self.base_domain.and(clicked))
    }
}

impl Widget for BarWidget {
    fn name(&self) -> &str {
        &self.fname
    }

    fn update(&mut self, records: &[Record]) {
        let tally = aggregate(records, &self.aggregation);
        if tally.is_empty() {
            debug!("no groups for {}", self.fname);
        }
        self.bars = match self.order {
            Some(order) => rank::select(tally, order, self.limit),
            None => tally.into_iter().take(self.limit.unwrap_or(usize::MAX)).collect(),
        };
    }

    fn plot(&self, out_dir: &Path) -> anyhow::Result<Option<ChartHandle>> {
        if self.bars.is_empty() {
            return Ok(None);
        }

        let path = plot_path(out_dir, &self.fname);
        let total: f64 = self.bars.iter().map(|(_, v)| v).sum();
        let is_average = self.aggregation.is_average();
        gen_bar_graph(&path, &self.title, self.y_desc(), &self.bars, self.color, |v| {
            if is_average {
                average_label(v)
            } else {
                share_label(v, total)
            }
        })?;

        let labels: Vec<String> = self.bars.iter().map(|(l, _)| l.clone()).collect();
        let targets = labels.iter().map(|l| Some(self.target(l))).collect();
        Ok(Some(ChartHandle::new(path, self.title.clone(), labels, targets)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::stat::ValueSource;

    fn records() -> Vec<Record> {
        serde_json::from_value(json!([
            {"category": [1, "Network"], "customer": [7, "Acme"], "min_point": 5},
            {"category": [1, "Network"], "customer": [8, "Globex"], "min_point": 50},
            {"category": [2, "Hardware"], "customer": [9, "Initech"], "min_point": 20},
            {"category": false, "customer": [7, "Acme"], "min_point": 5},
            {"category": [3, "404"], "customer": [7, "Acme"], "min_point": 1},
        ]))
        .unwrap_or_default()
    }

    #[test]
    fn test_count_bars_sorted_descending() -> anyhow::Result<()> {
        let mut widget = BarWidget::new(
            "problem",
            "Problem Distribution (Ticket Count)",
            Aggregation::count("category").with_fallback("Uncategorized"),
            Domain::default(),
        );
        widget.update(&records());
        assert_eq!(widget.bars()[0], ("Network".to_string(), 2.0));
        assert_eq!(widget.bars().len(), 4);

        let dir = tempfile::tempdir()?;
        let handle = widget.plot(dir.path())?.ok_or_else(|| anyhow::anyhow!("expected a chart"))?;
        assert!(handle.path().exists());
        assert_eq!(handle.labels()[0], "Network");

        let net = handle.click(0).ok_or_else(|| anyhow::anyhow!("no action"))?;
        assert_eq!(net.name, "Problem Distribution (Ticket Count): Network");
        assert_eq!(serde_json::to_value(&net.domain)?, json!([["category", "ilike", "Network"]]));

        let numeric = handle.labels().iter().position(|l| l == "404").and_then(|idx| handle.click(idx));
        let numeric = numeric.ok_or_else(|| anyhow::anyhow!("no action for 404"))?;
        assert_eq!(serde_json::to_value(&numeric.domain)?, json!([["category", "=", "404"]]));
        Ok(())
    }

    #[test]
    fn test_top_n_window() {
        let agg = Aggregation::sum("customer", "min_point").with_fallback("Unknown");
        let mut widget = BarWidget::new("customer", "Top 2 Customers by Point Usage", agg.clone(), Domain::default())
            .ranked(Some(SortOrder::Descending), Some(2));
        widget.update(&records());
        assert_eq!(widget.bars(), &[("Globex".to_string(), 50.0), ("Initech".to_string(), 20.0)]);
        assert_eq!(widget.y_desc(), "Total Points");

        let mut lowest = BarWidget::new("customer", "Top 2 Customers by Point Usage", agg, Domain::default())
            .ranked(Some(SortOrder::Ascending), Some(2));
        lowest.update(&records());
        assert_eq!(lowest.bars(), &[("Acme".to_string(), 11.0), ("Initech".to_string(), 20.0)]);
    }

    #[test]
    fn test_empty_renders_nothing() -> anyhow::Result<()> {
        let agg = Aggregation::average("technician", ValueSource::elapsed_hours("progress_date", "finish_date"));
        let mut widget = BarWidget::new("technician", "Technician Resolution Performance (Avg Hours)", agg, Domain::default());
        widget.update(&records());
        assert!(widget.bars().is_empty());
        assert_eq!(widget.y_desc(), "Average Time (Hours)");

        let dir = tempfile::tempdir()?;
        assert!(widget.plot(dir.path())?.is_none());
        Ok(())
    }

    #[test]
    fn test_insertion_order_with_exact_clicks() -> anyhow::Result<()> {
        let mut widget = BarWidget::new("problem", "Problems", Aggregation::count("category"), Domain::default())
            .ranked(None, None)
            .click_match(ClickMatch::Exact);
        widget.update(&records());
        let labels: Vec<&str> = widget.bars().iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["Network", "Hardware", "404"]);
        assert_eq!(serde_json::to_value(&widget.target("Network").domain)?, json!([["category", "=", "Network"]]));
        Ok(())
    }
}
