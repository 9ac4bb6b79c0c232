use std::{collections::BTreeMap, path::Path};

use anyhow::Context;
use clap::ValueEnum;
use plotters::prelude::*;
use tracing::debug;

use crate::{
    fields::{self, Record},
    navigation::{Condition, Domain, ListAction, Operator, KMEANS_RESULT_MODEL},
};
use super::{plot_path, setup_graph, ChartHandle, Widget, LABEL_SIZE_LEFT, SVG_SIZE};

/// Fields a cluster result row is read through
pub const RESULT_FIELDS: [&str; 9] = [
    "cluster_id",
    "customer_id",
    "norm_ticket_count",
    "norm_priority",
    "norm_complexity",
    "norm_response_time",
    "norm_resolution_time",
    "norm_rating",
    "norm_point",
];

const UNKNOWN_CUSTOMER: &str = "Unknown Customer";

const CLUSTER_COLORS: [RGBColor; 10] = [
    RGBColor(255, 99, 132),
    RGBColor(54, 162, 235),
    RGBColor(255, 206, 86),
    RGBColor(75, 192, 192),
    RGBColor(153, 102, 255),
    RGBColor(255, 159, 64),
    RGBColor(199, 199, 199),
    RGBColor(83, 102, 255),
    RGBColor(40, 167, 69),
    RGBColor(214, 51, 132),
];
const POINT_ALPHA: f64 = 0.7;
const POINT_RADIUS: i32 = 4;
/// Padding around the outermost points, as a share of the data span
const AXIS_PADDING: f64 = 0.05;

/// A normalised (z-score) customer feature a scatter axis can show
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Feature {
    TicketCount,
    Priority,
    Complexity,
    ResponseTime,
    ResolutionTime,
    Rating,
    Point,
}

impl Feature {
    pub fn field(&self) -> &'static str {
        match self {
            Feature::TicketCount => "norm_ticket_count",
            Feature::Priority => "norm_priority",
            Feature::Complexity => "norm_complexity",
            Feature::ResponseTime => "norm_response_time",
            Feature::ResolutionTime => "norm_resolution_time",
            Feature::Rating => "norm_rating",
            Feature::Point => "norm_point",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Feature::TicketCount => "Z-Count",
            Feature::Priority => "Z-Priority",
            Feature::Complexity => "Z-Complexity",
            Feature::ResponseTime => "Z-Response",
            Feature::ResolutionTime => "Z-Resolution",
            Feature::Rating => "Z-Rating",
            Feature::Point => "Z-Point",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ScatterPoint {
    x: f64,
    y: f64,
    customer: String,
}

/// Customers of one k-means run, plotted on two features and coloured by cluster.
/// Each cluster is one chart element; clicking it lists that cluster's results.
pub struct ScatterWidget {
    fname: String,
    run_id: i64,
    x: Feature,
    y: Feature,
    clusters: BTreeMap<i64, Vec<ScatterPoint>>,
}

impl ScatterWidget {
    pub fn new(run_id: i64, x: Feature, y: Feature) -> Self {
        ScatterWidget { fname: "scatter".to_string(), run_id, x, y, clusters: BTreeMap::new() }
    }

    pub fn title(&self) -> String {
        format!("Scatter Plot: {} vs {}", self.y.label(), self.x.label())
    }

    /// Only positive cluster ids navigate anywhere
    fn target(&self, cluster: i64) -> Option<ListAction> {
        if cluster <= 0 {
            return None;
        }
        let domain = Domain::from(vec![
            Condition::new("run_id", Operator::Eq, self.run_id),
            Condition::new("cluster_id", Operator::Eq, cluster),
        ]);
        let name = format!("Cluster {} Results (Run {})", cluster, self.run_id);
        Some(ListAction::for_model(KMEANS_RESULT_MODEL, name, domain))
    }

    /// One line per cluster with the customers in it
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for (cluster, points) in &self.clusters {
            let customers: Vec<&str> = points.iter().map(|p| p.customer.as_str()).collect();
            out.push_str(&format!("Cluster {} ({}): {}\n", cluster, points.len(), customers.join(", ")));
        }
        out
    }

    /// padded (min, max) over one axis
    fn axis_range(&self, value: impl Fn(&ScatterPoint) -> f64) -> (f64, f64) {
        let (min, max) = self
            .clusters
            .values()
            .flatten()
            .map(value)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let span = if max - min == 0.0 { 1.0 } else { max - min };
        (min - span * AXIS_PADDING, max + span * AXIS_PADDING)
    }
}

impl Widget for ScatterWidget {
    fn name(&self) -> &str {
        &self.fname
    }

    fn update(&mut self, records: &[Record]) {
        self.clusters.clear();
        let mut skipped = 0usize;
        for record in records {
            let x = fields::field_number(record, self.x.field());
            let y = fields::field_number(record, self.y.field());
            let cluster = fields::field_number(record, "cluster_id");
            let (Some(x), Some(y), Some(cluster)) = (x, y, cluster) else {
                skipped += 1;
                continue;
            };
            let customer = fields::field_label(record, "customer_id").unwrap_or_else(|| UNKNOWN_CUSTOMER.to_string());
            self.clusters.entry(cluster as i64).or_default().push(ScatterPoint { x, y, customer });
        }
        if skipped > 0 {
            debug!("{} of {} cluster results had nothing to plot", skipped, records.len());
        }
    }

    fn plot(&self, out_dir: &Path) -> anyhow::Result<Option<ChartHandle>> {
        if self.clusters.is_empty() {
            return Ok(None);
        }

        let title = self.title();
        let (x_min, x_max) = self.axis_range(|p| p.x);
        let (y_min, y_max) = self.axis_range(|p| p.y);
        let path = plot_path(out_dir, &self.fname);
        debug!("writing {}...", path.display());

        let root = SVGBackend::new(&path, SVG_SIZE).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = setup_graph(&title, &root, LABEL_SIZE_LEFT);
        let mut chart_con = chart.build_cartesian_2d(x_min..x_max, y_min..y_max)?;
        chart_con.configure_mesh().x_desc(self.x.label()).y_desc(self.y.label()).draw()?;

        for (idx, (cluster, points)) in self.clusters.iter().enumerate() {
            let color = CLUSTER_COLORS[idx % CLUSTER_COLORS.len()].mix(POINT_ALPHA);
            chart_con
                .draw_series(points.iter().map(|p| Circle::new((p.x, p.y), POINT_RADIUS, color.filled())))?
                .label(format!("Cluster {}", cluster))
                .legend(move |(x, y)| Circle::new((x + 5, y), POINT_RADIUS, color.filled()));
        }
        chart_con
            .configure_series_labels()
            .border_style(BLACK)
            .background_style(WHITE.mix(0.8))
            .position(SeriesLabelPosition::UpperRight)
            .draw()?;

        root.present().context("could not write file")?;

        let labels = self.clusters.keys().map(|c| format!("Cluster {}", c)).collect();
        let targets = self.clusters.keys().map(|c| self.target(*c)).collect();
        Ok(Some(ChartHandle::new(path.clone(), title, labels, targets)))
    }
}
