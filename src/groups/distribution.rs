use std::path::Path;

use plotters::style::RGBColor;

use crate::{
    fields::Record,
    navigation::{exact_domain, Domain, ListAction},
    stat::{count_buckets, Buckets, Tally},
};
use super::{gen_bar_graph, plot_path, slice_label, ChartHandle, Widget};

const BUCKET_COLOR: RGBColor = RGBColor(0xFF, 0x9F, 0x40);

/// Counts over a fixed set of buckets, e.g. the five customer rating levels.
/// Every bucket is always drawn; clicking one filters on the raw value behind it.
pub struct BucketWidget {
    fname: String,
    title: String,
    field: String,
    buckets: Buckets,
    base_domain: Domain,
    tally: Tally,
}

impl BucketWidget {
    pub fn new(fname: impl Into<String>, title: impl Into<String>, field: impl Into<String>, buckets: Buckets, base_domain: Domain) -> Self {
        BucketWidget {
            fname: fname.into(),
            title: title.into(),
            field: field.into(),
            buckets,
            base_domain,
            tally: Tally::default(),
        }
    }

    #[cfg(test)]
    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    fn target(&self, idx: usize) -> Option<ListAction> {
        let raw = self.buckets.raw_value(idx)?;
        let name = format!("{}: {}", self.title, raw.to_uppercase());
        Some(ListAction::new(name, self.base_domain.and(exact_domain(&self.field, raw))))
    }
}

impl Widget for BucketWidget {
    fn name(&self) -> &str {
        &self.fname
    }

    fn update(&mut self, records: &[Record]) {
        self.tally = count_buckets(records, &self.field, &self.buckets);
    }

    fn plot(&self, out_dir: &Path) -> anyhow::Result<Option<ChartHandle>> {
        // every bucket is zero, nothing to see
        if self.tally.total() == 0.0 {
            return Ok(None);
        }

        let path = plot_path(out_dir, &self.fname);
        let total = self.tally.total();
        let bars: Vec<(String, f64)> = self.tally.iter().map(|(l, v)| (format!("Rating {}", l), *v)).collect();
        gen_bar_graph(&path, &self.title, "Ticket Count", &bars, BUCKET_COLOR, |v| slice_label(v, total))?;

        let labels = bars.into_iter().map(|(l, _)| l).collect();
        let targets = (0..self.tally.len()).map(|idx| self.target(idx)).collect();
        Ok(Some(ChartHandle::new(path, self.title.clone(), labels, targets)))
    }
}
