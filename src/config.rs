use std::path::PathBuf;

use anyhow::{anyhow, Context};
use chrono::{Local, NaiveDate};

use crate::{navigation::Domain, rank::SortOrder, Cli};

/// Field the dashboard's date range applies to
const DATE_FIELD: &str = "submitted_date";

fn default_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Everything a dashboard run needs to know, resolved from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    /// first day of the date range, inclusive
    pub start: NaiveDate,
    /// last day of the date range, inclusive
    pub end: NaiveDate,
    pub date_field: String,
    /// order of the customer point ranking
    pub sort: SortOrder,
    /// size of the customer point ranking
    pub top: usize,
    pub out_dir: PathBuf,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        DashboardConfig {
            start: default_start(),
            end: Local::now().date_naive(),
            date_field: DATE_FIELD.to_string(),
            sort: SortOrder::Descending,
            top: 20,
            out_dir: PathBuf::from("."),
        }
    }
}

impl DashboardConfig {
    /// The date-range filter every fetch and every click is scoped to
    pub fn base_domain(&self) -> Domain {
        Domain::date_range(&self.date_field, self.start, self.end)
    }
}

fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("invalid date {}, expected YYYY-MM-DD", raw))
}

impl TryFrom<&Cli> for DashboardConfig {
    type Error = anyhow::Error;
    fn try_from(value: &Cli) -> Result<Self, Self::Error> {
        let mut config = DashboardConfig { sort: value.sort, top: value.top, out_dir: value.out_dir.clone(), ..Default::default() };

        if let Some(start) = &value.start {
            config.start = parse_date(start)?;
        }
        if let Some(end) = &value.end {
            config.end = parse_date(end)?;
        }

        if config.start > config.end {
            Err(anyhow!("start date {} is after end date {}", config.start, config.end))
        } else if config.top == 0 {
            Err(anyhow!("--top must be at least 1"))
        } else {
            Ok(config)
        }
    }
}
