/*!
 * Where records and coefficient maps come from. Both can be read from a local file or fetched over HTTP;
 * records are filtered to the requested date range and trimmed to the fields a dashboard reads.
 */

use std::{fs::read_to_string, path::PathBuf};

use anyhow::Context;
use reqwest::IntoUrl;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{correlation::CoefficientMap, fields::Record, navigation::Domain};

/// A read-only supplier of records.
#[allow(async_fn_in_trait)]
pub trait RecordSource {
    /// Every record matching `domain`, keeping only `fields` (or every field, when empty)
    async fn fetch(&self, domain: &Domain, fields: &[&str]) -> anyhow::Result<Vec<Record>>;
}

/// Records stored in a file, either as a JSON array or one object per line.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSource { path: path.into() }
    }
}

impl RecordSource for FileSource {
    async fn fetch(&self, domain: &Domain, fields: &[&str]) -> anyhow::Result<Vec<Record>> {
        let raw = read_to_string(&self.path).with_context(|| format!("error reading {}", self.path.display()))?;
        let records = parse_records(&raw)?;
        Ok(select_records(records, domain, fields))
    }
}

/// Records served as JSON by an HTTP endpoint.
pub struct HttpSource {
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Self {
        HttpSource { url: url.into() }
    }
}

impl RecordSource for HttpSource {
    async fn fetch(&self, domain: &Domain, fields: &[&str]) -> anyhow::Result<Vec<Record>> {
        let raw = get_text(&self.url).await?;
        let records = parse_records(&raw)?;
        Ok(select_records(records, domain, fields))
    }
}

async fn get_text<T: IntoUrl>(url: T) -> anyhow::Result<String> {
    let body = reqwest::get(url)
        .await
        .context("error fetching URL")?
        .error_for_status()?
        .text()
        .await?;
    Ok(body)
}

fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Parse a JSON array of records, or newline-delimited JSON objects.
pub fn parse_records(raw: &str) -> anyhow::Result<Vec<Record>> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("error parsing JSON array of records");
    }

    let mut records = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(line).with_context(|| format!("error parsing JSON on line {}", idx + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// Apply the domain and drop the fields nobody asked for
fn select_records(records: Vec<Record>, domain: &Domain, fields: &[&str]) -> Vec<Record> {
    let total = records.len();
    let selected: Vec<Record> = records
        .into_iter()
        .filter(|r| domain.matches(r))
        .map(|r| {
            if fields.is_empty() {
                r
            } else {
                r.into_iter().filter(|(k, _)| fields.contains(&k.as_str())).collect()
            }
        })
        .collect();
    debug!("{} of {} records matched the domain", selected.len(), total);
    selected
}

/// Load a coefficient map from a file or URL holding a single JSON object.
pub async fn load_coefficients(location: &str) -> anyhow::Result<CoefficientMap> {
    let raw = if is_url(location) {
        get_text(location).await?
    } else {
        read_to_string(location).with_context(|| format!("error reading {}", location))?
    };
    let map: Map<String, Value> = serde_json::from_str(&raw).context("coefficients must be a single JSON object")?;
    let coeffs = CoefficientMap::from(&map);
    info!("loaded {} coefficients from {}", coeffs.len(), location);
    Ok(coeffs)
}

/// Pick a record source for a path or URL
pub enum Source {
    File(FileSource),
    Http(HttpSource),
}

impl From<&str> for Source {
    fn from(location: &str) -> Self {
        if is_url(location) {
            Source::Http(HttpSource::new(location))
        } else {
            Source::File(FileSource::new(location))
        }
    }
}

impl RecordSource for Source {
    async fn fetch(&self, domain: &Domain, fields: &[&str]) -> anyhow::Result<Vec<Record>> {
        match self {
            Source::File(file) => file.fetch(domain, fields).await,
            Source::Http(http) => http.fetch(domain, fields).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::correlation::Metric;

    fn january() -> anyhow::Result<Domain> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).ok_or_else(|| anyhow::anyhow!("bad date"))?;
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).ok_or_else(|| anyhow::anyhow!("bad date"))?;
        Ok(Domain::date_range("submitted_date", start, end))
    }

    #[test]
    fn test_parse_ndjson_and_array() -> anyhow::Result<()> {
        let ndjson = "{\"a\": 1}\n\n{\"a\": 2}\n";
        assert_eq!(parse_records(ndjson)?.len(), 2);

        let array = "  [{\"a\": 1}, {\"a\": 2}, {\"a\": 3}]";
        assert_eq!(parse_records(array)?.len(), 3);

        let broken = "{\"a\": 1}\nnot json\n";
        let err = parse_records(broken).err().ok_or_else(|| anyhow::anyhow!("expected an error"))?;
        assert!(format!("{}", err).contains("line 2"));
        Ok(())
    }

    #[tokio::test]
    async fn test_file_source_filters_and_projects() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "{}", json!({"submitted_date": "2024-01-05 10:00:00", "category": [1, "Network"], "secret": 1}))?;
        writeln!(file, "{}", json!({"submitted_date": "2023-12-31 23:59:59", "category": [1, "Network"]}))?;
        writeln!(file, "{}", json!({"submitted_date": false, "category": [2, "Hardware"]}))?;

        let source = Source::from(&*file.path().to_string_lossy());
        let records = source.fetch(&january()?, &["submitted_date", "category"]).await?;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].len(), 2);
        assert!(!records[0].contains_key("secret"));

        let everything = source.fetch(&Domain::default(), &[]).await?;
        assert_eq!(everything.len(), 3);
        assert!(everything[0].contains_key("secret"));
        Ok(())
    }

    #[tokio::test]
    async fn test_load_coefficients_from_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, "{}", json!({"corr_ticket_priority": 0.42, "calculation_date": "2024-01-01 00:00:00"}))?;

        let coeffs = load_coefficients(&file.path().to_string_lossy()).await?;
        assert_eq!(coeffs.len(), 1);
        assert_eq!(coeffs.resolve(Metric::Priority, Metric::Ticket), 0.42);

        let missing = load_coefficients("/definitely/not/here.json").await;
        assert!(missing.is_err());
        Ok(())
    }

    #[test]
    fn test_source_selection() {
        assert!(matches!(Source::from("http://localhost:8069/tickets"), Source::Http(_)));
        assert!(matches!(Source::from("tickets.ndjson"), Source::File(_)));
    }
}
