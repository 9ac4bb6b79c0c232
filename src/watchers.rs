use std::time::Duration;

use anyhow::Context;
use spinners::{Spinner, Spinners};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    groups::tickets::{TicketDashboard, TICKET_FIELDS},
    navigation::Domain,
    source::RecordSource,
};

/// Fetch a fresh snapshot of records and rebuild every chart from it
pub async fn refresh<S: RecordSource>(source: &S, dashboard: &mut TicketDashboard, domain: &Domain) -> anyhow::Result<usize> {
    let records = source.fetch(domain, &TICKET_FIELDS).await.context("could not fetch ticket records")?;
    dashboard.render(&records)
}

/// Re-render the dashboard every `interval` until `token` is cancelled.
/// A failed refresh is logged and leaves the charts from the last good run in place.
pub async fn run_watch<S: RecordSource>(
    source: &S,
    dashboard: &mut TicketDashboard,
    domain: &Domain,
    interval: Duration,
    token: CancellationToken,
) -> anyhow::Result<()> {
    let mut ticker = time::interval(interval);
    info!("starting watch of ticket records...");
    let mut sp = Spinner::new(Spinners::Dots9, "Watching...".into());
    let mut runs = 0usize;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                sp.stop_with_message("shutting down!".to_string());
                return Ok(());
            }
            _ = ticker.tick() => {
                // a cancel while fetching drops the run, nothing is half-rendered
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        sp.stop_with_message("shutting down!".to_string());
                        return Ok(());
                    }
                    res = refresh(source, dashboard, domain) => {
                        runs += 1;
                        match res {
                            Ok(drawn) => debug!("run {}: drew {} charts", runs, drawn),
                            Err(e) => error!("got error refreshing dashboard: {:#}", e),
                        }
                    }
                }
            }
        }
    }
}
