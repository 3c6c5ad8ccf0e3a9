//! # Fan-out/Fan-in Aggregator
//!
//! Sessions are served one day at a time. The aggregator reads the schedule
//! manifest, fetches every valid day link concurrently and joins them at one
//! bounded wait. The aggregate is usable only when the wait ended because all
//! fetches finished and every link was processed; anything else is discarded
//! whole, so visible sessions are never a mix of old and new days.
//!
//! Fetches still outstanding when the wait expires are detached, not aborted.
//! Their results are dropped on arrival.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::model::{Conference, Session};
use crate::retrieve::{CfpApi, ScheduleLink};

/// Result of one fan-in round.
#[derive(Debug)]
pub struct FanInOutcome {
    pub total: usize,
    /// Links whose day schedule arrived and parsed.
    pub processed: usize,
    pub failed: usize,
    pub timed_out: bool,
    days: Vec<Option<Vec<Session>>>,
}

impl FanInOutcome {
    /// Commit condition: the wait did not expire and every link was processed.
    pub fn is_complete(&self) -> bool {
        !self.timed_out && self.total > 0 && self.processed == self.total
    }

    /// Sessions in link order, or the reason the aggregate was discarded.
    pub fn into_sessions(self) -> SyncResult<Vec<Session>> {
        if !self.is_complete() {
            return Err(SyncError::AggregatePartialFailure {
                processed: self.processed,
                total: self.total,
                timed_out: self.timed_out,
            });
        }
        Ok(self.days.into_iter().flatten().flatten().collect())
    }
}

/// Fetches the manifest and every day of `conference`.
pub async fn aggregate_sessions(
    api: Arc<dyn CfpApi>,
    conference: Arc<Conference>,
    wait: Duration,
) -> SyncResult<Vec<Session>> {
    let links = api.schedule_links(&conference).await?;
    let listed = links.len();
    let links: Vec<ScheduleLink> = links.into_iter().filter(ScheduleLink::is_valid).collect();
    if links.len() < listed {
        debug!(
            conference = conference.id(),
            skipped = listed - links.len(),
            "invalid schedule links skipped"
        );
    }

    let outcome = fan_in(api, Arc::clone(&conference), links, wait).await;
    if outcome.is_complete() {
        info!(
            conference = conference.id(),
            days = outcome.total,
            "all day schedules fetched"
        );
    } else {
        warn!(
            conference = conference.id(),
            processed = outcome.processed,
            failed = outcome.failed,
            total = outcome.total,
            timed_out = outcome.timed_out,
            "session aggregate incomplete, discarding"
        );
    }
    outcome.into_sessions()
}

/// One concurrent fetch per link, joined with a single bounded wait.
pub async fn fan_in(
    api: Arc<dyn CfpApi>,
    conference: Arc<Conference>,
    links: Vec<ScheduleLink>,
    wait: Duration,
) -> FanInOutcome {
    let total = links.len();
    let mut days: Vec<Option<Vec<Session>>> = vec![None; total];
    let mut processed = 0;
    let mut failed = 0;

    let mut tasks = JoinSet::new();
    for (index, link) in links.into_iter().enumerate() {
        let api = Arc::clone(&api);
        let conference = Arc::clone(&conference);
        tasks.spawn(async move {
            let result = api.day_sessions(&conference, &link).await;
            (index, link, result)
        });
    }

    let joined = timeout(wait, async {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(slots))) => {
                    days[index] = Some(slots);
                    processed += 1;
                }
                Ok((_, link, Err(e))) => {
                    failed += 1;
                    warn!(link = %link.href, error = %e, "day schedule fetch failed");
                }
                Err(e) => {
                    failed += 1;
                    warn!(error = %e, "day schedule task did not finish");
                }
            }
        }
    })
    .await;

    let timed_out = joined.is_err();
    if timed_out {
        tasks.detach_all();
    }

    FanInOutcome {
        total,
        processed,
        failed,
        timed_out,
        days,
    }
}
