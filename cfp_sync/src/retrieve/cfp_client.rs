//! # CFP REST API
//!
//! Typed access to the conference-scoped endpoints. [`CfpApi`] is the seam the
//! loaders and the aggregator are written against; [`HttpCfpApi`] is the
//! production implementation over [`ApiClient`].

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use tracing::debug;

use super::ky_http::ApiClient;
use crate::error::SyncResult;
use crate::model::{Conference, DaySchedule, ProposalType, ProposalTypeList, Session, Speaker, Track, TrackList};

/// One entry of the schedule manifest. `href` points at a single day.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScheduleLink {
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub title: String,
}

impl ScheduleLink {
    /// Links with an empty or unparsable `href` are skipped by the aggregator.
    pub fn is_valid(&self) -> bool {
        let href = self.href.trim();
        if href.is_empty() {
            return false;
        }
        match url::Url::parse(href) {
            Ok(url) => matches!(url.scheme(), "http" | "https"),
            // Relative links are joined to the conference endpoint.
            Err(url::ParseError::RelativeUrlWithoutBase) => !href.contains(char::is_whitespace),
            Err(_) => false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ScheduleManifest {
    #[serde(default)]
    links: Vec<ScheduleLink>,
}

#[async_trait]
pub trait CfpApi: Send + Sync {
    /// `GET /conferences/{id}/schedules/`
    async fn schedule_links(&self, conference: &Conference) -> SyncResult<Vec<ScheduleLink>>;

    /// `GET <day link>`
    async fn day_sessions(&self, conference: &Conference, link: &ScheduleLink) -> SyncResult<Vec<Session>>;

    /// `GET /conferences/{id}/speakers`, summaries only.
    async fn speakers(&self, conference: &Conference) -> SyncResult<Vec<Speaker>>;

    /// `GET /conferences/{id}/speakers/{uuid}`, the hydrated record.
    async fn speaker(&self, conference: &Conference, uuid: &str) -> SyncResult<Speaker>;

    /// `GET /conferences/{id}/tracks`
    async fn tracks(&self, conference: &Conference) -> SyncResult<Vec<Track>>;

    /// `GET /conferences/{id}/proposalTypes`
    async fn proposal_types(&self, conference: &Conference) -> SyncResult<Vec<ProposalType>>;
}

/// [`CfpApi`] over HTTP. One shared transport; a per-conference [`ApiClient`]
/// is bound to each conference's endpoint on demand.
#[derive(Clone)]
pub struct HttpCfpApi {
    transport: ClientWithMiddleware,
}

impl HttpCfpApi {
    pub fn new(transport: ClientWithMiddleware) -> Self {
        Self { transport }
    }

    fn client(&self, conference: &Conference) -> SyncResult<ApiClient> {
        ApiClient::with_client(self.transport.clone(), conference.cfp_endpoint())
    }
}

fn conference_path(conference: &Conference, tail: &str) -> String {
    format!("conferences/{}/{}", conference.id(), tail)
}

#[async_trait]
impl CfpApi for HttpCfpApi {
    async fn schedule_links(&self, conference: &Conference) -> SyncResult<Vec<ScheduleLink>> {
        let manifest: ScheduleManifest = self
            .client(conference)?
            .get_json(&conference_path(conference, "schedules/"))
            .await?;
        debug!(conference = conference.id(), links = manifest.links.len(), "schedule manifest fetched");
        Ok(manifest.links)
    }

    async fn day_sessions(&self, conference: &Conference, link: &ScheduleLink) -> SyncResult<Vec<Session>> {
        let day: DaySchedule = self.client(conference)?.get_json(link.href.trim()).await?;
        Ok(day.slots)
    }

    async fn speakers(&self, conference: &Conference) -> SyncResult<Vec<Speaker>> {
        self.client(conference)?
            .get_json(&conference_path(conference, "speakers"))
            .await
    }

    async fn speaker(&self, conference: &Conference, uuid: &str) -> SyncResult<Speaker> {
        let speaker: Speaker = self
            .client(conference)?
            .get_json(&conference_path(conference, &format!("speakers/{uuid}")))
            .await?;
        Ok(speaker.into_detailed())
    }

    async fn tracks(&self, conference: &Conference) -> SyncResult<Vec<Track>> {
        let list: TrackList = self
            .client(conference)?
            .get_json(&conference_path(conference, "tracks"))
            .await?;
        Ok(list.tracks)
    }

    async fn proposal_types(&self, conference: &Conference) -> SyncResult<Vec<ProposalType>> {
        let list: ProposalTypeList = self
            .client(conference)?
            .get_json(&conference_path(conference, "proposalTypes"))
            .await?;
        Ok(list.proposal_types)
    }
}
