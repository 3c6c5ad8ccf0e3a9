//! Conference-scoped enumerations loaded in bulk.

use serde::{Deserialize, Serialize};

use super::Identified;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "imgsrc")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalType {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackList {
    #[serde(default)]
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalTypeList {
    #[serde(default)]
    pub proposal_types: Vec<ProposalType>,
}

impl Identified for Track {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Identified for ProposalType {
    fn key(&self) -> &str {
        &self.id
    }
}
