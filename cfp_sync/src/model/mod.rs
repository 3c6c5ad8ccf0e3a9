//! # Data Model
//!
//! Plain data types shared by every component of the engine: the conference
//! and its day boundaries, the schedule, speakers, taxonomy lists and the
//! user-scoped lists. Wire names follow the CFP REST API (camelCase JSON).

/// Conference metadata and day-boundary computation.
pub mod conference;
/// Schedule slots and talks.
pub mod session;
/// Speaker summaries and hydrated records.
pub mod speaker;
/// Tracks and proposal types.
pub mod taxonomy;
/// Favorites, scheduled sessions, notes and votes.
pub mod user_list;

pub use conference::{Conference, ConferenceDay, ConferenceRecord};
pub use session::{DaySchedule, Session, SpeakerRef, Talk};
pub use speaker::{AcceptedTalk, Speaker};
pub use taxonomy::{ProposalType, ProposalTypeList, Track, TrackList};
pub use user_list::{ListKind, ListPayload, UserListItem};

/// Anything matched by a stable identifier rather than by value.
pub trait Identified {
    fn key(&self) -> &str;
}

/// The conference-scoped resources fetched from the CFP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    Sessions,
    Speakers,
    Tracks,
    ProposalTypes,
}

impl ResourceType {
    pub const ALL: [ResourceType; 4] = [
        ResourceType::Sessions,
        ResourceType::Speakers,
        ResourceType::Tracks,
        ResourceType::ProposalTypes,
    ];

    /// Base name of the cache file for this resource.
    pub fn file_stem(&self) -> &'static str {
        match self {
            ResourceType::Sessions => "sessions",
            ResourceType::Speakers => "speakers",
            ResourceType::Tracks => "tracks",
            ResourceType::ProposalTypes => "proposal_types",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_stem())
    }
}
