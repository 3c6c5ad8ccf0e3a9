//! # Conference
//!
//! A conference and its day boundaries. The boundaries are derived from the
//! inclusive date range and the IANA time zone, and are rebuilt by every setter
//! that touches either of them.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// One conference day, as a half-open `[start, end)` window in UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConferenceDay {
    /// 1-based position of the day within the conference.
    pub index: usize,
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Wire shape of a conference as served by the CFP API and kept in settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConferenceRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "timezone")]
    pub time_zone: String,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub cfp_endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ConferenceRecord", into = "ConferenceRecord")]
pub struct Conference {
    id: String,
    name: String,
    time_zone: Tz,
    from_date: NaiveDate,
    to_date: NaiveDate,
    cfp_endpoint: String,
    days: Vec<ConferenceDay>,
}

impl Conference {
    pub fn new(
        id: &str,
        time_zone: &str,
        from_date: NaiveDate,
        to_date: NaiveDate,
        cfp_endpoint: &str,
    ) -> SyncResult<Self> {
        let id = id.trim();
        if id.is_empty() {
            return Err(SyncError::InvalidConference("conference id cannot be empty".into()));
        }
        let mut conference = Self {
            id: id.to_string(),
            name: id.to_string(),
            time_zone: parse_time_zone(time_zone)?,
            from_date,
            to_date,
            cfp_endpoint: cfp_endpoint.trim().to_string(),
            days: Vec::new(),
        };
        conference.rebuild_days()?;
        Ok(conference)
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    pub fn from_date(&self) -> NaiveDate {
        self.from_date
    }

    pub fn to_date(&self) -> NaiveDate {
        self.to_date
    }

    /// Base URL of the conference's CFP API.
    pub fn cfp_endpoint(&self) -> &str {
        &self.cfp_endpoint
    }

    pub fn days(&self) -> &[ConferenceDay] {
        &self.days
    }

    pub fn set_dates(&mut self, from_date: NaiveDate, to_date: NaiveDate) -> SyncResult<()> {
        let previous = (self.from_date, self.to_date);
        self.from_date = from_date;
        self.to_date = to_date;
        if let Err(err) = self.rebuild_days() {
            (self.from_date, self.to_date) = previous;
            return Err(err);
        }
        Ok(())
    }

    pub fn set_time_zone(&mut self, time_zone: &str) -> SyncResult<()> {
        let previous = std::mem::replace(&mut self.time_zone, parse_time_zone(time_zone)?);
        if let Err(err) = self.rebuild_days() {
            self.time_zone = previous;
            return Err(err);
        }
        Ok(())
    }

    /// 1-based index of the day containing `instant`, or `None` when the
    /// instant falls outside the conference.
    pub fn day_index(&self, instant: DateTime<Utc>) -> Option<usize> {
        self.days
            .iter()
            .find(|day| day.start <= instant && instant < day.end)
            .map(|day| day.index)
    }

    /// 1-based index of a calendar date in the conference's own time zone.
    pub fn day_index_of_date(&self, date: NaiveDate) -> Option<usize> {
        self.days.iter().find(|day| day.date == date).map(|day| day.index)
    }

    fn rebuild_days(&mut self) -> SyncResult<()> {
        if self.from_date > self.to_date {
            return Err(SyncError::InvalidConference(format!(
                "{}: start date {} is after end date {}",
                self.id, self.from_date, self.to_date
            )));
        }

        let mut starts = Vec::new();
        let mut date = self.from_date;
        loop {
            starts.push((date, local_day_start(self.time_zone, date)?));
            if date == self.to_date {
                break;
            }
            date = date.succ_opt().ok_or_else(|| {
                SyncError::InvalidConference(format!("{}: date range overflows", self.id))
            })?;
        }
        let after_last = self.to_date.succ_opt().ok_or_else(|| {
            SyncError::InvalidConference(format!("{}: date range overflows", self.id))
        })?;
        let final_end = local_day_start(self.time_zone, after_last)?;

        self.days = starts
            .iter()
            .enumerate()
            .map(|(position, (date, start))| ConferenceDay {
                index: position + 1,
                date: *date,
                start: *start,
                end: starts
                    .get(position + 1)
                    .map(|(_, next)| *next)
                    .unwrap_or(final_end),
            })
            .collect();
        Ok(())
    }
}

impl TryFrom<ConferenceRecord> for Conference {
    type Error = SyncError;

    fn try_from(record: ConferenceRecord) -> Result<Self, Self::Error> {
        let conference = Conference::new(
            &record.id,
            &record.time_zone,
            record.from_date,
            record.to_date,
            &record.cfp_endpoint,
        )?;
        if record.name.is_empty() {
            Ok(conference)
        } else {
            Ok(conference.with_name(&record.name))
        }
    }
}

impl From<Conference> for ConferenceRecord {
    fn from(conference: Conference) -> Self {
        Self {
            id: conference.id,
            name: conference.name,
            time_zone: conference.time_zone.name().to_string(),
            from_date: conference.from_date,
            to_date: conference.to_date,
            cfp_endpoint: conference.cfp_endpoint,
        }
    }
}

fn parse_time_zone(value: &str) -> SyncResult<Tz> {
    value
        .trim()
        .parse::<Tz>()
        .map_err(|_| SyncError::InvalidConference(format!("unknown time zone `{value}`")))
}

// Midnight can be skipped by a DST switch in a few zones; the first existing
// local hour of the day is used instead.
fn local_day_start(tz: Tz, date: NaiveDate) -> SyncResult<DateTime<Utc>> {
    (0..4)
        .filter_map(|hour| date.and_hms_opt(hour, 0, 0))
        .find_map(|local| tz.from_local_datetime(&local).earliest())
        .map(|start| start.with_timezone(&Utc))
        .ok_or_else(|| SyncError::InvalidConference(format!("no local start for {date} in {tz}")))
}
