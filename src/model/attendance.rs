use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

use crate::geofence::Coordinates;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AttendanceStatus {
    #[default]
    Present,
    Absent,
    Late,
    HalfDay,
}

/// Where a user stands for the current day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NoSession,
    CheckedIn,
    CheckedOut,
}

impl SessionState {
    pub fn of(record: Option<&AttendanceRecord>) -> Self {
        match record {
            None => SessionState::NoSession,
            Some(r) if r.is_open() => SessionState::CheckedIn,
            Some(_) => SessionState::CheckedOut,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 10,
    "user_id": 3,
    "user_name": "Jane Doe",
    "location_id": 1,
    "location_name": "Head Office",
    "check_in_time": "2026-01-05T03:01:12Z",
    "check_out_time": null,
    "check_in_coordinates": { "latitude": 23.8103, "longitude": 90.4125 },
    "check_out_coordinates": null,
    "status": "present",
    "notes": "",
    "is_manual_entry": false,
    "manual_editor_id": null,
    "manual_editor_name": null,
    "manual_reason": null,
    "created_at": "2026-01-05T03:01:12Z",
    "updated_at": "2026-01-05T03:01:12Z"
}))]
pub struct AttendanceRecord {
    pub id: u64,
    pub user_id: u64,
    pub user_name: Option<String>,
    pub location_id: u64,
    pub location_name: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub check_in_time: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out_time: Option<DateTime<Utc>>,
    pub check_in_coordinates: Coordinates,
    pub check_out_coordinates: Option<Coordinates>,
    pub status: AttendanceStatus,
    pub notes: String,
    pub is_manual_entry: bool,
    pub manual_editor_id: Option<u64>,
    pub manual_editor_name: Option<String>,
    pub manual_reason: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn is_open(&self) -> bool {
        self.check_out_time.is_none()
    }
}

/// An ordinary self check-in. `day` is the calendar day the store keys uniqueness on.
#[derive(Debug, Clone)]
pub struct NewCheckIn {
    pub user_id: u64,
    pub location_id: u64,
    pub day: NaiveDate,
    pub at: DateTime<Utc>,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone)]
pub struct NewManualRecord {
    pub user_id: u64,
    pub location_id: u64,
    pub check_in_time: DateTime<Utc>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub check_in_coordinates: Coordinates,
    pub check_out_coordinates: Option<Coordinates>,
    pub status: AttendanceStatus,
    pub notes: String,
    pub editor_id: u64,
    pub reason: String,
}

/// Full replacement of the admin-editable fields of an existing record.
///
/// `day` is the local day of `check_in_time`. A row holding a self check-in key moves
/// that key to `day`.
#[derive(Debug, Clone)]
pub struct ManualChanges {
    pub check_in_time: DateTime<Utc>,
    pub day: NaiveDate,
    pub check_out_time: Option<DateTime<Utc>>,
    pub check_out_coordinates: Option<Coordinates>,
    pub status: AttendanceStatus,
    pub notes: String,
    pub editor_id: u64,
    pub reason: String,
}

/// Store-level listing filter. Time bounds are `[from, until)` in UTC.
#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    pub user_id: Option<u64>,
    pub location_id: Option<u64>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub page: u32,
    pub per_page: u32,
}

impl AttendanceFilter {
    pub fn offset(&self) -> u64 {
        (self.page.saturating_sub(1) as u64) * self.per_page as u64
    }

    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.user_id.is_none_or(|id| record.user_id == id)
            && self.location_id.is_none_or(|id| record.location_id == id)
            && self.from.is_none_or(|from| record.check_in_time >= from)
            && self.until.is_none_or(|until| record.check_in_time < until)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AttendancePage {
    pub data: Vec<AttendanceRecord>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 50)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: u64,
    #[schema(example = 1)]
    pub pages: u64,
}

impl AttendancePage {
    pub fn new(data: Vec<AttendanceRecord>, filter: &AttendanceFilter, total: u64) -> Self {
        let per_page = filter.per_page.max(1);
        Self {
            data,
            page: filter.page,
            per_page,
            total,
            pages: total.div_ceil(per_page as u64),
        }
    }
}
