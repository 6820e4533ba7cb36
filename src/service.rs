//! Check-in/check-out state machine.
//!
//! Per user and local calendar day a record moves `NoSession -> CheckedIn -> CheckedOut`.
//! Only one ordinary check-in is allowed per day, open or closed. Administrators can
//! create and rewrite records outside those rules, but every such write is stamped as a
//! manual entry with the editor and a reason.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

use crate::clock::{Clock, DayPolicy, DayWindow};
use crate::error::AttendanceError;
use crate::geofence::{self, Coordinates};
use crate::model::attendance::{
    AttendanceFilter, AttendancePage, AttendanceRecord, AttendanceStatus, ManualChanges,
    NewCheckIn, NewManualRecord, SessionState,
};
use crate::store::{AttendanceStore, LocationRegistry};

pub const DEFAULT_CREATE_REASON: &str = "Manual entry by admin";
pub const DEFAULT_UPDATE_REASON: &str = "Updated by admin";

const DEFAULT_PER_PAGE: u32 = 50;
const MAX_PER_PAGE: u32 = 100;

/// Distinguishes "field absent" (`None`) from "field explicitly null" (`Some(None)`).
fn explicit_null<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// Administrative create-or-edit payload.
///
/// Without `record_id` this creates a record and `user_id`, `location_id`,
/// `check_in_time`, `latitude` and `longitude` are required. With `record_id` only
/// `check_in_time`, `check_out_time`, `status`, `notes` and the check-out coordinates
/// are applied.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ManualEntry {
    #[serde(skip)]
    pub record_id: Option<u64>,
    #[schema(example = 3)]
    pub user_id: Option<u64>,
    #[schema(example = 1)]
    pub location_id: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time", example = "2026-01-05T03:00:00Z")]
    pub check_in_time: Option<DateTime<Utc>>,
    /// `null` clears the check-out and reopens the session.
    #[serde(default, deserialize_with = "explicit_null")]
    #[schema(value_type = Option<String>, format = "date-time", example = "2026-01-05T11:00:00Z")]
    pub check_out_time: Option<Option<DateTime<Utc>>>,
    #[schema(example = 23.8103)]
    pub latitude: Option<f64>,
    #[schema(example = 90.4125)]
    pub longitude: Option<f64>,
    pub check_out_latitude: Option<f64>,
    pub check_out_longitude: Option<f64>,
    pub status: Option<AttendanceStatus>,
    pub notes: Option<String>,
    #[schema(example = "Forgot to check in")]
    pub reason: Option<String>,
}

impl ManualEntry {
    fn reason_or(&self, default: &str) -> String {
        self.reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(default)
            .to_string()
    }

    fn check_out_coordinates(&self) -> Result<Option<Coordinates>, AttendanceError> {
        match (self.check_out_latitude, self.check_out_longitude) {
            (Some(lat), Some(lon)) => {
                let c = Coordinates::new(lat, lon);
                c.validate()?;
                Ok(Some(c))
            }
            (None, None) => Ok(None),
            _ => Err(AttendanceError::validation(
                "Check-out latitude and longitude must be given together.",
            )),
        }
    }
}

/// Listing filter shared by a user's own history and the admin listing.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AttendanceQuery {
    /// Filter by user (admin listing only)
    pub user_id: Option<u64>,
    /// Filter by location (admin listing only)
    pub location_id: Option<u64>,
    /// First day to include, local date
    #[param(value_type = Option<String>, example = "2026-01-01")]
    pub start_date: Option<NaiveDate>,
    /// Last day to include, local date, inclusive
    #[param(value_type = Option<String>, example = "2026-01-31")]
    pub end_date: Option<NaiveDate>,
    /// Page number, starting at 1
    pub page: Option<u32>,
    /// Items per page (max 100)
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TodayStatus {
    pub state: SessionState,
    pub has_checked_in: bool,
    pub attendance: Option<AttendanceRecord>,
}

#[derive(Clone)]
pub struct AttendanceService {
    store: Arc<dyn AttendanceStore>,
    locations: Arc<dyn LocationRegistry>,
    clock: Arc<dyn Clock>,
    days: DayPolicy,
}

impl AttendanceService {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        locations: Arc<dyn LocationRegistry>,
        clock: Arc<dyn Clock>,
        days: DayPolicy,
    ) -> Self {
        Self {
            store,
            locations,
            clock,
            days,
        }
    }

    pub fn locations(&self) -> &Arc<dyn LocationRegistry> {
        &self.locations
    }

    /// `now` and the day it falls in, read once per request.
    fn today(&self) -> (DateTime<Utc>, DayWindow) {
        let now = self.clock.now();
        (now, self.days.window(now))
    }

    #[instrument(skip(self))]
    pub async fn check_in(
        &self,
        user_id: u64,
        location_id: u64,
        coordinates: Coordinates,
    ) -> Result<AttendanceRecord, AttendanceError> {
        coordinates.validate()?;

        let location = self
            .locations
            .get(location_id)
            .await?
            .filter(|l| l.is_active)
            .ok_or(AttendanceError::NotFound {
                entity: "Location",
                id: location_id,
            })?;

        let check = geofence::evaluate(coordinates, &location);
        if !check.inside {
            warn!(
                distance = check.distance,
                allowed_radius = check.allowed_radius,
                "Check-in outside geofence"
            );
            return Err(AttendanceError::OutOfRange {
                distance: check.distance,
                allowed_radius: check.allowed_radius,
            });
        }

        let (now, today) = self.today();
        if let Some(existing) = self.store.find_in_window(user_id, &today).await? {
            info!(record_id = existing.id, "Already checked in today");
            return Err(AttendanceError::AlreadyCheckedIn);
        }

        let record = self
            .store
            .insert_check_in(NewCheckIn {
                user_id,
                location_id,
                day: today.day,
                at: now,
                coordinates,
            })
            .await?;

        info!(record_id = record.id, distance = check.distance, "Checked in");
        Ok(record)
    }

    #[instrument(skip(self))]
    pub async fn check_out(
        &self,
        user_id: u64,
        coordinates: Coordinates,
    ) -> Result<AttendanceRecord, AttendanceError> {
        coordinates.validate()?;

        let (now, today) = self.today();
        let open = self
            .store
            .find_open_in_window(user_id, &today, None)
            .await?
            .ok_or(AttendanceError::NoOpenSession)?;

        if now < open.check_in_time {
            return Err(AttendanceError::validation(
                "Check-out time cannot be earlier than check-in time.",
            ));
        }

        // a concurrent check-out or an admin delete can beat us between find and close
        let record = self
            .store
            .close_session(open.id, now, coordinates)
            .await?
            .ok_or(AttendanceError::NoOpenSession)?;

        info!(record_id = record.id, "Checked out");
        Ok(record)
    }

    pub async fn today_status(&self, user_id: u64) -> Result<TodayStatus, AttendanceError> {
        let (_, today) = self.today();
        let attendance = self.store.find_in_window(user_id, &today).await?;

        Ok(TodayStatus {
            state: SessionState::of(attendance.as_ref()),
            has_checked_in: attendance.is_some(),
            attendance,
        })
    }

    pub async fn list_my_history(
        &self,
        user_id: u64,
        query: AttendanceQuery,
    ) -> Result<AttendancePage, AttendanceError> {
        let query = AttendanceQuery {
            user_id: Some(user_id),
            location_id: None,
            ..query
        };
        self.list_all(query).await
    }

    pub async fn list_all(&self, query: AttendanceQuery) -> Result<AttendancePage, AttendanceError> {
        let filter = self.to_filter(&query)?;
        let (data, total) = self.store.list(&filter).await?;
        Ok(AttendancePage::new(data, &filter, total))
    }

    #[instrument(skip(self))]
    pub async fn manual_upsert(
        &self,
        admin_id: u64,
        entry: ManualEntry,
    ) -> Result<AttendanceRecord, AttendanceError> {
        match entry.record_id {
            None => self.manual_create(admin_id, entry).await,
            Some(id) => self.manual_update(admin_id, id, entry).await,
        }
    }

    async fn manual_create(
        &self,
        admin_id: u64,
        entry: ManualEntry,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let (Some(user_id), Some(location_id), Some(check_in_time), Some(lat), Some(lon)) = (
            entry.user_id,
            entry.location_id,
            entry.check_in_time,
            entry.latitude,
            entry.longitude,
        ) else {
            return Err(AttendanceError::validation(
                "User ID, location ID, check-in time, latitude, and longitude are required.",
            ));
        };

        let check_in_coordinates = Coordinates::new(lat, lon);
        check_in_coordinates.validate()?;
        let check_out_coordinates = entry.check_out_coordinates()?;

        // backfills may target a site that has since been deactivated
        if self.locations.get(location_id).await?.is_none() {
            return Err(AttendanceError::NotFound {
                entity: "Location",
                id: location_id,
            });
        }

        let check_out_time = entry.check_out_time.flatten();
        ensure_ordered(check_in_time, check_out_time)?;
        if check_out_time.is_none() {
            self.ensure_no_other_open(user_id, check_in_time, None).await?;
        }

        let record = self
            .store
            .insert_manual(NewManualRecord {
                user_id,
                location_id,
                check_in_time,
                check_out_time,
                check_in_coordinates,
                check_out_coordinates,
                status: entry.status.unwrap_or_default(),
                notes: entry.notes.clone().unwrap_or_default(),
                editor_id: admin_id,
                reason: entry.reason_or(DEFAULT_CREATE_REASON),
            })
            .await?;

        info!(record_id = record.id, user_id, "Manual attendance created");
        Ok(record)
    }

    async fn manual_update(
        &self,
        admin_id: u64,
        id: u64,
        entry: ManualEntry,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let not_found = AttendanceError::NotFound {
            entity: "Attendance record",
            id,
        };
        let existing = self.store.get(id).await?.ok_or(not_found)?;

        let check_in_time = entry.check_in_time.unwrap_or(existing.check_in_time);
        let check_out_time = match entry.check_out_time {
            Some(v) => v,
            None => existing.check_out_time,
        };
        ensure_ordered(check_in_time, check_out_time)?;
        if check_out_time.is_none() {
            self.ensure_no_other_open(existing.user_id, check_in_time, Some(id))
                .await?;
        }

        let changes = ManualChanges {
            check_in_time,
            day: self.days.day_of(check_in_time),
            check_out_time,
            check_out_coordinates: entry.check_out_coordinates()?,
            status: entry.status.unwrap_or(existing.status),
            notes: entry.notes.clone().unwrap_or(existing.notes),
            editor_id: admin_id,
            reason: entry.reason_or(DEFAULT_UPDATE_REASON),
        };

        let record = self
            .store
            .update_manual(id, changes)
            .await?
            .ok_or(AttendanceError::NotFound {
                entity: "Attendance record",
                id,
            })?;

        info!(record_id = id, "Manual attendance updated");
        Ok(record)
    }

    /// Hard delete. Nothing of the record survives, only this log line.
    #[instrument(skip(self))]
    pub async fn delete(&self, admin_id: u64, record_id: u64) -> Result<(), AttendanceError> {
        if !self.store.delete(record_id).await? {
            return Err(AttendanceError::NotFound {
                entity: "Attendance record",
                id: record_id,
            });
        }
        info!("Attendance record deleted");
        Ok(())
    }

    /// Manual writes skip the one-check-in-per-day rule but may not leave a second open
    /// session on the same day.
    async fn ensure_no_other_open(
        &self,
        user_id: u64,
        check_in_time: DateTime<Utc>,
        exclude: Option<u64>,
    ) -> Result<(), AttendanceError> {
        let window = self.days.window(check_in_time);
        if let Some(other) = self
            .store
            .find_open_in_window(user_id, &window, exclude)
            .await?
        {
            return Err(AttendanceError::Validation(format!(
                "User already has an open session on {} (record {}).",
                window.day, other.id
            )));
        }
        Ok(())
    }

    fn to_filter(&self, query: &AttendanceQuery) -> Result<AttendanceFilter, AttendanceError> {
        if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
            if start > end {
                return Err(AttendanceError::validation(
                    "start_date cannot be after end_date",
                ));
            }
        }

        Ok(AttendanceFilter {
            user_id: query.user_id,
            location_id: query.location_id,
            from: query.start_date.map(|d| self.days.window_for(d).start),
            until: query.end_date.map(|d| self.days.window_for(d).end),
            page: query.page.unwrap_or(1).max(1),
            per_page: query.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        })
    }
}

fn ensure_ordered(
    check_in: DateTime<Utc>,
    check_out: Option<DateTime<Utc>>,
) -> Result<(), AttendanceError> {
    match check_out {
        Some(out) if out < check_in => Err(AttendanceError::validation(
            "Check-out time cannot be earlier than check-in time.",
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::location::NewLocation;
    use crate::store::memory::MemoryStore;
    use chrono::{Duration, TimeZone};

    const ADMIN: u64 = 1;
    const USER: u64 = 2;

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        service: AttendanceService,
        site: u64,
    }

    async fn fixture(radius: f64) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        store.add_user(ADMIN, "Admin");
        store.add_user(USER, "Jane Doe");
        let site = store
            .create(NewLocation {
                name: "Origin".to_string(),
                description: None,
                center: Coordinates::new(0.0, 0.0),
                radius,
                created_by: Some(ADMIN),
            })
            .await
            .unwrap();

        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap(),
        ));
        let service = AttendanceService::new(
            store.clone(),
            store.clone(),
            clock.clone(),
            DayPolicy::utc(),
        );

        Fixture {
            store,
            clock,
            service,
            site: site.id,
        }
    }

    fn origin() -> Coordinates {
        Coordinates::new(0.0, 0.0)
    }

    #[actix_web::test]
    async fn full_day_scenario() {
        let f = fixture(100.0).await;

        let record = f.service.check_in(USER, f.site, origin()).await.unwrap();
        assert!(record.is_open());
        assert!(!record.is_manual_entry);
        assert_eq!(record.status, AttendanceStatus::Present);
        assert_eq!(record.user_name.as_deref(), Some("Jane Doe"));
        assert_eq!(record.location_name.as_deref(), Some("Origin"));
        assert_eq!(
            f.service.today_status(USER).await.unwrap().state,
            SessionState::CheckedIn
        );

        let again = f.service.check_in(USER, f.site, origin()).await;
        assert!(matches!(again, Err(AttendanceError::AlreadyCheckedIn)));

        f.clock.advance(Duration::hours(8));
        let closed = f.service.check_out(USER, origin()).await.unwrap();
        assert_eq!(closed.id, record.id);
        assert_eq!(
            closed.check_out_time,
            Some(Utc.with_ymd_and_hms(2026, 5, 4, 17, 0, 0).unwrap())
        );
        assert_eq!(closed.check_out_coordinates, Some(origin()));

        match f
            .service
            .check_in(USER, f.site, Coordinates::new(0.0, 0.01))
            .await
        {
            Err(AttendanceError::OutOfRange {
                distance,
                allowed_radius,
            }) => {
                assert!((distance - 1113.0).abs() < 1.0, "got {distance}");
                assert_eq!(allowed_radius, 100.0);
            }
            other => panic!("expected OutOfRange, got {other:?}"),
        }
    }

    #[actix_web::test]
    async fn second_check_in_after_checkout_is_refused() {
        let f = fixture(100.0).await;
        f.service.check_in(USER, f.site, origin()).await.unwrap();
        f.service.check_out(USER, origin()).await.unwrap();

        let status = f.service.today_status(USER).await.unwrap();
        assert_eq!(status.state, SessionState::CheckedOut);
        assert!(status.has_checked_in);

        let again = f.service.check_in(USER, f.site, origin()).await;
        assert!(matches!(again, Err(AttendanceError::AlreadyCheckedIn)));
    }

    #[actix_web::test]
    async fn next_day_starts_fresh() {
        let f = fixture(100.0).await;
        f.service.check_in(USER, f.site, origin()).await.unwrap();

        f.clock.advance(Duration::days(1));
        let status = f.service.today_status(USER).await.unwrap();
        assert_eq!(status.state, SessionState::NoSession);
        assert!(status.attendance.is_none());

        // yesterday's open session is not today's
        let out = f.service.check_out(USER, origin()).await;
        assert!(matches!(out, Err(AttendanceError::NoOpenSession)));

        assert!(f.service.check_in(USER, f.site, origin()).await.is_ok());
    }

    #[actix_web::test]
    async fn check_out_without_check_in() {
        let f = fixture(100.0).await;
        let out = f.service.check_out(USER, origin()).await;
        assert!(matches!(out, Err(AttendanceError::NoOpenSession)));
    }

    #[actix_web::test]
    async fn checkout_skips_the_geofence() {
        let f = fixture(100.0).await;
        f.service.check_in(USER, f.site, origin()).await.unwrap();
        let far_away = Coordinates::new(45.0, 45.0);
        assert!(f.service.check_out(USER, far_away).await.is_ok());
    }

    #[actix_web::test]
    async fn radius_boundary_is_inclusive() {
        let point = Coordinates::new(0.0003, 0.0004);
        let exact = geofence::distance(origin(), point);

        let inside = fixture(exact).await;
        assert!(inside.service.check_in(USER, inside.site, point).await.is_ok());

        let outside = fixture(exact - 0.01).await;
        assert!(matches!(
            outside.service.check_in(USER, outside.site, point).await,
            Err(AttendanceError::OutOfRange { .. })
        ));
    }

    #[actix_web::test]
    async fn unknown_or_inactive_location() {
        let f = fixture(100.0).await;
        assert!(matches!(
            f.service.check_in(USER, 404, origin()).await,
            Err(AttendanceError::NotFound { entity: "Location", .. })
        ));

        f.store.deactivate(f.site).await.unwrap();
        assert!(matches!(
            f.service.check_in(USER, f.site, origin()).await,
            Err(AttendanceError::NotFound { .. })
        ));
    }

    #[actix_web::test]
    async fn invalid_coordinates_are_rejected_before_lookup() {
        let f = fixture(100.0).await;
        assert!(matches!(
            f.service.check_in(USER, 404, Coordinates::new(91.0, 0.0)).await,
            Err(AttendanceError::Validation(_))
        ));
        assert!(matches!(
            f.service.check_out(USER, Coordinates::new(0.0, 181.0)).await,
            Err(AttendanceError::Validation(_))
        ));
    }

    #[actix_web::test]
    async fn manual_create_is_stamped_with_editor_and_default_reason() {
        let f = fixture(100.0).await;
        let entry = ManualEntry {
            user_id: Some(USER),
            location_id: Some(f.site),
            check_in_time: Some(Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()),
            check_out_time: Some(Some(Utc.with_ymd_and_hms(2026, 4, 1, 17, 0, 0).unwrap())),
            latitude: Some(5.0),
            longitude: Some(5.0),
            status: Some(AttendanceStatus::Late),
            reason: Some("   ".to_string()),
            ..Default::default()
        };

        let record = f.service.manual_upsert(ADMIN, entry).await.unwrap();
        assert!(record.is_manual_entry);
        assert_eq!(record.manual_editor_id, Some(ADMIN));
        assert_eq!(record.manual_editor_name.as_deref(), Some("Admin"));
        assert_eq!(record.manual_reason.as_deref(), Some(DEFAULT_CREATE_REASON));
        assert_eq!(record.status, AttendanceStatus::Late);
    }

    #[actix_web::test]
    async fn manual_create_requires_core_fields() {
        let f = fixture(100.0).await;
        let entry = ManualEntry {
            user_id: Some(USER),
            location_id: Some(f.site),
            latitude: Some(0.0),
            longitude: Some(0.0),
            ..Default::default()
        };
        assert!(matches!(
            f.service.manual_upsert(ADMIN, entry).await,
            Err(AttendanceError::Validation(_))
        ));
    }

    #[actix_web::test]
    async fn manual_create_bypasses_daily_uniqueness_but_not_open_session_rule() {
        let f = fixture(100.0).await;
        f.service.check_in(USER, f.site, origin()).await.unwrap();

        let today_nine = Utc.with_ymd_and_hms(2026, 5, 4, 7, 0, 0).unwrap();
        let open_entry = ManualEntry {
            user_id: Some(USER),
            location_id: Some(f.site),
            check_in_time: Some(today_nine),
            latitude: Some(0.0),
            longitude: Some(0.0),
            ..Default::default()
        };
        assert!(matches!(
            f.service.manual_upsert(ADMIN, open_entry.clone()).await,
            Err(AttendanceError::Validation(_))
        ));

        let closed_entry = ManualEntry {
            check_out_time: Some(Some(today_nine + Duration::hours(1))),
            ..open_entry
        };
        let record = f.service.manual_upsert(ADMIN, closed_entry).await.unwrap();
        assert!(record.is_manual_entry);
    }

    #[actix_web::test]
    async fn manual_update_patches_and_marks_record() {
        let f = fixture(100.0).await;
        let record = f.service.check_in(USER, f.site, origin()).await.unwrap();
        let out = record.check_in_time + Duration::hours(4);

        let entry = ManualEntry {
            record_id: Some(record.id),
            check_out_time: Some(Some(out)),
            status: Some(AttendanceStatus::HalfDay),
            notes: Some("left early".to_string()),
            reason: Some("Approved half day".to_string()),
            ..Default::default()
        };
        let updated = f.service.manual_upsert(ADMIN, entry).await.unwrap();

        assert_eq!(updated.check_in_time, record.check_in_time);
        assert_eq!(updated.check_out_time, Some(out));
        assert_eq!(updated.status, AttendanceStatus::HalfDay);
        assert_eq!(updated.notes, "left early");
        assert!(updated.is_manual_entry);
        assert_eq!(updated.manual_editor_id, Some(ADMIN));
        assert_eq!(updated.manual_reason.as_deref(), Some("Approved half day"));

        // editing does not hand the user a second check-in for the day
        assert!(matches!(
            f.service.check_in(USER, f.site, origin()).await,
            Err(AttendanceError::AlreadyCheckedIn)
        ));
    }

    #[actix_web::test]
    async fn manual_update_can_reopen_and_uses_default_reason() {
        let f = fixture(100.0).await;
        let record = f.service.check_in(USER, f.site, origin()).await.unwrap();
        f.service.check_out(USER, origin()).await.unwrap();

        let entry = ManualEntry {
            record_id: Some(record.id),
            check_out_time: Some(None),
            ..Default::default()
        };
        let reopened = f.service.manual_upsert(ADMIN, entry).await.unwrap();
        assert!(reopened.is_open());
        assert_eq!(reopened.manual_reason.as_deref(), Some(DEFAULT_UPDATE_REASON));
        assert_eq!(
            f.service.today_status(USER).await.unwrap().state,
            SessionState::CheckedIn
        );
    }

    #[actix_web::test]
    async fn manual_update_rejects_inverted_times() {
        let f = fixture(100.0).await;
        let record = f.service.check_in(USER, f.site, origin()).await.unwrap();

        let entry = ManualEntry {
            record_id: Some(record.id),
            check_out_time: Some(Some(record.check_in_time - Duration::minutes(1))),
            ..Default::default()
        };
        assert!(matches!(
            f.service.manual_upsert(ADMIN, entry).await,
            Err(AttendanceError::Validation(_))
        ));

        let missing = ManualEntry {
            record_id: Some(999),
            ..Default::default()
        };
        assert!(matches!(
            f.service.manual_upsert(ADMIN, missing).await,
            Err(AttendanceError::NotFound { .. })
        ));
    }

    #[actix_web::test]
    async fn moving_a_check_in_to_another_day_frees_today() {
        let f = fixture(100.0).await;
        let record = f.service.check_in(USER, f.site, origin()).await.unwrap();
        let yesterday = record.check_in_time - Duration::days(1);

        let entry = ManualEntry {
            record_id: Some(record.id),
            check_in_time: Some(yesterday),
            check_out_time: Some(Some(yesterday + Duration::hours(8))),
            ..Default::default()
        };
        f.service.manual_upsert(ADMIN, entry).await.unwrap();

        let status = f.service.today_status(USER).await.unwrap();
        assert!(!status.has_checked_in);
        let fresh = f.service.check_in(USER, f.site, origin()).await.unwrap();
        assert_ne!(fresh.id, record.id);

        // yesterday is now held by the moved record
        f.clock.advance(Duration::days(-1));
        assert!(matches!(
            f.service.check_in(USER, f.site, origin()).await,
            Err(AttendanceError::AlreadyCheckedIn)
        ));
    }

    #[actix_web::test]
    async fn moving_a_check_in_onto_a_taken_day_is_refused() {
        let f = fixture(100.0).await;
        let first = f.service.check_in(USER, f.site, origin()).await.unwrap();
        f.clock.advance(Duration::hours(8));
        f.service.check_out(USER, origin()).await.unwrap();

        f.clock.advance(Duration::hours(16));
        let second = f.service.check_in(USER, f.site, origin()).await.unwrap();

        let entry = ManualEntry {
            record_id: Some(second.id),
            check_in_time: Some(first.check_in_time + Duration::hours(9)),
            check_out_time: Some(Some(first.check_in_time + Duration::hours(10))),
            ..Default::default()
        };
        assert!(matches!(
            f.service.manual_upsert(ADMIN, entry).await,
            Err(AttendanceError::Validation(_))
        ));

        // the refused edit left today's record in place
        let status = f.service.today_status(USER).await.unwrap();
        assert_eq!(status.attendance.map(|r| r.id), Some(second.id));
    }

    #[actix_web::test]
    async fn checkout_refuses_a_check_in_moved_into_the_future() {
        let f = fixture(100.0).await;
        let record = f.service.check_in(USER, f.site, origin()).await.unwrap();
        let later_today = record.check_in_time + Duration::hours(3);

        let entry = ManualEntry {
            record_id: Some(record.id),
            check_in_time: Some(later_today),
            ..Default::default()
        };
        f.service.manual_upsert(ADMIN, entry).await.unwrap();

        assert!(matches!(
            f.service.check_out(USER, origin()).await,
            Err(AttendanceError::Validation(_))
        ));
    }

    #[actix_web::test]
    async fn delete_is_hard_and_reports_missing_records() {
        let f = fixture(100.0).await;
        let record = f.service.check_in(USER, f.site, origin()).await.unwrap();

        f.service.delete(ADMIN, record.id).await.unwrap();
        assert!(AttendanceStore::get(f.store.as_ref(), record.id)
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            f.service.delete(ADMIN, record.id).await,
            Err(AttendanceError::NotFound { .. })
        ));
    }

    #[actix_web::test]
    async fn history_is_scoped_to_the_caller_and_date_range() {
        let f = fixture(100.0).await;
        for _ in 0..3 {
            f.service.check_in(USER, f.site, origin()).await.unwrap();
            f.service.check_in(ADMIN, f.site, origin()).await.unwrap();
            f.clock.advance(Duration::days(1));
        }

        let mine = f
            .service
            .list_my_history(
                USER,
                AttendanceQuery {
                    user_id: Some(ADMIN),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(mine.total, 3);
        assert!(mine.data.iter().all(|r| r.user_id == USER));
        assert!(mine.data[0].check_in_time > mine.data[2].check_in_time);

        let one_day = f
            .service
            .list_my_history(
                USER,
                AttendanceQuery {
                    start_date: NaiveDate::from_ymd_opt(2026, 5, 5),
                    end_date: NaiveDate::from_ymd_opt(2026, 5, 5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(one_day.total, 1);

        let all = f
            .service
            .list_all(AttendanceQuery {
                per_page: Some(2),
                page: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.total, 6);
        assert_eq!(all.pages, 3);
        assert_eq!(all.data.len(), 2);

        let inverted = f
            .service
            .list_all(AttendanceQuery {
                start_date: NaiveDate::from_ymd_opt(2026, 5, 6),
                end_date: NaiveDate::from_ymd_opt(2026, 5, 5),
                ..Default::default()
            })
            .await;
        assert!(matches!(inverted, Err(AttendanceError::Validation(_))));
    }

    #[actix_web::test]
    async fn never_two_open_sessions_per_day() {
        let f = fixture(100.0).await;
        f.service.check_in(USER, f.site, origin()).await.unwrap();

        // a mix of operations that each try to open another session today
        let _ = f.service.check_in(USER, f.site, origin()).await;
        let _ = f
            .service
            .manual_upsert(
                ADMIN,
                ManualEntry {
                    user_id: Some(USER),
                    location_id: Some(f.site),
                    check_in_time: Some(f.clock.now()),
                    latitude: Some(0.0),
                    longitude: Some(0.0),
                    ..Default::default()
                },
            )
            .await;

        let page = f
            .service
            .list_my_history(USER, AttendanceQuery::default())
            .await
            .unwrap();
        assert_eq!(page.data.iter().filter(|r| r.is_open()).count(), 1);
    }
}
