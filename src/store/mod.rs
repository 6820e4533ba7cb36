//! Persistence seams for the attendance core.
//!
//! The service only talks to these traits. `mysql` backs the running server and
//! `memory` backs tests and local experiments; both must enforce the per-(user, day)
//! check-in uniqueness atomically inside `insert_check_in`.

use async_trait::async_trait;

use crate::clock::DayWindow;
use crate::error::AttendanceError;
use crate::geofence::Coordinates;
use crate::model::attendance::{
    AttendanceFilter, AttendanceRecord, ManualChanges, NewCheckIn, NewManualRecord,
};
use crate::model::location::{Location, LocationPatch, NewLocation};

pub mod memory;
pub mod mysql;

pub type StoreResult<T> = Result<T, AttendanceError>;

#[async_trait]
pub trait LocationRegistry: Send + Sync {
    /// Returns the location whether or not it is active.
    async fn get(&self, id: u64) -> StoreResult<Option<Location>>;

    /// Active locations, newest first.
    async fn list_active(&self) -> StoreResult<Vec<Location>>;

    async fn create(&self, new: NewLocation) -> StoreResult<Location>;

    async fn update(&self, id: u64, patch: LocationPatch) -> StoreResult<Option<Location>>;

    /// Soft delete. Returns false when no such location exists.
    async fn deactivate(&self, id: u64) -> StoreResult<bool>;
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Earliest record of any kind whose check-in falls inside `window`.
    async fn find_in_window(
        &self,
        user_id: u64,
        window: &DayWindow,
    ) -> StoreResult<Option<AttendanceRecord>>;

    /// Open record inside `window`, ignoring `exclude`.
    async fn find_open_in_window(
        &self,
        user_id: u64,
        window: &DayWindow,
        exclude: Option<u64>,
    ) -> StoreResult<Option<AttendanceRecord>>;

    /// Inserts a self check-in. Fails with `AlreadyCheckedIn` when the user already holds
    /// a self check-in for `new.day`, even if a concurrent request got there first.
    async fn insert_check_in(&self, new: NewCheckIn) -> StoreResult<AttendanceRecord>;

    /// Closes `record_id` only if it is still open. `None` means someone else closed or
    /// removed it in the meantime.
    async fn close_session(
        &self,
        record_id: u64,
        at: chrono::DateTime<chrono::Utc>,
        coordinates: Coordinates,
    ) -> StoreResult<Option<AttendanceRecord>>;

    async fn get(&self, id: u64) -> StoreResult<Option<AttendanceRecord>>;

    async fn insert_manual(&self, new: NewManualRecord) -> StoreResult<AttendanceRecord>;

    async fn update_manual(
        &self,
        id: u64,
        changes: ManualChanges,
    ) -> StoreResult<Option<AttendanceRecord>>;

    /// Hard delete. Returns false when nothing was removed.
    async fn delete(&self, id: u64) -> StoreResult<bool>;

    /// Matching records ordered by check-in time, newest first, plus the unpaged total.
    async fn list(&self, filter: &AttendanceFilter) -> StoreResult<(Vec<AttendanceRecord>, u64)>;
}
