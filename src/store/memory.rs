use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::{AttendanceStore, LocationRegistry, StoreResult};
use crate::clock::DayWindow;
use crate::error::AttendanceError;
use crate::geofence::Coordinates;
use crate::model::attendance::{
    AttendanceFilter, AttendanceRecord, ManualChanges, NewCheckIn, NewManualRecord,
};
use crate::model::location::{Location, LocationPatch, NewLocation};

#[derive(Default)]
struct State {
    users: HashMap<u64, String>,
    locations: BTreeMap<u64, Location>,
    records: BTreeMap<u64, AttendanceRecord>,
    // (user_id, day) taken by a self check-in, mirrors uq_attendance_user_day
    self_days: HashSet<(u64, NaiveDate)>,
    record_days: HashMap<u64, (u64, NaiveDate)>,
    next_location_id: u64,
    next_record_id: u64,
}

impl State {
    fn decorate(&self, mut record: AttendanceRecord) -> AttendanceRecord {
        record.user_name = self.users.get(&record.user_id).cloned();
        record.location_name = self
            .locations
            .get(&record.location_id)
            .map(|l| l.name.clone());
        record.manual_editor_name = record
            .manual_editor_id
            .and_then(|id| self.users.get(&id).cloned());
        record
    }

    fn in_window<'a>(
        &'a self,
        user_id: u64,
        window: &'a DayWindow,
    ) -> impl Iterator<Item = &'a AttendanceRecord> + 'a {
        self.records
            .values()
            .filter(move |r| r.user_id == user_id && window.contains(r.check_in_time))
    }
}

/// Process-local store. Every operation runs under one mutex, which is what makes
/// check-then-insert atomic here.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a display name for a user id.
    pub fn add_user(&self, id: u64, name: impl Into<String>) {
        self.lock().users.insert(id, name.into());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn day_taken(day: NaiveDate) -> AttendanceError {
    AttendanceError::Validation(format!("User already has a check-in on {day}."))
}

#[async_trait]
impl LocationRegistry for MemoryStore {
    async fn get(&self, id: u64) -> StoreResult<Option<Location>> {
        Ok(self.lock().locations.get(&id).cloned())
    }

    async fn list_active(&self) -> StoreResult<Vec<Location>> {
        let state = self.lock();
        let mut active: Vec<Location> = state
            .locations
            .values()
            .filter(|l| l.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(active)
    }

    async fn create(&self, new: NewLocation) -> StoreResult<Location> {
        let mut state = self.lock();
        state.next_location_id += 1;
        let now = Utc::now();
        let location = Location {
            id: state.next_location_id,
            name: new.name,
            description: new.description,
            latitude: new.center.latitude,
            longitude: new.center.longitude,
            radius: new.radius,
            is_active: true,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
        };
        state.locations.insert(location.id, location.clone());
        Ok(location)
    }

    async fn update(&self, id: u64, patch: LocationPatch) -> StoreResult<Option<Location>> {
        let mut state = self.lock();
        Ok(state.locations.get_mut(&id).map(|location| {
            patch.apply(location);
            location.updated_at = Utc::now();
            location.clone()
        }))
    }

    async fn deactivate(&self, id: u64) -> StoreResult<bool> {
        let mut state = self.lock();
        match state.locations.get_mut(&id) {
            Some(location) => {
                location.is_active = false;
                location.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn find_in_window(
        &self,
        user_id: u64,
        window: &DayWindow,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let state = self.lock();
        let found = state
            .in_window(user_id, window)
            .min_by_key(|r| r.check_in_time)
            .cloned();
        Ok(found.map(|r| state.decorate(r)))
    }

    async fn find_open_in_window(
        &self,
        user_id: u64,
        window: &DayWindow,
        exclude: Option<u64>,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let state = self.lock();
        let found = state
            .in_window(user_id, window)
            .filter(|r| r.is_open() && Some(r.id) != exclude)
            .max_by_key(|r| r.check_in_time)
            .cloned();
        Ok(found.map(|r| state.decorate(r)))
    }

    async fn insert_check_in(&self, new: NewCheckIn) -> StoreResult<AttendanceRecord> {
        let mut state = self.lock();
        if !state.self_days.insert((new.user_id, new.day)) {
            return Err(AttendanceError::AlreadyCheckedIn);
        }
        state.next_record_id += 1;
        let record = AttendanceRecord {
            id: state.next_record_id,
            user_id: new.user_id,
            user_name: None,
            location_id: new.location_id,
            location_name: None,
            check_in_time: new.at,
            check_out_time: None,
            check_in_coordinates: new.coordinates,
            check_out_coordinates: None,
            status: Default::default(),
            notes: String::new(),
            is_manual_entry: false,
            manual_editor_id: None,
            manual_editor_name: None,
            manual_reason: None,
            created_at: new.at,
            updated_at: new.at,
        };
        state.records.insert(record.id, record.clone());
        state.record_days.insert(record.id, (new.user_id, new.day));
        Ok(state.decorate(record))
    }

    async fn close_session(
        &self,
        record_id: u64,
        at: DateTime<Utc>,
        coordinates: Coordinates,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let mut state = self.lock();
        let closed = match state.records.get_mut(&record_id) {
            Some(record) if record.is_open() => {
                record.check_out_time = Some(at);
                record.check_out_coordinates = Some(coordinates);
                record.updated_at = at;
                record.clone()
            }
            _ => return Ok(None),
        };
        Ok(Some(state.decorate(closed)))
    }

    async fn get(&self, id: u64) -> StoreResult<Option<AttendanceRecord>> {
        let state = self.lock();
        Ok(state.records.get(&id).cloned().map(|r| state.decorate(r)))
    }

    async fn insert_manual(&self, new: NewManualRecord) -> StoreResult<AttendanceRecord> {
        let mut state = self.lock();
        state.next_record_id += 1;
        let now = Utc::now();
        let record = AttendanceRecord {
            id: state.next_record_id,
            user_id: new.user_id,
            user_name: None,
            location_id: new.location_id,
            location_name: None,
            check_in_time: new.check_in_time,
            check_out_time: new.check_out_time,
            check_in_coordinates: new.check_in_coordinates,
            check_out_coordinates: new.check_out_coordinates,
            status: new.status,
            notes: new.notes,
            is_manual_entry: true,
            manual_editor_id: Some(new.editor_id),
            manual_editor_name: None,
            manual_reason: Some(new.reason),
            created_at: now,
            updated_at: now,
        };
        state.records.insert(record.id, record.clone());
        Ok(state.decorate(record))
    }

    async fn update_manual(
        &self,
        id: u64,
        changes: ManualChanges,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let mut state = self.lock();
        if !state.records.contains_key(&id) {
            return Ok(None);
        }
        if let Some((user_id, day)) = state.record_days.get(&id).copied() {
            if day != changes.day {
                if !state.self_days.insert((user_id, changes.day)) {
                    return Err(day_taken(changes.day));
                }
                state.self_days.remove(&(user_id, day));
                state.record_days.insert(id, (user_id, changes.day));
            }
        }
        let updated = match state.records.get_mut(&id) {
            Some(record) => {
                record.check_in_time = changes.check_in_time;
                record.check_out_time = changes.check_out_time;
                if changes.check_out_time.is_none() {
                    record.check_out_coordinates = None;
                } else if changes.check_out_coordinates.is_some() {
                    record.check_out_coordinates = changes.check_out_coordinates;
                }
                record.status = changes.status;
                record.notes = changes.notes;
                record.is_manual_entry = true;
                record.manual_editor_id = Some(changes.editor_id);
                record.manual_reason = Some(changes.reason);
                record.updated_at = Utc::now();
                record.clone()
            }
            None => return Ok(None),
        };
        Ok(Some(state.decorate(updated)))
    }

    async fn delete(&self, id: u64) -> StoreResult<bool> {
        let mut state = self.lock();
        if state.records.remove(&id).is_none() {
            return Ok(false);
        }
        if let Some(key) = state.record_days.remove(&id) {
            state.self_days.remove(&key);
        }
        Ok(true)
    }

    async fn list(&self, filter: &AttendanceFilter) -> StoreResult<(Vec<AttendanceRecord>, u64)> {
        let state = self.lock();
        let mut matching: Vec<&AttendanceRecord> =
            state.records.values().filter(|r| filter.matches(r)).collect();
        matching.sort_by(|a, b| {
            b.check_in_time
                .cmp(&a.check_in_time)
                .then(b.id.cmp(&a.id))
        });

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.per_page as usize)
            .cloned()
            .map(|r| state.decorate(r))
            .collect();
        Ok((page, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn check_in(user_id: u64, day: NaiveDate) -> NewCheckIn {
        NewCheckIn {
            user_id,
            location_id: 1,
            day,
            at: Utc.from_utc_datetime(&day.and_hms_opt(9, 0, 0).unwrap()),
            coordinates: Coordinates::new(0.0, 0.0),
        }
    }

    #[actix_web::test]
    async fn concurrent_check_ins_yield_one_record() {
        let store = Arc::new(MemoryStore::new());
        let day = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                actix_web::rt::spawn(async move { store.insert_check_in(check_in(1, day)).await })
            })
            .collect();

        let mut ok = 0;
        let mut duplicates = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(AttendanceError::AlreadyCheckedIn) => duplicates += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(duplicates, 7);
    }

    #[actix_web::test]
    async fn deleting_a_self_check_in_frees_the_day() {
        let store = MemoryStore::new();
        let day = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();

        let first = store.insert_check_in(check_in(1, day)).await.unwrap();
        assert!(store.delete(first.id).await.unwrap());
        assert!(store.insert_check_in(check_in(1, day)).await.is_ok());
        assert!(!store.delete(999).await.unwrap());
    }

    #[actix_web::test]
    async fn close_session_only_closes_open_records() {
        let store = MemoryStore::new();
        let day = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        let record = store.insert_check_in(check_in(1, day)).await.unwrap();
        let later = record.check_in_time + chrono::Duration::hours(8);

        let closed = store
            .close_session(record.id, later, Coordinates::new(0.0, 0.0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(closed.check_out_time, Some(later));

        let again = store
            .close_session(record.id, later, Coordinates::new(0.0, 0.0))
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[actix_web::test]
    async fn deactivated_locations_drop_out_of_listing() {
        let store = MemoryStore::new();
        let a = store
            .create(NewLocation {
                name: "A".into(),
                description: None,
                center: Coordinates::new(1.0, 1.0),
                radius: 50.0,
                created_by: None,
            })
            .await
            .unwrap();

        assert_eq!(store.list_active().await.unwrap().len(), 1);
        assert!(store.deactivate(a.id).await.unwrap());
        assert!(store.list_active().await.unwrap().is_empty());
        // soft delete keeps the row
        let kept = LocationRegistry::get(&store, a.id).await.unwrap().unwrap();
        assert!(!kept.is_active);
    }
}
