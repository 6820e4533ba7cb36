use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::MySqlPool;
use tracing::debug;

use super::{AttendanceStore, LocationRegistry, StoreResult};
use crate::clock::DayWindow;
use crate::error::AttendanceError;
use crate::geofence::Coordinates;
use crate::model::attendance::{
    AttendanceFilter, AttendanceRecord, AttendanceStatus, ManualChanges, NewCheckIn,
    NewManualRecord,
};
use crate::model::location::{Location, LocationPatch, NewLocation};
use crate::utils::db_utils::{SqlValue, UpdateBuilder, bind_values, execute_update};

const RECORD_SELECT: &str = r#"
    SELECT
        a.id,
        a.user_id,
        u.name AS user_name,
        a.location_id,
        l.name AS location_name,
        a.check_in_time,
        a.check_out_time,
        a.check_in_latitude,
        a.check_in_longitude,
        a.check_out_latitude,
        a.check_out_longitude,
        a.status,
        a.notes,
        a.is_manual_entry,
        a.manual_editor_id,
        e.name AS manual_editor_name,
        a.manual_reason,
        a.created_at,
        a.updated_at
    FROM attendance_records a
    LEFT JOIN users u ON u.id = a.user_id
    LEFT JOIN locations l ON l.id = a.location_id
    LEFT JOIN users e ON e.id = a.manual_editor_id
"#;

const LOCATION_SELECT: &str = r#"
    SELECT id, name, description, latitude, longitude, radius, is_active, created_by,
           created_at, updated_at
    FROM locations
"#;

#[derive(sqlx::FromRow)]
struct AttendanceRow {
    id: u64,
    user_id: u64,
    user_name: Option<String>,
    location_id: u64,
    location_name: Option<String>,
    check_in_time: DateTime<Utc>,
    check_out_time: Option<DateTime<Utc>>,
    check_in_latitude: f64,
    check_in_longitude: f64,
    check_out_latitude: Option<f64>,
    check_out_longitude: Option<f64>,
    status: String,
    notes: String,
    is_manual_entry: bool,
    manual_editor_id: Option<u64>,
    manual_editor_name: Option<String>,
    manual_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = AttendanceError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        let status = AttendanceStatus::from_str(&row.status)
            .map_err(|e| AttendanceError::Storage(sqlx::Error::Decode(Box::new(e))))?;

        let check_out_coordinates = match (row.check_out_latitude, row.check_out_longitude) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        };

        Ok(AttendanceRecord {
            id: row.id,
            user_id: row.user_id,
            user_name: row.user_name,
            location_id: row.location_id,
            location_name: row.location_name,
            check_in_time: row.check_in_time,
            check_out_time: row.check_out_time,
            check_in_coordinates: Coordinates::new(row.check_in_latitude, row.check_in_longitude),
            check_out_coordinates,
            status,
            notes: row.notes,
            is_manual_entry: row.is_manual_entry,
            manual_editor_id: row.manual_editor_id,
            manual_editor_name: row.manual_editor_name,
            manual_reason: row.manual_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Foreign key violations mean the caller referenced a user or location that isn't there.
fn classify(e: sqlx::Error) -> AttendanceError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_foreign_key_violation() {
            return AttendanceError::validation("Referenced user or location does not exist.");
        }
    }
    AttendanceError::Storage(e)
}

#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn fetch_record(&self, id: u64) -> StoreResult<Option<AttendanceRecord>> {
        let sql = format!("{RECORD_SELECT} WHERE a.id = ?");
        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(AttendanceRecord::try_from)
            .transpose()
    }

    async fn fetch_inserted(&self, id: u64) -> StoreResult<AttendanceRecord> {
        self.fetch_record(id)
            .await?
            .ok_or(AttendanceError::NotFound {
                entity: "Attendance record",
                id,
            })
    }

    async fn fetch_location(&self, id: u64) -> StoreResult<Option<Location>> {
        let sql = format!("{LOCATION_SELECT} WHERE id = ?");
        let location = sqlx::query_as::<_, Location>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(location)
    }
}

#[async_trait]
impl LocationRegistry for MySqlStore {
    async fn get(&self, id: u64) -> StoreResult<Option<Location>> {
        self.fetch_location(id).await
    }

    async fn list_active(&self) -> StoreResult<Vec<Location>> {
        let sql = format!("{LOCATION_SELECT} WHERE is_active = TRUE ORDER BY created_at DESC, id DESC");
        let locations = sqlx::query_as::<_, Location>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(locations)
    }

    async fn create(&self, new: NewLocation) -> StoreResult<Location> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO locations
                (name, description, latitude, longitude, radius, is_active, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, TRUE, ?, ?, ?)
            "#,
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.center.latitude)
        .bind(new.center.longitude)
        .bind(new.radius)
        .bind(new.created_by)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        let id = result.last_insert_id();
        self.fetch_location(id)
            .await?
            .ok_or(AttendanceError::NotFound {
                entity: "Location",
                id,
            })
    }

    async fn update(&self, id: u64, patch: LocationPatch) -> StoreResult<Option<Location>> {
        let update = UpdateBuilder::new("locations")
            .set_some("name", patch.name)
            .set_some("description", patch.description)
            .set_some("latitude", patch.latitude)
            .set_some("longitude", patch.longitude)
            .set_some("radius", patch.radius)
            .set_some("is_active", patch.is_active)
            .set("updated_at", Utc::now())
            .build("id", id)?;

        debug!(sql = %update.sql, location_id = id, "Updating location");
        execute_update(&self.pool, update).await?;

        self.fetch_location(id).await
    }

    async fn deactivate(&self, id: u64) -> StoreResult<bool> {
        if self.fetch_location(id).await?.is_none() {
            return Ok(false);
        }

        sqlx::query("UPDATE locations SET is_active = FALSE, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(true)
    }
}

#[async_trait]
impl AttendanceStore for MySqlStore {
    async fn find_in_window(
        &self,
        user_id: u64,
        window: &DayWindow,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let sql = format!(
            "{RECORD_SELECT} WHERE a.user_id = ? AND a.check_in_time >= ? AND a.check_in_time < ? \
             ORDER BY a.check_in_time ASC LIMIT 1"
        );
        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(user_id)
            .bind(window.start)
            .bind(window.end)
            .fetch_optional(&self.pool)
            .await?
            .map(AttendanceRecord::try_from)
            .transpose()
    }

    async fn find_open_in_window(
        &self,
        user_id: u64,
        window: &DayWindow,
        exclude: Option<u64>,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let sql = format!(
            "{RECORD_SELECT} WHERE a.user_id = ? AND a.check_in_time >= ? AND a.check_in_time < ? \
             AND a.check_out_time IS NULL AND (? IS NULL OR a.id <> ?) \
             ORDER BY a.check_in_time DESC LIMIT 1"
        );
        sqlx::query_as::<_, AttendanceRow>(&sql)
            .bind(user_id)
            .bind(window.start)
            .bind(window.end)
            .bind(exclude)
            .bind(exclude)
            .fetch_optional(&self.pool)
            .await?
            .map(AttendanceRecord::try_from)
            .transpose()
    }

    async fn insert_check_in(&self, new: NewCheckIn) -> StoreResult<AttendanceRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_records
                (user_id, location_id, check_in_time, check_in_latitude, check_in_longitude,
                 status, notes, is_manual_entry, self_check_in_day, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, '', FALSE, ?, ?, ?)
            "#,
        )
        .bind(new.user_id)
        .bind(new.location_id)
        .bind(new.at)
        .bind(new.coordinates.latitude)
        .bind(new.coordinates.longitude)
        .bind(AttendanceStatus::Present.to_string())
        .bind(new.day)
        .bind(new.at)
        .bind(new.at)
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(r) => r,
            // uq_attendance_user_day: a concurrent check-in won the race
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(AttendanceError::AlreadyCheckedIn);
            }
            Err(e) => return Err(classify(e)),
        };

        self.fetch_inserted(result.last_insert_id()).await
    }

    async fn close_session(
        &self,
        record_id: u64,
        at: DateTime<Utc>,
        coordinates: Coordinates,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let result = sqlx::query(
            r#"
            UPDATE attendance_records
            SET check_out_time = ?, check_out_latitude = ?, check_out_longitude = ?, updated_at = ?
            WHERE id = ?
            AND check_out_time IS NULL
            "#,
        )
        .bind(at)
        .bind(coordinates.latitude)
        .bind(coordinates.longitude)
        .bind(at)
        .bind(record_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.fetch_record(record_id).await
    }

    async fn get(&self, id: u64) -> StoreResult<Option<AttendanceRecord>> {
        self.fetch_record(id).await
    }

    async fn insert_manual(&self, new: NewManualRecord) -> StoreResult<AttendanceRecord> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_records
                (user_id, location_id, check_in_time, check_out_time,
                 check_in_latitude, check_in_longitude, check_out_latitude, check_out_longitude,
                 status, notes, is_manual_entry, manual_editor_id, manual_reason,
                 self_check_in_day, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, TRUE, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(new.user_id)
        .bind(new.location_id)
        .bind(new.check_in_time)
        .bind(new.check_out_time)
        .bind(new.check_in_coordinates.latitude)
        .bind(new.check_in_coordinates.longitude)
        .bind(new.check_out_coordinates.map(|c| c.latitude))
        .bind(new.check_out_coordinates.map(|c| c.longitude))
        .bind(new.status.to_string())
        .bind(&new.notes)
        .bind(new.editor_id)
        .bind(&new.reason)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        self.fetch_inserted(result.last_insert_id()).await
    }

    async fn update_manual(
        &self,
        id: u64,
        changes: ManualChanges,
    ) -> StoreResult<Option<AttendanceRecord>> {
        // reopening a session drops whatever check-out position it had
        let check_out_coordinates = match changes.check_out_time {
            None => Some(None),
            Some(_) => changes.check_out_coordinates.map(Some),
        };

        let mut tx = self.pool.begin().await?;

        // only self check-ins carry a per-day key; it follows the check-in to its new day
        let self_day: Option<Option<NaiveDate>> = sqlx::query_scalar(
            "SELECT self_check_in_day FROM attendance_records WHERE id = ? FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(self_day) = self_day else {
            return Ok(None);
        };
        let moved_day = self_day.filter(|day| *day != changes.day).map(|_| changes.day);

        let update = UpdateBuilder::new("attendance_records")
            .set("check_in_time", changes.check_in_time)
            .set_some("self_check_in_day", moved_day)
            .set("check_out_time", changes.check_out_time)
            .set_some("check_out_latitude", check_out_coordinates.map(|c| c.map(|c| c.latitude)))
            .set_some("check_out_longitude", check_out_coordinates.map(|c| c.map(|c| c.longitude)))
            .set("status", changes.status.to_string())
            .set("notes", changes.notes)
            .set("is_manual_entry", true)
            .set("manual_editor_id", changes.editor_id)
            .set("manual_reason", changes.reason)
            .set("updated_at", Utc::now())
            .build("id", id)?;

        debug!(sql = %update.sql, record_id = id, "Applying manual attendance change");
        match execute_update(&mut *tx, update).await {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(AttendanceError::Validation(format!(
                    "User already has a check-in on {}.",
                    changes.day
                )));
            }
            Err(e) => return Err(classify(e)),
        }
        tx.commit().await?;

        self.fetch_record(id).await
    }

    async fn delete(&self, id: u64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM attendance_records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &AttendanceFilter) -> StoreResult<(Vec<AttendanceRecord>, u64)> {
        // ---------- build WHERE clause dynamically ----------
        let mut conditions = Vec::new();
        let mut bindings: Vec<SqlValue> = Vec::new();

        if let Some(user_id) = filter.user_id {
            conditions.push("a.user_id = ?");
            bindings.push(user_id.into());
        }
        if let Some(location_id) = filter.location_id {
            conditions.push("a.location_id = ?");
            bindings.push(location_id.into());
        }
        if let Some(from) = filter.from {
            conditions.push("a.check_in_time >= ?");
            bindings.push(from.into());
        }
        if let Some(until) = filter.until {
            conditions.push("a.check_in_time < ?");
            bindings.push(until.into());
        }

        let where_clause = if conditions.is_empty() {
            "".to_string()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        // ---------- total count ----------
        let count_sql = format!("SELECT COUNT(*) FROM attendance_records a {where_clause}");
        debug!(sql = %count_sql, bindings = ?bindings, "Counting attendance records");
        let total: i64 = bind_values!(sqlx::query_scalar::<_, i64>(&count_sql), bindings.clone())
            .fetch_one(&self.pool)
            .await?;

        // ---------- data query ----------
        let data_sql = format!(
            "{RECORD_SELECT} {where_clause} ORDER BY a.check_in_time DESC, a.id DESC LIMIT ? OFFSET ?"
        );
        let rows = bind_values!(sqlx::query_as::<_, AttendanceRow>(&data_sql), bindings)
            .bind(filter.per_page as u64)
            .bind(filter.offset())
            .fetch_all(&self.pool)
            .await?;

        let records = rows
            .into_iter()
            .map(AttendanceRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((records, total.max(0) as u64))
    }
}
