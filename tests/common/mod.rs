#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use actix_web::test::TestRequest;
use actix_web::web::Data;
use chrono::{TimeZone, Utc};

use geo_attendance::auth::auth::AuthUser;
use geo_attendance::auth::jwt::generate_access_token;
use geo_attendance::clock::{DayPolicy, ManualClock};
use geo_attendance::config::Config;
use geo_attendance::geofence::Coordinates;
use geo_attendance::model::location::{Location, NewLocation};
use geo_attendance::model::role::Role;
use geo_attendance::service::AttendanceService;
use geo_attendance::store::LocationRegistry;
use geo_attendance::store::memory::MemoryStore;

pub const ADMIN_ID: u64 = 1;
pub const USER_ID: u64 = 2;

pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub config: Config,
    pub service: Data<AttendanceService>,
}

pub fn test_config() -> Config {
    Config {
        database_url: String::new(),
        jwt_secret: "test-secret".to_string(),
        server_addr: "127.0.0.1:0".to_string(),
        access_token_ttl: 900,
        refresh_token_ttl: 3600,
        rate_login_per_min: 60,
        rate_refresh_per_min: 30,
        rate_protected_per_min: 1000,
        rate_attendance_per_min: 30,
        api_prefix: "/api".to_string(),
        day_policy: DayPolicy::utc(),
        location_cache_ttl: Duration::from_secs(60),
        default_location_radius: 100.0,
    }
}

impl TestContext {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        store.add_user(ADMIN_ID, "Admin");
        store.add_user(USER_ID, "Jane Doe");

        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap(),
        ));
        let config = test_config();
        let service = Data::new(AttendanceService::new(
            store.clone(),
            store.clone(),
            clock.clone(),
            config.day_policy,
        ));

        Self {
            store,
            clock,
            config,
            service,
        }
    }

    pub async fn site(&self, latitude: f64, longitude: f64, radius: f64) -> Location {
        self.store
            .create(NewLocation {
                name: "Head Office".to_string(),
                description: None,
                center: Coordinates::new(latitude, longitude),
                radius,
                created_by: Some(ADMIN_ID),
            })
            .await
            .unwrap()
    }

    pub fn token(&self, user_id: u64, role: Role) -> String {
        let user = AuthUser {
            user_id,
            email: format!("user{user_id}@company.com"),
            name: format!("User {user_id}"),
            role,
        };
        generate_access_token(&user, &self.config.jwt_secret, 900).unwrap()
    }

    pub fn admin_token(&self) -> String {
        self.token(ADMIN_ID, Role::Admin)
    }

    pub fn user_token(&self) -> String {
        self.token(USER_ID, Role::User)
    }
}

/// The rate limiter keys on the peer address, so every test request needs one.
pub fn peer() -> SocketAddr {
    "10.0.0.7:40000".parse().unwrap()
}

pub fn authed(req: TestRequest, token: &str) -> TestRequest {
    req.peer_addr(peer())
        .insert_header(("Authorization", format!("Bearer {token}")))
}

/// Builds the full route table over the context's in-memory store.
macro_rules! init_app {
    ($ctx:expr) => {{
        let config = $ctx.config.clone();
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($ctx.config.clone()))
                .app_data($ctx.service.clone())
                .configure(move |cfg| geo_attendance::routes::configure(cfg, config.clone())),
        )
        .await
    }};
}
