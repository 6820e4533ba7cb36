pub mod db_utils;
pub mod location_cache;
