pub mod db_connect;
pub mod dedupe_config;
pub mod env;
pub mod logging;
pub mod progress_config;
