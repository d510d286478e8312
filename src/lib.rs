pub mod autopost;
pub mod caption;
pub mod channel;
pub mod config;
pub mod db;
pub mod model;
pub mod publisher;
pub mod reconcile;
pub mod supervisor;
pub mod watcher;
