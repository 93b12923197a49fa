pub mod connection_manager;
pub mod database;
pub mod database_manager;
pub mod ledger;
pub mod lobby_manager;
pub mod recorder;
pub mod resolver;
pub mod rng;
