pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod layout;
pub mod ledger;
pub mod output;
pub mod schema;
