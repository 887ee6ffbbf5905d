//! Issue views over a project tracker: a keyed issue cache, a grouping and
//! ordering engine, per-surface view state and optimistic mutations.

pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod error;
pub mod fields;
pub mod model;
pub mod mutation;
pub mod notify;
pub mod output;
pub mod view;
