//! Posts with threaded comments stored as materialized paths, a cache-aside
//! branch cache and transactional mutations over Postgres or memory.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
