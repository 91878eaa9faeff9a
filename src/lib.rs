//! Personal CDN - image hosting with public and private buckets
//!
//! This library provides the session table, access controller, image store
//! and HTTP surface of the personal CDN server.

pub mod access;
pub mod api;
pub mod captcha;
pub mod config;
pub mod session;
pub mod storage;
pub mod types;
