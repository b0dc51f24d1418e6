//! HTTP handlers for resmatch-api.

pub mod jobs;
pub mod matching;
pub mod stream;
