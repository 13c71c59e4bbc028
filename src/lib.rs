//! Cohort baselines, data-quality audits and rule-based attention flags for
//! longitudinal athlete testing data.

pub mod audit;
pub mod cohort;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod flags;
pub mod models;
pub mod report;
pub mod reshape;
pub mod source;
