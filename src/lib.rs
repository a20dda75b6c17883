//! Handie onboarding: step engine, persistence and HTTP host.

pub mod config;
pub mod error;
pub mod onboarding;
pub mod store;
