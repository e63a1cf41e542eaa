pub mod api;
pub mod backend;
pub mod committer;
pub mod config;
pub mod eligibility;
pub mod languages;
pub mod message;
pub mod metrics;
pub mod orchestrator;
pub mod permissions;
pub mod retry;
pub mod security;
pub mod service;
pub mod store;
pub mod translator;
