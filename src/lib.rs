pub mod app;
pub mod config;
pub mod guardrail;
pub mod orchestration;
pub mod scope;
pub mod shared;
