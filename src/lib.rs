//! Credit Score Orchestrator Library
//!
//! Scores a national identity document against interchangeable credit-bureau
//! providers (Equifax, MYM, BCU), with automatic provider fallback.
//!
//! # Modules
//!
//! - `cache`: Injected cache service (tokens, scoring rules).
//! - `cache_validator`: Checksummed cache entries with expiry.
//! - `circuit_breaker`: Per-provider circuit breaker.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `events`: Structured service events ("Provider Fallback").
//! - `handlers`: HTTP request handlers.
//! - `models`: Core data models.
//! - `normalizer`: Provider payload to canonical credit report.
//! - `orchestrator`: Validation, fetch with fallback, scoring.
//! - `providers`: Provider adapters and payload coercion.
//! - `rules`: Scoring rules loading and caching.
//! - `scoring`: Pure scoring engine.
//! - `validator`: Document validation.

pub mod cache;
pub mod cache_validator;
pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod providers;
pub mod rules;
pub mod scoring;
pub mod validator;
