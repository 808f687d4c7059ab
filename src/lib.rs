//! Créditos Consultation API Library
//!
//! Read-only HTTP API over constituted ISSQN credit records, with an audit
//! event published for every credit query.
//!
//! # Modules
//!
//! - `api`: API definitions.
//! - `core`: Core business logic.
//! - `data`: Data access layer.
//! - `integrations`: External service integrations.
//! - `audit`: Audit events and the background publisher.
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `errors`: Error handling types.
//! - `extract`: Extractors rejecting with the JSON error envelope.
//! - `handlers`: HTTP request handlers and router.
//! - `interceptor`: Request classification and audit middleware.
//! - `kafka_rest`: Kafka REST proxy audit transport.
//! - `models`: Credit records, API responses and validation.
//! - `repository`: Credit store contract and implementations.
//! - `services`: Credit query service.

pub mod api;
pub mod core;
pub mod data;
pub mod integrations;

// Re-export primary modules for shared use in tests and other binaries
pub mod audit;
pub mod config;
pub mod db;
pub mod errors;
pub mod extract;
pub mod handlers;
pub mod interceptor;
pub mod kafka_rest;
pub mod models;
pub mod repository;
pub mod services;
