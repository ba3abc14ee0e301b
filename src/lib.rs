//! # Recipe Explorer
//!
//! A small recipe catalog: CRUD over a local SQLite store, search that
//! merges local results with TheMealDB, JSON import/export with full schema
//! validation, and request timing metrics.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Importer │──▶│  Normalizer  │──▶│  Validator  │──▶ RecipeRepository
//! └──────────┘   └──────────────┘   └─────────────┘      (SQLite)
//!
//! ┌──────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Handler  │──▶│ MealDbSource │──▶│ CacheBackend│──▶ TheMealDB (HTTP)
//! └──────────┘   └──────────────┘   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! recipes init                              # create database
//! recipes validate data/sample-recipes.json # check an import file
//! recipes import data/sample-recipes.json   # load it
//! recipes serve                             # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and schema bounds |
//! | [`normalize`] | Legacy record migration |
//! | [`validation`] | Batch schema validation |
//! | [`mealdb`] | TheMealDB adapter and transform |
//! | [`cache`] | Redis, in-memory and no-op response caches |
//! | [`store`] | Recipe repository trait and in-memory store |
//! | [`sqlite_store`] | SQLite recipe repository |
//! | [`metrics`] | Request timings and source counters |
//! | [`server`] | JSON HTTP API |
//! | [`export`] | JSON export |
//! | [`sources`] | Store, cache and external status |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cache;
pub mod config;
pub mod db;
pub mod export;
pub mod mealdb;
pub mod metrics;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod server;
pub mod sources;
pub mod sqlite_store;
pub mod store;
pub mod validation;
