//! Asynchronous AI product-customization generation pipeline.
//!
//! Turns a customization request (a product plus per-zone customizations) into
//! a composed image, thumbnail, and AR-ready asset, through a priority job
//! queue and interchangeable image-generation providers. The API server
//! accepts and validates requests; the worker binary consumes the queue and
//! drives provider calls, image composition, and asset uploads.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
