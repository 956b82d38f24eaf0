//! Backend Module
//!
//! A small Axum server for the offline layer to talk to. It answers the
//! health probe the client uses to tell "server down" from "no internet",
//! and serves the shell assets the worker precaches.
//!
//! This module is only compiled when the `ssr` feature is enabled.
//!
//! # Routes
//!
//! - `GET /api/health` - `{"status":"ok","timestamp":<rfc3339>}`
//! - `GET /`, `/offline.html`, `/manifest.json`, `/icon.png` - shell assets

pub mod routes;

pub use routes::create_app;
