//! # Logger Export
//!
//! Date-range previews and exports of per-device time-series data held in
//! local storage or a cloud drive.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   ┌────────┐   ┌────────┐   ┌──────────┐
//! │ StorageBackend │──▶│ Loader │──▶│ Filter │──▶│ Renderer │──▶ bytes, MIME, name
//! │ Local / Drive  │   └────────┘   └────────┘   │ CSV/XLSX │
//! └────────────────┘                             │   /PDF   │
//!         ▲                                      └──────────┘
//!         │ device id
//! ┌───────┴───────┐     ┌──────────┐       ┌──────────┐
//! │   Directory   │◀────│   CLI    │       │   HTTP   │
//! │   (SQLite)    │     │  (lgx)   │       │  (axum)  │
//! └───────────────┘     └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lgx init                                   # create directory catalog
//! lgx groups                                 # list groups
//! lgx preview ABC123 --start 2024-01-01 --end 2024-01-10
//! lgx export ABC123 --start 2024-01-01 --end 2024-01-10 --format pdf
//! lgx serve                                  # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`traits`] | Storage backend abstraction |
//! | [`connector_fs`] | Local filesystem backend |
//! | [`connector_drive`] | Cloud-drive backend |
//! | [`loader`] | CSV → time-indexed table |
//! | [`filter`] | Date-range filtering and preview truncation |
//! | [`render`] | CSV, XLSX and PDF writers |
//! | [`naming`] | Download file names |
//! | [`preview`] | HTML preview fragment |
//! | [`directory`] | Startup-loaded group/device directory |
//! | [`service`] | Request pipeline orchestration |
//! | [`session`] | Signed session tokens |
//! | [`server`] | HTTP server |
//! | [`db`] | Catalog connection |
//! | [`migrate`] | Catalog schema |
//! | [`logging`] | Tracing subscriber setup |

pub mod config;
pub mod connector_drive;
pub mod connector_fs;
pub mod db;
pub mod directory;
pub mod error;
pub mod filter;
pub mod loader;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod naming;
pub mod preview;
pub mod render;
pub mod server;
pub mod service;
pub mod session;
pub mod traits;
