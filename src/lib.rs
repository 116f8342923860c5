//! taskmirror - a local-first task tracker mirrored onto external issue
//! trackers
//!
//! Tasks live in a local JSON store and are mirrored one-way onto GitHub
//! Issues and Shortcut Stories. The whole task tree, including metadata
//! the remote schema cannot hold, is encoded into each remote item's body
//! as marker comments; the sync engine detects drift before spending API
//! calls, refuses to close items it cannot prove safe to close, and pulls
//! instead of pushing when the remote copy is newer.
//!
//! # Modules
//!
//! * [`cli`] - Command definitions and handlers
//! * [`codec`] - Marker and body codecs for remote item bodies
//! * [`config`] - Application configuration management
//! * [`git`] - Commit verification against the remote default branch
//! * [`model`] - Task data types and sync metadata
//! * [`remote`] - Sync engine and the two remote integrations
//! * [`store`] - Local JSON task store and forest view

/// Command-line interface and handlers
pub mod cli;

/// Codecs for embedding task trees in remote item bodies
pub mod codec;

/// Configuration module for managing application settings
pub mod config;

/// Commit verification collaborator
pub mod git;

/// Logging utilities for debugging and error tracking
pub mod logger;

/// Core task data types
pub mod model;

/// Remote mirroring engine and service integrations
pub mod remote;

/// Local task store
pub mod store;
