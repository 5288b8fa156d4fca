//! Self-updating distributor for a catalogue of installable titles.
//!
//! Each configured title gets a [`engine::TitleController`] that checks the
//! remote source for a newer version (throttled to one check per cooldown
//! window), downloads the release archive with progress reporting, installs
//! it crash-safely, and launches the installed executable. State changes are
//! published over a channel so any front end can observe them.

pub mod config;
pub mod engine;
pub mod env;
pub mod error;
pub mod installer;
pub mod networking;
pub mod process;
pub mod resolver;
pub mod throttle;
pub mod util;
pub mod version;
