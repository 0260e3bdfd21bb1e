//! Mirror a remote Git repository onto local disk and keep it in sync.
//!
//! A [`mirror::Mirror`] owns one working copy tied to one remote.  Each
//! authorized webhook push received by a [`webhook::TriggerListener`] drives
//! one update cycle (fetch, diff, hard reset) and the resulting file-level
//! change set is handed to every registered [`mirror::Observer`].

pub mod auth;
pub mod config;
pub mod credentials;
pub mod git;
pub mod mirror;
pub mod webhook;
