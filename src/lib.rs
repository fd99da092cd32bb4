//! tunequeue - media queue and playback scheduler for shared listening
//! sessions.
//!
//! Tracks come from a local library or are fetched on demand from remote
//! references. The [`queue::MediaQueue`] orders them, bounds concurrent
//! fetches and keeps the fetch cache in check; the [`player::Scheduler`]
//! plays them one at a time with synchronized captions and an optional
//! guessing game.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod library;
pub mod metadata;
pub mod model;
pub mod notify;
pub mod player;
pub mod queue;
#[cfg(test)]
pub mod test_utils;
