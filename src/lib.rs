//! # Copydesk
//!
//! Edit-and-sync toolkit for bilingual site copy.
//!
//! Copydesk lets site editors change in-page text and rotate slideshow
//! images on a marketing site whose content lives in a git-backed file
//! store. Pages are decomposed into addressable text segments that an editor
//! can change without touching markup, and every read and write goes through
//! a store client that absorbs network failure, rate limiting, and
//! optimistic-concurrency conflicts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   extract   ┌───────────────┐
//! │ page bytes   │────────────▶│   segments    │──▶ editor
//! └──────┬───────┘             └───────┬───────┘
//!        ▲                             │ edited subset
//!        │ get/put                     ▼
//! ┌──────┴───────┐    apply    ┌───────────────┐
//! │ RemoteStore  │◀────────────│  new bytes    │
//! │ (contents    │             └───────────────┘
//! │  API client) │
//! └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`dom`] | Lenient HTML tree for the codec |
//! | [`segments`] | Segment extraction and application |
//! | [`store`] | Resilient remote file store client |
//! | [`pages`] | Page edit workflow |
//! | [`slides`] | Slideshow image and manifest management |

pub mod config;
pub mod dom;
pub mod models;
pub mod pages;
pub mod segments;
pub mod slides;
pub mod store;
