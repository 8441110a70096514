//! sitecache - offline caching layer for a brochure site
//!
//! A service worker model (routing, cache strategies, install/activate
//! lifecycle, page messaging) over persistent named caches, plus the
//! visibility detector that drives lazily rendered sections.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod net;
pub mod output;
pub mod visibility;
pub mod vitals;
pub mod worker;

pub use error::{Error, Result};
