//! Page retrieval and article extraction.
//!
//! Scraping is split in two phases:
//!
//! 1. **Fetching** ([`fetch`]): download the raw HTML with bounded retries
//! 2. **Extraction** ([`extract`]): locate the article container and reduce it
//!    to plain text
//!
//! Extraction is pure and works on any HTML string, so it is tested without a
//! network.

pub mod extract;
pub mod fetch;
