//! Browser side of the Pilot agent
//!
//! The control loop only sees the [`BrowserDriver`] trait: a closed set of
//! named actions plus the read-only calls needed to build a snapshot.
//!
//! - [`BrowserSession`]: real Chrome/Chromium over the DevTools Protocol
//! - [`GuardedDriver`]: wraps any driver with the repetition guard
//! - [`SnapshotProducer`]: captures tabs and indexed interactive elements
//! - [`MockBrowser`]: scripted driver for tests
//!
//! # Requirements
//!
//! - Chrome or Chromium installed for [`BrowserSession::launch`]
//! - For attaching to a running browser: `chrome --remote-debugging-port=9222`

pub mod browser;
pub mod dom;
mod driver;
mod guarded;
pub mod locator;
mod mock;
mod snapshot;

pub use browser::{BrowserConfig, BrowserSession};
pub use driver::BrowserDriver;
pub use guarded::GuardedDriver;
pub use locator::{normalize_xpath, relax_exact_match};
pub use mock::{DriverCall, MockBrowser};
pub use snapshot::SnapshotProducer;
