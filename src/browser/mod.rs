//! Browser control module
//!
//! Launching or connecting to Chrome over CDP, and page navigation.

pub mod controller;
pub mod navigation;

pub use controller::{BrowserConfig, BrowserController};
pub use navigation::{validate_url, PageNavigator};
