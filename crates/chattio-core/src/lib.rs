//! Headless core of the Chattio messaging aggregator.
//!
//! Everything here is independent of the webview toolkit: the desktop shell
//! implements [`host::SessionHost`] and forwards [`events::AppEvent`]s to the
//! UI, badge and notification center.

pub mod app;
pub mod clock;
pub mod consts;
pub mod detector;
pub mod error;
pub mod events;
pub mod host;
pub mod navigation;
pub mod registry;
pub mod session;
pub mod settings;
pub mod storage;
pub mod telemetry;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod unread;

pub use app::AppCore;
pub use error::{Error, Result};
pub use events::{AppEvent, EventBus};
