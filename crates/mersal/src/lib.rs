#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **mersal** – an async message/service bus application built on
//! `mersal-core`'s pipeline, with in-memory and filesystem storage
//! backends (`mersal-memory`, `mersal-fs`) wired in behind a single
//! [`AppConfig`] switch.
//!
//! ```ignore
//! use mersal::{App, AppConfig};
//!
//! let app = App::builder(AppConfig::default())
//!     .handler::<MyMessage, _>("my-message", |ctx| Box::new(MyHandler))
//!     .build();
//! app.start().await?;
//! app.send("destination", LogicalMessage::new(MyMessage { .. }))
//!     .await?;
//! ```

mod app;
mod config;
mod logging;

pub use app::{App, AppBuilder};
pub use config::{AppConfig, StorageConfig};
pub use logging::init_tracing;
