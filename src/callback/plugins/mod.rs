//! Callback plugins forwarding execution events to external services.
//!
//! # Available Plugins
//!
//! ## Logging
//! - [`LogdnaCallback`] - Structured task results sent to LogDNA
//!
//! # Example
//!
//! ```rust,ignore
//! use logdna_callback::callback::plugins::LogdnaCallback;
//!
//! let callback = LogdnaCallback::from_env();
//! callback.on_playbook_start("site.yml").await;
//! ```

pub mod logdna;

pub use logdna::LogdnaCallback;
