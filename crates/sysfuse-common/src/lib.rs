//! Data model shared by the sysfuse agent crates.
//!
//! A window's worth of data travels from the collectors to the persistence and
//! forwarding sinks as one immutable [`types::CombinedSnapshot`].

pub mod types;
