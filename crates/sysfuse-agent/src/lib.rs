//! The sysfuse host agent.
//!
//! Syscall notifications arrive continuously through the webhook listener
//! ([`ingest`]) and are counted by a shared
//! [`SyscallAggregator`](sysfuse_collector::SyscallAggregator). The
//! [`scheduler::WindowScheduler`] fires on wall-clock aligned boundaries and
//! runs one [`pipeline::FlushPipeline`] cycle per window: pull resource
//! metrics, snapshot and reset the counters, append to the daily CSV, and
//! forward to the central server.

pub mod config;
pub mod ingest;
pub mod pipeline;
pub mod scheduler;
pub mod snapshot;
