//! Service-message dependency and lifecycle engine.
//!
//! A service message is a history entry with no user-authored content,
//! describing an event: a message was pinned, a game score was posted, a
//! payment was received, a member joined via invite link. Its display text
//! may depend on *another* message that is not locally available yet; this
//! crate resolves such references asynchronously against an injected store,
//! regenerates the prepared text whenever resolution state changes, and
//! tracks self-destruct countdowns for expiring media.
//!
//! The mutation core is single-threaded and event-driven: the owning
//! [`ServiceHistory`] applies one event at a time (insertion, edition,
//! availability, eviction, ticks). Network retrieval is fire-and-forget —
//! a [`MessageStore::request_fetch`] call queues the id, and the result
//! re-enters later as a [`ServiceHistory::dependency_available`] event.

use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

mod attachments;
mod entity;
mod error;
mod history;
mod prepared_text;
mod resolver;
mod store;
mod types;

pub use attachments::{
    Attachments, DependentAttachment, DependentData, DependentPayload, SelfDestruct,
};
pub use entity::ServiceMessage;
pub use error::{Result, UndertoneError};
pub use history::{EngineConfig, ServiceHistory};
pub use prepared_text::{Link, PreparedText, PreparedTextBuilder, TextLink};
pub use store::{
    InMemoryStore, MediaRemover, MessageFetcher, MessageRef, MessageStore, NoMediaRemover,
    run_fetch_loop,
};
pub use types::{MediaKind, MessageId, ServicePayload, TextSelection, UserId, UserRef};

static TRACING_GUARDS: OnceLock<(WorkerGuard, WorkerGuard)> = OnceLock::new();
static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Initializes tracing with a daily-rolling file appender in `logs_dir` plus
/// a non-blocking stdout layer. Safe to call more than once; only the first
/// call takes effect.
pub fn init_tracing(logs_dir: &std::path::Path) {
    TRACING_INIT.get_or_init(|| {
        let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("undertone")
            .filename_suffix("log")
            .build(logs_dir)
            .expect("Failed to create file appender");

        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

        TRACING_GUARDS.set((file_guard, stdout_guard)).ok();

        let stdout_layer = Layer::new()
            .with_writer(non_blocking_stdout)
            .with_ansi(true)
            .with_target(true);

        let file_layer = Layer::new()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_target(true);

        Registry::default()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(stdout_layer)
            .with(file_layer)
            .init();
    });
}
