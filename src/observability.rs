//! Pluggable logger, tracer, and clock capabilities.
//!
//! The spec treats logging sinks, metrics exporters, and tracing exporters
//! as external collaborators: the core only needs a `Logger` capability
//! and a `Clock`, not a prescribed sink. The default `Logger` forwards to
//! `tracing`, matching the rest of the crate's instrumentation; callers
//! that want their own sink (e.g. to forward into an IDE's output
//! channel) can supply an alternate implementation instead of the core
//! reaching for a global subscriber.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Severity for [`Logger::log`], independent of any particular logging
/// crate's level type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// A sink for structured log events. Implementors receive the rendered
/// message and a target string (mirroring `tracing`'s `target:` field)
/// for routing.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, target: &str, message: &str);
}

/// Forwards every event to the `tracing` macros at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, target: &str, message: &str) {
        match level {
            Level::Debug => tracing::debug!(target: "nuget_client_core::external", "[{target}] {message}"),
            Level::Info => tracing::info!(target: "nuget_client_core::external", "[{target}] {message}"),
            Level::Warn => tracing::warn!(target: "nuget_client_core::external", "[{target}] {message}"),
            Level::Error => tracing::error!(target: "nuget_client_core::external", "[{target}] {message}"),
        }
    }
}

/// A span handle returned by [`Tracer::start_span`]; dropping it ends the
/// span. Kept intentionally minimal — the contract, not a full OpenTelemetry
/// SDK, is what the core depends on.
pub trait Span: Send {
    fn record_status(&mut self, ok: bool);
}

impl Span for () {
    fn record_status(&mut self, _ok: bool) {}
}

/// Distributed-tracing contract. The default no-op tracer emits nothing;
/// the `Traceparent` header (spec §6) is only added when a real tracer is
/// wired in and reports itself `enabled()`.
pub trait Tracer: Send + Sync {
    fn enabled(&self) -> bool {
        false
    }

    fn start_span(&self, _name: &str) -> Box<dyn Span> {
        Box::new(())
    }

    fn traceparent(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}

/// Abstracts wall-clock time so retry/backoff/circuit-breaker/TTL logic is
/// testable without real sleeps. Production code uses [`SystemClock`];
/// tests can substitute a manually-advanced fake.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;

    /// Sleeps for `dur`, or returns early if `cancel` resolves first.
    /// Implemented as an associated async fn via a boxed future so the
    /// trait stays object-safe.
    fn sleep<'a>(
        &'a self,
        dur: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            tokio::time::sleep(dur).await;
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Bundle of observability capabilities threaded through the transport and
/// client layers, replacing the package-level globals the source exhibits
/// (spec §9 design note).
#[derive(Clone)]
pub struct Observability {
    pub logger: Arc<dyn Logger>,
    pub tracer: Arc<dyn Tracer>,
    pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for Observability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observability").finish_non_exhaustive()
    }
}

impl Default for Observability {
    fn default() -> Self {
        Self {
            logger: Arc::new(TracingLogger),
            tracer: Arc::new(NoopTracer),
            clock: Arc::new(SystemClock),
        }
    }
}
