//! Application-logic crate: the five reconcile components plus the task
//! orchestrator that ties them to the §6 task-key surface.

pub mod actor_reconciler;
pub mod auto_subscribe;
pub mod collection_reconciler;
pub mod library_indexer;
pub mod orchestrator;
pub mod webhook_propagator;

pub use actor_reconciler::ActorReconciler;
pub use auto_subscribe::{AutoSubscribeGate, AutoSubscribeSummary};
pub use collection_reconciler::{CollectionOutcome, CollectionReconciler};
pub use library_indexer::{IndexMode, LibraryIndexer};
pub use orchestrator::{CancellationToken, LoggingProgressSink, Orchestrator, ProgressSink};
pub use webhook_propagator::WebhookPropagator;
