//! Postgres implementations of the six repository traits declared in
//! `reconciler_core::domain::repositories`.

pub mod actor_subscription;
pub mod collection;
pub mod media_metadata;
pub mod person_identity;
pub mod translation_cache;
pub mod watchlist;

pub use actor_subscription::PostgresActorSubscriptionRepository;
pub use collection::PostgresCollectionRepository;
pub use media_metadata::PostgresMediaMetadataRepository;
pub use person_identity::PostgresPersonIdentityRepository;
pub use translation_cache::PostgresTranslationCacheRepository;
pub use watchlist::PostgresWatchlistRepository;
