//! Domain entities for the collection reconciliation engine.

pub mod actor_subscription;
pub mod collection;
pub mod log;
pub mod media;
pub mod person_identity;
pub mod status;
pub mod translation;
pub mod watchlist;

pub use actor_subscription::*;
pub use collection::*;
pub use log::*;
pub use media::*;
pub use person_identity::*;
pub use status::*;
pub use translation::*;
pub use watchlist::*;
