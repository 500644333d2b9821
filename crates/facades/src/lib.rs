//! HTTP client implementations for the three external systems the engine
//! talks to (media server, TMDb, downloader), plus the bounded concurrent
//! fan-out helper every worker-pool operation shares.

pub mod downloader;
pub mod emby;
pub mod fanout;
pub mod tmdb;

pub use downloader::*;
pub use emby::*;
pub use fanout::*;
pub use tmdb::*;
