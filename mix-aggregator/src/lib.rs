pub mod codec;
pub mod extract;
pub mod fetcher;
pub mod filter;
pub mod mixer;
pub mod server;
pub mod source_manager;
pub mod telemetry;
pub mod traits;
pub mod types;

pub use fetcher::Fetcher;
pub use mixer::{mix_epg, mix_multi_repo, mix_playlist, mix_site_repo};
pub use source_manager::{RefreshOutcome, SourceManager};
pub use traits::{Fetch, Sourcer};
pub use types::*;
