pub mod app;
pub mod artwork;
pub mod config;
pub mod poller;
pub mod track;

pub use app::ArtworkApp;
pub use config::Config;
pub use poller::{DisplayCommand, PollCommand, Poller, PollerHandle, TickOutcome};
pub use track::Snapshot;
