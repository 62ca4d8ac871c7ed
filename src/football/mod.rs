//! Competition data: request building, crest enrichment and the cached service.

mod client;
mod crests;
mod service;

pub use crests::apply_crests;
pub use service::FootballService;
