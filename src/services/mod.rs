pub mod reference;
pub mod registration;

pub use reference::{seed_countries, sync_sources, SeedReport, SyncReport, COUNTRIES};
pub use registration::{hash_password, register_user, Registration};
