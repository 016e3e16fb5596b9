mod repository;
mod schema;

pub use repository::{CountryChange, Repository};
