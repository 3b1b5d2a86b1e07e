mod admin;
mod indexes;

pub use admin::health;
pub use indexes::{apply_indexes, index_status, list_indexes};
