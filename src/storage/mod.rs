mod ledger;
mod schema;
mod types;

pub use schema::Database;
pub use types::{DatabaseError, PersistedSource};
