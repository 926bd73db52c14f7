pub mod pool;
pub mod roster;

pub use pool::DbPool;
pub use roster::{PgRosterDirectory, RosterDirectory};
