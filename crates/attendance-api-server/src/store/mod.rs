pub mod session;

pub use session::{Session, SessionMeta, SessionStore, StoreError};
