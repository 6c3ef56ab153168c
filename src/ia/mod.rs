pub mod persister;
pub mod store;

pub use persister::Persister;
pub use store::{PageStore, StoreError};
