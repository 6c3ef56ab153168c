pub mod discovery;
pub mod store;
pub mod worker;

pub use store::{JobStore, StoreError};
pub use worker::WorkerPool;
