//! In-memory record store emulating the scraping platform's jobs, pages and
//! outputs, plus fake executor contexts built on top of it.
mod collections;
mod config;
mod context;
mod executor;
mod store;

pub use collections::{
    JobStatus, DEFAULT_COLLECTION, DEFAULT_SCRAPER_NAME, JOB_KEYS, OUTPUT_KEYS, PAGE_KEYS,
};
pub use config::StoreConfig;
pub use context::{JobContext, StoreContext};
pub use executor::{ExecutorKind, FakeExecutor};
pub use store::RecordStore;

pub use mockdb_core::{
    clean_url, time_stamp, FixedClock, FixedNameGenerator, HashAlgorithm, Record, StoreError,
    SystemClock, Value, DEFAULT_FETCH_TYPE, EPOCH_SENTINEL, FETCHING_SENTINEL,
};
