//! Mock database core: record values, keyed collections and identity generation.
mod clock;
mod collection;
mod error;
mod identity;
mod names;
mod timestamp;
mod url_clean;
mod value;

pub use clock::{Clock, FixedClock, SystemClock};
pub use collection::{
    AfterInsertHook, BeforeDefaultsHook, BeforeInsertHook, FieldDefault, KeyedCollection,
    LifecyclePoint,
};
pub use error::StoreError;
pub use identity::{
    format_headers, is_default_fetch_type, is_display_empty, is_driver_empty, is_map_empty,
    is_screenshot_empty, HashAlgorithm, IdentityGenerator, DEFAULT_FETCH_TYPE,
};
pub use names::{FixedNameGenerator, NameGenerator, RandomSlugGenerator};
pub use timestamp::{time_stamp, EPOCH_SENTINEL, FETCHING_SENTINEL};
pub use url_clean::{clean_url, CleanUrl};
pub use value::{
    is_blank, is_nil, is_truthy, to_float, value_to_string, values_equal, Record, Value,
};
