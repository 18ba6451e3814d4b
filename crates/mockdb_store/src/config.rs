use mockdb_core::{HashAlgorithm, StoreError};
use serde::Deserialize;

/// Construction options for a [`RecordStore`](crate::RecordStore).
///
/// Every field is optional in JSON form; missing values fall back to the
/// store defaults (job 1, `my_scraper`, a random page gid, md5). An unset
/// override flag is off for [`RecordStore::new`](crate::RecordStore::new)
/// and on for the page builders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub job_id: Option<i64>,
    pub scraper_name: Option<String>,
    pub page_gid: Option<String>,
    pub allow_page_gid_override: Option<bool>,
    pub allow_job_id_override: Option<bool>,
    pub uuid_algorithm: Option<String>,
}

impl StoreConfig {
    pub fn from_json(raw: &str) -> Result<Self, StoreError> {
        serde_json::from_str(raw).map_err(|err| StoreError::InvalidConfig(err.to_string()))
    }

    /// Defaults with both override flags on, as used by the record builders.
    pub fn overriding() -> Self {
        Self {
            allow_page_gid_override: Some(true),
            allow_job_id_override: Some(true),
            ..Self::default()
        }
    }

    pub fn hash_algorithm(&self) -> Result<HashAlgorithm, StoreError> {
        match self.uuid_algorithm.as_deref() {
            None => Ok(HashAlgorithm::default()),
            Some(name) => name.parse(),
        }
    }
}
