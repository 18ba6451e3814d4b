use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("unknown collection {name}")]
    UnknownCollection { name: String },
    #[error("invalid uuid algorithm {value:?}, valid values are md5, sha1, sha256")]
    InvalidHashAlgorithm { value: String },
    #[error("page not found with job_id \"{job_id}\" gid \"{gid}\"")]
    PageNotFound { job_id: i64, gid: String },
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("{method} is not exposed by the {executor} executor")]
    NotExposed {
        method: &'static str,
        executor: &'static str,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
