use db_logging::db_info;
use mockdb_core::{
    time_stamp, values_equal, Clock, IdentityGenerator, KeyedCollection, NameGenerator, Record,
    StoreError, Value,
};
use serde_json::json;

use crate::collections::JobStatus;

/// Store-wide settings read by the job hooks.
pub struct JobContext {
    pub(crate) job_id: i64,
    pub(crate) scraper_name: String,
    pub(crate) page_gid: String,
    pub(crate) identity: IdentityGenerator,
    pub(crate) allow_page_gid_override: bool,
    pub(crate) allow_job_id_override: bool,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) names: Box<dyn NameGenerator>,
}

impl JobContext {
    pub(crate) fn now_stamp(&self) -> String {
        time_stamp(self.clock.now())
    }
}

/// State handed to page and output hooks: the settings plus the jobs they
/// may lazily create.
pub struct StoreContext {
    pub(crate) settings: JobContext,
    pub(crate) jobs: KeyedCollection<JobContext>,
}

impl StoreContext {
    /// Returns the job whose id equals `target` (the current job when nil),
    /// creating it when missing. The id is stored as given.
    pub(crate) fn ensure_job(&mut self, target: Option<&Value>) -> Result<&Record, StoreError> {
        let current = json!(self.settings.job_id);
        let target = match target {
            Some(id) if !id.is_null() => id.clone(),
            _ => current.clone(),
        };
        let mut job = Record::new();
        job.insert("job_id".into(), target.clone());
        if let Some(index) = self.jobs.position_of(&job) {
            return Ok(&self.jobs.as_slice()[index]);
        }

        job.insert(
            "scraper_name".into(),
            json!(self.settings.scraper_name.clone()),
        );
        if values_equal(&target, &current) {
            job.insert("status".into(), json!(JobStatus::Active.as_str()));
        }
        db_info!("creating job {target} for {}", self.settings.scraper_name);
        self.jobs.insert(job, &mut self.settings)
    }

    pub(crate) fn job_index(&self, job_id: i64) -> Option<usize> {
        self.jobs.position_of(&job_criteria(job_id))
    }
}

pub(crate) fn job_criteria(job_id: i64) -> Record {
    let mut criteria = Record::new();
    criteria.insert("job_id".into(), json!(job_id));
    criteria
}

/// One past the highest stored integer job id, or 1 for an empty collection.
pub(crate) fn next_job_id<C>(jobs: &KeyedCollection<C>) -> i64 {
    jobs.iter()
        .filter_map(|job| job.get("job_id").and_then(Value::as_i64))
        .max()
        .map_or(1, |max| max + 1)
}
