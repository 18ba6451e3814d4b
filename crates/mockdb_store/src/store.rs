use db_logging::{db_debug, db_warn};
use mockdb_core::{
    time_stamp, values_equal, Clock, HashAlgorithm, IdentityGenerator, KeyedCollection,
    NameGenerator, RandomSlugGenerator, Record, StoreError, SystemClock, Value, FETCHING_SENTINEL,
};
use serde_json::json;

use crate::collections::{
    job_collection, output_collection, page_collection, JobStatus, DEFAULT_SCRAPER_NAME,
};
use crate::config::StoreConfig;
use crate::context::{next_job_id, JobContext, StoreContext};

/// Fields cleared when a page goes back to the fetch queue. Parse-stage
/// fields are reset separately.
const FETCH_STAGE_NULLS: &[&str] = &[
    "fetched_from",
    "fetched_at",
    "effective_url",
    "response_checksum",
    "response_status",
    "response_status_code",
    "response_headers",
    "response_cookie",
    "response_proto",
    "content_type",
    "failed_response_status_code",
    "failed_response_headers",
    "failed_response_cookie",
    "failed_effective_url",
    "failed_at",
    "failed_content_type",
];

/// In-memory stand-in for the scraping platform database.
///
/// Holds jobs, pages and outputs. Page and output inserts run their
/// defaults and hooks, generate identities and make sure the referenced job
/// exists.
pub struct RecordStore {
    ctx: StoreContext,
    pages: KeyedCollection<StoreContext>,
    outputs: KeyedCollection<StoreContext>,
}

impl RecordStore {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        Self::with_collaborators(config, SystemClock, RandomSlugGenerator)
    }

    /// Builds a store whose timestamps and generated scraper names come from
    /// the given collaborators.
    pub fn with_collaborators(
        config: StoreConfig,
        clock: impl Clock + 'static,
        names: impl NameGenerator + 'static,
    ) -> Result<Self, StoreError> {
        let identity = IdentityGenerator::new(config.hash_algorithm()?);
        let page_gid = match config.page_gid {
            Some(gid) => gid,
            None => identity.random_hash(&clock),
        };
        let settings = JobContext {
            job_id: config.job_id.unwrap_or(1),
            scraper_name: config
                .scraper_name
                .unwrap_or_else(|| DEFAULT_SCRAPER_NAME.to_string()),
            page_gid,
            identity,
            allow_page_gid_override: config.allow_page_gid_override.unwrap_or(false),
            allow_job_id_override: config.allow_job_id_override.unwrap_or(false),
            clock: Box::new(clock),
            names: Box::new(names),
        };

        let mut store = Self {
            ctx: StoreContext {
                settings,
                jobs: job_collection(),
            },
            pages: page_collection(),
            outputs: output_collection(),
        };
        store.ctx.ensure_job(None)?;
        db_debug!(
            "record store ready: job {} ({}), {} ids",
            store.ctx.settings.job_id,
            store.ctx.settings.scraper_name,
            store.ctx.settings.identity.algorithm()
        );
        Ok(store)
    }

    pub fn jobs(&self) -> &KeyedCollection<JobContext> {
        &self.ctx.jobs
    }

    pub fn pages(&self) -> &KeyedCollection<StoreContext> {
        &self.pages
    }

    pub fn outputs(&self) -> &KeyedCollection<StoreContext> {
        &self.outputs
    }

    pub fn insert_job(&mut self, job: Record) -> Result<&Record, StoreError> {
        self.ctx.jobs.insert(job, &mut self.ctx.settings)
    }

    pub fn insert_page(&mut self, page: Record) -> Result<&Record, StoreError> {
        self.pages.insert(page, &mut self.ctx)
    }

    pub fn insert_output(&mut self, output: Record) -> Result<&Record, StoreError> {
        self.outputs.insert(output, &mut self.ctx)
    }

    /// Stored page with this gid, for direct field assignment.
    pub fn page_mut(&mut self, gid: &str) -> Option<&mut Record> {
        let mut criteria = Record::new();
        criteria.insert("gid".into(), json!(gid));
        self.pages.find_match_mut(&criteria)
    }

    /// Removes every record of `collection` (`pages`, `outputs` or `jobs`).
    pub fn clear(&mut self, collection: &str) -> Result<(), StoreError> {
        match collection {
            "pages" => self.pages.clear(),
            "outputs" => self.outputs.clear(),
            "jobs" => self.ctx.jobs.clear(),
            other => {
                return Err(StoreError::UnknownCollection {
                    name: other.to_string(),
                })
            }
        }
        db_debug!("{collection}: cleared");
        Ok(())
    }

    /// Returns the job with `job_id` (the current job when `None`), creating
    /// it when missing. A job created for the current id starts active.
    pub fn ensure_job(&mut self, job_id: Option<i64>) -> Result<&Record, StoreError> {
        let job_id = job_id.map(|id| json!(id));
        self.ctx.ensure_job(job_id.as_ref())
    }

    pub fn generate_job_id(&self) -> i64 {
        next_job_id(&self.ctx.jobs)
    }

    pub fn job_id(&self) -> i64 {
        self.ctx.settings.job_id
    }

    /// Switches the current job; `None` picks the next free id.
    pub fn set_job_id(&mut self, job_id: Option<i64>) -> Result<i64, StoreError> {
        let job_id = job_id.unwrap_or_else(|| self.generate_job_id());
        self.ctx.settings.job_id = job_id;
        self.ctx.ensure_job(None)?;
        Ok(job_id)
    }

    pub fn scraper_name(&self) -> &str {
        &self.ctx.settings.scraper_name
    }

    /// Renames the scraper, including on the current job.
    pub fn set_scraper_name(&mut self, name: impl Into<String>) -> Result<(), StoreError> {
        self.ctx.ensure_job(None)?;
        self.ctx.settings.scraper_name = name.into();
        let name = json!(self.ctx.settings.scraper_name.clone());
        if let Some(index) = self.ctx.job_index(self.ctx.settings.job_id) {
            if let Some(job) = self.ctx.jobs.get_mut(index) {
                job.insert("scraper_name".into(), name);
            }
        }
        Ok(())
    }

    pub fn page_gid(&self) -> &str {
        &self.ctx.settings.page_gid
    }

    pub fn set_page_gid(&mut self, gid: impl Into<String>) {
        self.ctx.settings.page_gid = gid.into();
    }

    pub fn uuid_algorithm(&self) -> HashAlgorithm {
        self.ctx.settings.identity.algorithm()
    }

    pub fn set_uuid_algorithm(&mut self, name: &str) -> Result<(), StoreError> {
        self.ctx.settings.identity = IdentityGenerator::new(name.parse()?);
        Ok(())
    }

    pub fn enable_page_gid_override(&mut self) {
        self.ctx.settings.allow_page_gid_override = true;
    }

    pub fn disable_page_gid_override(&mut self) {
        self.ctx.settings.allow_page_gid_override = false;
    }

    pub fn allow_page_gid_override(&self) -> bool {
        self.ctx.settings.allow_page_gid_override
    }

    pub fn enable_job_id_override(&mut self) {
        self.ctx.settings.allow_job_id_override = true;
    }

    pub fn disable_job_id_override(&mut self) {
        self.ctx.settings.allow_job_id_override = false;
    }

    pub fn allow_job_id_override(&self) -> bool {
        self.ctx.settings.allow_job_id_override
    }

    /// Hash of `seed` with the configured algorithm, or a random hash when
    /// there is no seed.
    pub fn fake_uuid(&self, seed: Option<&str>) -> String {
        let identity = &self.ctx.settings.identity;
        match seed {
            Some(seed) => identity.hash(seed),
            None => identity.random_hash(self.ctx.settings.clock.as_ref()),
        }
    }

    pub fn page_fingerprint(&self, page: &Record) -> Result<String, StoreError> {
        self.ctx.settings.identity.page_fingerprint(page)
    }

    /// Table scan over `collection` (`pages`, `outputs` or `jobs`).
    ///
    /// A record matches when every filter field equals the record's value; a
    /// field missing from the record only matches a `null` filter value.
    /// A zero or negative `limit` yields no records at all.
    pub fn query(
        &self,
        collection: &str,
        filter: &Record,
        offset: usize,
        limit: Option<i64>,
    ) -> Result<Vec<&Record>, StoreError> {
        let limit = match limit {
            Some(limit) if limit <= 0 => return Ok(Vec::new()),
            Some(limit) => usize::try_from(limit).unwrap_or(usize::MAX),
            None => usize::MAX,
        };
        let items = match collection {
            "pages" => self.pages.as_slice(),
            "outputs" => self.outputs.as_slice(),
            "jobs" => self.ctx.jobs.as_slice(),
            other => {
                return Err(StoreError::UnknownCollection {
                    name: other.to_string(),
                })
            }
        };

        Ok(items
            .iter()
            .filter(|item| matches_filter(item, filter))
            .skip(offset)
            .take(limit)
            .collect())
    }

    /// Sends a page back to the fetch queue, clearing fetch and parse results.
    pub fn refetch(&mut self, job_id: i64, gid: &str) -> Result<&Record, StoreError> {
        let now = time_stamp(self.ctx.settings.clock.now());
        let page = self.page_for_job(job_id, gid)?;
        page.insert("status".into(), json!("to_fetch"));
        page.insert("freshness".into(), json!(now));
        page.insert("to_fetch".into(), json!(now));
        page.insert("fetching_at".into(), json!(FETCHING_SENTINEL));
        page.insert("fetching_try_count".into(), json!(0));
        page.insert("content_size".into(), json!(0));
        for field in FETCH_STAGE_NULLS {
            page.insert((*field).into(), Value::Null);
        }
        reset_parse_stage(page);
        db_debug!("pages: refetch {gid} in job {job_id}");
        Ok(page)
    }

    /// Sends a page back to the parse queue; fetch results are kept.
    pub fn reparse(&mut self, job_id: i64, gid: &str) -> Result<&Record, StoreError> {
        let page = self.page_for_job(job_id, gid)?;
        page.insert("status".into(), json!("to_parse"));
        reset_parse_stage(page);
        db_debug!("pages: reparse {gid} in job {job_id}");
        Ok(page)
    }

    fn page_for_job(&mut self, job_id: i64, gid: &str) -> Result<&mut Record, StoreError> {
        let mut criteria = Record::new();
        criteria.insert("gid".into(), json!(gid));
        let wanted = json!(job_id);
        let found = self
            .pages
            .find_match_mut(&criteria)
            .filter(|page| page.get("job_id").is_some_and(|id| values_equal(id, &wanted)));
        match found {
            Some(page) => Ok(page),
            None => {
                db_warn!("pages: no page {gid} in job {job_id}");
                Err(StoreError::PageNotFound {
                    job_id,
                    gid: gid.to_string(),
                })
            }
        }
    }

    /// A page built with the store's defaults and hooks. Either override
    /// left unset in `config` is turned on.
    pub fn build_page(page: Record, config: Option<StoreConfig>) -> Result<Record, StoreError> {
        let mut config = config.unwrap_or_default();
        config.allow_page_gid_override.get_or_insert(true);
        config.allow_job_id_override.get_or_insert(true);
        let mut store = Self::new(config)?;
        Ok(store.insert_page(page)?.clone())
    }

    pub fn build_fake_page(url: Option<&str>) -> Result<Record, StoreError> {
        let mut page = Record::new();
        page.insert("url".into(), json!(url.unwrap_or("https://example.com")));
        Self::build_page(page, None)
    }

    pub fn build_job(job: Record, config: StoreConfig) -> Result<Record, StoreError> {
        let mut store = Self::new(config)?;
        Ok(store.insert_job(job)?.clone())
    }

    /// A job with a generated id and scraper name unless given; `done` by
    /// default.
    pub fn build_fake_job(
        job_id: Option<i64>,
        scraper_name: Option<&str>,
        status: Option<JobStatus>,
    ) -> Result<Record, StoreError> {
        let config = StoreConfig {
            job_id,
            scraper_name: scraper_name.map(str::to_string),
            ..StoreConfig::default()
        };
        let mut job = Record::new();
        job.insert("job_id".into(), json!(job_id));
        job.insert("scraper_name".into(), json!(scraper_name));
        job.insert(
            "status".into(),
            json!(status.unwrap_or(JobStatus::Done).as_str()),
        );
        Self::build_job(job, config)
    }
}

fn reset_parse_stage(page: &mut Record) {
    for field in ["parsing_at", "parsing_failed_at", "parsed_at"] {
        page.insert(field.into(), Value::Null);
    }
    page.insert("parsing_updated_at".into(), json!(FETCHING_SENTINEL));
    page.insert("parsing_try_count".into(), json!(0));
    page.insert("parsing_fail_count".into(), json!(0));
}

fn matches_filter(item: &Record, filter: &Record) -> bool {
    filter.iter().all(|(field, wanted)| {
        let actual = item.get(field).unwrap_or(&Value::Null);
        values_equal(actual, wanted)
    })
}
