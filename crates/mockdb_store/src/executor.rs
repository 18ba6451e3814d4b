use std::mem;

use db_logging::db_debug;
use mockdb_core::{Record, StoreError};
use serde_json::json;

use crate::collections::DEFAULT_COLLECTION;
use crate::store::RecordStore;

const PARSER_METHODS: &[&str] = &[
    "content",
    "failed_content",
    "outputs",
    "pages",
    "page",
    "save_pages",
    "save_outputs",
    "find_output",
    "find_outputs",
    "refetch",
    "reparse",
];

const SEEDER_METHODS: &[&str] = &[
    "outputs",
    "pages",
    "save_pages",
    "save_outputs",
    "find_output",
    "find_outputs",
];

const FINISHER_METHODS: &[&str] = &[
    "outputs",
    "save_outputs",
    "find_output",
    "find_outputs",
    "job_id",
];

/// Script context a fake executor emulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    Parser,
    Seeder,
    Finisher,
}

impl ExecutorKind {
    pub fn name(self) -> &'static str {
        match self {
            ExecutorKind::Parser => "parser",
            ExecutorKind::Seeder => "seeder",
            ExecutorKind::Finisher => "finisher",
        }
    }

    /// Methods a script running in this context may call.
    pub fn exposed_methods(self) -> &'static [&'static str] {
        match self {
            ExecutorKind::Parser => PARSER_METHODS,
            ExecutorKind::Seeder => SEEDER_METHODS,
            ExecutorKind::Finisher => FINISHER_METHODS,
        }
    }

    pub fn exposes(self, method: &str) -> bool {
        self.exposed_methods().contains(&method)
    }
}

/// Test double for a parser, seeder or finisher execution context, backed
/// by a [`RecordStore`].
///
/// Scripts push into the `pages`/`outputs` buffers and [`flush`] saves them.
///
/// [`flush`]: FakeExecutor::flush
pub struct FakeExecutor {
    kind: ExecutorKind,
    db: RecordStore,
    pages: Vec<Record>,
    outputs: Vec<Record>,
    page: Option<Record>,
    content: Option<String>,
    failed_content: Option<String>,
}

impl FakeExecutor {
    pub fn new(kind: ExecutorKind, db: RecordStore) -> Self {
        Self {
            kind,
            db,
            pages: Vec::new(),
            outputs: Vec::new(),
            page: None,
            content: None,
            failed_content: None,
        }
    }

    pub fn kind(&self) -> ExecutorKind {
        self.kind
    }

    pub fn db(&self) -> &RecordStore {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut RecordStore {
        &mut self.db
    }

    fn expose(&self, method: &'static str) -> Result<(), StoreError> {
        if self.kind.exposes(method) {
            Ok(())
        } else {
            Err(StoreError::NotExposed {
                method,
                executor: self.kind.name(),
            })
        }
    }

    /// Sets the page being parsed along with its fetched bodies.
    pub fn load_page(
        &mut self,
        page: Record,
        content: Option<String>,
        failed_content: Option<String>,
    ) {
        self.page = Some(page);
        self.content = content;
        self.failed_content = failed_content;
    }

    pub fn page(&self) -> Result<Option<&Record>, StoreError> {
        self.expose("page")?;
        Ok(self.page.as_ref())
    }

    pub fn content(&self) -> Result<Option<&str>, StoreError> {
        self.expose("content")?;
        Ok(self.content.as_deref())
    }

    pub fn failed_content(&self) -> Result<Option<&str>, StoreError> {
        self.expose("failed_content")?;
        Ok(self.failed_content.as_deref())
    }

    pub fn job_id(&self) -> Result<i64, StoreError> {
        self.expose("job_id")?;
        Ok(self.db.job_id())
    }

    /// Buffered pages, saved on [`flush`](FakeExecutor::flush).
    pub fn pages(&mut self) -> Result<&mut Vec<Record>, StoreError> {
        self.expose("pages")?;
        Ok(&mut self.pages)
    }

    /// Buffered outputs, saved on [`flush`](FakeExecutor::flush).
    pub fn outputs(&mut self) -> Result<&mut Vec<Record>, StoreError> {
        self.expose("outputs")?;
        Ok(&mut self.outputs)
    }

    pub fn save_pages(&mut self, pages: Vec<Record>) -> Result<(), StoreError> {
        self.expose("save_pages")?;
        let count = pages.len();
        let db = &mut self.db;
        save_each(pages, |page| db.insert_page(page).map(|_| ())).map_err(|(err, _)| err)?;
        db_debug!("{}: saved {count} pages", self.kind.name());
        Ok(())
    }

    pub fn save_outputs(&mut self, outputs: Vec<Record>) -> Result<(), StoreError> {
        self.expose("save_outputs")?;
        let count = outputs.len();
        let db = &mut self.db;
        save_each(outputs, |output| db.insert_output(output).map(|_| ()))
            .map_err(|(err, _)| err)?;
        db_debug!("{}: saved {count} outputs", self.kind.name());
        Ok(())
    }

    /// Saves and empties both buffers, pages first.
    ///
    /// When an insert fails, the failing record and the ones after it stay
    /// buffered; records saved before it remain in the store.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if !self.pages.is_empty() {
            self.expose("save_pages")?;
            let pages = mem::take(&mut self.pages);
            let db = &mut self.db;
            if let Err((err, unsaved)) = save_each(pages, |page| db.insert_page(page).map(|_| ()))
            {
                self.pages = unsaved;
                return Err(err);
            }
        }
        if !self.outputs.is_empty() {
            self.expose("save_outputs")?;
            let outputs = mem::take(&mut self.outputs);
            let db = &mut self.db;
            if let Err((err, unsaved)) =
                save_each(outputs, |output| db.insert_output(output).map(|_| ()))
            {
                self.outputs = unsaved;
                return Err(err);
            }
        }
        db_debug!("{}: flushed", self.kind.name());
        Ok(())
    }

    /// One page of outputs from `collection` matching `filter`. `page` is
    /// 1-based.
    pub fn find_outputs(
        &self,
        collection: &str,
        filter: &Record,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<&Record>, StoreError> {
        self.expose("find_outputs")?;
        let mut filter = filter.clone();
        filter.insert("_collection".into(), json!(collection));
        let offset = page.saturating_sub(1).saturating_mul(per_page);
        let limit = i64::try_from(per_page).unwrap_or(i64::MAX);
        self.db.query("outputs", &filter, offset, Some(limit))
    }

    pub fn find_output(
        &self,
        collection: &str,
        filter: &Record,
    ) -> Result<Option<&Record>, StoreError> {
        self.expose("find_output")?;
        let mut filter = filter.clone();
        filter.insert("_collection".into(), json!(collection));
        Ok(self
            .db
            .query("outputs", &filter, 0, Some(1))?
            .into_iter()
            .next())
    }

    /// Same as [`find_outputs`](FakeExecutor::find_outputs) on the default
    /// collection.
    pub fn find_default_outputs(
        &self,
        filter: &Record,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<&Record>, StoreError> {
        self.find_outputs(DEFAULT_COLLECTION, filter, page, per_page)
    }

    pub fn refetch(&mut self, gid: &str) -> Result<(), StoreError> {
        self.expose("refetch")?;
        let job_id = self.db.job_id();
        self.db.refetch(job_id, gid).map(|_| ())
    }

    pub fn reparse(&mut self, gid: &str) -> Result<(), StoreError> {
        self.expose("reparse")?;
        let job_id = self.db.job_id();
        self.db.reparse(job_id, gid).map(|_| ())
    }
}

/// Inserts `records` in order, stopping at the first failure. The error
/// comes back with the failed record and everything after it.
fn save_each(
    records: Vec<Record>,
    mut insert: impl FnMut(Record) -> Result<(), StoreError>,
) -> Result<(), (StoreError, Vec<Record>)> {
    let mut pending = records.into_iter();
    while let Some(record) = pending.next() {
        if let Err(err) = insert(record.clone()) {
            let mut unsaved = vec![record];
            unsaved.extend(pending);
            return Err((err, unsaved));
        }
    }
    Ok(())
}
