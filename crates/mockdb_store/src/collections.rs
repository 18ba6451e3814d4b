//! Keys, defaults and insert hooks of the jobs, pages and outputs collections.

use std::fmt;

use chrono::Duration;
use db_logging::db_debug;
use mockdb_core::{
    clean_url, is_blank, is_display_empty, is_driver_empty, is_map_empty, is_nil,
    is_screenshot_empty, is_truthy, time_stamp, value_to_string, FieldDefault, KeyedCollection,
    Record, StoreError, Value, DEFAULT_FETCH_TYPE, EPOCH_SENTINEL,
};
use serde_json::json;

use crate::context::{next_job_id, JobContext, StoreContext};

pub const PAGE_KEYS: [&str; 1] = ["gid"];
pub const OUTPUT_KEYS: [&str; 2] = ["_id", "_collection"];
pub const JOB_KEYS: [&str; 1] = ["job_id"];

/// Collection name given to outputs saved without one.
pub const DEFAULT_COLLECTION: &str = "default";
pub const DEFAULT_SCRAPER_NAME: &str = "my_scraper";

const FRESHNESS_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Active,
    Done,
    Cancelled,
    Paused,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Active => "active",
            JobStatus::Done => "done",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn job_collection() -> KeyedCollection<JobContext> {
    KeyedCollection::<JobContext>::new("jobs", JOB_KEYS)
        .with_default(
            "job_id",
            FieldDefault::computed(|jobs, _, _| json!(next_job_id(jobs))),
        )
        .with_default(
            "scraper_name",
            FieldDefault::computed(|_, ctx: &JobContext, _| json!(ctx.names.generate())),
        )
        .with_default("status", FieldDefault::Static(json!(JobStatus::Done.as_str())))
        .with_default(
            "created_at",
            FieldDefault::computed(|_, ctx: &JobContext, _| json!(ctx.now_stamp())),
        )
        .on_before_insert(|jobs, _, mut job: Record, _| {
            if is_nil(job.get("job_id")) {
                job.insert("job_id".into(), json!(next_job_id(jobs)));
            }
            Ok(job)
        })
}

/// Static page defaults in storage order. `job_id` is computed separately.
fn page_defaults() -> Vec<(&'static str, Value)> {
    vec![
        ("url", Value::Null),
        ("status", json!("to_fetch")),
        ("page_type", json!("default")),
        ("method", json!("GET")),
        ("headers", json!({})),
        ("fetch_type", json!(DEFAULT_FETCH_TYPE)),
        ("cookie", Value::Null),
        ("no_redirect", json!(false)),
        ("body", Value::Null),
        ("ua_type", json!("desktop")),
        ("no_url_encode", json!(false)),
        ("http2", json!(false)),
        ("priority", json!(0)),
        ("parsing_try_count", json!(0)),
        ("parsing_fail_count", json!(0)),
        ("fetching_at", json!(EPOCH_SENTINEL)),
        ("fetching_try_count", json!(0)),
        ("refetch_count", json!(0)),
        ("fetched_from", json!("")),
        ("content_size", json!(0)),
        ("force_fetch", json!(false)),
        (
            "driver",
            json!({
                "name": "",
                "pre_code": "",
                "code": "",
                "goto_options": null,
                "stealth": false,
                "enable_images": false,
                "disable_adblocker": false
            }),
        ),
        ("display", json!({"width": 0, "height": 0})),
        (
            "screenshot",
            json!({"take_screenshot": false, "options": null}),
        ),
        ("driver_log", Value::Null),
        ("vars", json!({})),
        ("no_default_headers", json!(false)),
        ("fresh", Value::Null),
        ("proxy_type", json!("")),
        ("max_size", json!(0)),
        ("enable_global_cache", Value::Null),
        ("retry_interval", Value::Null),
        ("effective_url", Value::Null),
        ("fetched_at", Value::Null),
        ("parsing_at", Value::Null),
        ("parsing_failed_at", Value::Null),
        ("parsed_at", Value::Null),
        ("content_type", Value::Null),
        ("response_checksum", Value::Null),
        ("response_status", Value::Null),
        ("response_status_code", Value::Null),
        ("response_headers", Value::Null),
        ("response_cookie", Value::Null),
        ("response_proto", Value::Null),
        ("failed_response_checksum", Value::Null),
        ("failed_response_proto", Value::Null),
        ("failed_response_status", Value::Null),
        ("failed_response_status_code", Value::Null),
        ("failed_response_headers", Value::Null),
        ("failed_response_cookie", Value::Null),
        ("failed_effective_url", Value::Null),
        ("failed_at", Value::Null),
        ("failed_content_type", Value::Null),
    ]
}

pub(crate) fn page_collection() -> KeyedCollection<StoreContext> {
    let mut pages = KeyedCollection::<StoreContext>::new("pages", PAGE_KEYS).with_default(
        "job_id",
        FieldDefault::computed(|_, ctx: &StoreContext, _| json!(ctx.settings.job_id)),
    );
    for (field, value) in page_defaults() {
        pages = pages.with_default(field, FieldDefault::Static(value));
    }
    pages
        .on_before_defaults(normalize_page)
        .on_before_insert(prepare_page)
        .on_after_insert(|_, ctx: &mut StoreContext, page: &Record| {
            ctx.ensure_job(page.get("job_id")).map(|_| ())
        })
}

/// Merges caller sub-maps over the default ones and drops a caller `job_id`
/// unless job id override is on.
fn normalize_page(
    pages: &KeyedCollection<StoreContext>,
    ctx: &StoreContext,
    mut page: Record,
) -> Result<Record, StoreError> {
    for field in ["driver", "display", "screenshot"] {
        let (Some(Value::Object(given)), Some(Value::Object(base))) =
            (page.get(field), pages.static_default(field))
        else {
            continue;
        };
        let mut merged = base.clone();
        merged.extend(given.clone());
        page.insert(field.into(), Value::Object(merged));
    }

    if !ctx.settings.allow_job_id_override {
        if let Some(job_id) = page.remove("job_id") {
            db_debug!("pages: discarding job_id {job_id}, override disabled");
        }
    }
    Ok(page)
}

fn prepare_page(
    _: &KeyedCollection<StoreContext>,
    ctx: &StoreContext,
    mut page: Record,
    _existing: Option<&Record>,
) -> Result<Record, StoreError> {
    let emptiness: [(&str, fn(Option<&Value>) -> bool); 5] = [
        ("driver", is_driver_empty),
        ("display", is_display_empty),
        ("screenshot", is_screenshot_empty),
        ("headers", is_map_empty),
        ("vars", is_map_empty),
    ];
    for (field, is_empty) in emptiness {
        if is_empty(page.get(field)) {
            page.insert(field.into(), Value::Null);
        }
    }

    let url = page.get("url");
    let hostname = if is_blank(url) {
        Value::Null
    } else {
        json!(clean_url(&value_to_string(url))?.hostname())
    };
    page.insert("hostname".into(), hostname);

    let supplied = !is_nil(page.get("gid"));
    if !supplied || !ctx.settings.allow_page_gid_override {
        if supplied {
            db_debug!("pages: replacing caller gid, override disabled");
        }
        let gid = ctx.settings.identity.page_fingerprint(&page)?;
        page.insert("gid".into(), json!(gid));
    }

    let now = ctx.settings.clock.now();
    fill_unset(
        &mut page,
        "freshness",
        time_stamp(now - Duration::days(FRESHNESS_WINDOW_DAYS)),
    );
    fill_unset(&mut page, "to_fetch", time_stamp(now));
    fill_unset(&mut page, "created_at", time_stamp(now));
    Ok(page)
}

fn fill_unset(record: &mut Record, field: &str, value: String) {
    if !is_truthy(record.get(field)) {
        record.insert(field.into(), json!(value));
    }
}

pub(crate) fn output_collection() -> KeyedCollection<StoreContext> {
    KeyedCollection::<StoreContext>::new("outputs", OUTPUT_KEYS)
        .with_default("_collection", FieldDefault::Static(json!(DEFAULT_COLLECTION)))
        .with_default(
            "_job_id",
            FieldDefault::computed(|_, ctx: &StoreContext, _| json!(ctx.settings.job_id)),
        )
        .with_default(
            "_created_at",
            FieldDefault::computed(|_, ctx: &StoreContext, _| json!(ctx.settings.now_stamp())),
        )
        .with_default(
            "_gid",
            FieldDefault::computed(|_, ctx: &StoreContext, _| {
                json!(ctx.settings.page_gid.clone())
            }),
        )
        .on_before_defaults(|_, ctx: &StoreContext, mut output: Record| {
            if !ctx.settings.allow_job_id_override && output.remove("_job_id").is_some() {
                db_debug!("outputs: discarding _job_id, override disabled");
            }
            if !ctx.settings.allow_page_gid_override && output.remove("_gid").is_some() {
                db_debug!("outputs: discarding _gid, override disabled");
            }
            Ok(output)
        })
        .on_before_insert(|_, ctx: &StoreContext, mut output: Record, _| {
            if !is_truthy(output.get("_id")) {
                let id = ctx
                    .settings
                    .identity
                    .output_identity(&output, ctx.settings.clock.as_ref());
                output.insert("_id".into(), json!(id));
            }
            Ok(output)
        })
        .on_after_insert(|_, ctx: &mut StoreContext, output: &Record| {
            ctx.ensure_job(output.get("_job_id")).map(|_| ())
        })
}
