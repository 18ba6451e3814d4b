#![recursion_limit = "256"]

use chrono::{DateTime, Utc};
use mockdb_store::{
    FixedClock, FixedNameGenerator, HashAlgorithm, JobStatus, Record, RecordStore, StoreConfig,
    StoreError, Value,
};
use pretty_assertions::assert_eq;
use serde_json::json;

const NOW: &str = "2021-05-23T01:25:26.427321Z";

fn init_logging() {
    db_logging::initialize_for_tests();
}

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn store_with(config: StoreConfig) -> RecordStore {
    init_logging();
    let now: DateTime<Utc> = NOW.parse().unwrap();
    RecordStore::with_collaborators(
        config,
        FixedClock::new(now),
        FixedNameGenerator("generated-scraper".into()),
    )
    .unwrap()
}

fn store() -> RecordStore {
    store_with(StoreConfig::default())
}

#[test]
fn new_store_has_active_default_job() {
    let db = store();
    assert_eq!(db.job_id(), 1);
    assert_eq!(db.scraper_name(), "my_scraper");
    assert_eq!(db.uuid_algorithm(), HashAlgorithm::Md5);
    assert_eq!(db.page_gid().len(), 32);
    assert!(!db.allow_page_gid_override());
    assert!(!db.allow_job_id_override());
    assert_eq!(
        db.jobs().as_slice(),
        &[record(json!({
            "job_id": 1,
            "scraper_name": "my_scraper",
            "status": "active",
            "created_at": NOW,
        }))]
    );
}

#[test]
fn config_values_are_applied() {
    let config = StoreConfig::from_json(
        r#"{"job_id": 222, "scraper_name": "abc", "page_gid": "p-1",
            "allow_page_gid_override": true, "uuid_algorithm": "sha256"}"#,
    )
    .unwrap();
    let db = store_with(config);
    assert_eq!(db.job_id(), 222);
    assert_eq!(db.scraper_name(), "abc");
    assert_eq!(db.page_gid(), "p-1");
    assert!(db.allow_page_gid_override());
    assert!(!db.allow_job_id_override());
    assert_eq!(db.uuid_algorithm(), HashAlgorithm::Sha256);
    assert_eq!(db.fake_uuid(None).len(), 64);
}

#[test]
fn invalid_algorithm_is_rejected() {
    let config = StoreConfig {
        uuid_algorithm: Some("aaa".into()),
        ..StoreConfig::default()
    };
    let err = RecordStore::new(config).err().unwrap();
    assert_eq!(
        err,
        StoreError::InvalidHashAlgorithm {
            value: "aaa".into()
        }
    );

    let mut db = store();
    assert!(db.set_uuid_algorithm("crc32").is_err());
    db.set_uuid_algorithm("sha1").unwrap();
    assert_eq!(db.uuid_algorithm(), HashAlgorithm::Sha1);
    assert_eq!(db.fake_uuid(Some("abc")), db.fake_uuid(Some("abc")));
}

#[test]
fn malformed_config_json_is_an_error() {
    let err = StoreConfig::from_json(r#"{"job_id": "one"}"#).unwrap_err();
    assert!(matches!(err, StoreError::InvalidConfig(_)), "{err}");
}

#[test]
fn page_insert_fills_every_default() {
    let mut db = store();
    let stored = db
        .insert_page(record(json!({
            "url": "https://www.example.com/abc",
            "headers": {"Cookie": "abc=123"},
        })))
        .unwrap()
        .clone();

    let expected = record(json!({
        "gid": stored["gid"].clone(),
        "job_id": 1,
        "status": "to_fetch",
        "url": "https://www.example.com/abc",
        "method": "GET",
        "headers": {"Cookie": "abc=123"},
        "fetch_type": "standard",
        "cookie": null,
        "no_redirect": false,
        "body": null,
        "ua_type": "desktop",
        "no_url_encode": false,
        "http2": false,
        "page_type": "default",
        "freshness": "2021-04-23T01:25:26.427321Z",
        "hostname": "www.example.com",
        "priority": 0,
        "parsing_try_count": 0,
        "parsing_fail_count": 0,
        "fetching_at": "0001-01-01T00:00:00Z",
        "fetching_try_count": 0,
        "refetch_count": 0,
        "fetched_from": "",
        "content_size": 0,
        "force_fetch": false,
        "to_fetch": NOW,
        "created_at": NOW,
        "no_default_headers": false,
        "fresh": null,
        "proxy_type": "",
        "failed_response_checksum": null,
        "failed_response_proto": null,
        "failed_response_status": null,
        "max_size": 0,
        "enable_global_cache": null,
        "retry_interval": null,
        "content_type": null,
        "effective_url": null,
        "failed_at": null,
        "failed_content_type": null,
        "failed_effective_url": null,
        "failed_response_cookie": null,
        "failed_response_headers": null,
        "failed_response_status_code": null,
        "fetched_at": null,
        "parsed_at": null,
        "parsing_at": null,
        "parsing_failed_at": null,
        "response_checksum": null,
        "response_cookie": null,
        "response_headers": null,
        "response_proto": null,
        "response_status": null,
        "response_status_code": null,
        "driver": null,
        "display": null,
        "screenshot": null,
        "driver_log": null,
        "vars": null,
    }));
    assert_eq!(stored, expected);
    assert!(stored["gid"]
        .as_str()
        .unwrap()
        .starts_with("www.example.com-"));
}

#[test]
fn reordered_query_strings_upsert_the_same_page() {
    let mut db = store();
    db.insert_page(record(json!({"url": "https://abc.com/a/b?c=2&a=1"})))
        .unwrap();
    db.insert_page(record(json!({"url": "https://abc.com/a/b?a=1&c=2"})))
        .unwrap();
    assert_eq!(db.pages().len(), 1);

    db.insert_page(record(json!({"url": "https://example.com", "driver": {"name": "x"}})))
        .unwrap();
    db.insert_page(record(json!({"url": "https://example.com"})))
        .unwrap();
    assert_eq!(db.pages().len(), 3);
    assert_ne!(db.pages().get(1).unwrap()["gid"], db.pages().get(2).unwrap()["gid"]);
}

#[test]
fn caller_sub_maps_merge_over_defaults() {
    let mut db = store();
    let stored = db
        .insert_page(record(json!({
            "url": "https://example.com",
            "driver": {"name": "abc", "stealth": true, "goto_options": {"aaa": "AAA"}},
            "display": {"width": 1024},
            "screenshot": {"take_screenshot": true, "options": {"full_page": true}},
            "vars": {"k": 1},
        })))
        .unwrap()
        .clone();

    assert_eq!(
        stored["driver"],
        json!({
            "name": "abc",
            "pre_code": "",
            "code": "",
            "goto_options": {"aaa": "AAA"},
            "stealth": true,
            "enable_images": false,
            "disable_adblocker": false,
        })
    );
    assert_eq!(stored["display"], json!({"width": 1024, "height": 0}));
    assert_eq!(
        stored["screenshot"],
        json!({"take_screenshot": true, "options": {"full_page": true}})
    );
    assert_eq!(stored["vars"], json!({"k": 1}));
    assert_eq!(stored["headers"], Value::Null);
}

#[test]
fn supplied_gid_is_replaced_unless_override_enabled() {
    let mut db = store();
    db.insert_page(record(json!({"gid": "555", "url": "https://www.example.com/aaa"})))
        .unwrap();
    db.insert_page(record(json!({"gid": "555", "url": "https://www.example.com/bbb"})))
        .unwrap();
    assert_eq!(db.pages().len(), 2);
    assert_ne!(db.pages().get(0).unwrap()["gid"], json!("555"));
    assert_ne!(db.pages().get(0).unwrap()["gid"], db.pages().get(1).unwrap()["gid"]);

    db.enable_page_gid_override();
    db.insert_page(record(json!({"gid": "555", "url": "https://www.example.com/aaa"})))
        .unwrap();
    db.insert_page(record(json!({"gid": "555", "url": "https://www.example.com/ccc"})))
        .unwrap();
    assert_eq!(db.pages().len(), 3);
    assert_eq!(db.pages().last().unwrap()["gid"], json!("555"));
    assert_eq!(
        db.pages().last().unwrap()["url"],
        json!("https://www.example.com/ccc")
    );
}

#[test]
fn supplied_job_id_follows_override_flag() {
    let mut db = store();
    db.set_job_id(Some(222)).unwrap();

    db.insert_page(record(json!({"job_id": 111, "url": "https://www.example.com/aaa"})))
        .unwrap();
    assert_eq!(db.pages().last().unwrap()["job_id"], json!(222));
    db.insert_output(record(json!({"_job_id": 111, "aaa": "AAA"})))
        .unwrap();
    assert_eq!(db.outputs().last().unwrap()["_job_id"], json!(222));

    db.enable_job_id_override();
    db.insert_page(record(json!({"job_id": 111, "url": "https://www.example.com/bbb"})))
        .unwrap();
    assert_eq!(db.pages().last().unwrap()["job_id"], json!(111));
    db.insert_output(record(json!({"_job_id": 111, "aaa": "AAA"})))
        .unwrap();
    assert_eq!(db.outputs().last().unwrap()["_job_id"], json!(111));

    // job 111 was referenced, so it exists and is not the current job
    let job = db.ensure_job(Some(111)).unwrap().clone();
    assert_eq!(job["status"], json!("done"));
    assert_eq!(job["scraper_name"], json!("my_scraper"));
    assert_eq!(db.jobs().len(), 3);
}

#[test]
fn referenced_job_ids_are_kept_as_given() {
    let mut db = store_with(StoreConfig::overriding());
    let page = db
        .insert_page(record(json!({"url": "https://example.com/a", "job_id": 7.0})))
        .unwrap()
        .clone();
    assert_eq!(page["job_id"], json!(7.0));
    db.insert_output(record(json!({"_job_id": "9", "aaa": "AAA"})))
        .unwrap();

    let job_ids: Vec<Value> = db.jobs().iter().map(|job| job["job_id"].clone()).collect();
    assert_eq!(job_ids, vec![json!(1), json!(7.0), json!("9")]);
    let seven = db
        .query("jobs", &record(json!({"job_id": 7})), 0, None)
        .unwrap();
    assert_eq!(seven.len(), 1);
    assert_eq!(seven[0]["status"], json!("done"));

    // a second page of the same job does not create another one
    db.insert_page(record(json!({"url": "https://example.com/b", "job_id": 7})))
        .unwrap();
    assert_eq!(db.jobs().len(), 3);
}

#[test]
fn output_insert_fills_defaults() {
    let mut db = store_with(StoreConfig {
        page_gid: Some("page-1".into()),
        ..StoreConfig::default()
    });
    let stored = db
        .insert_output(record(json!({"aaa": "AAA"})))
        .unwrap()
        .clone();

    let id = stored["_id"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 32);
    assert_eq!(
        stored,
        record(json!({
            "aaa": "AAA",
            "_collection": "default",
            "_job_id": 1,
            "_created_at": NOW,
            "_gid": "page-1",
            "_id": id,
        }))
    );
}

#[test]
fn output_ids_are_random_and_collections_scope_keys() {
    let mut db = store();
    db.insert_output(record(json!({"aaa": "AAA"}))).unwrap();
    db.insert_output(record(json!({"aaa": "AAA"}))).unwrap();
    assert_eq!(db.outputs().len(), 2);
    assert_ne!(
        db.outputs().get(0).unwrap()["_id"],
        db.outputs().get(1).unwrap()["_id"]
    );

    db.insert_output(record(json!({"_id": "x", "n": 1}))).unwrap();
    db.insert_output(record(json!({"_id": "x", "_collection": "other", "n": 2})))
        .unwrap();
    db.insert_output(record(json!({"_id": "x", "n": 3}))).unwrap();
    assert_eq!(db.outputs().len(), 4);
    assert_eq!(db.outputs().get(2).unwrap()["n"], json!(3));
}

#[test]
fn output_gid_follows_page_gid_override() {
    let mut db = store_with(StoreConfig {
        page_gid: Some("current".into()),
        ..StoreConfig::default()
    });
    db.insert_output(record(json!({"_gid": "mine"}))).unwrap();
    assert_eq!(db.outputs().last().unwrap()["_gid"], json!("current"));

    db.enable_page_gid_override();
    db.insert_output(record(json!({"_gid": "mine"}))).unwrap();
    assert_eq!(db.outputs().last().unwrap()["_gid"], json!("mine"));

    db.set_page_gid("next");
    db.insert_output(record(json!({}))).unwrap();
    assert_eq!(db.outputs().last().unwrap()["_gid"], json!("next"));
}

#[test]
fn job_insert_generates_missing_fields() {
    let mut db = store();
    db.set_job_id(Some(123)).unwrap();
    let job = db
        .insert_job(record(json!({"scraper_name": "CCC"})))
        .unwrap()
        .clone();
    assert_eq!(
        job,
        record(json!({
            "job_id": 124,
            "scraper_name": "CCC",
            "status": "done",
            "created_at": NOW,
        }))
    );

    let job = db.insert_job(record(json!({"job_id": 500}))).unwrap().clone();
    assert_eq!(job["scraper_name"], json!("generated-scraper"));
    assert_eq!(db.generate_job_id(), 501);
}

#[test]
fn job_insert_replaces_same_id() {
    let mut db = store();
    db.insert_job(record(json!({"job_id": 444, "scraper_name": "AAA"})))
        .unwrap();
    db.insert_job(record(json!({"job_id": 444, "scraper_name": "BBB", "status": "paused"})))
        .unwrap();
    assert_eq!(db.jobs().len(), 2);
    assert_eq!(db.jobs().last().unwrap()["scraper_name"], json!("BBB"));
    assert_eq!(db.jobs().last().unwrap()["status"], json!(JobStatus::Paused.as_str()));
}

#[test]
fn set_job_id_without_value_uses_next_id() {
    let mut db = store();
    assert_eq!(db.set_job_id(None).unwrap(), 2);
    assert_eq!(db.job_id(), 2);
    assert_eq!(db.jobs().last().unwrap()["status"], json!("active"));
}

#[test]
fn renaming_scraper_updates_current_job() {
    let mut db = store();
    db.set_scraper_name("renamed").unwrap();
    assert_eq!(db.scraper_name(), "renamed");
    assert_eq!(db.jobs().first().unwrap()["scraper_name"], json!("renamed"));
}

#[test]
fn invalid_page_url_stores_nothing() {
    let mut db = store();
    let err = db
        .insert_page(record(json!({"url": "not a url"})))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidUrl { .. }), "{err}");
    assert!(db.pages().is_empty());
}

#[test]
fn blank_page_url_gets_empty_gid() {
    let mut db = store();
    let stored = db.insert_page(Record::new()).unwrap().clone();
    assert_eq!(stored["gid"], json!(""));
    assert_eq!(stored["hostname"], Value::Null);
}

#[test]
fn builders_use_store_defaults() {
    init_logging();
    let page = RecordStore::build_page(
        record(json!({"gid": "fixed", "job_id": 9, "url": "https://Example.com/x"})),
        None,
    )
    .unwrap();
    assert_eq!(page["gid"], json!("fixed"));
    assert_eq!(page["job_id"], json!(9));
    assert_eq!(page["hostname"], json!("example.com"));

    let fake = RecordStore::build_fake_page(None).unwrap();
    assert_eq!(fake["url"], json!("https://example.com"));
    assert!(fake["gid"].as_str().unwrap().starts_with("example.com-"));

    let job = RecordStore::build_job(
        record(json!({"job_id": 123, "scraper_name": "abc"})),
        StoreConfig::default(),
    )
    .unwrap();
    assert_eq!(job["status"], json!("done"));
    assert_eq!(job["scraper_name"], json!("abc"));

    let fake_job = RecordStore::build_fake_job(None, None, None).unwrap();
    let mut keys: Vec<&str> = fake_job.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["created_at", "job_id", "scraper_name", "status"]);
    assert_eq!(fake_job["status"], json!("done"));
    assert!(fake_job["job_id"].as_i64().unwrap() > 0);
    assert!(!fake_job["scraper_name"].as_str().unwrap().trim().is_empty());
}

#[test]
fn build_page_keeps_overrides_unless_disabled() {
    init_logging();
    let given = record(json!({"gid": "fixed", "job_id": 9, "url": "https://a.com/x"}));
    let page = RecordStore::build_page(
        given.clone(),
        Some(StoreConfig {
            job_id: Some(5),
            ..StoreConfig::default()
        }),
    )
    .unwrap();
    assert_eq!(page["gid"], json!("fixed"));
    assert_eq!(page["job_id"], json!(9));

    let page = RecordStore::build_page(
        given,
        Some(StoreConfig {
            job_id: Some(5),
            allow_page_gid_override: Some(false),
            allow_job_id_override: Some(false),
            ..StoreConfig::default()
        }),
    )
    .unwrap();
    assert!(page["gid"].as_str().unwrap().starts_with("a.com-"));
    assert_eq!(page["job_id"], json!(5));
}
