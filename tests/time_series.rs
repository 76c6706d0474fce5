// Time-ordered store over a persistent log store.
use serde::{Deserialize, Serialize};
use tabula::api::{Durability, EventTime, LogStore, TimeSeries};
use time::PrimitiveDateTime;
use time::macros::datetime;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct EventInfo {
    at: PrimitiveDateTime,
    kind: String,
}

impl EventTime for EventInfo {
    fn event_time(&self) -> PrimitiveDateTime {
        self.at
    }
}

struct PageView {
    path: &'static str,
    when: PrimitiveDateTime,
}

fn open_series(path: &std::path::Path) -> TimeSeries<EventInfo> {
    let store = LogStore::open(path, Durability::Flush).expect("open log");
    let mut series = TimeSeries::new(Box::new(store)).expect("series");
    series.register(|view: &PageView| EventInfo {
        at: view.when,
        kind: format!("view:{}", view.path),
    });
    series
}

fn kinds_between(
    series: &TimeSeries<EventInfo>,
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
) -> Vec<String> {
    let mut kinds = Vec::new();
    series
        .between(start, end, |event| {
            kinds.push(event.kind);
            true
        })
        .expect("between");
    kinds
}

#[test]
fn events_persist_and_keys_keep_increasing_after_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("events.tbl");

    {
        let series = open_series(&path);
        for (page, when) in [
            ("/", datetime!(2020-09-01 12:00:00)),
            ("/a", datetime!(2020-09-01 12:00:00)),
            ("/b", datetime!(2020-09-01 12:30:00)),
        ] {
            series.insert(&PageView { path: page, when }).expect("insert");
        }
        series.close().expect("close");
    }

    let series = open_series(&path);
    assert_eq!(series.len().expect("len"), 3);
    let key = series
        .insert(&PageView {
            path: "/c",
            when: datetime!(2020-09-01 12:00:00),
        })
        .expect("insert after reopen");
    assert_eq!(key, "20200901120000.0000000004");

    assert_eq!(
        kinds_between(
            &series,
            datetime!(2020-09-01 12:00:00),
            datetime!(2020-09-01 12:00:00)
        ),
        vec!["view:/", "view:/a", "view:/c"]
    );

    let mut later = Vec::new();
    series
        .greater_than(datetime!(2020-09-01 12:00:00), |event| {
            later.push(event.kind);
            true
        })
        .expect("greater_than");
    assert_eq!(later, vec!["view:/b"]);
}
