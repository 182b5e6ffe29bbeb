//! SheetsLedger against a local stand-in for the Sheets and Drive APIs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use archive_relay::config::SpreadsheetRef;
use archive_relay::credentials::StaticToken;
use archive_relay::ledger::{
    load_key_map, Ledger, LedgerEntry, LedgerError, SheetsEndpoints, SheetsLedger,
};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

const SHEET_ID: &str = "sheet-123";
const TOKEN: &str = "test-access-token";

#[derive(Default)]
struct FakeSheets {
    tabs: HashMap<String, Vec<Vec<Value>>>,
    appended: Vec<(String, Value)>,
}

type Shared = Arc<Mutex<FakeSheets>>;

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

fn google_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({"error": {"code": status.as_u16(), "message": message}})),
    )
        .into_response()
}

/// `'My Tab'!1:1` -> (`My Tab`, header_only)
fn parse_range(range: &str) -> (String, bool) {
    let (tab, rest) = match range.rsplit_once('!') {
        Some((tab, rest)) => (tab, Some(rest)),
        None => (range, None),
    };
    let tab = tab
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .unwrap_or(tab)
        .replace("''", "'");
    (tab, rest == Some("1:1"))
}

async fn spreadsheet(
    State(_): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return google_error(StatusCode::UNAUTHORIZED, "Request had invalid credentials");
    }
    if id != SHEET_ID {
        return google_error(StatusCode::NOT_FOUND, "Requested entity was not found.");
    }
    Json(json!({"properties": {"title": "KeyData"}})).into_response()
}

async fn read_values(
    State(state): State<Shared>,
    Path((_id, range)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return google_error(StatusCode::UNAUTHORIZED, "Request had invalid credentials");
    }
    let (tab, header_only) = parse_range(&range);
    let state = state.lock().unwrap();
    match state.tabs.get(&tab) {
        None => google_error(
            StatusCode::BAD_REQUEST,
            &format!("Unable to parse range: {range}"),
        ),
        Some(rows) => {
            let rows: Vec<_> = if header_only {
                rows.iter().take(1).cloned().collect()
            } else {
                rows.clone()
            };
            if rows.is_empty() {
                Json(json!({"range": range, "majorDimension": "ROWS"})).into_response()
            } else {
                Json(json!({"range": range, "majorDimension": "ROWS", "values": rows}))
                    .into_response()
            }
        }
    }
}

async fn append_values(
    State(state): State<Shared>,
    Path((_id, range)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return google_error(StatusCode::UNAUTHORIZED, "Request had invalid credentials");
    }
    let Some(range) = range.strip_suffix(":append") else {
        return google_error(StatusCode::NOT_FOUND, "unknown method");
    };
    assert_eq!(params.get("valueInputOption").map(String::as_str), Some("RAW"));

    let (tab, _) = parse_range(range);
    let mut state = state.lock().unwrap();
    let Some(rows) = state.tabs.get_mut(&tab) else {
        return google_error(
            StatusCode::BAD_REQUEST,
            &format!("Unable to parse range: {range}"),
        );
    };
    for row in body["values"].as_array().cloned().unwrap_or_default() {
        rows.push(row.as_array().cloned().unwrap_or_default());
    }
    state.appended.push((tab, body));
    Json(json!({"spreadsheetId": SHEET_ID})).into_response()
}

async fn drive_files(
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return google_error(StatusCode::UNAUTHORIZED, "Request had invalid credentials");
    }
    let q = params.get("q").cloned().unwrap_or_default();
    if q.contains("name = 'KeyData'") {
        Json(json!({"files": [{"id": SHEET_ID}]})).into_response()
    } else {
        Json(json!({"files": []})).into_response()
    }
}

async fn start_fake(tabs: Vec<(&str, Vec<Vec<Value>>)>) -> (String, Shared) {
    let state: Shared = Arc::new(Mutex::new(FakeSheets {
        tabs: tabs
            .into_iter()
            .map(|(name, rows)| (name.to_string(), rows))
            .collect(),
        appended: Vec::new(),
    }));

    let app = Router::new()
        .route("/v4/spreadsheets/:id", get(spreadsheet))
        .route(
            "/v4/spreadsheets/:id/values/:range",
            get(read_values).post(append_values),
        )
        .route("/drive/v3/files", get(drive_files))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), state)
}

async fn connect(
    base: &str,
    spreadsheet: SpreadsheetRef,
    token: &str,
) -> Result<SheetsLedger, LedgerError> {
    SheetsLedger::connect(
        reqwest::Client::new(),
        SheetsEndpoints {
            sheets: base.to_string(),
            drive: base.to_string(),
        },
        Arc::new(StaticToken(token.to_string())),
        &spreadsheet,
    )
    .await
}

fn standard_tab() -> Vec<Vec<Value>> {
    vec![
        vec![json!("key"), json!("name_file"), json!("message_id")],
        vec![json!("ABC"), json!("movie.rar"), json!(555)],
        vec![json!("abc "), json!("movie-2.rar"), json!(556.0)],
        vec![json!("")],
    ]
}

#[tokio::test]
async fn test_resolves_spreadsheet_by_name() {
    let (base, _) = start_fake(vec![("1", standard_tab())]).await;
    let ledger = connect(&base, SpreadsheetRef::Name("KeyData".to_string()), TOKEN)
        .await
        .unwrap();
    assert_eq!(ledger.spreadsheet_id(), SHEET_ID);
}

#[tokio::test]
async fn test_unknown_spreadsheet_name_is_fatal() {
    let (base, _) = start_fake(vec![]).await;
    let result = connect(&base, SpreadsheetRef::Name("Nope".to_string()), TOKEN).await;
    assert!(matches!(result, Err(LedgerError::SpreadsheetNotFound(_))));
}

#[tokio::test]
async fn test_bad_credentials_are_fatal() {
    let (base, _) = start_fake(vec![]).await;
    let result = connect(&base, SpreadsheetRef::Id(SHEET_ID.to_string()), "wrong").await;
    assert!(matches!(result, Err(LedgerError::Auth(_))));
}

#[tokio::test]
async fn test_load_key_map_over_http() {
    let (base, _) = start_fake(vec![
        ("1", standard_tab()),
        ("Old Files", vec![vec![json!("key"), json!("message_id")]]),
    ])
    .await;
    let ledger = connect(&base, SpreadsheetRef::Id(SHEET_ID.to_string()), TOKEN)
        .await
        .unwrap();

    let tabs = vec!["1".to_string(), "Old Files".to_string(), "Missing".to_string()];
    let keys = load_key_map(&ledger, &tabs).await.unwrap();

    let ids: Vec<i64> = keys
        .lookup("abc")
        .unwrap()
        .iter()
        .map(|r| r.message_id)
        .collect();
    assert_eq!(ids, vec![555, 556]);
    assert_eq!(keys.len(), 1);
}

#[tokio::test]
async fn test_missing_tab_is_reported() {
    let (base, _) = start_fake(vec![("1", standard_tab())]).await;
    let ledger = connect(&base, SpreadsheetRef::Id(SHEET_ID.to_string()), TOKEN)
        .await
        .unwrap();

    assert!(matches!(
        ledger.read_tab("Nope").await,
        Err(LedgerError::TabNotFound(tab)) if tab == "Nope"
    ));
}

#[tokio::test]
async fn test_append_places_values_by_header() {
    let (base, state) = start_fake(vec![(
        "Uploads",
        vec![vec![
            json!("name_file"),
            json!("message_id"),
            json!("comment"),
            json!("key"),
        ]],
    )])
    .await;
    let ledger = connect(&base, SpreadsheetRef::Id(SHEET_ID.to_string()), TOKEN)
        .await
        .unwrap();

    for id in [555, 556] {
        ledger
            .append(
                "Uploads",
                &LedgerEntry {
                    key: None,
                    file_name: format!("movie-{id}.rar"),
                    message_id: id,
                },
            )
            .await
            .unwrap();
    }

    let state = state.lock().unwrap();
    assert_eq!(state.appended.len(), 2);
    let (tab, body) = &state.appended[0];
    assert_eq!(tab, "Uploads");
    assert_eq!(body["values"], json!([["movie-555.rar", 555, "", ""]]));
}

#[tokio::test]
async fn test_append_then_reload_round_trip() {
    let (base, _) = start_fake(vec![("1", standard_tab())]).await;
    let ledger = connect(&base, SpreadsheetRef::Id(SHEET_ID.to_string()), TOKEN)
        .await
        .unwrap();

    ledger
        .append(
            "1",
            &LedgerEntry {
                key: Some("xyz".to_string()),
                file_name: "new.rar".to_string(),
                message_id: 900,
            },
        )
        .await
        .unwrap();

    let keys = load_key_map(&ledger, &["1".to_string()]).await.unwrap();
    assert_eq!(keys.lookup("XYZ ").unwrap()[0].file_name, "new.rar");
}

#[tokio::test]
async fn test_reordered_header_is_picked_up_after_reload() {
    let (base, state) = start_fake(vec![(
        "1",
        vec![vec![json!("key"), json!("name_file"), json!("message_id")]],
    )])
    .await;
    let ledger = connect(&base, SpreadsheetRef::Id(SHEET_ID.to_string()), TOKEN)
        .await
        .unwrap();
    let entry = |id: i64| LedgerEntry {
        key: Some("k".to_string()),
        file_name: format!("f{id}.rar"),
        message_id: id,
    };

    ledger.append("1", &entry(1)).await.unwrap();

    // An operator moves the columns around
    state.lock().unwrap().tabs.get_mut("1").unwrap()[0] =
        vec![json!("message_id"), json!("key"), json!("name_file")];

    load_key_map(&ledger, &["1".to_string()]).await.unwrap();
    ledger.append("1", &entry(2)).await.unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.appended[0].1["values"], json!([["k", "f1.rar", 1]]));
    assert_eq!(state.appended[1].1["values"], json!([[2, "k", "f2.rar"]]));
}
