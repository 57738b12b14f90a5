//! Host interface
//!
//! The small table of callbacks the VM invokes. All callbacks are
//! synchronous; the VM never blocks on I/O directly, so whether a host
//! call blocks the thread or yields is the host's decision.
//!
//! Two implementations ship with the runtime: `StdHost` (stdout, real
//! clock, ureq HTTP client, in-memory storage) and `CaptureHost`, which
//! records everything for tests.

use crate::value::Value;
use droe_core::schema::{DbOpCode, FieldAnnotation, RecordSchema, TypeTag};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Default timeout for outbound HTTP requests (30 seconds).
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Response of an outbound `http_request`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: i32,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

/// Result of a storage operation. The adapter returns a record, a
/// collection of records, or a status count.
#[derive(Debug, Clone, PartialEq)]
pub enum DbResult {
    One(Value),
    Many(Vec<Value>),
    Count(i32),
}

/// Callbacks the VM invokes for I/O, HTTP, and storage.
pub trait Host {
    fn print(&mut self, text: &str);
    fn print_line(&mut self, text: &str);

    /// Epoch seconds; feeds `auto` date fields.
    fn now(&mut self) -> i64;

    /// Fresh unique key text; feeds `auto` key fields.
    fn uuid(&mut self) -> String;

    fn http_request(
        &mut self,
        url: &str,
        method: &str,
        body: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, String>;

    /// Forwarded `DatabaseOp`. The host owns query interpretation; the
    /// VM only moves operands and results.
    fn db_op(
        &mut self,
        op: DbOpCode,
        entity_index: u16,
        schema: &RecordSchema,
        predicates: &[(String, Value)],
        fields: &[(String, Value)],
    ) -> Result<DbResult, String>;

    /// Runtime diagnostic notification (kind, message, instruction index).
    fn fail(&mut self, kind: &str, message: &str, at: usize);
}

/// Convert epoch seconds to `YYYY-MM-DD` date text (proleptic Gregorian).
pub fn epoch_to_date(epoch_seconds: i64) -> String {
    // Civil-from-days; days relative to 1970-01-01
    let days = epoch_seconds.div_euclid(86_400);
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    format!("{:04}-{:02}-{:02}", y, m, d)
}

/// Shared in-memory storage adapter: one table of records per entity.
///
/// `create` fills `auto` fields (keys from `uuid`, dates from `now`) and
/// unset fields from their declared defaults. Used by both hosts so the
/// behavior under test matches production.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<String, Vec<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    #[allow(clippy::too_many_arguments)]
    fn op(
        &mut self,
        op: DbOpCode,
        entity_index: u16,
        schema: &RecordSchema,
        predicates: &[(String, Value)],
        fields: &[(String, Value)],
        now: i64,
        uuid: &mut dyn FnMut() -> String,
    ) -> Result<DbResult, String> {
        match op {
            DbOpCode::Create => {
                let record = build_record(schema, entity_index, fields, now, uuid);
                self.tables
                    .entry(schema.name.clone())
                    .or_default()
                    .push(record.clone());
                Ok(DbResult::One(record))
            }
            DbOpCode::Find => {
                let table = self.tables.get(&schema.name).map(Vec::as_slice).unwrap_or(&[]);
                table
                    .iter()
                    .find(|record| matches_predicates(schema, record, predicates))
                    .cloned()
                    .map(DbResult::One)
                    .ok_or_else(|| format!("no {} matches the predicate", schema.name))
            }
            DbOpCode::FindAll => {
                let table = self.tables.get(&schema.name).map(Vec::as_slice).unwrap_or(&[]);
                Ok(DbResult::Many(
                    table
                        .iter()
                        .filter(|record| matches_predicates(schema, record, predicates))
                        .cloned()
                        .collect(),
                ))
            }
            DbOpCode::Update => {
                let mut updated = 0;
                if let Some(table) = self.tables.get_mut(&schema.name) {
                    for record in table.iter_mut() {
                        if matches_predicates(schema, record, predicates) {
                            *record = apply_fields(schema, record, fields);
                            updated += 1;
                        }
                    }
                }
                Ok(DbResult::Count(updated))
            }
            DbOpCode::Delete => {
                let mut deleted = 0;
                if let Some(table) = self.tables.get_mut(&schema.name) {
                    let before = table.len();
                    table.retain(|record| !matches_predicates(schema, record, predicates));
                    deleted = (before - table.len()) as i32;
                }
                Ok(DbResult::Count(deleted))
            }
        }
    }
}

fn build_record(
    schema: &RecordSchema,
    entity_index: u16,
    fields: &[(String, Value)],
    now: i64,
    uuid: &mut dyn FnMut() -> String,
) -> Value {
    let mut values = Vec::with_capacity(schema.fields.len());
    for field in &schema.fields {
        let provided = fields
            .iter()
            .find(|(name, _)| *name == field.name)
            .map(|(_, value)| value.clone());
        let value = match provided {
            Some(v) => v,
            None if field.annotations.contains(&FieldAnnotation::Auto) => match field.ty {
                TypeTag::Date => Value::text(epoch_to_date(now)),
                _ => Value::text(uuid()),
            },
            None => default_for(field),
        };
        values.push(value);
    }
    Value::Record {
        schema: entity_index,
        fields: Arc::new(values),
    }
}

fn default_for(field: &droe_core::schema::FieldSchema) -> Value {
    let declared = field.annotations.iter().find_map(|a| match a {
        FieldAnnotation::Default(text) => Some(text.clone()),
        _ => None,
    });
    match (&field.ty, declared) {
        (TypeTag::Int, Some(text)) => Value::Int(text.parse().unwrap_or(0)),
        (TypeTag::Int, None) => Value::Int(0),
        (TypeTag::Decimal, Some(text)) => {
            let cents = text
                .split_once('.')
                .and_then(|(whole, frac)| {
                    let whole: i64 = whole.parse().ok()?;
                    let frac: i64 = format!("{:0<2}", frac).get(..2)?.parse().ok()?;
                    Some(whole * 100 + if whole < 0 { -frac } else { frac })
                })
                .or_else(|| text.parse::<i64>().ok().map(|w| w * 100))
                .unwrap_or(0);
            Value::Decimal(cents)
        }
        (TypeTag::Decimal, None) => Value::Decimal(0),
        (TypeTag::Flag, Some(text)) => Value::Flag(text == "true"),
        (TypeTag::Flag, None) => Value::Flag(false),
        (TypeTag::ListOf(_), _) => Value::List(Arc::new(Vec::new())),
        (TypeTag::GroupOf(_), _) => Value::Group(Arc::new(Vec::new())),
        (_, Some(text)) => Value::text(text),
        (_, None) => Value::text(""),
    }
}

fn matches_predicates(
    schema: &RecordSchema,
    record: &Value,
    predicates: &[(String, Value)],
) -> bool {
    let fields = match record {
        Value::Record { fields, .. } => fields,
        _ => return false,
    };
    predicates.iter().all(|(name, expected)| {
        schema
            .field_index(name)
            .and_then(|i| fields.get(i))
            .map(|actual| actual == expected)
            .unwrap_or(false)
    })
}

fn apply_fields(schema: &RecordSchema, record: &Value, fields: &[(String, Value)]) -> Value {
    let (schema_index, existing) = match record {
        Value::Record { schema, fields } => (*schema, fields),
        _ => return record.clone(),
    };
    let mut values: Vec<Value> = existing.as_ref().clone();
    for (name, value) in fields {
        if let Some(i) = schema.field_index(name) {
            values[i] = value.clone();
        }
    }
    Value::Record {
        schema: schema_index,
        fields: Arc::new(values),
    }
}

/// Production host: stdout, real clock, v4 uuids, ureq HTTP client with
/// a fixed timeout, and the in-memory storage adapter.
#[derive(Default)]
pub struct StdHost {
    store: MemoryStore,
}

impl StdHost {
    pub fn new() -> Self {
        StdHost {
            store: MemoryStore::new(),
        }
    }
}

impl Host for StdHost {
    fn print(&mut self, text: &str) {
        use std::io::Write;
        print!("{}", text);
        let _ = std::io::stdout().flush();
    }

    fn print_line(&mut self, text: &str) {
        println!("{}", text);
    }

    fn now(&mut self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    fn uuid(&mut self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn http_request(
        &mut self,
        url: &str,
        method: &str,
        body: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, String> {
        // Reject targets ureq would choke on before building the request
        url::Url::parse(url).map_err(|e| format!("invalid url '{}': {}", url, e))?;
        debug!(url, method, "outbound http request");

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build();
        let mut request = agent.request(method, url);
        for (name, value) in headers {
            request = request.set(name, value);
        }
        let result = if body.is_empty() {
            request.call()
        } else {
            request.send_string(body)
        };
        match result {
            Ok(response) => Ok(read_response(response)),
            // Non-2xx statuses still carry a usable response
            Err(ureq::Error::Status(_, response)) => Ok(read_response(response)),
            Err(ureq::Error::Transport(e)) => Err(format!("connection error: {}", e)),
        }
    }

    fn db_op(
        &mut self,
        op: DbOpCode,
        entity_index: u16,
        schema: &RecordSchema,
        predicates: &[(String, Value)],
        fields: &[(String, Value)],
    ) -> Result<DbResult, String> {
        let now = self.now();
        let mut uuid = || uuid::Uuid::new_v4().to_string();
        self.store
            .op(op, entity_index, schema, predicates, fields, now, &mut uuid)
    }

    fn fail(&mut self, kind: &str, message: &str, at: usize) {
        warn!(kind, at, "runtime failure: {}", message);
        eprintln!("{}: {} (at instruction {})", kind, message, at);
    }
}

fn read_response(response: ureq::Response) -> HttpResponse {
    let status = response.status() as i32;
    let headers: Vec<(String, String)> = response
        .headers_names()
        .into_iter()
        .filter_map(|name| {
            response
                .header(&name)
                .map(|value| (name.clone(), value.to_string()))
        })
        .collect();
    let body = response.into_string().unwrap_or_default();
    HttpResponse {
        status,
        body,
        headers,
    }
}

/// Test host: captures output, runs a deterministic clock and key
/// sequence, answers HTTP from a canned queue, and shares the in-memory
/// storage adapter with `StdHost`.
#[derive(Default)]
pub struct CaptureHost {
    pub output: String,
    pub failures: Vec<(String, String)>,
    /// Responses handed out FIFO to `http_request`; an empty queue
    /// reports a connection error
    pub canned_http: Vec<HttpResponse>,
    pub requests_seen: Vec<(String, String, String)>,
    store: MemoryStore,
    clock: i64,
    next_key: u32,
}

impl CaptureHost {
    pub fn new() -> Self {
        CaptureHost {
            clock: 1_700_000_000,
            ..CaptureHost::default()
        }
    }

    pub fn with_http(mut self, responses: Vec<HttpResponse>) -> Self {
        self.canned_http = responses;
        self
    }
}

impl Host for CaptureHost {
    fn print(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn print_line(&mut self, text: &str) {
        self.output.push_str(text);
        self.output.push('\n');
    }

    fn now(&mut self) -> i64 {
        self.clock
    }

    fn uuid(&mut self) -> String {
        self.next_key += 1;
        format!("key-{:04}", self.next_key)
    }

    fn http_request(
        &mut self,
        url: &str,
        method: &str,
        body: &str,
        _headers: &[(String, String)],
    ) -> Result<HttpResponse, String> {
        self.requests_seen
            .push((url.to_string(), method.to_string(), body.to_string()));
        if self.canned_http.is_empty() {
            Err("no canned response".to_string())
        } else {
            Ok(self.canned_http.remove(0))
        }
    }

    fn db_op(
        &mut self,
        op: DbOpCode,
        entity_index: u16,
        schema: &RecordSchema,
        predicates: &[(String, Value)],
        fields: &[(String, Value)],
    ) -> Result<DbResult, String> {
        let now = self.clock;
        let mut counter = self.next_key;
        let result = {
            let mut uuid = || {
                counter += 1;
                format!("key-{:04}", counter)
            };
            self.store
                .op(op, entity_index, schema, predicates, fields, now, &mut uuid)
        };
        self.next_key = counter;
        result
    }

    fn fail(&mut self, kind: &str, message: &str, _at: usize) {
        self.failures.push((kind.to_string(), message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_schema() -> RecordSchema {
        RecordSchema {
            name: "User".to_string(),
            fields: vec![
                droe_core::schema::FieldSchema {
                    name: "id".to_string(),
                    ty: TypeTag::Text,
                    annotations: vec![FieldAnnotation::Key, FieldAnnotation::Auto],
                },
                droe_core::schema::FieldSchema {
                    name: "name".to_string(),
                    ty: TypeTag::Text,
                    annotations: vec![FieldAnnotation::Required],
                },
                droe_core::schema::FieldSchema {
                    name: "joined".to_string(),
                    ty: TypeTag::Date,
                    annotations: vec![FieldAnnotation::Auto],
                },
            ],
        }
    }

    #[test]
    fn test_epoch_to_date() {
        assert_eq!(epoch_to_date(0), "1970-01-01");
        assert_eq!(epoch_to_date(86_400), "1970-01-02");
        assert_eq!(epoch_to_date(1_700_000_000), "2023-11-14");
    }

    #[test]
    fn test_create_fills_auto_fields() {
        let mut host = CaptureHost::new();
        let schema = user_schema();
        let result = host
            .db_op(
                DbOpCode::Create,
                0,
                &schema,
                &[],
                &[("name".to_string(), Value::text("Ada"))],
            )
            .unwrap();
        match result {
            DbResult::One(Value::Record { fields, .. }) => {
                assert_eq!(fields[0], Value::text("key-0001"));
                assert_eq!(fields[1], Value::text("Ada"));
                assert_eq!(fields[2], Value::text("2023-11-14"));
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_find_and_update_and_delete() {
        let mut host = CaptureHost::new();
        let schema = user_schema();
        host.db_op(
            DbOpCode::Create,
            0,
            &schema,
            &[],
            &[("name".to_string(), Value::text("Ada"))],
        )
        .unwrap();
        host.db_op(
            DbOpCode::Create,
            0,
            &schema,
            &[],
            &[("name".to_string(), Value::text("Grace"))],
        )
        .unwrap();

        let found = host
            .db_op(
                DbOpCode::Find,
                0,
                &schema,
                &[("name".to_string(), Value::text("Grace"))],
                &[],
            )
            .unwrap();
        assert!(matches!(found, DbResult::One(_)));

        let updated = host
            .db_op(
                DbOpCode::Update,
                0,
                &schema,
                &[("name".to_string(), Value::text("Ada"))],
                &[("name".to_string(), Value::text("Ada L."))],
            )
            .unwrap();
        assert_eq!(updated, DbResult::Count(1));

        let deleted = host
            .db_op(
                DbOpCode::Delete,
                0,
                &schema,
                &[("name".to_string(), Value::text("Grace"))],
                &[],
            )
            .unwrap();
        assert_eq!(deleted, DbResult::Count(1));

        let all = host
            .db_op(DbOpCode::FindAll, 0, &schema, &[], &[])
            .unwrap();
        match all {
            DbResult::Many(records) => assert_eq!(records.len(), 1),
            other => panic!("expected records, got {:?}", other),
        }
    }

    #[test]
    fn test_find_miss_is_error() {
        let mut host = CaptureHost::new();
        let schema = user_schema();
        let result = host.db_op(
            DbOpCode::Find,
            0,
            &schema,
            &[("name".to_string(), Value::text("Nobody"))],
            &[],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_capture_host_output() {
        let mut host = CaptureHost::new();
        host.print("a");
        host.print_line("b");
        assert_eq!(host.output, "ab\n");
    }

    #[test]
    fn test_canned_http() {
        let mut host = CaptureHost::new().with_http(vec![HttpResponse {
            status: 200,
            body: "ok".to_string(),
            headers: vec![],
        }]);
        let first = host.http_request("https://example.com", "GET", "", &[]);
        assert_eq!(first.unwrap().body, "ok");
        let second = host.http_request("https://example.com", "GET", "", &[]);
        assert!(second.is_err());
        assert_eq!(host.requests_seen.len(), 2);
    }
}
