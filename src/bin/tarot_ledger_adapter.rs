use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::io::{self, Read};
use std::path::PathBuf;
use tarot_ledger_lib::{
    apply_embedded_migrations, inspect_status_at_path, AnalysisRecord, AnalysisStore,
    AnalysisViewModel, LedgerConfig, LedgerDb, NoticeLog, Period, SignalBus, SignalPublisher,
    Signal, StatusTab, Subscription,
};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct AdapterRequest {
    schema_version: u64,
    case: Option<AdapterCaseMeta>,
    endpoint: AdapterEndpoint,
    #[serde(default)]
    query: Value,
    #[serde(default)]
    dataset: AdapterDataset,
}

#[derive(Debug, Deserialize)]
struct AdapterCaseMeta {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdapterEndpoint {
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AdapterDataset {
    db_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OverviewQuery {
    tab: Option<String>,
    period: Option<String>,
    search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IdQuery {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpsertQuery {
    record: AnalysisRecord,
}

#[derive(Debug, Serialize)]
struct AdapterErrorBody {
    category: String,
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
enum AdapterResponse {
    #[serde(rename = "success")]
    Success { payload: Value },
    #[serde(rename = "error")]
    Error { error: AdapterErrorBody },
}

fn classify_error_message(message: &str) -> String {
    let validation_keywords = ["is required", "must be", "invalid for"];
    if validation_keywords.iter().any(|k| message.contains(k)) {
        return "VALIDATION_ERROR".to_string();
    }
    if message.contains("not found") {
        return "NOT_FOUND_ERROR".to_string();
    }
    "UNKNOWN_ERROR".to_string()
}

fn error_response(
    category: impl Into<String>,
    message: impl Into<String>,
    error_type: impl Into<String>,
) -> AdapterResponse {
    AdapterResponse::Error {
        error: AdapterErrorBody {
            category: category.into(),
            message: message.into(),
            error_type: error_type.into(),
        },
    }
}

fn parse_bool_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}

fn init_logging(config: &LedgerConfig, verbose: bool) {
    let fallback = if verbose {
        "debug".to_string()
    } else {
        config.log_filter.clone()
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .init();
}

fn read_stdin_json() -> Result<Value, String> {
    let mut raw = String::new();
    io::stdin()
        .read_to_string(&mut raw)
        .map_err(|e| format!("read stdin failed: {e}"))?;
    if raw.trim().is_empty() {
        return Err("empty stdin request".to_string());
    }
    serde_json::from_str::<Value>(&raw).map_err(|e| format!("invalid JSON request: {e}"))
}

fn parse_query<T: serde::de::DeserializeOwned + Default>(query: Value, endpoint: &str) -> Result<T, String> {
    if query.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(query).map_err(|e| format!("request.query invalid for {endpoint}: {e}"))
}

fn required_id(query: IdQuery) -> Result<String, String> {
    let id = query.id.unwrap_or_default().trim().to_string();
    if id.is_empty() {
        return Err("id is required".to_string());
    }
    Ok(id)
}

fn signal_names(watch: &Subscription) -> Vec<&'static str> {
    watch.drain().into_iter().map(Signal::name).collect()
}

fn dispatch(req: AdapterRequest, config: &LedgerConfig) -> Result<Value, String> {
    if req.schema_version != 1 {
        return Err(format!(
            "unsupported schema_version: {}",
            req.schema_version
        ));
    }

    let path = req
        .endpoint
        .path
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "request.endpoint.path missing".to_string())?;
    let db_path = req
        .dataset
        .db_path
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| config.db_path.clone());
    debug!(endpoint = path, db = %db_path.display(), "dispatching request");

    match path {
        "/api/db/status" => {
            let status = inspect_status_at_path(&db_path)?;
            serde_json::to_value(status).map_err(|e| format!("encode status failed: {e}"))
        }
        "/api/db/migrate" => {
            let result = apply_embedded_migrations(&db_path)?;
            serde_json::to_value(result).map_err(|e| format!("encode migrate result failed: {e}"))
        }
        "/api/plans/list" => {
            let plans = LedgerDb::open(&db_path)?.get_plans()?;
            Ok(json!({ "count": plans.len(), "plans": plans }))
        }
        "/api/analyses/upsert" => {
            let query: UpsertQuery = serde_json::from_value(req.query)
                .map_err(|e| format!("request.query invalid for {path}: {e}"))?;
            let db = LedgerDb::open(&db_path)?;
            let bus = SignalBus::new();
            let watch = bus.subscribe(&Signal::ALL);
            let stored = db.save_analysis_with_plan(&query.record)?;
            bus.publish(Signal::AnalysesUpdated);
            info!(id = %stored.id, "analysis upserted");
            Ok(json!({ "record": stored, "signals": signal_names(&watch) }))
        }
        "/api/analyses/overview" => {
            let query: OverviewQuery = parse_query(req.query, path)?;
            let notices = NoticeLog::new();
            let mut vm = AnalysisViewModel::mount(LedgerDb::open(&db_path)?, &notices, SignalBus::new())?;
            vm.set_period(config.default_period);
            if let Some(tab) = query.tab.as_deref() {
                vm.set_active_tab(StatusTab::parse(tab)?);
            }
            if let Some(period) = query.period.as_deref() {
                vm.set_period(Period::parse(period)?);
            }
            vm.set_search_term(query.search.unwrap_or_default());
            Ok(json!({
                "tab": vm.active_tab(),
                "period": vm.selected_period(),
                "search": vm.search_term(),
                "analyses": vm.visible_analyses(),
                "revenue": vm.revenue_stats(),
                "status_counts": vm.status_counts(),
                "birthday": vm.birthday_notice(),
            }))
        }
        "/api/analyses/delete" => {
            let id = required_id(parse_query(req.query, path)?)?;
            let notices = NoticeLog::new();
            let bus = SignalBus::new();
            let watch = bus.subscribe(&Signal::ALL);
            let mut vm = AnalysisViewModel::mount(LedgerDb::open(&db_path)?, &notices, bus.clone())?;
            vm.delete(&id)?;
            Ok(json!({
                "id": id,
                "deleted": true,
                "notices": notices.take(),
                "signals": signal_names(&watch),
            }))
        }
        "/api/analyses/toggle-finished" => {
            let id = required_id(parse_query(req.query, path)?)?;
            let notices = NoticeLog::new();
            let bus = SignalBus::new();
            let watch = bus.subscribe(&Signal::ALL);
            let mut vm = AnalysisViewModel::mount(LedgerDb::open(&db_path)?, &notices, bus.clone())?;
            if !vm.toggle_finished(&id)? {
                return Err(format!("analysis not found: {id}"));
            }
            let finished = vm
                .analyses()
                .iter()
                .find(|a| a.id == id)
                .map(|a| a.finished)
                .unwrap_or_default();
            Ok(json!({
                "id": id,
                "finished": finished,
                "notices": notices.take(),
                "signals": signal_names(&watch),
            }))
        }
        _ => Err(format!("unsupported endpoint path: {path}")),
    }
}

fn main() {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let pretty = parse_bool_flag(&args, "--pretty");
    let verbose = parse_bool_flag(&args, "--verbose");

    let config = match LedgerConfig::from_env() {
        Ok(config) => config,
        Err(message) => {
            let resp = error_response("CONFIG_ERROR", message, "AdapterError");
            print!(
                "{}",
                serde_json::to_string(&resp).unwrap_or_else(|_| "{\"status\":\"error\"}".to_string())
            );
            return;
        }
    };
    init_logging(&config, verbose);

    let resp = match read_stdin_json()
        .and_then(|v| {
            serde_json::from_value::<AdapterRequest>(v)
                .map_err(|e| format!("request root invalid: {e}"))
        })
        .and_then(|req| {
            if let Some(case_id) = req.case.as_ref().and_then(|c| c.id.as_deref()) {
                debug!(case = case_id, "adapter case");
            }
            dispatch(req, &config)
        }) {
        Ok(payload) => AdapterResponse::Success { payload },
        Err(message) => {
            let category = if message.starts_with("unsupported endpoint path:") {
                "UNSUPPORTED_ENDPOINT".to_string()
            } else if message.starts_with("unsupported schema_version:")
                || message.starts_with("request root invalid")
                || message.starts_with("request.endpoint")
                || message.starts_with("invalid JSON request:")
                || message == "empty stdin request"
            {
                "ADAPTER_PROTOCOL_ERROR".to_string()
            } else {
                classify_error_message(&message)
            };
            error_response(category, message, "AdapterError")
        }
    };

    let out = if pretty {
        serde_json::to_string_pretty(&resp)
    } else {
        serde_json::to_string(&resp)
    }
    .unwrap_or_else(|e| {
        json!({
            "status": "error",
            "error": {
                "category": "ADAPTER_PROTOCOL_ERROR",
                "message": format!("serialize response failed: {e}"),
                "type": "SerializeError",
            }
        })
        .to_string()
    });

    print!("{out}");
}
