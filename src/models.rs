use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PLAN_TYPE_WEEKLY: &str = "semanal";
pub const PLAN_TYPE_MONTHLY: &str = "plano";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPlanData {
    #[serde(default)]
    pub meses: Value,
    #[serde(rename = "valorMensal", default)]
    pub valor_mensal: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeeklyPlanData {
    #[serde(default)]
    pub semanas: Value,
    #[serde(rename = "valorSemanal", default)]
    pub valor_semanal: Value,
}

/// A client session as persisted by the store. Field names follow the
/// stored JSON; anything we do not model lands in `extra` and survives a
/// round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "nomeCliente", default, skip_serializing_if = "Option::is_none")]
    pub nome_cliente: Option<String>,
    #[serde(rename = "clientName", default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(rename = "dataNascimento", default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(rename = "dataAtendimento", default)]
    pub attendance_date: String,
    #[serde(rename = "valor", default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
    #[serde(rename = "finalizado", default)]
    pub finished: bool,
    #[serde(rename = "planoAtivo", default, skip_serializing_if = "is_false")]
    pub monthly_plan_active: bool,
    #[serde(rename = "planoData", default, skip_serializing_if = "Option::is_none")]
    pub monthly_plan: Option<MonthlyPlanData>,
    #[serde(rename = "semanalAtivo", default, skip_serializing_if = "is_false")]
    pub weekly_plan_active: bool,
    #[serde(rename = "semanalData", default, skip_serializing_if = "Option::is_none")]
    pub weekly_plan: Option<WeeklyPlanData>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl AnalysisRecord {
    /// `nomeCliente` wins over the legacy `clientName` when both are set.
    pub fn display_name(&self) -> &str {
        [self.nome_cliente.as_deref(), self.client_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
            .unwrap_or("")
    }

    pub fn amount(&self) -> f64 {
        parse_lenient_amount(&self.value)
    }

    pub fn attended_at(&self) -> Option<NaiveDateTime> {
        parse_attendance_datetime(&self.attendance_date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    Weekly,
    Monthly,
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub plan_type: String,
    #[serde(rename = "analysisId", default, skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<String>,
    #[serde(rename = "clientName", default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(rename = "dueDate", default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub paid: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlanRecord {
    pub fn kind(&self) -> PlanKind {
        match self.plan_type.as_str() {
            PLAN_TYPE_WEEKLY => PlanKind::Weekly,
            PLAN_TYPE_MONTHLY => PlanKind::Monthly,
            _ => PlanKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BirthdayNotice {
    pub name: String,
    pub birth_date: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RevenueStats {
    pub total: f64,
    pub week: f64,
    pub month: f64,
    pub year: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub finished: usize,
    pub in_progress: usize,
    pub attention: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusTab {
    #[default]
    All,
    Finished,
    InProgress,
}

impl StatusTab {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_lowercase().as_str() {
            "" | "all" => Ok(Self::All),
            "finished" => Ok(Self::Finished),
            "in-progress" | "in_progress" => Ok(Self::InProgress),
            other => Err(format!("tab must be all, finished or in-progress: {other}")),
        }
    }

    pub fn admits(self, record: &AnalysisRecord) -> bool {
        match self {
            Self::All => true,
            Self::Finished => record.finished,
            Self::InProgress => !record.finished,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Week,
    #[default]
    Month,
    Year,
    Total,
}

impl Period {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_lowercase().as_str() {
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "total" => Ok(Self::Total),
            other => Err(format!("period must be week, month, year or total: {other}")),
        }
    }
}

/// Numeric coercion for stored values: numbers pass through, numeric
/// strings are parsed, booleans count as 1/0, everything else is 0.
pub fn parse_lenient_amount(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => {
            let text = s.trim();
            if text.is_empty() {
                0.0
            } else {
                text.parse::<f64>().unwrap_or(0.0)
            }
        }
        Value::Bool(true) => 1.0,
        _ => 0.0,
    };
    if parsed.is_finite() {
        parsed
    } else {
        0.0
    }
}

/// Parses a positive installment count from a number or numeric string.
pub fn parse_count(value: &Value) -> u32 {
    let n = parse_lenient_amount(value);
    if n >= 1.0 {
        n.floor().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

pub fn parse_attendance_datetime(raw: &str) -> Option<NaiveDateTime> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date.and_time(NaiveTime::MIN));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Local).naive_local())
}

/// Truncates a birth date to its calendar date, ignoring time of day and
/// any offset.
pub fn normalize_birth_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    let date_part = text.split(['T', ' ']).next().unwrap_or(text);
    if let Ok(date) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        return Some(date);
    }
    if let Some(prefix) = text.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(date);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.date())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lenient_amount_follows_numeric_coercion() {
        assert_eq!(parse_lenient_amount(&json!(150)), 150.0);
        assert_eq!(parse_lenient_amount(&json!("80.5")), 80.5);
        assert_eq!(parse_lenient_amount(&json!("  ")), 0.0);
        assert_eq!(parse_lenient_amount(&json!("abc")), 0.0);
        assert_eq!(parse_lenient_amount(&json!(true)), 1.0);
        assert_eq!(parse_lenient_amount(&Value::Null), 0.0);
        assert_eq!(parse_lenient_amount(&json!([1, 2])), 0.0);
        assert_eq!(parse_lenient_amount(&json!("inf")), 0.0);
    }

    #[test]
    fn display_name_prefers_primary_field() {
        let rec: AnalysisRecord = serde_json::from_value(json!({
            "id": "a1",
            "clientName": "Legacy",
            "nomeCliente": "Maria",
        }))
        .expect("deserialize");
        assert_eq!(rec.display_name(), "Maria");

        let legacy: AnalysisRecord =
            serde_json::from_value(json!({"id": "a2", "clientName": "Joana"})).expect("legacy");
        assert_eq!(legacy.display_name(), "Joana");
    }

    #[test]
    fn unknown_fields_round_trip() {
        let raw = json!({
            "id": "a1",
            "nomeCliente": "Maria",
            "dataAtendimento": "2026-03-01",
            "valor": "120",
            "finalizado": true,
            "signo": "Leo",
        });
        let rec: AnalysisRecord = serde_json::from_value(raw.clone()).expect("deserialize");
        assert_eq!(rec.extra.get("signo"), Some(&json!("Leo")));
        assert_eq!(serde_json::to_value(&rec).expect("serialize"), raw);
    }

    #[test]
    fn attendance_dates_accept_common_shapes() {
        let midnight = NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_time(NaiveTime::MIN);
        assert_eq!(parse_attendance_datetime("2026-03-01"), Some(midnight));
        assert!(parse_attendance_datetime("2026-03-01T10:30").is_some());
        assert!(parse_attendance_datetime("2026-03-01T10:30:00Z").is_some());
        assert_eq!(parse_attendance_datetime("01/03/2026"), None);
        assert_eq!(parse_attendance_datetime(""), None);
    }

    #[test]
    fn birth_date_is_truncated_to_date() {
        let expected = NaiveDate::from_ymd_opt(1990, 5, 5);
        assert_eq!(normalize_birth_date("1990-05-05"), expected);
        assert_eq!(normalize_birth_date("1990-05-05T23:00:00-03:00"), expected);
        assert_eq!(normalize_birth_date("not a date"), None);
    }

    #[test]
    fn birth_date_accepts_unpadded_fields() {
        let expected = NaiveDate::from_ymd_opt(1990, 5, 5);
        assert_eq!(normalize_birth_date("1990-5-5"), expected);
        assert_eq!(normalize_birth_date(" 1990-5-05 "), expected);
        assert_eq!(normalize_birth_date("1990-5-5T08:30:00"), expected);
        assert_eq!(normalize_birth_date("1990-13-5"), None);
    }

    #[test]
    fn plan_kind_follows_type_tag() {
        let plan = |tag: &str| PlanRecord {
            plan_type: tag.to_string(),
            ..Default::default()
        };
        assert_eq!(plan(PLAN_TYPE_WEEKLY).kind(), PlanKind::Weekly);
        assert_eq!(plan(PLAN_TYPE_MONTHLY).kind(), PlanKind::Monthly);
        assert_eq!(plan("avulso").kind(), PlanKind::Other);
    }

    #[test]
    fn tab_and_period_parse() {
        assert_eq!(StatusTab::parse("in-progress"), Ok(StatusTab::InProgress));
        assert_eq!(StatusTab::parse(""), Ok(StatusTab::All));
        assert!(StatusTab::parse("paused").is_err());
        assert_eq!(Period::parse("YEAR"), Ok(Period::Year));
        assert!(Period::parse("decade").is_err());
        assert_eq!(Period::default(), Period::Month);
    }
}
