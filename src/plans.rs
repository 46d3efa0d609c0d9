use chrono::{Duration, Months};
use serde_json::Map;

use crate::models::{
    parse_attendance_datetime, parse_count, parse_lenient_amount, AnalysisRecord, PlanKind,
    PlanRecord, PLAN_TYPE_MONTHLY, PLAN_TYPE_WEEKLY,
};

fn week_prefix(analysis_id: &str) -> String {
    format!("{analysis_id}-week-")
}

fn month_prefix(analysis_id: &str) -> String {
    format!("{analysis_id}-month-")
}

/// A plan belongs to an analysis when it carries its id as back-reference
/// or when its id was generated from the analysis id.
pub fn is_dependent_plan(plan: &PlanRecord, analysis_id: &str) -> bool {
    if plan.analysis_id.as_deref() == Some(analysis_id) {
        return true;
    }
    plan.id.starts_with(&week_prefix(analysis_id)) || plan.id.starts_with(&month_prefix(analysis_id))
}

/// Returns the surviving plans and how many were dropped.
pub fn remove_dependent_plans(plans: Vec<PlanRecord>, analysis_id: &str) -> (Vec<PlanRecord>, usize) {
    let before = plans.len();
    let kept = plans
        .into_iter()
        .filter(|p| !is_dependent_plan(p, analysis_id))
        .collect::<Vec<_>>();
    let removed = before - kept.len();
    (kept, removed)
}

fn generated_index(plan_id: &str, prefix: &str) -> Option<u32> {
    plan_id.strip_prefix(prefix)?.parse::<u32>().ok()
}

fn build_installments(
    analysis: &AnalysisRecord,
    prefix: &str,
    plan_type: &str,
    count: u32,
    amount: f64,
    due_for: impl Fn(u32) -> Option<String>,
) -> Vec<PlanRecord> {
    (1..=count)
        .map(|n| PlanRecord {
            id: format!("{prefix}{n}"),
            plan_type: plan_type.to_string(),
            analysis_id: Some(analysis.id.clone()),
            client_name: Some(analysis.display_name().to_string()).filter(|s| !s.is_empty()),
            amount: Some(amount),
            due_date: due_for(n),
            paid: false,
            extra: Map::new(),
        })
        .collect()
}

/// Recurring installments implied by a finished analysis.
pub fn expected_plans(analysis: &AnalysisRecord) -> Vec<PlanRecord> {
    if !analysis.finished {
        return Vec::new();
    }
    let start = parse_attendance_datetime(&analysis.attendance_date).map(|dt| dt.date());
    let mut out = Vec::new();

    if analysis.monthly_plan_active {
        if let Some(data) = &analysis.monthly_plan {
            let count = parse_count(&data.meses);
            let amount = parse_lenient_amount(&data.valor_mensal);
            out.extend(build_installments(
                analysis,
                &month_prefix(&analysis.id),
                PLAN_TYPE_MONTHLY,
                count,
                amount,
                |n| {
                    start
                        .and_then(|d| d.checked_add_months(Months::new(n)))
                        .map(|d| d.format("%Y-%m-%d").to_string())
                },
            ));
        }
    }

    if analysis.weekly_plan_active {
        if let Some(data) = &analysis.weekly_plan {
            let count = parse_count(&data.semanas);
            let amount = parse_lenient_amount(&data.valor_semanal);
            out.extend(build_installments(
                analysis,
                &week_prefix(&analysis.id),
                PLAN_TYPE_WEEKLY,
                count,
                amount,
                |n| {
                    start
                        .and_then(|d| d.checked_add_signed(Duration::weeks(i64::from(n))))
                        .map(|d| d.format("%Y-%m-%d").to_string())
                },
            ));
        }
    }
    out
}

/// Merges the installments of `analysis` into `plans`.
///
/// Existing installments keep their `paid` flag and any extra fields.
/// Generated installments beyond the configured count are dropped, and
/// plans of unrelated analyses are never touched. Unfinished analyses
/// leave the plan list as is.
pub fn sync_plans_for_analysis(plans: Vec<PlanRecord>, analysis: &AnalysisRecord) -> Vec<PlanRecord> {
    if !analysis.finished {
        return plans;
    }
    let expected = expected_plans(analysis);
    let monthly_prefix = month_prefix(&analysis.id);
    let weekly_prefix = week_prefix(&analysis.id);
    let count_of = |kind: PlanKind| expected.iter().filter(|p| p.kind() == kind).count() as u32;
    let monthly_count = count_of(PlanKind::Monthly);
    let weekly_count = count_of(PlanKind::Weekly);

    let mut out = Vec::with_capacity(plans.len() + expected.len());
    for plan in plans {
        let surplus = generated_index(&plan.id, &monthly_prefix).is_some_and(|n| n > monthly_count)
            || generated_index(&plan.id, &weekly_prefix).is_some_and(|n| n > weekly_count);
        if surplus {
            continue;
        }
        out.push(plan);
    }

    for fresh in expected {
        match out.iter_mut().find(|p| p.id == fresh.id) {
            Some(existing) => {
                existing.plan_type = fresh.plan_type;
                existing.analysis_id = fresh.analysis_id;
                existing.client_name = fresh.client_name;
                existing.amount = fresh.amount;
                existing.due_date = fresh.due_date;
            }
            None => out.push(fresh),
        }
    }
    out
}
