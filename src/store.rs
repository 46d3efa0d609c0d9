use chrono::Local;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use uuid::Uuid;

use crate::models::{AnalysisRecord, PlanRecord};
use crate::plans::sync_plans_for_analysis;
use crate::stats::is_birthday_text_on;

/// Durable source of truth for analyses and plans.
pub trait AnalysisStore {
    fn get_all_analyses(&self) -> Result<Vec<AnalysisRecord>, String>;
    fn delete_analysis(&self, id: &str) -> Result<(), String>;
    /// Upserts `record` and creates or updates the recurring plans tied to
    /// its completion state. Returns the record as stored (a missing id is
    /// assigned here).
    fn save_analysis_with_plan(&self, record: &AnalysisRecord) -> Result<AnalysisRecord, String>;
    /// `date` is a `YYYY-MM-DD` birth date.
    fn is_client_birthday_today(&self, date: &str) -> bool;
    fn get_plans(&self) -> Result<Vec<PlanRecord>, String>;
    /// Replaces the whole plan list.
    fn save_plans(&self, plans: &[PlanRecord]) -> Result<(), String>;
}

impl<S: AnalysisStore + ?Sized> AnalysisStore for Rc<S> {
    fn get_all_analyses(&self) -> Result<Vec<AnalysisRecord>, String> {
        (**self).get_all_analyses()
    }
    fn delete_analysis(&self, id: &str) -> Result<(), String> {
        (**self).delete_analysis(id)
    }
    fn save_analysis_with_plan(&self, record: &AnalysisRecord) -> Result<AnalysisRecord, String> {
        (**self).save_analysis_with_plan(record)
    }
    fn is_client_birthday_today(&self, date: &str) -> bool {
        (**self).is_client_birthday_today(date)
    }
    fn get_plans(&self) -> Result<Vec<PlanRecord>, String> {
        (**self).get_plans()
    }
    fn save_plans(&self, plans: &[PlanRecord]) -> Result<(), String> {
        (**self).save_plans(plans)
    }
}

/// Returns the record to persist. An id already present in the store is kept
/// byte for byte; only a blank id with no stored match gets a fresh UUID.
pub(crate) fn resolve_record_id(record: &AnalysisRecord, already_stored: bool) -> AnalysisRecord {
    let mut stored = record.clone();
    if !already_stored && stored.id.trim().is_empty() {
        stored.id = Uuid::new_v4().to_string();
    }
    stored
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ReadAnalyses,
    DeleteAnalysis,
    SaveAnalysis,
    ReadPlans,
    SavePlans,
}

type BirthdayPredicate = Box<dyn Fn(&str) -> bool>;

/// Process-local store. Operations listed via [`MemoryStore::set_failing`]
/// return an error instead of touching the data.
#[derive(Default)]
pub struct MemoryStore {
    analyses: RefCell<Vec<AnalysisRecord>>,
    plans: RefCell<Vec<PlanRecord>>,
    failing: RefCell<HashSet<StoreOp>>,
    birthday: Option<BirthdayPredicate>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(analyses: Vec<AnalysisRecord>, plans: Vec<PlanRecord>) -> Self {
        Self {
            analyses: RefCell::new(analyses),
            plans: RefCell::new(plans),
            ..Self::default()
        }
    }

    /// Replaces the "today" check, e.g. to pin the calendar in tests.
    pub fn with_birthday_predicate(mut self, predicate: impl Fn(&str) -> bool + 'static) -> Self {
        self.birthday = Some(Box::new(predicate));
        self
    }

    pub fn set_failing(&self, op: StoreOp, failing: bool) {
        let mut set = self.failing.borrow_mut();
        if failing {
            set.insert(op);
        } else {
            set.remove(&op);
        }
    }

    pub fn analyses(&self) -> Vec<AnalysisRecord> {
        self.analyses.borrow().clone()
    }

    pub fn plans(&self) -> Vec<PlanRecord> {
        self.plans.borrow().clone()
    }

    fn check(&self, op: StoreOp) -> Result<(), String> {
        if self.failing.borrow().contains(&op) {
            Err(format!("memory store: {op:?} unavailable"))
        } else {
            Ok(())
        }
    }
}

impl AnalysisStore for MemoryStore {
    fn get_all_analyses(&self) -> Result<Vec<AnalysisRecord>, String> {
        self.check(StoreOp::ReadAnalyses)?;
        Ok(self.analyses())
    }

    fn delete_analysis(&self, id: &str) -> Result<(), String> {
        self.check(StoreOp::DeleteAnalysis)?;
        self.analyses.borrow_mut().retain(|a| a.id != id);
        Ok(())
    }

    fn save_analysis_with_plan(&self, record: &AnalysisRecord) -> Result<AnalysisRecord, String> {
        self.check(StoreOp::SaveAnalysis)?;
        let stored = {
            let mut analyses = self.analyses.borrow_mut();
            match analyses.iter_mut().find(|a| a.id == record.id) {
                Some(existing) => {
                    *existing = resolve_record_id(record, true);
                    existing.clone()
                }
                None => {
                    let stored = resolve_record_id(record, false);
                    analyses.push(stored.clone());
                    stored
                }
            }
        };
        let current = std::mem::take(&mut *self.plans.borrow_mut());
        *self.plans.borrow_mut() = sync_plans_for_analysis(current, &stored);
        Ok(stored)
    }

    fn is_client_birthday_today(&self, date: &str) -> bool {
        match &self.birthday {
            Some(predicate) => predicate(date),
            None => is_birthday_text_on(date, Local::now().date_naive()),
        }
    }

    fn get_plans(&self) -> Result<Vec<PlanRecord>, String> {
        self.check(StoreOp::ReadPlans)?;
        Ok(self.plans())
    }

    fn save_plans(&self, plans: &[PlanRecord]) -> Result<(), String> {
        self.check(StoreOp::SavePlans)?;
        *self.plans.borrow_mut() = plans.to_vec();
        Ok(())
    }
}
