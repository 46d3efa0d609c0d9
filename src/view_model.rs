//! View-model behind the analyses screen.
//!
//! Holds the cached analyses plus the user's filter selections and derives
//! everything else on read. Mutations write to the store first and only
//! then touch the cache and broadcast, so a failed write never shows a
//! state the store does not have.

use chrono::{Local, NaiveDateTime};
use std::collections::HashSet;
use tracing::{error, info, warn};

use crate::models::{AnalysisRecord, BirthdayNotice, Period, RevenueStats, StatusCounts, StatusTab};
use crate::notify::Notifier;
use crate::plans::remove_dependent_plans;
use crate::signals::{Signal, SignalBus, SignalPublisher, Subscription};
use crate::stats;
use crate::store::AnalysisStore;

const MSG_DELETED: &str = "Analysis deleted successfully";
const MSG_DELETE_FAILED: &str = "Failed to delete analysis";
const MSG_FINALIZED: &str = "Analysis finalized successfully";
const MSG_REOPENED: &str = "Analysis reopened successfully";
const MSG_UPDATE_FAILED: &str = "Failed to update analysis";

pub struct AnalysisViewModel<S: AnalysisStore, N: Notifier> {
    store: S,
    notifier: N,
    bus: SignalBus,
    subscription: Option<Subscription>,
    analyses: Vec<AnalysisRecord>,
    search_term: String,
    active_tab: StatusTab,
    selected_period: Period,
    birthday: Option<BirthdayNotice>,
}

impl<S: AnalysisStore, N: Notifier> AnalysisViewModel<S, N> {
    /// Subscribes to `analyses-updated` and performs the initial load.
    pub fn mount(store: S, notifier: N, bus: SignalBus) -> Result<Self, String> {
        let subscription = bus.subscribe(&[Signal::AnalysesUpdated]);
        let mut vm = Self {
            store,
            notifier,
            bus,
            subscription: Some(subscription),
            analyses: Vec::new(),
            search_term: String::new(),
            active_tab: StatusTab::default(),
            selected_period: Period::default(),
            birthday: None,
        };
        vm.load_all()?;
        Ok(vm)
    }

    /// Releases the bus subscription. Dropping the view-model does the same.
    pub fn unmount(mut self) {
        self.subscription = None;
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn load_all(&mut self) -> Result<(), String> {
        let fetched = self.store.get_all_analyses()?;
        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(fetched.len());
        for record in fetched {
            if seen.insert(record.id.clone()) {
                records.push(record);
            } else {
                warn!(id = %record.id, "duplicate analysis id from store ignored");
            }
        }

        let store = &self.store;
        self.birthday = stats::find_birthday(&records, |date| store.is_client_birthday_today(date));
        info!(
            count = records.len(),
            birthday = self.birthday.is_some(),
            "analyses loaded"
        );
        self.analyses = records;
        Ok(())
    }

    /// Drains pending signals and reloads once if the analyses changed.
    pub fn pump_signals(&mut self) -> Result<bool, String> {
        let Some(subscription) = &self.subscription else {
            return Ok(false);
        };
        let received = subscription.drain();
        if !received.contains(&Signal::AnalysesUpdated) {
            return Ok(false);
        }
        self.load_all()?;
        Ok(true)
    }

    pub fn analyses(&self) -> &[AnalysisRecord] {
        &self.analyses
    }

    pub fn tab_analyses(&self) -> Vec<AnalysisRecord> {
        stats::filter_by_tab(&self.analyses, self.active_tab)
    }

    /// Tab filter plus the search term; what a list view renders.
    pub fn visible_analyses(&self) -> Vec<AnalysisRecord> {
        stats::filter_by_search(self.tab_analyses(), &self.search_term)
    }

    pub fn revenue_stats(&self) -> RevenueStats {
        self.revenue_stats_at(Local::now().naive_local())
    }

    pub fn revenue_stats_at(&self, now: NaiveDateTime) -> RevenueStats {
        stats::revenue_stats(&self.tab_analyses(), self.selected_period, now)
    }

    /// Counts ignore the active tab.
    pub fn status_counts(&self) -> StatusCounts {
        stats::status_counts(&self.analyses)
    }

    pub fn birthday_notice(&self) -> Option<&BirthdayNotice> {
        self.birthday.as_ref()
    }

    pub fn active_tab(&self) -> StatusTab {
        self.active_tab
    }

    pub fn set_active_tab(&mut self, tab: StatusTab) {
        self.active_tab = tab;
    }

    pub fn selected_period(&self) -> Period {
        self.selected_period
    }

    pub fn set_period(&mut self, period: Period) {
        self.selected_period = period;
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
    }

    fn remove_plans_of(&self, id: &str) -> Result<usize, String> {
        let plans = self.store.get_plans()?;
        let (kept, removed) = remove_dependent_plans(plans, id);
        if removed > 0 {
            self.store.save_plans(&kept)?;
            info!(analysis = id, removed, "removed plans tied to analysis");
        }
        Ok(removed)
    }

    // Plan cleanup and the analysis delete are separate store writes; a
    // failure in between leaves the plans gone and the analysis in place.
    fn try_delete(&mut self, id: &str) -> Result<(), String> {
        if self.analyses.iter().any(|a| a.id == id) {
            self.remove_plans_of(id)?;
        }
        self.store.delete_analysis(id)?;
        self.analyses.retain(|a| a.id != id);
        for signal in [
            Signal::AnalysesUpdated,
            Signal::PlansUpdated,
            Signal::PaymentUpdated,
        ] {
            self.bus.publish(signal);
        }
        Ok(())
    }

    pub fn delete(&mut self, id: &str) -> Result<(), String> {
        match self.try_delete(id) {
            Ok(()) => {
                self.notifier.notify_success(MSG_DELETED);
                Ok(())
            }
            Err(err) => {
                error!(id, "delete analysis failed: {err}");
                self.notifier.notify_failure(MSG_DELETE_FAILED);
                Err(err)
            }
        }
    }

    /// Returns `Ok(false)` when `id` is not cached.
    pub fn toggle_finished(&mut self, id: &str) -> Result<bool, String> {
        let Some(current) = self.analyses.iter().find(|a| a.id == id) else {
            return Ok(false);
        };
        let original_id = current.id.clone();
        let mut updated = current.clone();
        updated.finished = !updated.finished;

        let stored = match self.store.save_analysis_with_plan(&updated) {
            Ok(stored) => stored,
            Err(err) => {
                error!(id, "toggle finished failed: {err}");
                self.notifier.notify_failure(MSG_UPDATE_FAILED);
                return Err(err);
            }
        };
        let finished = stored.finished;
        if let Some(slot) = self.analyses.iter_mut().find(|a| a.id == original_id) {
            // The cached id is what the store keys on; keep it as loaded.
            *slot = AnalysisRecord {
                id: original_id,
                ..stored
            };
        }
        self.notifier
            .notify_success(if finished { MSG_FINALIZED } else { MSG_REOPENED });
        self.bus.publish(Signal::AnalysesUpdated);
        Ok(true)
    }
}
