pub mod config;
pub mod ledger_db;
pub mod models;
pub mod notify;
pub mod plans;
pub mod signals;
pub mod stats;
pub mod store;
pub mod view_model;

pub use config::LedgerConfig;
pub use ledger_db::{
    apply_embedded_migrations, inspect_status_at_path, LedgerDb, LedgerDbMigrateResult,
    LedgerDbStatus,
};
pub use models::{
    AnalysisRecord, BirthdayNotice, Period, PlanKind, PlanRecord, RevenueStats, StatusCounts,
    StatusTab,
};
pub use notify::{Notice, NoticeLevel, NoticeLog, Notifier, TracingNotifier};
pub use signals::{Signal, SignalBus, SignalPublisher, Subscription};
pub use store::{AnalysisStore, MemoryStore, StoreOp};
pub use view_model::AnalysisViewModel;
