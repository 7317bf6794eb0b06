//! Fee ledger generation: resolve what a student owes, then materialize it month by month.

mod collect;
mod cycle;
mod generate;
mod ledger;
mod structure;

pub use collect::record_payment;
pub use cycle::{period_amount, should_bill_this_month};
pub use generate::{
    generate_for_school, generate_for_student, generate_monthly_fee_components, GenerationSummary,
    SchoolGenerationSummary,
};
pub use ledger::{monthly_fee_ledger, FeeLedger, LedgerMonth, LedgerPage, DEFAULT_LEDGER_LIMIT};
pub use structure::{load_assigned_fee_structure, AppliedOverride, FeeKind, FeeLine, FeeStructure};
