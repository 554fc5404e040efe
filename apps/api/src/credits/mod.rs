// Credit Ledger: monthly AI credit metering with free/premium tiers.
// Gates every AI route before the LLM provider is called.

pub mod handlers;
pub mod ledger;
#[cfg(test)]
pub mod memory;
pub mod operation;
pub mod plan;
pub mod store;

pub use ledger::{CreditCheck, CreditDenial, CreditLedger};
pub use operation::AiOperation;
pub use plan::PlanTier;
