pub mod cursor;
pub mod index;
pub mod materializer;
pub mod recurrence;

pub use index::AvailabilityIndex;
pub use materializer::SlotMaterializer;
pub use recurrence::{CompiledRule, RecurrenceRule, RecurrenceRuleCompiler};
