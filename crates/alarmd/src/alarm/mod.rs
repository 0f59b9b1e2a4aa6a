//! Alarm evaluation pipeline: policy state machine, duplicate filter,
//! suppression check and the alert value the channels deliver.

mod alert;
mod filter;
mod policy;
mod suppress;

pub use alert::Alert;
pub use alert::APP_NAME;
pub use filter::DuplicateFilter;
pub use policy::AlarmPolicy;
pub use policy::Decision;
pub use policy::TriggerSource;
pub use suppress::SuppressionCheck;
