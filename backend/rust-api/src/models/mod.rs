pub mod catalog;
pub mod progress;
pub mod user;

pub use catalog::{Exercise, ExerciseDocument, ExerciseKind, Part};
pub use progress::{AttemptRecord, AttemptView, RecordKey, RecordLevel};
pub use user::UserAccount;
