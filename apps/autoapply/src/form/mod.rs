//! Form model and fill logic shared by every site adapter.

pub mod classifier;
pub mod handlers;
pub mod policy;
pub mod step;

pub use classifier::FieldClassifier;
pub use handlers::{FieldHandler, Pass};
pub use policy::FillPolicy;
pub use step::{FieldId, FormStep, StepControl, StepState};
