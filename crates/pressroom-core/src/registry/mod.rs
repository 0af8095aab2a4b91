//! Handler seams for step execution and job processing.
//!
//! Both traits use native async fn in traits (RPITIT), so dynamic dispatch
//! goes through object-safe `*Dyn` companions with boxed futures and a
//! blanket impl, wrapped by `BoxStepHandler` / `BoxJobProcessor`.

mod processor;
mod step;

pub use processor::{BoxJobProcessor, JobProcessor, JobProcessorDyn, ProcessorMap};
pub use step::{BoxStepHandler, StepHandler, StepHandlerDyn, StepInput, StepOutput, StepRegistry};
