mod run;
mod signal;
mod vu;

pub use run::Workload;
pub use signal::StopSignal;
pub use vu::{VuEvent, VuState};
