// Core studio library modules

pub mod activity;
pub mod config;
pub mod jobs;
pub mod lifecycle;
pub mod params;
pub mod poller;
pub mod runner;
pub mod session;
pub mod submit;
pub mod view;

// Re-export commonly used types
pub use config::{load_config, StudioConfig};
pub use jobs::{JobKind, JobRecord, JobStatus, JobStore};
pub use lifecycle::{apply_signal, PollPolicy, Signal, StatusDriver};
pub use params::{Asset, JobParameters, VideoStyle};
pub use runner::{HttpRunner, JobRunner, SimulatedRunner};
pub use session::{Outcome, Session, SessionError};
pub use submit::{submit, validate, ValidationError};
pub use view::{on_action, render, Action, Command, ViewModel};
