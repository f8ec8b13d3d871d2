//! Session handler, GPU broadcast hub, service orchestrator and HTTP control
//! surface (C11-C13, §4.11-§4.13, §6).

pub mod gpu_hub;
pub mod http;
pub mod orchestrator;
pub mod session;
pub mod state;
pub mod websocket;

pub use gpu_hub::GpuHub;
pub use orchestrator::{Orchestrator, ServiceEntry, ServiceStatus};
pub use state::AppState;
