pub mod container;
pub mod ports;

pub use container::{ComposeBackend, ComposeProject, ServiceHandle};
pub use ports::PublishedPort;
