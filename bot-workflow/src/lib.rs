pub mod bootstrap;
pub mod credentials;
pub mod engine;
pub mod registry;
pub mod templates;

pub use bootstrap::{authorize, AUTH_TIMEOUT};
pub use credentials::CredentialStore;
pub use engine::{EngineState, ForumFailure, MonitorEngine};
pub use registry::ForumRegistry;
pub use templates::{Template, TemplatePool, MAX_TEMPLATE_BYTES};
