// Port Layer - Interfaces for external dependencies

pub mod browser;
pub mod credential_store;
pub mod device_status;
pub mod id_provider; // For deterministic testing
pub mod reachability;
pub mod remote_shell;
pub mod target_registry;
pub mod time_provider;

// Re-exports
pub use browser::{ActionReport, BrowserDriver, BrowserError, TabId};
pub use credential_store::{Credential, CredentialError, CredentialStore};
pub use device_status::{DeviceStatus, DeviceStatusReporter, StatusReport};
pub use id_provider::IdProvider;
pub use reachability::{ProbeError, ReachabilityProber};
pub use remote_shell::{RemoteShell, ShellError, ShellOutput, ShellRequest};
pub use target_registry::{RegistryError, TargetQuery, TargetRegistry};
pub use time_provider::TimeProvider;
