// apbatch Infrastructure - System Adapters
// Implements: ReachabilityProber, RemoteShell, BrowserDriver

mod process;
pub mod subprocess_prober;
pub mod subprocess_shell;
pub mod webdriver;

pub use subprocess_prober::SubprocessProber;
pub use subprocess_shell::{SshOptions, SubprocessShell};
pub use webdriver::{WebDriverBrowser, WebDriverConfig};
