//! Browser side of the engagement worker, over the Chrome DevTools Protocol.

pub mod agent;
pub mod cdp;
pub mod driver;
pub mod pool;
pub mod tabs;
pub mod targets;
pub mod watcher;

pub use agent::{BrowserSignal, CdpPageAgent, PageReport};
pub use cdp::CdpClient;
pub use driver::CdpNavigationDriver;
pub use pool::CdpPool;
pub use targets::{DevtoolsEndpoint, TargetInfo};
pub use watcher::TargetWatcher;
