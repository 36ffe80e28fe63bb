mod install;
mod notifications;
mod recents;
mod store;
mod watch;

pub use install::*;
pub use notifications::*;
pub use recents::*;
pub use store::*;
pub use watch::*;
