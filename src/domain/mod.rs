mod debounce;
mod entry;
mod layout;
mod recents;

pub use debounce::*;
pub use entry::*;
pub use layout::*;
pub use recents::*;
