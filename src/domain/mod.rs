mod account;
mod entry;
mod money;
mod period;
mod posting;
mod reference;
mod ticket;

pub use account::*;
pub use entry::*;
pub use money::*;
pub use period::*;
pub use posting::*;
pub use reference::*;
pub use ticket::*;
