mod maintenance;
mod resolve;
mod search;

pub use maintenance::*;
pub use resolve::*;
pub use search::*;
