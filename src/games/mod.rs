pub mod crash;
pub mod instant;
pub mod mines;
pub mod outcome;
pub mod session;
pub mod towers;
pub mod types;

pub use crash::{RoundActor, RoundDeps, RoundHandle};
pub use instant::InstantEngine;
pub use session::SessionEngine;
pub use types::*;
