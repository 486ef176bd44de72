pub mod replica;
pub mod session;

pub use replica::{Marker, PlayerInfo, Replica, MARKER_SIZE};
pub use session::{ViewerError, ViewerSession};
