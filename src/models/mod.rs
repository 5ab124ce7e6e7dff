mod session;

pub use session::{SessionSnapshot, SessionStatus};
