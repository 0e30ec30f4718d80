pub mod actor;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod registry;

pub use connection::{Connection, SendFailure};
pub use registry::{deliver, SessionRegistry};
