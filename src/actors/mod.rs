pub mod call_actor;
pub mod messages;

pub use call_actor::CallActor;
pub use messages::CallCommand;
