pub use duetcore::room::*;

pub mod loopback;

pub use loopback::LoopbackRoomService;
