pub mod driver;
pub mod protocol;

pub use driver::{FrameTransmitter, LinkError};
pub use protocol::{Frame, FRAME_LEN};
