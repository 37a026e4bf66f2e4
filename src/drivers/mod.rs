pub mod crank_link;

pub use crank_link::{Frame, FrameTransmitter, LinkError};
