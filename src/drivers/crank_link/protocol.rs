// Crank sensor link wire format.
//
// Every step is one fixed 4-byte frame, both fields big-endian:
//
//   [ c_hi | c_lo | v_hi | v_lo ]
//
// c = step duration in reference clock ticks (constant for a run)
// v = waveform sample
//
// No sync bytes and no checksum: the receiver keeps frame alignment from the
// fixed size.

use bytemuck::{Pod, Zeroable};

pub const FRAME_LEN: usize = 4;

/// Byte offsets inside a frame
pub mod idx {
    pub const TIMING_CONSTANT: usize = 0;
    pub const SAMPLE: usize = 2;
}

/// Wire-format frame: exactly the bytes the UART shifts out.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod, defmt::Format)]
pub struct Frame {
    timing_constant: [u8; 2],
    sample: [u8; 2],
}

impl Frame {
    #[inline]
    pub fn new(timing_constant: u16, sample: u16) -> Self {
        Self {
            timing_constant: timing_constant.to_be_bytes(),
            sample: sample.to_be_bytes(),
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(bytes: [u8; FRAME_LEN]) -> Self {
        bytemuck::cast(bytes)
    }

    pub fn timing_constant(&self) -> u16 {
        u16::from_be_bytes(self.timing_constant)
    }

    pub fn sample(&self) -> u16 {
        u16::from_be_bytes(self.sample)
    }
}
