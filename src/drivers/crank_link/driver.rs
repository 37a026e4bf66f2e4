//! Crank sensor link frame transmitter
//! ===========================================================

use super::protocol::{Frame, FRAME_LEN};
use embedded_io_async::Write;

/* ------------------------------------------------------------------------- */
/*  Error enum                                                               */
/* ------------------------------------------------------------------------- */
/// Fatal link failures. There is no partial-frame recovery: a receiver that
/// aligns on the fixed frame size cannot resync from a fragment.
#[derive(Debug, PartialEq, Eq, defmt::Format)]
pub enum LinkError<E> {
    Write(E),
    Flush(E),
    /// The sink accepted fewer bytes than a whole frame.
    ShortWrite { written: usize },
}

/* ------------------------------------------------------------------------- */
/*  Main driver struct                                                       */
/* ------------------------------------------------------------------------- */
/// Owns the byte sink for the whole run; dropping the transmitter releases it.
pub struct FrameTransmitter<W> {
    sink: W,
    flush_each_frame: bool,
}

impl<W: Write> FrameTransmitter<W> {
    pub fn new(sink: W, flush_each_frame: bool) -> Self {
        Self {
            sink,
            flush_each_frame,
        }
    }

    /// Hand one frame to the sink with a single write.
    ///
    /// With `flush_each_frame` this only returns once the sink reports the
    /// bytes have left its local buffer, which makes the return the point at
    /// which the pacer should measure.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), LinkError<W::Error>> {
        let written = self
            .sink
            .write(frame.as_bytes())
            .await
            .map_err(LinkError::Write)?;
        if written != FRAME_LEN {
            return Err(LinkError::ShortWrite { written });
        }
        if self.flush_each_frame {
            self.sink.flush().await.map_err(LinkError::Flush)?;
        }
        Ok(())
    }

    /// Wait for everything queued so far to go out. Used before release.
    pub async fn drain(&mut self) -> Result<(), LinkError<W::Error>> {
        self.sink.flush().await.map_err(LinkError::Flush)
    }

    pub fn flushes_each_frame(&self) -> bool {
        self.flush_each_frame
    }
}
