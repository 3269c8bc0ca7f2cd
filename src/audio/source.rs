use super::AudioFrame;
use crate::error::Result;

/// Callback invoked from the capture thread for every produced frame.
/// Must never block; the pipeline absorbs frames through the ring buffer.
pub type FrameSink = Box<dyn FnMut(AudioFrame) + Send>;

/// Platform audio capture, supplied by the embedding application.
///
/// Implementations deliver [`AudioFrame`]s at a fixed sample rate and frame
/// size via the sink passed to [`start`](Self::start). `pause`/`resume`
/// gate frame production only; the rest of the pipeline keeps draining
/// whatever is already buffered.
pub trait AudioSource: Send {
    fn start(&mut self, sink: FrameSink) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}
