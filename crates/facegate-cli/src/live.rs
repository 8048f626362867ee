use facegate_core::FrameSource;
use facegate_hw::{CameraError, CameraStream};
use image::RgbImage;

/// Camera stream as a frame source for a match session.
pub struct LiveFeed<'a> {
    stream: CameraStream<'a>,
    dark_frames: usize,
}

impl<'a> LiveFeed<'a> {
    pub fn new(stream: CameraStream<'a>) -> Self {
        Self { stream, dark_frames: 0 }
    }

    pub fn dark_frames(&self) -> usize {
        self.dark_frames
    }
}

impl FrameSource for LiveFeed<'_> {
    type Error = CameraError;

    fn next_frame(&mut self) -> Result<RgbImage, CameraError> {
        let frame = self.stream.next_frame()?;
        if frame.is_dark {
            self.dark_frames += 1;
            tracing::debug!(seq = frame.sequence, "dark frame");
        }
        Ok(frame.into_image())
    }
}
