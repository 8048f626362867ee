//! facegate-hw — Webcam access.
//!
//! Provides V4L2-based capture and conversion of YUYV, MJPG, GREY and Y16
//! buffers to 8-bit RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraStream, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
