//! Raw video frames entering the send path

use bytes::Bytes;

/// Raw captured video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Raw pixel data (I420)
    pub data: Bytes,
    /// RTP timestamp (90 kHz)
    pub rtp_timestamp: u32,
    /// Capture time in milliseconds
    pub capture_time_ms: i64,
}

impl VideoFrame {
    /// Create a frame with zeroed timestamps
    pub fn new(width: u32, height: u32, data: Bytes) -> Self {
        Self {
            width,
            height,
            data,
            rtp_timestamp: 0,
            capture_time_ms: 0,
        }
    }

    /// Set capture time and derive the 90 kHz RTP timestamp from it
    pub fn with_capture_time(mut self, capture_time_ms: i64) -> Self {
        self.capture_time_ms = capture_time_ms;
        self.rtp_timestamp = (capture_time_ms.wrapping_mul(90)) as u32;
        self
    }

    /// Black I420 frame of the given size
    pub fn black(width: u32, height: u32) -> Self {
        let y = (width * height) as usize;
        let mut data = vec![0u8; y + y / 2];
        data[y..].fill(128);
        Self::new(width, height, Bytes::from(data))
    }

    /// Expected I420 buffer size for the frame dimensions
    pub fn i420_size(&self) -> usize {
        let y = (self.width * self.height) as usize;
        y + y / 2
    }
}
