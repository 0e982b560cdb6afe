//! Send Path Demo
//!
//! Runs a two-layer simulcast send path against a toy encoder and a transport
//! that only counts bytes. The congestion controller estimate ramps down to
//! zero and back up, the receiver asks for a key frame, and the collected
//! statistics are printed as JSON at the end.
//!
//! Pass a config file path as the first argument to override the built-in
//! configuration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use tokio::time::sleep;

use vidsend::*;

const DEMO_CONFIG: &str = r#"{
    "number_of_cores": 2,
    "codec": { "payload_type": 96, "name": "VP8", "width": 1280, "height": 720,
               "max_framerate": 30, "start_bitrate_bps": 600000 },
    "streams": [
        { "id": 1001, "width": 320, "height": 180,
          "min_bitrate_bps": 50000, "max_bitrate_bps": 200000 },
        { "id": 1002, "min_bitrate_bps": 300000, "max_bitrate_bps": 1500000 }
    ],
    "min_transmit_bitrate_bps": 100000,
    "protection": { "nack": true, "fec": false }
}"#;

/// Produces a fake bitstream sized from the allocated bitrate
#[derive(Debug, Default)]
struct ToyEncoder {
    layer_bytes: Vec<usize>,
}

impl VideoEncoder for ToyEncoder {
    fn implementation_name(&self) -> &str {
        "toy-vp8"
    }

    fn init_encode(&mut self, settings: &EncoderSettings) -> EncoderResult<()> {
        self.layer_bytes = vec![0; settings.codec.number_of_streams()];
        Ok(())
    }

    fn set_rates(&mut self, allocation: &BitrateAllocation) -> EncoderResult<()> {
        let fps = allocation.framerate.max(1) as usize;
        self.layer_bytes = allocation
            .layers()
            .map(|(_, bps)| bps as usize / 8 / fps)
            .collect();
        Ok(())
    }

    fn encode(
        &mut self,
        frame: &VideoFrame,
        request: &EncodeRequest,
        output: &EncodedOutputSink,
    ) -> EncoderResult<()> {
        for (idx, (stream_id, frame_type)) in request.frame_types.iter().enumerate() {
            let mut size = self.layer_bytes.get(idx).copied().unwrap_or(0);
            if frame_type.is_key() {
                size *= 4;
            }
            let image = EncodedImage {
                stream_id,
                payload: Bytes::from(vec![0u8; size.max(1)]),
                frame_type: *frame_type,
                width: frame.width,
                height: frame.height,
                rtp_timestamp: frame.rtp_timestamp,
                capture_time_ms: frame.capture_time_ms,
            };
            output.deliver(
                image,
                None,
                RtpVideoHeader {
                    codec: VideoCodecType::Vp8,
                    simulcast_idx: idx as u8,
                    picture_id: Some(output.frame_id() as u16 & 0x7fff),
                    temporal_idx: None,
                },
            )?;
        }
        Ok(())
    }
}

/// Transport that counts routed bytes
#[derive(Debug, Default)]
struct ByteCounter {
    bytes: AtomicU64,
}

impl PayloadRouter for ByteCounter {
    fn route_encoded_image(
        &self,
        _payload_type: u8,
        image: &EncodedImage,
        _fragmentation: Option<&FragmentationHeader>,
        _header: &RtpVideoHeader,
    ) -> SendPathResult<()> {
        self.bytes.fetch_add(image.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => SendPathConfig::from_file(&path)
            .with_context(|| format!("loading send path config from {}", path))?,
        None => SendPathConfig::from_json_str(DEMO_CONFIG)?,
    };
    init_logging(config.log_format)?;

    println!("🎥 vidsend Send Path Demo");
    println!("=========================");

    let router = Arc::new(ByteCounter::default());
    let (stream, mut events) =
        VideoSendStream::start(&config, router.clone(), Box::new(ToyEncoder::default()))?;

    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if !matches!(event, SendEvent::Statistics(_)) {
                println!("  📣 {:?}", event);
            }
        }
    });

    let estimates = [
        1_700_000u32,
        900_000,
        400_000,
        0,
        0,
        250_000,
        1_200_000,
    ];
    let stream_ids = config.stream_ids();

    for (step, estimate) in estimates.iter().enumerate() {
        println!("\n📉 Estimate {} bps", estimate);
        stream.on_bitrate_updated(*estimate, 5, 60);
        sleep(Duration::from_millis(20)).await;

        if step == 5 {
            println!("  🔑 Receiver requests a key frame");
            stream.on_feedback(FeedbackSignal::IntraFrameRequest {
                stream_id: stream_ids[0],
            });
        }

        for _ in 0..10 {
            let outcome = stream.encode(&VideoFrame::black(1280, 720));
            if !outcome.is_submitted() {
                println!("  ⏸️  {:?}", outcome);
                break;
            }
            sleep(Duration::from_millis(33)).await;
        }
        println!(
            "  📦 {} bytes routed, padding {} bps",
            router.bytes.load(Ordering::Relaxed),
            stream.session().padding_needed_bps()
        );
    }

    let snapshot = stream.statistics();
    stream.shutdown().await;
    printer.await?;

    println!("\n📊 Final statistics");
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    println!("\n✨ Send path demo completed!");
    Ok(())
}
