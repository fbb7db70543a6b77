use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, warn};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Producer, Split};

use crate::bus::host::{StreamHandle, StreamHost};
use crate::bus::processor::ProcessorSlot;
use crate::dsp::StreamFormat;
use crate::error::EngineError;

/// Frames of slack between the capture and render callbacks, in blocks.
const RING_BLOCKS: usize = 8;

/// Stream host backed by the system's default CPAL devices.
///
/// Each opened bus gets a capture stream feeding an SPSC ring and a render
/// stream that drains it, runs the bus processor, and writes the device
/// buffer. Without a capture device the bus renders processed silence
/// rather than failing.
pub struct CpalHost;

impl CpalHost {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CpalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamHost for CpalHost {
    fn open(
        &self,
        format: StreamFormat,
        slot: ProcessorSlot,
    ) -> Result<Box<dyn StreamHandle>, EngineError> {
        let host = cpal::default_host();
        let output_device = host
            .default_output_device()
            .ok_or_else(|| EngineError::StreamFailed("no default output device".to_string()))?;

        let config = cpal::StreamConfig {
            channels: format.channels as u16,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ring = HeapRb::<f32>::new(format.block_size * format.channels * RING_BLOCKS);
        let (mut producer, mut consumer) = ring.split();

        // The capture side is best-effort: a bus with no input device still
        // opens and renders silence through its chain.
        let input_stream = match host.default_input_device() {
            Some(device) => match device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Non-blocking push; overruns drop frames at the ring.
                    let _ = producer.push_slice(data);
                },
                |err| error!("bus capture stream error: {err}"),
                None,
            ) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    warn!("capture stream unavailable, bus renders silence: {e}");
                    None
                }
            },
            None => {
                warn!("no default input device, bus renders silence");
                None
            }
        };

        let input_stream = match input_stream {
            Some(stream) => match stream.play() {
                Ok(()) => Some(stream),
                Err(e) => {
                    warn!("capture stream failed to play, bus renders silence: {e}");
                    None
                }
            },
            None => None,
        };

        let mut input_scratch = vec![0.0f32; format.block_size * format.channels * 2];
        let output_stream = output_device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let take = data.len().min(input_scratch.len());
                    let got = consumer.pop_slice(&mut input_scratch[..take]);
                    // Underruns render as silence.
                    input_scratch[got..take].fill(0.0);

                    match slot.try_lock() {
                        Ok(mut processor) => processor.process(&input_scratch[..take], data),
                        Err(_) => {
                            // The control thread holds the slot for a chain
                            // mutation; pass this tick straight through.
                            data[..take].copy_from_slice(&input_scratch[..take]);
                            data[take..].fill(0.0);
                        }
                    }
                },
                |err| error!("bus render stream error: {err}"),
                None,
            )
            .map_err(|e| EngineError::StreamFailed(e.to_string()))?;

        output_stream
            .play()
            .map_err(|e| EngineError::StreamFailed(e.to_string()))?;

        Ok(Box::new(CpalStreamHandle {
            _input: input_stream,
            _output: output_stream,
        }))
    }
}

/// Keeps both CPAL streams alive. Dropping pauses and tears them down;
/// CPAL joins the in-flight callback before the drop returns.
struct CpalStreamHandle {
    _input: Option<cpal::Stream>,
    _output: cpal::Stream,
}

impl StreamHandle for CpalStreamHandle {}
