use super::processor::SpatialProcessor;
use super::renderer::{RenderThread, Renderer};
use crate::backend::hrtf_catalog::HrtfProfile;
use crate::backend::{HrtfSelection, VoiceTable};
use crate::config::SteamBackendDesc;
use crate::error::{OrbitSonicError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::{Sender, bounded};
use ringbuf::HeapCons;
use ringbuf::traits::Consumer;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Blocks rendered ahead of the device
const RING_BLOCKS: usize = 3;

/// The cpal output stream, kept alive on its own thread.
///
/// `cpal::Stream` is not `Send`, so the stream is built, played and dropped
/// by the device thread together with the render thread feeding it. Dropping
/// the shutdown sender ends both.
pub struct OutputDevice {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl OutputDevice {
    /// Starts the device thread and waits until the stream is playing or has failed.
    pub fn start(
        desc: &SteamBackendDesc,
        hrtf_profile: Option<HrtfProfile>,
        table: Arc<Mutex<VoiceTable>>,
    ) -> Result<(Self, HrtfSelection)> {
        let (ready_tx, ready_rx) = bounded::<Result<HrtfSelection>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let desc = desc.clone();

        let thread = thread::Builder::new()
            .name("orbitsonic-output".to_string())
            .spawn(move || {
                let (stream, mut render_thread) =
                    match open_stream(&desc, hrtf_profile.as_ref(), table) {
                        Ok((stream, render_thread, selection)) => {
                            let _ = ready_tx.send(Ok(selection));
                            (stream, render_thread)
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                // Blocks until the backend drops the sender
                let _ = shutdown_rx.recv();
                drop(stream);
                render_thread.shutdown();
                log::debug!("Output stream closed");
            })?;

        match ready_rx.recv() {
            Ok(Ok(selection)) => Ok((
                Self {
                    shutdown: Some(shutdown_tx),
                    thread: Some(thread),
                },
                selection,
            )),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(OrbitSonicError::AudioDevice(
                    "Output thread exited during startup".to_string(),
                ))
            }
        }
    }

    /// Stops the stream and joins the device thread.
    pub fn shutdown(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Output thread panicked");
            }
        }
    }
}

impl Drop for OutputDevice {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn open_stream(
    desc: &SteamBackendDesc,
    hrtf_profile: Option<&HrtfProfile>,
    table: Arc<Mutex<VoiceTable>>,
) -> Result<(cpal::Stream, RenderThread, HrtfSelection)> {
    let (processor, selection) = SpatialProcessor::new(desc, hrtf_profile)?;
    let renderer = Renderer::new(table, processor, desc.channels);

    let host = cpal::default_host();
    let device = host.default_output_device().ok_or_else(|| {
        OrbitSonicError::AudioDevice("No default output device available".into())
    })?;

    let config = cpal::StreamConfig {
        channels: desc.channels,
        sample_rate: cpal::SampleRate(desc.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let default_config = device.default_output_config().map_err(|e| {
        OrbitSonicError::AudioDevice(format!("Failed to get default config: {}", e))
    })?;

    let (render_thread, ring) = RenderThread::start(renderer, desc.sample_rate, RING_BLOCKS)?;

    let stream = match default_config.sample_format() {
        cpal::SampleFormat::F32 => create_stream::<f32>(&device, &config, ring)?,
        cpal::SampleFormat::I16 => create_stream::<i16>(&device, &config, ring)?,
        cpal::SampleFormat::U16 => create_stream::<u16>(&device, &config, ring)?,
        format => {
            return Err(OrbitSonicError::AudioFormat(format!(
                "Unsupported sample format {:?}",
                format
            )));
        }
    };

    stream
        .play()
        .map_err(|e| OrbitSonicError::AudioDevice(format!("Failed to start stream: {}", e)))?;

    log::info!(
        "Output stream started ({} Hz, {} channel(s), {:?} samples)",
        desc.sample_rate,
        desc.channels,
        default_config.sample_format()
    );

    Ok((stream, render_thread, selection))
}

/// Builds a typed output stream that drains rendered f32 samples from the ring.
///
/// The callback never locks anything. Samples the render thread has not
/// produced yet are played as silence.
fn create_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut ring: HeapCons<f32>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                let popped = ring.pop_slice(&mut scratch);
                if popped < scratch.len() {
                    log::trace!("Render underrun: {} of {} samples", popped, scratch.len());
                    scratch[popped..].fill(0.0);
                }

                for (sample, value) in data.iter_mut().zip(&scratch) {
                    *sample = T::from_sample(*value);
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| OrbitSonicError::AudioDevice(format!("Failed to build stream: {}", e)))
}
