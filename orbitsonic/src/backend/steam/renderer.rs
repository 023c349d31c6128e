use crate::backend::{RenderedVoice, VoiceTable};
use crate::error::Result;
use crate::math::Pose;
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use ringbuf::traits::{Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Turns one block of mono voice input into interleaved stereo.
pub trait BlockProcessor: Send {
    /// Frames per block
    fn frame_size(&self) -> usize;

    /// Writes `frame_size` interleaved stereo frames to `output`.
    fn process(
        &mut self,
        listener: &Pose,
        voices: &[RenderedVoice],
        output: &mut [f32],
    ) -> Result<()>;
}

/// Renders the voice table in fixed-size blocks.
///
/// Callers ask for arbitrary buffer sizes, so a rendered block is drained
/// across calls. The table lock is only held while a block's input is copied
/// out; spatial processing runs without it.
pub struct Renderer<P> {
    table: Arc<Mutex<VoiceTable>>,
    processor: P,
    device_channels: usize,
    voices: Vec<RenderedVoice>,
    stereo_block: Vec<f32>,
    block_pos: usize,
    block_len: usize,
}

impl<P: BlockProcessor> Renderer<P> {
    pub fn new(table: Arc<Mutex<VoiceTable>>, processor: P, device_channels: u16) -> Self {
        let frame_size = processor.frame_size().max(1);
        Self {
            table,
            processor,
            device_channels: (device_channels as usize).max(1),
            voices: Vec::new(),
            stereo_block: vec![0.0; frame_size * 2],
            block_pos: 0,
            block_len: 0,
        }
    }

    pub fn device_channels(&self) -> usize {
        self.device_channels
    }

    pub fn frame_size(&self) -> usize {
        self.stereo_block.len() / 2
    }

    /// Fills an interleaved device buffer.
    pub fn fill(&mut self, output: &mut [f32]) {
        for frame in output.chunks_mut(self.device_channels) {
            if self.block_pos >= self.block_len {
                self.render_block();
            }

            let left = self.stereo_block[self.block_pos * 2];
            let right = self.stereo_block[self.block_pos * 2 + 1];
            self.block_pos += 1;

            write_frame(frame, left, right);
        }
    }

    fn render_block(&mut self) {
        let frame_size = self.frame_size();
        self.block_pos = 0;
        self.block_len = frame_size;

        let listener = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.pull_block(frame_size, &mut self.voices);
            table.listener()
        };

        if let Err(e) = self
            .processor
            .process(&listener, &self.voices, &mut self.stereo_block)
        {
            log::error!("Error processing spatial voices: {}", e);
            self.stereo_block.fill(0.0);
        }
    }
}

/// Renders ahead of the device into a lock-free ring.
///
/// The output callback only pops samples from the ring, so engine threads
/// holding the voice table never stall the device. The ring holds
/// `ring_blocks` blocks; the thread tops it up whenever a block's worth of
/// space is free.
pub struct RenderThread {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl RenderThread {
    pub fn start<P>(
        mut renderer: Renderer<P>,
        sample_rate: u32,
        ring_blocks: usize,
    ) -> Result<(Self, HeapCons<f32>)>
    where
        P: BlockProcessor + 'static,
    {
        let chunk_len = renderer.frame_size() * renderer.device_channels();
        let (producer, consumer) = HeapRb::<f32>::new(chunk_len * ring_blocks.max(2)).split();
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let idle = idle_wait(renderer.frame_size(), sample_rate);

        let thread = thread::Builder::new()
            .name("orbitsonic-render".to_string())
            .spawn(move || {
                let mut producer: HeapProd<f32> = producer;
                let mut chunk = vec![0.0f32; chunk_len];
                loop {
                    if producer.vacant_len() >= chunk_len {
                        renderer.fill(&mut chunk);
                        producer.push_slice(&chunk);
                        continue;
                    }

                    match shutdown_rx.recv_timeout(idle) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::debug!("Render thread stopped");
            })?;

        Ok((
            Self {
                shutdown: Some(shutdown_tx),
                thread: Some(thread),
            },
            consumer,
        ))
    }

    pub fn shutdown(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Render thread panicked");
            }
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A quarter of a block, at least a millisecond so tiny blocks do not spin.
fn idle_wait(frame_size: usize, sample_rate: u32) -> Duration {
    let block = Duration::from_secs_f64(frame_size as f64 / sample_rate.max(1) as f64);
    (block / 4).max(Duration::from_millis(1))
}

/// Maps a stereo frame onto a device frame of any width.
fn write_frame(frame: &mut [f32], left: f32, right: f32) {
    match frame {
        [] => {}
        [mono] => *mono = 0.5 * (left + right),
        [l, r, rest @ ..] => {
            *l = left;
            *r = right;
            rest.fill(0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BufferInfo, VoiceHandle, VoiceState};
    use crate::config::VoiceConfig;
    use ringbuf::traits::Consumer;
    use std::time::Instant;

    /// Sums voices into the left channel and half of it into the right.
    struct SummingProcessor {
        frame_size: usize,
    }

    impl BlockProcessor for SummingProcessor {
        fn frame_size(&self) -> usize {
            self.frame_size
        }

        fn process(
            &mut self,
            _: &Pose,
            voices: &[RenderedVoice],
            output: &mut [f32],
        ) -> Result<()> {
            output.fill(0.0);
            for voice in voices {
                for (i, sample) in voice.samples.iter().enumerate() {
                    output[i * 2] += sample;
                    output[i * 2 + 1] += sample * 0.5;
                }
            }
            Ok(())
        }
    }

    fn playing_table(samples: usize) -> (Arc<Mutex<VoiceTable>>, VoiceHandle) {
        let mut table = VoiceTable::new();
        table.open();
        let info = BufferInfo {
            size_bytes: samples * 4,
            channels: 1,
            bits: 32,
            sample_rate: 100,
        };
        let buffer = table
            .insert_buffer(vec![1.0; samples].into(), 100, info)
            .unwrap();
        let voice = table.create_voice(buffer, VoiceConfig::default()).unwrap();
        table.play(voice).unwrap();
        (Arc::new(Mutex::new(table)), voice)
    }

    #[test]
    fn blocks_are_drained_across_device_buffers() {
        let (table, voice) = playing_table(6);
        let mut renderer = Renderer::new(table.clone(), SummingProcessor { frame_size: 4 }, 2);

        let mut first = vec![9.0; 6];
        renderer.fill(&mut first);
        assert_eq!(first, vec![1.0f32, 0.5, 1.0, 0.5, 1.0, 0.5]);

        let mut second = vec![9.0; 14];
        renderer.fill(&mut second);
        assert_eq!(second[..6].to_vec(), vec![1.0f32, 0.5, 1.0, 0.5, 1.0, 0.5]);
        assert!(second[6..].iter().all(|s| *s == 0.0));

        let table = table.lock().unwrap();
        assert_eq!(table.state(voice).unwrap(), VoiceState::Stopped);
    }

    #[test]
    fn stereo_is_mapped_onto_other_channel_counts() {
        let (table, _) = playing_table(8);

        let mut mono = Renderer::new(table.clone(), SummingProcessor { frame_size: 2 }, 1);
        let mut out = vec![0.0; 2];
        mono.fill(&mut out);
        assert_eq!(out, vec![0.75f32, 0.75]);

        let mut quad = Renderer::new(table, SummingProcessor { frame_size: 2 }, 4);
        let mut out = vec![9.0; 4];
        quad.fill(&mut out);
        assert_eq!(out, vec![1.0f32, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn rendering_waits_for_a_busy_table_instead_of_going_silent() {
        let (table, _) = playing_table(8);
        let mut renderer = Renderer::new(table.clone(), SummingProcessor { frame_size: 4 }, 2);

        let held = table.lock().unwrap();
        let out = thread::scope(|scope| {
            let render = scope.spawn(|| {
                let mut out = vec![9.0; 8];
                renderer.fill(&mut out);
                out
            });
            thread::sleep(Duration::from_millis(20));
            drop(held);
            render.join().unwrap()
        });

        assert_eq!(out, vec![1.0f32, 0.5, 1.0, 0.5, 1.0, 0.5, 1.0, 0.5]);
    }

    #[test]
    fn render_thread_keeps_the_ring_filled() {
        let (table, voice) = playing_table(8);
        let renderer = Renderer::new(table.clone(), SummingProcessor { frame_size: 4 }, 2);
        let (mut render_thread, mut consumer) = RenderThread::start(renderer, 100, 2).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while consumer.occupied_len() < 16 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        let mut out = vec![0.0; 16];
        assert_eq!(consumer.pop_slice(&mut out), 16);
        assert_eq!(out[..8].to_vec(), vec![1.0f32, 0.5, 1.0, 0.5, 1.0, 0.5, 1.0, 0.5]);

        // An engine thread holding the table does not block the consumer side
        {
            let _held = table.lock().unwrap();
            let mut more = vec![0.0; 4];
            let _ = consumer.pop_slice(&mut more);
        }

        render_thread.shutdown();
        let table = table.lock().unwrap();
        assert_eq!(table.state(voice).unwrap(), VoiceState::Stopped);
    }

    #[test]
    fn idle_wait_is_a_fraction_of_a_block() {
        assert_eq!(idle_wait(4800, 48_000), Duration::from_millis(25));
        assert_eq!(idle_wait(4, 48_000), Duration::from_millis(1));
    }
}
