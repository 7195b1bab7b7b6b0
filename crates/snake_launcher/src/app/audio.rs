use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use thiserror::Error;
use tracing::warn;

pub(crate) const DEFAULT_OUTPUT_RATE: u32 = 44_100;

#[derive(Debug, Error)]
pub(crate) enum AudioError {
    #[cfg(not(feature = "audio"))]
    #[error("built without the `audio` feature")]
    Disabled,
    #[cfg(feature = "audio")]
    #[error("no audio output device available")]
    NoDevice,
    #[cfg(feature = "audio")]
    #[error("failed to read the default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),
    #[cfg(feature = "audio")]
    #[error("failed to build the output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[cfg(feature = "audio")]
    #[error("failed to start the output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[cfg(feature = "audio")]
    #[error("unsupported output sample format {0:?}")]
    UnsupportedFormat(cpal::SampleFormat),
    #[cfg(feature = "audio")]
    #[error("failed to spawn the audio thread: {0}")]
    Thread(#[source] std::io::Error),
    #[cfg(feature = "audio")]
    #[error("audio thread exited before the stream started")]
    ThreadExited,
}

#[derive(Debug)]
struct Voice {
    frames: Arc<[f32]>,
    step: f64,
    cursor: f64,
}

/// Mono voices mixed into every output channel. One voice per clip name, so
/// playing a clip again restarts it instead of layering a second copy.
#[derive(Debug)]
struct Mixer {
    output_rate: u32,
    voices: HashMap<String, Voice>,
}

impl Mixer {
    fn new(output_rate: u32) -> Self {
        Self {
            output_rate: output_rate.max(1),
            voices: HashMap::new(),
        }
    }

    fn restart(&mut self, name: &str, frames: Arc<[f32]>, source_rate: u32) {
        let step = f64::from(source_rate.max(1)) / f64::from(self.output_rate);
        self.voices.insert(
            name.to_string(),
            Voice {
                frames,
                step,
                cursor: 0.0,
            },
        );
    }

    #[cfg_attr(not(feature = "audio"), allow(dead_code))]
    fn next_sample(&mut self) -> f32 {
        let mut mixed = 0.0;
        self.voices.retain(|_, voice| {
            let Some(sample) = voice.frames.get(voice.cursor as usize) else {
                return false;
            };
            mixed += *sample;
            voice.cursor += voice.step;
            true
        });
        mixed.clamp(-1.0, 1.0)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MixerHandle {
    inner: Arc<Mutex<Mixer>>,
}

impl Default for MixerHandle {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Mixer::new(DEFAULT_OUTPUT_RATE))),
        }
    }
}

impl MixerHandle {
    pub(crate) fn restart(&self, name: &str, frames: Arc<[f32]>, source_rate: u32) {
        self.lock().restart(name, frames, source_rate);
    }

    pub(crate) fn is_playing(&self, name: &str) -> bool {
        self.lock().voices.contains_key(name)
    }

    #[cfg_attr(not(feature = "audio"), allow(dead_code))]
    fn set_output_rate(&self, output_rate: u32) {
        let mut mixer = self.lock();
        mixer.output_rate = output_rate.max(1);
        mixer.voices.clear();
    }

    /// Fills interleaved output, the same mono sample in every channel.
    #[cfg_attr(not(feature = "audio"), allow(dead_code))]
    fn fill<T: Copy>(&self, data: &mut [T], channels: usize, convert: impl Fn(f32) -> T) {
        let mut mixer = self.lock();
        for frame in data.chunks_mut(channels.max(1)) {
            let sample = convert(mixer.next_sample());
            frame.fill(sample);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Mixer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps the output device running on its own thread. Dropping it stops
/// playback; the mixer keeps accepting voices either way.
pub(crate) struct AudioOutput {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl AudioOutput {
    pub(crate) fn open(mixer: &MixerHandle) -> Result<Self, AudioError> {
        let (stop, thread) = spawn_output_thread(mixer.clone())?;
        Ok(Self {
            stop: Some(stop),
            thread: Some(thread),
        })
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("audio output thread panicked");
            }
        }
    }
}

/// Falls back to a silent mixer when no device can be opened.
pub(crate) fn open_output(mixer: &MixerHandle) -> Option<AudioOutput> {
    match AudioOutput::open(mixer) {
        Ok(output) => Some(output),
        Err(error) => {
            warn!(error = %error, "audio output unavailable; sounds are silent");
            None
        }
    }
}

#[cfg(not(feature = "audio"))]
fn spawn_output_thread(_mixer: MixerHandle) -> Result<(Sender<()>, JoinHandle<()>), AudioError> {
    Err(AudioError::Disabled)
}

#[cfg(feature = "audio")]
fn spawn_output_thread(mixer: MixerHandle) -> Result<(Sender<()>, JoinHandle<()>), AudioError> {
    use crossbeam_channel::bounded;
    use tracing::debug;

    let (started_tx, started_rx) = bounded::<Result<u32, AudioError>>(1);
    let (stop_tx, stop_rx) = bounded::<()>(0);
    // The stream is not `Send` on every host, so it lives and dies on this thread.
    let thread = std::thread::Builder::new()
        .name("audio-output".into())
        .spawn(move || {
            let stream = match build_stream(&mixer) {
                Ok((stream, rate)) => {
                    let _ = started_tx.send(Ok(rate));
                    stream
                }
                Err(error) => {
                    let _ = started_tx.send(Err(error));
                    return;
                }
            };
            let _ = stop_rx.recv();
            drop(stream);
            debug!("audio_output_stopped");
        })
        .map_err(AudioError::Thread)?;

    match started_rx.recv() {
        Ok(Ok(rate)) => {
            debug!(sample_rate = rate, "audio_output_started");
            Ok((stop_tx, thread))
        }
        Ok(Err(error)) => {
            let _ = thread.join();
            Err(error)
        }
        Err(_) => {
            let _ = thread.join();
            Err(AudioError::ThreadExited)
        }
    }
}

#[cfg(feature = "audio")]
fn build_stream(mixer: &MixerHandle) -> Result<(cpal::Stream, u32), AudioError> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use tracing::error;

    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
    let supported = device.default_output_config()?;
    let sample_rate = supported.sample_rate().0;
    let channels = usize::from(supported.channels());
    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    mixer.set_output_rate(sample_rate);

    let on_error = |err: cpal::StreamError| error!(error = %err, "audio stream error");
    let stream = match format {
        cpal::SampleFormat::F32 => {
            let mixer = mixer.clone();
            device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    mixer.fill(data, channels, |sample| sample)
                },
                on_error,
                None,
            )?
        }
        cpal::SampleFormat::I16 => {
            let mixer = mixer.clone();
            device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    mixer.fill(data, channels, |sample| (sample * 32767.0) as i16)
                },
                on_error,
                None,
            )?
        }
        cpal::SampleFormat::U16 => {
            let mixer = mixer.clone();
            device.build_output_stream(
                &config,
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    mixer.fill(data, channels, |sample| {
                        (sample * 32767.0 + 32768.0).clamp(0.0, 65535.0) as u16
                    })
                },
                on_error,
                None,
            )?
        }
        other => return Err(AudioError::UnsupportedFormat(other)),
    };
    stream.play()?;
    Ok((stream, sample_rate))
}
