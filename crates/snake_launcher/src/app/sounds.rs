use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hound::{SampleFormat, WavReader};
use snake_engine::{SoundClip, SoundLoadError, SoundLoader};
use tracing::debug;

use super::audio::MixerHandle;

/// Decoded clip, downmixed to mono. Playing it restarts its voice in the
/// mixer from the first frame.
#[derive(Debug)]
pub(crate) struct WavClip {
    name: String,
    frames: Arc<[f32]>,
    sample_rate: u32,
    mixer: MixerHandle,
    plays: AtomicU64,
}

impl WavClip {
    pub(crate) fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames.len() as f64 / f64::from(self.sample_rate.max(1)))
    }

    pub(crate) fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn plays(&self) -> u64 {
        self.plays.load(Ordering::Relaxed)
    }
}

impl SoundClip for WavClip {
    fn play_from_start(&self) {
        self.mixer
            .restart(&self.name, Arc::clone(&self.frames), self.sample_rate);
        let plays = self.plays.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            name = %self.name,
            duration_ms = self.duration().as_millis() as u64,
            plays,
            "sound_played"
        );
    }
}

/// Loads `<dir>/<name>.wav`; every clip plays through `mixer`.
#[derive(Debug, Clone)]
pub(crate) struct WavSoundLoader {
    dir: PathBuf,
    mixer: MixerHandle,
}

impl WavSoundLoader {
    pub(crate) fn new(dir: PathBuf, mixer: MixerHandle) -> Self {
        Self { dir, mixer }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.wav"))
    }
}

impl SoundLoader for WavSoundLoader {
    fn load(&mut self, name: &str) -> Result<Arc<dyn SoundClip>, SoundLoadError> {
        let clip = decode_wav(name, &self.path_for(name), self.mixer.clone())?;
        Ok(Arc::new(clip))
    }
}

pub(crate) fn decode_wav(
    name: &str,
    path: &Path,
    mixer: MixerHandle,
) -> Result<WavClip, SoundLoadError> {
    let mut reader = WavReader::open(path).map_err(|error| load_error(name, error))?;
    let spec = reader.spec();

    let samples: Vec<i16> = match spec.sample_format {
        SampleFormat::Int => match spec.bits_per_sample {
            8 => reader
                .samples::<i8>()
                .map(|sample| sample.map(|value| i16::from(value) << 8))
                .collect::<Result<Vec<i16>, _>>(),
            16 => reader.samples::<i16>().collect::<Result<Vec<i16>, _>>(),
            17..=32 => {
                let shift = spec.bits_per_sample - 16;
                reader
                    .samples::<i32>()
                    .map(|sample| sample.map(|value| (value >> shift) as i16))
                    .collect::<Result<Vec<i16>, _>>()
            }
            bits => {
                return Err(SoundLoadError::Malformed {
                    name: name.to_string(),
                    reason: format!("unsupported bit depth {bits}"),
                })
            }
        },
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|sample| sample.map(|value| (value.clamp(-1.0, 1.0) * 32767.0) as i16))
            .collect::<Result<Vec<i16>, _>>(),
    }
    .map_err(|error| load_error(name, error))?;

    Ok(WavClip {
        name: name.to_string(),
        frames: downmix(&samples, spec.channels),
        sample_rate: spec.sample_rate,
        mixer,
        plays: AtomicU64::new(0),
    })
}

fn downmix(samples: &[i16], channels: u16) -> Arc<[f32]> {
    let channels = usize::from(channels.max(1));
    samples
        .chunks(channels)
        .map(|frame| {
            let sum: f32 = frame.iter().map(|sample| f32::from(*sample) / 32768.0).sum();
            sum / frame.len() as f32
        })
        .collect()
}

fn load_error(name: &str, error: hound::Error) -> SoundLoadError {
    match error {
        hound::Error::IoError(source) if source.kind() == io::ErrorKind::NotFound => {
            SoundLoadError::NotFound {
                name: name.to_string(),
            }
        }
        hound::Error::IoError(source) => SoundLoadError::Io {
            name: name.to_string(),
            source,
        },
        other => SoundLoadError::Malformed {
            name: name.to_string(),
            reason: other.to_string(),
        },
    }
}
