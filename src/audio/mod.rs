use crate::ingest::ByteSource;
use anyhow::{Context, Result};
use rodio::Source;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub trait AudioEngine {
    fn play(&mut self, source: &ByteSource) -> Result<()>;
    fn pause(&mut self);
    fn resume(&mut self);
    fn is_paused(&self) -> bool;
    fn position(&self) -> Option<Duration>;
    fn duration(&self) -> Option<Duration>;
    fn seek_to(&mut self, position: Duration) -> Result<()>;
    fn is_finished(&self) -> bool;
    fn output_name(&self) -> &'static str;
}

enum Decoded {
    File(Decoder<BufReader<File>>),
    Memory(Decoder<Cursor<Vec<u8>>>),
}

fn decode(source: &ByteSource) -> Result<Decoded> {
    match source {
        ByteSource::File(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open audio {}", path.display()))?;
            let decoder = Decoder::new(BufReader::new(file))
                .with_context(|| format!("failed to decode {}", path.display()))?;
            Ok(Decoded::File(decoder))
        }
        ByteSource::Memory(bytes) => {
            let decoder = Decoder::new(Cursor::new(bytes.to_vec()))
                .context("failed to decode in-memory audio")?;
            Ok(Decoded::Memory(decoder))
        }
    }
}

fn known_duration(decoded: &Decoded) -> Option<Duration> {
    let duration = match decoded {
        Decoded::File(decoder) => decoder.total_duration(),
        Decoded::Memory(decoder) => decoder.total_duration(),
    };
    duration.filter(|duration| !duration.is_zero())
}

pub struct RodioAudioEngine {
    stream: OutputStream,
    sink: Sink,
    loaded: bool,
    track_duration: Option<Duration>,
}

impl RodioAudioEngine {
    pub fn new() -> Result<Self> {
        let mut stream = OutputStreamBuilder::from_default_device()
            .context("failed to open default system output stream")?
            .with_error_callback(|_| {})
            .open_stream_or_fallback()
            .context("failed to start default output stream")?;
        stream.log_on_drop(false);
        let sink = Sink::connect_new(stream.mixer());
        info!("audio output opened");
        Ok(Self {
            stream,
            sink,
            loaded: false,
            track_duration: None,
        })
    }
}

impl AudioEngine for RodioAudioEngine {
    fn play(&mut self, source: &ByteSource) -> Result<()> {
        self.sink.stop();
        self.sink = Sink::connect_new(self.stream.mixer());

        let decoded = decode(source)?;
        self.track_duration = known_duration(&decoded);
        match decoded {
            Decoded::File(decoder) => self.sink.append(decoder),
            Decoded::Memory(decoder) => self.sink.append(decoder),
        }
        self.loaded = true;
        debug!(duration = ?self.track_duration, "audio playback started");
        Ok(())
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn resume(&mut self) {
        self.sink.play();
    }

    fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }

    fn position(&self) -> Option<Duration> {
        self.loaded.then(|| self.sink.get_pos())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn seek_to(&mut self, position: Duration) -> Result<()> {
        if !self.loaded {
            return Err(anyhow::anyhow!("no active track"));
        }
        self.sink
            .try_seek(position)
            .map_err(|err| anyhow::anyhow!("failed to seek current track: {err:?}"))
    }

    fn is_finished(&self) -> bool {
        self.loaded && !self.sink.is_paused() && self.sink.empty()
    }

    fn output_name(&self) -> &'static str {
        "system output"
    }
}

/// Plays nothing; position advances on the wall clock so lyrics and the
/// breakdown still follow along.
pub struct SilentAudioEngine {
    paused: bool,
    loaded: bool,
    started_at: Option<Instant>,
    position_offset: Duration,
    track_duration: Option<Duration>,
}

impl SilentAudioEngine {
    pub fn new() -> Self {
        Self {
            paused: false,
            loaded: false,
            started_at: None,
            position_offset: Duration::ZERO,
            track_duration: None,
        }
    }

    fn current_position(&self) -> Duration {
        let mut position = self.position_offset;
        if !self.paused
            && self.loaded
            && let Some(started_at) = self.started_at
        {
            position = position.saturating_add(started_at.elapsed());
        }
        if let Some(duration) = self.track_duration {
            return position.min(duration);
        }
        position
    }
}

impl Default for SilentAudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine for SilentAudioEngine {
    fn play(&mut self, source: &ByteSource) -> Result<()> {
        self.paused = false;
        self.loaded = true;
        self.started_at = Some(Instant::now());
        self.position_offset = Duration::ZERO;
        self.track_duration = decode(source).ok().as_ref().and_then(known_duration);
        Ok(())
    }

    fn pause(&mut self) {
        self.position_offset = self.current_position();
        self.started_at = None;
        self.paused = true;
    }

    fn resume(&mut self) {
        if self.loaded {
            self.started_at = Some(Instant::now());
        }
        self.paused = false;
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn position(&self) -> Option<Duration> {
        self.loaded.then(|| self.current_position())
    }

    fn duration(&self) -> Option<Duration> {
        self.track_duration
    }

    fn seek_to(&mut self, position: Duration) -> Result<()> {
        if !self.loaded {
            return Err(anyhow::anyhow!("no active track"));
        }

        self.position_offset = self
            .track_duration
            .map_or(position, |duration| position.min(duration));
        self.started_at = if self.paused {
            None
        } else {
            Some(Instant::now())
        };
        Ok(())
    }

    fn is_finished(&self) -> bool {
        let Some(duration) = self.track_duration else {
            return false;
        };
        self.loaded && !self.paused && self.current_position() >= duration
    }

    fn output_name(&self) -> &'static str {
        "silent"
    }
}

#[cfg(test)]
mod tests {
    use super::{AudioEngine, SilentAudioEngine};
    use crate::ingest::ByteSource;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    fn wav_bytes(duration_ms: u32) -> Vec<u8> {
        let sample_rate: u32 = 44_100;
        let channels: u16 = 1;
        let bits_per_sample: u16 = 16;
        let bytes_per_sample = u32::from(bits_per_sample / 8);
        let total_samples = (u64::from(sample_rate) * u64::from(duration_ms) / 1_000) as u32;
        let data_size = total_samples * u32::from(channels) * bytes_per_sample;
        let byte_rate = sample_rate * u32::from(channels) * bytes_per_sample;
        let block_align = channels * (bits_per_sample / 8);

        let mut bytes = Vec::with_capacity((44_u32 + data_size) as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&36_u32.saturating_add(data_size).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16_u32.to_le_bytes());
        bytes.extend_from_slice(&1_u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&byte_rate.to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&bits_per_sample.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_size.to_le_bytes());
        bytes.resize((44_u32 + data_size) as usize, 0_u8);
        bytes
    }

    fn undecodable() -> ByteSource {
        ByteSource::File(Path::new("nonexistent-track.flac").to_path_buf())
    }

    #[test]
    fn silent_engine_position_advances_when_playing() {
        let mut engine = SilentAudioEngine::new();
        engine.play(&undecodable()).expect("silent play never fails");
        let before = engine.position().expect("position should be present");
        thread::sleep(Duration::from_millis(20));
        let after = engine.position().expect("position should be present");
        assert!(after > before, "position should advance while playing");
    }

    #[test]
    fn silent_engine_pause_freezes_position() {
        let mut engine = SilentAudioEngine::new();
        engine.play(&undecodable()).expect("play");
        thread::sleep(Duration::from_millis(20));

        engine.pause();
        let paused = engine.position().expect("position");
        thread::sleep(Duration::from_millis(20));
        assert_eq!(engine.position().expect("position"), paused);

        engine.resume();
        thread::sleep(Duration::from_millis(20));
        assert!(engine.position().expect("position") > paused);
    }

    #[test]
    fn silent_engine_seek_moves_backward_too() {
        let mut engine = SilentAudioEngine::new();
        engine.play(&undecodable()).expect("play");
        engine.seek_to(Duration::from_secs(12)).expect("seek");
        assert!(engine.position().expect("position") >= Duration::from_secs(12));

        engine.seek_to(Duration::from_secs(2)).expect("seek");
        assert!(engine.position().expect("position") < Duration::from_secs(12));
    }

    #[test]
    fn silent_engine_reads_duration_from_file_and_memory() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("fixture.wav");
        fs::write(&path, wav_bytes(80)).expect("write wav");

        let mut engine = SilentAudioEngine::new();
        engine.play(&ByteSource::File(path)).expect("play");
        assert!(engine.duration().expect("duration") >= Duration::from_millis(70));
        thread::sleep(Duration::from_millis(120));
        assert!(engine.is_finished());

        let memory = ByteSource::Memory(Arc::from(wav_bytes(80)));
        engine.play(&memory).expect("play");
        assert!(engine.duration().is_some());
    }

    #[test]
    fn silent_engine_without_track_rejects_seek() {
        let mut engine = SilentAudioEngine::new();
        assert!(engine.position().is_none());
        assert!(engine.seek_to(Duration::from_secs(1)).is_err());
        assert!(!engine.is_finished());
    }
}
