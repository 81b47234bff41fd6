use crate::audio::AudioEngine;
use crate::ingest::MediaAsset;
use crate::lyrics::LyricsDocument;
use anyhow::Result;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayScale {
    pub lyrics: f32,
    pub controls: f32,
}

impl Default for DisplayScale {
    fn default() -> Self {
        Self {
            lyrics: 0.9,
            controls: 0.9,
        }
    }
}

/// The player the presentation pane drives. It is handed a lyrics document
/// and a media reference, and reports the current 0-based lyric line.
pub trait PlaybackWidget {
    fn load(&mut self, lyrics: LyricsDocument, media: &MediaAsset, scale: DisplayScale)
    -> Result<()>;
    /// The current line, when it differs from the last one reported.
    fn poll_line_change(&mut self) -> Option<i64>;
    fn current_line(&self) -> i64;
    fn position(&self) -> Duration;
    fn duration(&self) -> Option<Duration>;
    fn toggle_pause(&mut self) -> bool;
    fn is_paused(&self) -> bool;
    fn seek_by(&mut self, delta_ms: i64) -> Result<()>;
    /// True once a loaded track has played to its end.
    fn is_finished(&self) -> bool;
    fn scale(&self) -> DisplayScale;
}

pub struct LyricsPlayer {
    engine: Box<dyn AudioEngine>,
    lyrics: Option<LyricsDocument>,
    scale: DisplayScale,
    reported: Option<i64>,
}

impl LyricsPlayer {
    pub fn new(engine: Box<dyn AudioEngine>) -> Self {
        Self {
            engine,
            lyrics: None,
            scale: DisplayScale::default(),
            reported: None,
        }
    }

    pub fn output_name(&self) -> &'static str {
        self.engine.output_name()
    }
}

impl PlaybackWidget for LyricsPlayer {
    fn load(
        &mut self,
        lyrics: LyricsDocument,
        media: &MediaAsset,
        scale: DisplayScale,
    ) -> Result<()> {
        self.engine.play(&media.source)?;
        debug!(media = %media.name, lines = lyrics.lines.len(), "playback loaded");
        self.lyrics = Some(lyrics);
        self.scale = scale;
        self.reported = None;
        Ok(())
    }

    fn poll_line_change(&mut self) -> Option<i64> {
        self.lyrics.as_ref()?;
        let line = self.current_line();
        if self.reported == Some(line) {
            return None;
        }
        self.reported = Some(line);
        Some(line)
    }

    fn current_line(&self) -> i64 {
        let Some(lyrics) = &self.lyrics else {
            return -1;
        };
        lyrics.line_at(self.position().as_millis() as u64)
    }

    fn position(&self) -> Duration {
        self.engine.position().unwrap_or_default()
    }

    fn duration(&self) -> Option<Duration> {
        self.engine.duration()
    }

    fn toggle_pause(&mut self) -> bool {
        if self.engine.is_paused() {
            self.engine.resume();
        } else {
            self.engine.pause();
        }
        self.engine.is_paused()
    }

    fn seek_by(&mut self, delta_ms: i64) -> Result<()> {
        let current = self.position().as_millis() as i64;
        let target = current.saturating_add(delta_ms).max(0) as u64;
        let target = Duration::from_millis(target);
        let target = self
            .engine
            .duration()
            .map_or(target, |duration| target.min(duration));
        self.engine.seek_to(target)
    }

    fn is_paused(&self) -> bool {
        self.engine.is_paused()
    }

    fn is_finished(&self) -> bool {
        self.lyrics.is_some() && self.engine.is_finished()
    }

    fn scale(&self) -> DisplayScale {
        self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SilentAudioEngine;
    use crate::ingest::DroppedFile;
    use crate::lyrics::normalize_lyrics;

    fn loaded_player() -> LyricsPlayer {
        let mut player = LyricsPlayer::new(Box::new(SilentAudioEngine::new()));
        let lyrics = normalize_lyrics("[00:00.00]\n[00:10.00]ten\n[00:20.00]twenty\n[00:30.00]thirty")
            .expect("lyrics");
        let media = MediaAsset::from(DroppedFile::from_bytes("song.mp3", vec![0_u8; 8]));
        player
            .load(lyrics, &media, DisplayScale::default())
            .expect("load");
        player
    }

    #[test]
    fn reports_each_line_once() {
        let mut player = loaded_player();
        assert_eq!(player.poll_line_change(), Some(0));
        assert_eq!(player.poll_line_change(), None);

        player.seek_by(21_000).expect("seek");
        assert_eq!(player.poll_line_change(), Some(2));
    }

    #[test]
    fn backward_seek_reports_lower_line() {
        let mut player = loaded_player();
        player.seek_by(35_000).expect("seek");
        assert_eq!(player.poll_line_change(), Some(3));
        player.seek_by(-20_000).expect("seek");
        assert_eq!(player.poll_line_change(), Some(1));
    }

    #[test]
    fn pause_toggles() {
        let mut player = loaded_player();
        assert!(player.toggle_pause());
        assert!(player.is_paused());
        assert!(!player.toggle_pause());
    }

    #[test]
    fn unloaded_player_is_silent() {
        let mut player = LyricsPlayer::new(Box::new(SilentAudioEngine::new()));
        assert_eq!(player.poll_line_change(), None);
        assert_eq!(player.current_line(), -1);
        assert!(!player.is_finished());
        assert_eq!(player.scale(), DisplayScale::default());
    }
}
