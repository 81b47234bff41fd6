use super::{
    AcceptPolicy, DroppedFile, MediaAsset, Rejection, RejectReason, RejectionList, SubmitError,
    file_stem, same_file_name,
};
use crate::lyrics::{LyricsDocument, normalize_lyrics};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct LyricsFile {
    pub name: String,
    pub text: String,
}

/// What a successful submit hands to the session.
#[derive(Debug, Clone)]
pub struct AudioSubmission {
    pub title: String,
    pub audio: MediaAsset,
    pub lyrics: LyricsDocument,
}

/// Single-file intake taking one audio track and one lyrics file.
#[derive(Debug, Clone)]
pub struct AudioLyricsIntake {
    policy: AcceptPolicy,
    audio: Option<MediaAsset>,
    lyrics: Option<LyricsFile>,
    rejected: RejectionList,
}

impl AudioLyricsIntake {
    pub fn new(policy: AcceptPolicy) -> Self {
        Self {
            policy,
            audio: None,
            lyrics: None,
            rejected: RejectionList::default(),
        }
    }

    pub fn audio(&self) -> Option<&MediaAsset> {
        self.audio.as_ref()
    }

    pub fn lyrics(&self) -> Option<&LyricsFile> {
        self.lyrics.as_ref()
    }

    pub fn rejected(&self) -> &RejectionList {
        &self.rejected
    }

    pub fn on_drop(&mut self, files: Vec<DroppedFile>) {
        let outcome = self.policy.classify(files);
        let mut rejected = outcome.rejected;

        for file in outcome.accepted {
            if is_lyrics_type(&file.declared_type) {
                match file.source.read_to_string() {
                    Ok(text) => {
                        debug!(file = %file.name, "lyrics file loaded");
                        self.lyrics = Some(LyricsFile {
                            name: file.name,
                            text,
                        });
                    }
                    Err(err) => rejected.push(Rejection::new(
                        &file.name,
                        RejectReason::Unreadable(err.to_string()),
                    )),
                }
            } else {
                debug!(file = %file.name, "audio file loaded");
                self.audio = Some(MediaAsset::from(file));
            }
        }

        if !rejected.is_empty() {
            self.rejected.replace(rejected);
        }
    }

    pub fn submit(&self) -> Result<AudioSubmission, SubmitError> {
        let audio = self.audio.as_ref().ok_or(SubmitError::MissingAudio)?;
        let lyrics = self.lyrics.as_ref().ok_or(SubmitError::MissingLyrics)?;
        let document = normalize_lyrics(&lyrics.text)?;

        let title = file_stem(&audio.name).to_string();
        info!(%title, lyrics_lines = document.lines.len(), "audio and lyrics submitted");
        Ok(AudioSubmission {
            title,
            audio: audio.clone(),
            lyrics: document,
        })
    }

    pub fn remove(&mut self, name: &str) -> bool {
        if self
            .lyrics
            .as_ref()
            .is_some_and(|lyrics| same_file_name(&lyrics.name, name))
        {
            self.lyrics = None;
            return true;
        }
        if self
            .audio
            .as_ref()
            .is_some_and(|audio| same_file_name(&audio.name, name))
        {
            self.audio = None;
            return true;
        }
        false
    }

    pub fn remove_rejected(&mut self, name: &str) -> bool {
        self.rejected.remove(name)
    }

    /// Adds rejections found before classification (unreadable paths).
    pub fn push_rejections(&mut self, rejections: Vec<Rejection>) {
        self.rejected.extend(rejections);
    }
}

fn is_lyrics_type(declared_type: &str) -> bool {
    declared_type.is_empty() || declared_type.eq_ignore_ascii_case("text/plain")
}
