use thiserror::Error;

/// Zero-position timestamp every lyrics file must carry.
pub const ANCHOR: &str = "[00:00.00]";
/// Stands in for a blank first line so the player's line 0 is never empty.
pub const PLACEHOLDER_GLYPH: &str = "\u{266B}";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LyricsError {
    #[error("lyrics file missing required anchor {ANCHOR}")]
    MissingAnchor,
    #[error("lyrics file has no content after {ANCHOR}")]
    EmptyBody,
}

impl LyricsError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingAnchor => "lyrics-missing-anchor",
            Self::EmptyBody => "lyrics-empty-body",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricLine {
    pub timestamp_ms: Option<u32>,
    pub text: String,
}

/// Normalised lyrics: the anchor-prefixed text handed to the player plus the
/// timed lines parsed out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricsDocument {
    text: String,
    pub lines: Vec<LyricLine>,
}

impl LyricsDocument {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// 0-based index of the line playing at `position_ms`, or -1 before the
    /// first timed line.
    pub fn line_at(&self, position_ms: u64) -> i64 {
        let position = u32::try_from(position_ms).unwrap_or(u32::MAX);
        let timed = self
            .lines
            .partition_point(|line| line.timestamp_ms.is_some_and(|ts| ts <= position));
        timed as i64 - 1
    }
}

/// Drops everything up to and including the first anchor, substitutes the
/// placeholder glyph for a blank first line, then re-prefixes the anchor.
pub fn normalize_lyrics(raw: &str) -> Result<LyricsDocument, LyricsError> {
    let Some((_, body)) = raw.split_once(ANCHOR) else {
        return Err(LyricsError::MissingAnchor);
    };
    if body.is_empty() {
        return Err(LyricsError::EmptyBody);
    }

    let first_line = body.split('\n').next().unwrap_or_default();
    let text = if first_line.trim().is_empty() {
        format!("{ANCHOR}{PLACEHOLDER_GLYPH}{body}")
    } else {
        format!("{ANCHOR}{body}")
    };

    Ok(LyricsDocument {
        lines: parse_lrc(&text),
        text,
    })
}

/// First body line of a normalised document (the text after the anchor).
pub fn first_line(doc: &LyricsDocument) -> &str {
    doc.text
        .strip_prefix(ANCHOR)
        .and_then(|body| body.split('\n').next())
        .unwrap_or_default()
}

pub fn parse_lrc(input: &str) -> Vec<LyricLine> {
    let mut lines = Vec::new();

    for raw_line in input.lines() {
        let line = raw_line.trim_end();
        if line.is_empty() || is_metadata_lrc_line(line) {
            continue;
        }

        let (timestamps, text_with_possible_word_tags) = parse_line_timestamps(line);
        let text = strip_word_timestamps(text_with_possible_word_tags);

        if timestamps.is_empty() {
            lines.push(LyricLine {
                timestamp_ms: None,
                text,
            });
            continue;
        }

        for timestamp_ms in timestamps {
            lines.push(LyricLine {
                timestamp_ms: Some(timestamp_ms),
                text: text.clone(),
            });
        }
    }

    lines.sort_by_key(|line| line.timestamp_ms.unwrap_or(u32::MAX));
    lines
}

fn is_metadata_lrc_line(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.starts_with("[ar:")
        || lower.starts_with("[ti:")
        || lower.starts_with("[al:")
        || lower.starts_with("[by:")
        || lower.starts_with("[offset:")
        || lower.starts_with("[length:")
}

fn parse_line_timestamps(input: &str) -> (Vec<u32>, &str) {
    let mut remaining = input;
    let mut out = Vec::new();

    while remaining.starts_with('[') {
        let Some(closing_idx) = remaining.find(']') else {
            break;
        };
        let token = &remaining[..=closing_idx];
        let Some(ms) = parse_single_lrc_timestamp(token) else {
            break;
        };
        out.push(ms);
        remaining = &remaining[closing_idx + 1..];
    }

    (out, remaining.trim_start())
}

fn parse_single_lrc_timestamp(token: &str) -> Option<u32> {
    if !(token.starts_with('[') && token.ends_with(']')) {
        return None;
    }
    let content = &token[1..token.len().saturating_sub(1)];
    let (minutes, seconds_part) = content.split_once(':')?;
    let minutes = minutes.parse::<u32>().ok()?;
    if seconds_part.contains(':') {
        return None;
    }

    let (seconds, fraction_raw) = seconds_part.split_once('.').unwrap_or((seconds_part, "0"));
    let seconds = seconds.parse::<u32>().ok()?;
    let hundredths = match fraction_raw.len() {
        0 => 0,
        1 => fraction_raw.parse::<u32>().ok()?.saturating_mul(10),
        _ => fraction_raw.get(..2)?.parse::<u32>().ok()?,
    };

    Some(
        minutes
            .saturating_mul(60_000)
            .saturating_add(seconds.saturating_mul(1000))
            .saturating_add(hundredths.saturating_mul(10)),
    )
}

fn strip_word_timestamps(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut remaining = input;

    while let Some(open_idx) = remaining.find('<') {
        out.push_str(&remaining[..open_idx]);
        let tail = &remaining[open_idx..];
        let Some(close_idx) = tail.find('>') else {
            out.push_str(tail);
            remaining = "";
            break;
        };
        let token = &tail[..=close_idx];
        let as_line_tag = format!("[{}]", &token[1..token.len().saturating_sub(1)]);
        if parse_single_lrc_timestamp(&as_line_tag).is_none() {
            out.push_str(token);
        }
        remaining = &tail[close_idx + 1..];
    }

    out.push_str(remaining);
    out.trim().to_string()
}
