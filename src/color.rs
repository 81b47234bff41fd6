//! Background colour synchronisation.
//!
//! Segment colours travel as [`ColorIntent`]s over a channel to the one
//! [`BackgroundSurface`] that owns the shared background. The surface drops
//! intents until it is mounted, then cross-fades to each new colour after a
//! fixed delay.

use crate::model::BreakdownMap;
use std::fmt;
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, Sender};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_BACKGROUND: &str = "#5c6677";
pub const FADE_DELAY_MS: u64 = 200;
pub const FADE_DURATION_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    #[error("{0:?} is not a #rgb or #rrggbb colour")]
    Invalid(String),
}

impl ColorError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "color-invalid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Linear blend; `t` is clamped to `0.0..=1.0`.
    pub fn mix(self, other: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let channel = |a: u8, b: u8| (f32::from(a) + (f32::from(b) - f32::from(a)) * t).round() as u8;
        Self {
            r: channel(self.r, other.r),
            g: channel(self.g, other.g),
            b: channel(self.b, other.b),
        }
    }
}

impl FromStr for Rgb {
    type Err = ColorError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ColorError::Invalid(raw.to_string());
        let hex = raw.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let digit = |index: usize| u8::from_str_radix(&hex[index..=index], 16).map_err(|_| invalid());
        let pair = |index: usize| u8::from_str_radix(&hex[index..index + 2], 16).map_err(|_| invalid());
        match hex.len() {
            3 => Ok(Self::new(digit(0)? * 17, digit(1)? * 17, digit(2)? * 17)),
            6 => Ok(Self::new(pair(0)?, pair(2)?, pair(4)?)),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorIntent {
    SetBackground(String),
}

/// Sending half: turns segment colours into intents.
#[derive(Debug, Clone)]
pub struct ColorSynchronizer {
    intents: Sender<ColorIntent>,
}

impl ColorSynchronizer {
    /// Sends the segment's colour if it declares one. Returns whether an
    /// intent was sent.
    pub fn apply_segment(&self, breakdown: &BreakdownMap, index: u32) -> bool {
        let Some(color) = breakdown.get(index).and_then(|segment| segment.color.clone()) else {
            return false;
        };
        debug!(index, %color, "background colour requested");
        self.intents.send(ColorIntent::SetBackground(color)).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fade {
    from: Rgb,
    to: Rgb,
    starts_at: u64,
}

/// Single owner of the shared background.
#[derive(Debug)]
pub struct BackgroundSurface {
    intents: Receiver<ColorIntent>,
    mounted: bool,
    settled: Rgb,
    fade: Option<Fade>,
}

pub fn channel(initial: Rgb) -> (ColorSynchronizer, BackgroundSurface) {
    let (tx, rx) = mpsc::channel();
    (
        ColorSynchronizer { intents: tx },
        BackgroundSurface {
            intents: rx,
            mounted: false,
            settled: initial,
            fade: None,
        },
    )
}

pub fn default_background() -> Rgb {
    Rgb::from_str(DEFAULT_BACKGROUND).unwrap_or(Rgb::new(0x5c, 0x66, 0x77))
}

impl BackgroundSurface {
    pub fn mount(&mut self) {
        self.mounted = true;
    }

    pub fn unmount(&mut self) {
        self.mounted = false;
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Drains pending intents. Returns the colour a fade was started towards,
    /// if any.
    pub fn pump(&mut self, now_ms: u64) -> Option<Rgb> {
        let mut started = None;
        while let Ok(ColorIntent::SetBackground(raw)) = self.intents.try_recv() {
            if !self.mounted {
                debug!(color = %raw, "background not mounted; intent dropped");
                continue;
            }
            match Rgb::from_str(&raw) {
                Ok(to) => {
                    let from = self.color_at(now_ms);
                    self.settled = to;
                    self.fade = Some(Fade {
                        from,
                        to,
                        starts_at: now_ms.saturating_add(FADE_DELAY_MS),
                    });
                    started = Some(to);
                }
                Err(err) => warn!(code = err.code(), "{err}"),
            }
        }
        started
    }

    /// Colour visible at `now_ms`, mid-fade included.
    pub fn color_at(&self, now_ms: u64) -> Rgb {
        let Some(fade) = self.fade else {
            return self.settled;
        };
        if now_ms <= fade.starts_at {
            return fade.from;
        }
        let elapsed = now_ms - fade.starts_at;
        if elapsed >= FADE_DURATION_MS {
            return fade.to;
        }
        fade.from.mix(fade.to, elapsed as f32 / FADE_DURATION_MS as f32)
    }

    /// Colour the surface is heading to.
    pub fn target(&self) -> Rgb {
        self.settled
    }

    pub fn is_fading(&self, now_ms: u64) -> bool {
        self.fade
            .is_some_and(|fade| now_ms < fade.starts_at.saturating_add(FADE_DURATION_MS))
    }
}
