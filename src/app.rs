use crate::audio::{AudioEngine, RodioAudioEngine, SilentAudioEngine};
use crate::config::Settings;
use crate::model::Slide;
use crate::playback::LyricsPlayer;
use crate::scheduler::{Clock, SystemClock};
use crate::session::{Flow, LyrixSession, SEEK_STEP_MS};
use crate::upload::{HttpObjectStore, ObjectStore, UnconfiguredStore};
use crate::worker::IngestWorker;
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct AppOptions {
    pub settings: Settings,
    pub silent: bool,
}

pub fn build_store(settings: &Settings) -> Arc<dyn ObjectStore> {
    let Some(url) = settings.upload_url.as_deref() else {
        warn!("no upload endpoint configured; image uploads will fail");
        return Arc::new(UnconfiguredStore);
    };
    match HttpObjectStore::new(url, settings.upload_preset.clone(), settings.upload_timeout()) {
        Ok(store) => {
            info!(endpoint = store.endpoint(), "upload endpoint configured");
            Arc::new(store)
        }
        Err(err) => {
            warn!("upload endpoint unusable: {err}");
            Arc::new(UnconfiguredStore)
        }
    }
}

fn build_engine(silent: bool) -> Box<dyn AudioEngine> {
    if silent {
        return Box::new(SilentAudioEngine::new());
    }
    match RodioAudioEngine::new() {
        Ok(engine) => Box::new(engine),
        Err(err) => {
            warn!("audio output unavailable, using silent engine: {err:#}");
            Box::new(SilentAudioEngine::new())
        }
    }
}

pub fn run(options: AppOptions) -> Result<()> {
    let worker = IngestWorker::new(build_store(&options.settings));
    let player = LyricsPlayer::new(build_engine(options.silent));
    info!(output = player.output_name(), "playback ready");
    let mut session = LyrixSession::new(&options.settings, Box::new(player), Box::new(worker));
    let clock = SystemClock::new();

    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(out);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    session.mount_surface();

    let mut command_mode = false;
    let mut command_buffer = String::new();
    let mut last_draw = Instant::now();

    let result: Result<()> = loop {
        let now_ms = clock.now_ms();
        session.tick(now_ms);

        if session.dirty || last_draw.elapsed() > Duration::from_millis(250) {
            terminal.draw(|frame| {
                crate::ui::draw(frame, &session, now_ms, &command_buffer, command_mode)
            })?;
            session.dirty = false;
            last_draw = Instant::now();
        }

        if !event::poll(Duration::from_millis(33))? {
            continue;
        }

        let Event::Key(key) = event::read()? else {
            continue;
        };

        if key.kind != KeyEventKind::Press {
            continue;
        }

        if command_mode {
            match key.code {
                KeyCode::Esc => {
                    command_mode = false;
                    command_buffer.clear();
                    session.dirty = true;
                }
                KeyCode::Enter => {
                    run_command(&mut session, &command_buffer);
                    command_mode = false;
                    command_buffer.clear();
                }
                KeyCode::Backspace => {
                    command_buffer.pop();
                    session.dirty = true;
                }
                KeyCode::Char(ch) => {
                    command_buffer.push(ch);
                    session.dirty = true;
                }
                _ => {}
            }
            continue;
        }

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break Ok(()),
            KeyCode::Left => session.slide(Slide::Left, clock.now_ms()),
            KeyCode::Right => session.slide(Slide::Right, clock.now_ms()),
            KeyCode::Char(' ') => session.toggle_pause(),
            KeyCode::Char('[') => session.seek_by(-SEEK_STEP_MS),
            KeyCode::Char(']') => session.seek_by(SEEK_STEP_MS),
            KeyCode::Char(':') => {
                command_mode = true;
                session.dirty = true;
            }
            _ => {}
        }
    };

    session.unmount_surface();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

/// Splits on whitespace, keeping double-quoted runs together.
fn split_args(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for ch in input.chars() {
        match ch {
            '"' => quoted = !quoted,
            ch if ch.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            ch => current.push(ch),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn run_command(session: &mut LyrixSession, raw: &str) {
    let input = raw.trim();
    if input.is_empty() {
        session.status = String::from("No command");
        session.dirty = true;
        return;
    }

    let mut command_split = input.splitn(2, char::is_whitespace);
    let command = command_split.next().unwrap_or_default();
    let rest = command_split.next().unwrap_or("").trim();

    match command {
        "help" => {
            session.status = String::from(
                "Commands: audio <path> | images <paths> | breakdown <path> | submit <audio|images|breakdown> | retry | remove <flow> <name> | dismiss <flow> <name> | clear",
            );
            session.dirty = true;
        }
        "audio" | "images" | "breakdown" => {
            let paths: Vec<PathBuf> = split_args(rest).into_iter().map(PathBuf::from).collect();
            if paths.is_empty() {
                session.status = format!("Usage: {command} <path>");
                session.dirty = true;
                return;
            }
            match command.parse::<Flow>() {
                Ok(flow) => session.drop_paths(flow, &paths),
                Err(err) => {
                    session.status = err;
                    session.dirty = true;
                }
            }
        }
        "submit" => match rest.parse::<Flow>() {
            Ok(flow) => session.submit(flow),
            Err(_) => {
                session.status = String::from("Usage: submit <audio|images|breakdown>");
                session.dirty = true;
            }
        },
        "retry" => session.retry(),
        "remove" | "dismiss" => {
            let mut split = rest.splitn(2, char::is_whitespace);
            let flow = split.next().unwrap_or_default().parse::<Flow>();
            let name = split.next().unwrap_or("").trim().trim_matches('"');
            let Ok(flow) = flow.map_err(|_| ()).and_then(|flow| {
                if name.is_empty() { Err(()) } else { Ok(flow) }
            }) else {
                session.status = format!("Usage: {command} <audio|images|breakdown> <name>");
                session.dirty = true;
                return;
            };
            if command == "remove" {
                session.remove(flow, name);
            } else {
                session.dismiss(flow, name);
            }
        }
        "clear" => session.clear_images(),
        _ => {
            session.status = String::from("Unknown command. Use :help");
            session.dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::InlineDispatcher;
    use std::fs;
    use tempfile::tempdir;

    fn session() -> LyrixSession {
        LyrixSession::new(
            &Settings::default(),
            Box::new(LyricsPlayer::new(Box::new(SilentAudioEngine::new()))),
            Box::new(InlineDispatcher::new(Arc::new(UnconfiguredStore))),
        )
    }

    #[test]
    fn unknown_command_is_reported() {
        let mut session = session();
        run_command(&mut session, "wat");
        assert!(session.status.contains("Unknown command"));
    }

    #[test]
    fn quoted_paths_keep_spaces() {
        assert_eq!(
            split_args(r#"a.png "My Covers/b.png"  c.png"#),
            vec!["a.png", "My Covers/b.png", "c.png"]
        );
    }

    #[test]
    fn images_command_drops_files_from_disk() {
        let dir = tempdir().expect("tempdir");
        let cover = dir.path().join("cover art.png");
        fs::write(&cover, b"png").expect("write");

        let mut session = session();
        run_command(&mut session, &format!("images \"{}\"", cover.display()));
        assert!(session.image_intake().contains("cover art.png"));

        run_command(&mut session, "remove images cover art.png");
        assert!(session.image_intake().is_empty());
    }

    #[test]
    fn malformed_remove_shows_usage() {
        let mut session = session();
        run_command(&mut session, "remove video x");
        assert!(session.status.starts_with("Usage: remove"));
        run_command(&mut session, "dismiss images");
        assert!(session.status.starts_with("Usage: dismiss"));
    }

    #[test]
    fn submit_without_files_reports_reason() {
        let mut session = session();
        run_command(&mut session, "submit breakdown");
        assert!(session.status.contains("nothing to submit"));
        run_command(&mut session, "submit audio");
        assert!(session.status.contains("audio file is required"));
    }
}
