use crate::color::Rgb;
use crate::ingest::RejectionList;
use crate::ingest::images::{HashState, UploadState};
use crate::model::{Pane, SlideDirection};
use crate::navigation::Navigator;
use crate::session::{ContentBlock, LyrixSession};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph, Wrap};
use std::time::Duration;

const APP_TITLE_WITH_VERSION: &str = "Lyrix v0.1.0  ";

#[derive(Clone, Copy)]
struct Palette {
    bg: Color,
    panel_bg: Color,
    border: Color,
    text: Color,
    muted: Color,
    accent: Color,
    alert: Color,
    ok: Color,
}

/// Panels are tinted from the synchronised background so a segment colour
/// change reads across the whole screen.
fn palette(background: Rgb) -> Palette {
    let black = Rgb::new(0, 0, 0);
    let white = Rgb::new(255, 255, 255);
    Palette {
        bg: rgb(background),
        panel_bg: rgb(background.mix(black, 0.35)),
        border: rgb(background.mix(white, 0.45)),
        text: Color::Rgb(236, 240, 246),
        muted: rgb(background.mix(white, 0.65)),
        accent: Color::Rgb(100, 203, 184),
        alert: Color::Rgb(249, 174, 88),
        ok: Color::Rgb(130, 220, 140),
    }
}

fn rgb(color: Rgb) -> Color {
    Color::Rgb(color.r, color.g, color.b)
}

pub fn draw(
    frame: &mut Frame,
    session: &LyrixSession,
    now_ms: u64,
    command_buffer: &str,
    command_mode: bool,
) {
    let colors = palette(session.background_color(now_ms));
    frame.render_widget(
        Block::default().style(Style::default().bg(colors.bg)),
        frame.area(),
    );

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    draw_header(frame, session, &colors, vertical[0]);

    match session.pane() {
        Pane::Intro => draw_intake(frame, session, &colors, vertical[1]),
        Pane::Content => draw_content(frame, session, &colors, vertical[1]),
        Pane::End => draw_end(frame, session, &colors, vertical[1]),
    }

    let timeline = Paragraph::new(Span::styled(
        timeline_line(session, 32),
        Style::default().fg(colors.text),
    ))
    .block(panel_block("Timeline", colors.panel_bg, colors.text, colors.border));
    frame.render_widget(timeline, vertical[2]);

    let footer = if command_mode {
        Paragraph::new(Line::from(vec![
            Span::styled(":", Style::default().fg(colors.accent)),
            Span::styled(command_buffer, Style::default().fg(colors.text)),
        ]))
    } else {
        Paragraph::new(Line::from(vec![
            Span::styled(
                "Keys: Left/Right slide, Space pause, [ ] seek, : command, Ctrl+C quit",
                Style::default().fg(colors.muted),
            ),
            Span::styled("  |  ", Style::default().fg(colors.muted)),
            Span::styled(session.status.as_str(), Style::default().fg(colors.text)),
        ]))
    };
    frame.render_widget(
        footer.block(panel_block("Message", colors.panel_bg, colors.text, colors.border)),
        vertical[3],
    );
}

fn draw_header(frame: &mut Frame, session: &LyrixSession, colors: &Palette, area: Rect) {
    let mut spans = vec![Span::styled(
        APP_TITLE_WITH_VERSION,
        Style::default()
            .fg(colors.accent)
            .add_modifier(Modifier::BOLD),
    )];

    for (idx, pane) in [Pane::Intro, Pane::Content, Pane::End].into_iter().enumerate() {
        if idx > 0 {
            spans.push(Span::styled(" -- ", Style::default().fg(colors.muted)));
        }
        let mut style = Style::default().fg(colors.text);
        if pane == session.pane() {
            style = style.add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
        } else if session.navigator().target() == Some(pane) {
            style = style.fg(colors.alert);
        }
        spans.push(Span::styled(pane.label(), style));
    }

    spans.push(Span::styled(
        transition_marker(session.navigator()),
        Style::default().fg(colors.alert),
    ));
    if session.pane() == Pane::Intro && session.is_ready() {
        spans.push(Span::styled(
            "   ready -->",
            Style::default().fg(colors.ok).add_modifier(Modifier::BOLD),
        ));
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans))
            .block(panel_block("Lyrix", colors.panel_bg, colors.text, colors.border)),
        area,
    );
}

/// Slide arrow until the pane commits, then a settle mark until the
/// transition clears.
fn transition_marker(navigator: &Navigator) -> &'static str {
    if !navigator.transition_active() {
        return "";
    }
    match navigator.direction() {
        SlideDirection::ToLeft => "  <<",
        SlideDirection::ToRight => "  >>",
        SlideDirection::None => "  ~",
    }
}

fn draw_intake(frame: &mut Frame, session: &LyrixSession, colors: &Palette, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(30),
            Constraint::Percentage(40),
            Constraint::Percentage(30),
        ])
        .split(area);

    let audio = session.audio_intake();
    let mut items = vec![readiness_item("Submitted", session.audio_loaded(), colors)];
    items.push(held_item(
        "Audio",
        audio.audio().map(|asset| asset.name.as_str()),
        colors,
    ));
    items.push(held_item(
        "Lyrics",
        audio.lyrics().map(|file| file.name.as_str()),
        colors,
    ));
    items.extend(rejection_items(audio.rejected(), colors));
    frame.render_widget(
        List::new(items).block(panel_block(
            "Audio + Lyrics",
            colors.panel_bg,
            colors.text,
            colors.border,
        )),
        columns[0],
    );

    let images = session.image_intake();
    let mut items = vec![readiness_item("Uploaded", session.images_loaded(), colors)];
    for (_, record) in images.records() {
        let hash = match &record.hash {
            HashState::Pending => String::from("hashing"),
            HashState::Ready(hash) => hash.as_str().chars().take(8).collect(),
            HashState::Failed(_) => String::from("no hash"),
        };
        let (upload, style) = match &record.upload {
            UploadState::Idle => (String::from("ready"), Style::default().fg(colors.muted)),
            UploadState::InFlight { .. } => {
                (String::from("uploading"), Style::default().fg(colors.alert))
            }
            UploadState::Uploaded { .. } => (String::from("uploaded"), Style::default().fg(colors.ok)),
            UploadState::Failed { error } => (
                format!("failed ({})", error.code()),
                Style::default().fg(colors.alert),
            ),
        };
        items.push(ListItem::new(Line::from(vec![
            Span::styled(
                format!("  {} ", record.asset.name),
                Style::default().fg(colors.text),
            ),
            Span::styled(format!("[{hash}] "), Style::default().fg(colors.muted)),
            Span::styled(upload, style),
        ])));
    }
    items.extend(rejection_items(images.rejected(), colors));
    frame.render_widget(
        List::new(items).block(panel_block(
            &format!("Images ({})", images.len()),
            colors.panel_bg,
            colors.text,
            colors.border,
        )),
        columns[1],
    );

    let breakdown = session.breakdown_intake();
    let mut items = vec![readiness_item("Submitted", session.breakdown_loaded(), colors)];
    items.push(held_item(
        "File",
        breakdown.file().map(|file| file.name.as_str()),
        colors,
    ));
    items.extend(rejection_items(breakdown.rejected(), colors));
    frame.render_widget(
        List::new(items).block(panel_block(
            "Breakdown",
            colors.panel_bg,
            colors.text,
            colors.border,
        )),
        columns[2],
    );
}

fn readiness_item(label: &str, ready: bool, colors: &Palette) -> ListItem<'static> {
    let (mark, color) = if ready {
        ("[x]", colors.ok)
    } else {
        ("[ ]", colors.muted)
    };
    ListItem::new(Span::styled(
        format!("{mark} {label}"),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    ))
}

fn held_item(label: &str, name: Option<&str>, colors: &Palette) -> ListItem<'static> {
    ListItem::new(Line::from(vec![
        Span::styled(format!("{label:<7} "), Style::default().fg(colors.muted)),
        Span::styled(
            name.unwrap_or("-").to_string(),
            Style::default().fg(colors.text),
        ),
    ]))
}

fn rejection_items(rejected: &RejectionList, colors: &Palette) -> Vec<ListItem<'static>> {
    if rejected.is_empty() {
        return Vec::new();
    }
    let mut items = vec![ListItem::new(Span::styled(
        "Rejected",
        Style::default()
            .fg(colors.alert)
            .add_modifier(Modifier::BOLD),
    ))];
    for entry in rejected.iter() {
        items.push(ListItem::new(Span::styled(
            format!("  {} ({})", entry.file_name, entry.codes().join(", ")),
            Style::default().fg(colors.alert),
        )));
    }
    items
}

fn draw_content(frame: &mut Frame, session: &LyrixSession, colors: &Palette, area: Rect) {
    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);

    let current = session.player().current_line();
    let lines: Vec<Line> = session
        .lyrics()
        .map(|doc| {
            doc.lines
                .iter()
                .enumerate()
                .map(|(idx, line)| {
                    if idx as i64 == current {
                        Line::from(Span::styled(
                            format!("> {}", line.text),
                            Style::default()
                                .fg(colors.accent)
                                .add_modifier(Modifier::BOLD),
                        ))
                    } else {
                        Line::from(Span::styled(
                            format!("  {}", line.text),
                            Style::default().fg(colors.muted),
                        ))
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    let scroll = u16::try_from(current.max(0)).unwrap_or(u16::MAX).saturating_sub(3);
    let title = if session.sources().title.is_empty() {
        String::from("Lyrics")
    } else {
        session.sources().title.clone()
    };
    frame.render_widget(
        Paragraph::new(lines)
            .block(panel_block(&title, colors.panel_bg, colors.text, colors.border))
            .scroll((scroll, 0)),
        body[0],
    );

    let mut text = Vec::new();
    for block in session.active_blocks() {
        match block {
            ContentBlock::Markdown(markdown) => {
                for line in markdown.lines() {
                    text.push(Line::from(Span::styled(
                        line.to_string(),
                        Style::default().fg(colors.text),
                    )));
                }
            }
            ContentBlock::Image { name, url } => {
                let (label, color) = match url {
                    Some(url) => (format!("[image {name}] {url}"), colors.accent),
                    None => (format!("[image {name}] not uploaded"), colors.alert),
                };
                text.push(Line::from(Span::styled(label, Style::default().fg(color))));
            }
        }
        text.push(Line::from(""));
    }
    frame.render_widget(
        Paragraph::new(text)
            .block(panel_block(
                &format!("Segment {}", session.active_index()),
                colors.panel_bg,
                colors.text,
                colors.border,
            ))
            .wrap(Wrap { trim: false }),
        body[1],
    );
}

fn draw_end(frame: &mut Frame, session: &LyrixSession, colors: &Palette, area: Rect) {
    let title = session.sources().title.as_str();
    let text = vec![
        Line::from(Span::styled(
            "That's the whole breakdown.",
            Style::default()
                .fg(colors.accent)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            format!(
                "{} · {} segments · {} images",
                if title.is_empty() { "-" } else { title },
                session.breakdown().len(),
                session.images().len()
            ),
            Style::default().fg(colors.text),
        )),
        Line::from(Span::styled(
            "Slide left to return.",
            Style::default().fg(colors.muted),
        )),
    ];
    frame.render_widget(
        Paragraph::new(text)
            .alignment(Alignment::Center)
            .block(panel_block("End", colors.panel_bg, colors.text, colors.border)),
        area,
    );
}

fn panel_block(title: &str, bg: Color, text: Color, border: Color) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(text).add_modifier(Modifier::BOLD),
        ))
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(bg))
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{minutes:02}:{seconds:02}")
}

fn progress_bar(ratio: Option<f64>, width: usize) -> String {
    let clamped = ratio.unwrap_or(0.0).clamp(0.0, 1.0);
    let filled = (clamped * width as f64).round() as usize;
    let mut bar = String::with_capacity(width + 2);
    bar.push('[');
    bar.push_str(&"#".repeat(filled));
    bar.push_str(&"-".repeat(width.saturating_sub(filled)));
    bar.push(']');
    bar
}

fn timeline_line(session: &LyrixSession, bar_width: usize) -> String {
    if session.lyrics().is_none() {
        return String::from("--:-- / --:--  nothing loaded");
    }
    let player = session.player();
    let elapsed = player.position();
    let total = player.duration();
    let ratio = total.and_then(|duration| {
        let total_secs = duration.as_secs_f64();
        (total_secs > 0.0).then_some((elapsed.as_secs_f64() / total_secs).clamp(0.0, 1.0))
    });
    let scale = player.scale();
    let state = if player.is_finished() {
        "ended"
    } else if player.is_paused() {
        "paused"
    } else {
        "playing"
    };

    format!(
        "{} / {} {}  {state}  |  line {}  |  scale {:.0}%",
        format_duration(elapsed),
        total
            .map(format_duration)
            .unwrap_or_else(|| String::from("--:--")),
        progress_bar(ratio, bar_width),
        player.current_line(),
        scale.lyrics * 100.0
    )
}
