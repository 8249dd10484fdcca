//! Terminal graphics detection and the pixel geometry of the reader area.

use std::time::Duration;

use folio_core::ViewportSize;
use folio_engine::{TextArea, ViewportGeometry};
use ratatui::layout::Rect;
use ratatui_image::picker::{Capability, Picker, ProtocolType, cap_parser::QueryStdioOptions};

fn env_contains(key: &str, needle: &str) -> bool {
    std::env::var(key).is_ok_and(|value| value.contains(needle))
}

fn env_present(key: &str) -> bool {
    std::env::var(key).is_ok_and(|value| !value.trim().is_empty())
}

fn in_kitty() -> bool {
    env_present("KITTY_WINDOW_ID")
        || std::env::var("TERM").is_ok_and(|term| term.trim().starts_with("xterm-kitty"))
}

fn in_iterm() -> bool {
    env_present("ITERM_SESSION_ID")
        || env_contains("TERM_PROGRAM", "iTerm")
        || env_contains("LC_TERMINAL", "iTerm")
}

fn in_tmux() -> bool {
    std::env::var_os("TMUX").is_some()
}

/// How long to wait for the terminal to answer a capability query. Zero
/// means the terminal gave no hint it speaks a graphics protocol.
pub(crate) fn query_timeout() -> Duration {
    if in_kitty() || in_iterm() {
        Duration::from_millis(1500)
    } else if in_tmux() {
        Duration::from_millis(300)
    } else {
        Duration::ZERO
    }
}

pub(crate) fn detect_picker() -> Picker {
    if in_tmux() {
        // Graphics escape sequences only reach the outer terminal with passthrough on.
        let _ = std::process::Command::new("tmux")
            .args(["set-option", "-g", "allow-passthrough", "on"])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
    }

    let timeout = query_timeout();
    let mut picker = if timeout.is_zero() {
        Picker::halfblocks()
    } else {
        let mut options = QueryStdioOptions::default();
        options.timeout = timeout;
        options.text_sizing_protocol = false;
        Picker::from_query_stdio_with_options(options).unwrap_or_else(|err| {
            log::debug!("terminal graphics query failed: {err:?}");
            Picker::halfblocks()
        })
    };
    picker.set_background_color(image::Rgba([255u8, 255u8, 255u8, 255u8]));

    let kitty = !in_iterm()
        && (env_present("KITTY_WINDOW_ID")
            || picker
                .capabilities()
                .iter()
                .any(|cap| matches!(cap, Capability::Kitty)));
    if kitty {
        picker.set_protocol_type(ProtocolType::Kitty);
    }
    log::info!(
        "terminal graphics: {} ({}x{} px cells)",
        protocol_label(&picker),
        picker.font_size().0,
        picker.font_size().1
    );
    picker
}

pub(crate) fn protocol_label(picker: &Picker) -> &'static str {
    match picker.protocol_type() {
        ProtocolType::Halfblocks => "halfblocks",
        ProtocolType::Sixel => "sixel",
        ProtocolType::Kitty => "kitty",
        ProtocolType::Iterm2 => "iterm2",
    }
}

/// The reader's content area, measured in cells and converted to device
/// pixels with the terminal's cell size. Updated on every draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TerminalViewport {
    pub area: Rect,
    pub cell: (u16, u16),
}

impl TerminalViewport {
    pub fn new(area: Rect, cell: (u16, u16)) -> Self {
        Self { area, cell }
    }

    pub fn text_area(&self) -> TextArea {
        TextArea::new(self.area.width.max(1), self.area.height.max(1))
    }
}

impl ViewportGeometry for TerminalViewport {
    fn available_size(&self) -> ViewportSize {
        let (cell_w, cell_h) = self.cell;
        ViewportSize::new(
            u32::from(self.area.width) * u32::from(cell_w.max(1)),
            u32::from(self.area.height) * u32::from(cell_h.max(1)),
        )
    }
}
