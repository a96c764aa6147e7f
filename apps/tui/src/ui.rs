//! UI rendering module.
//!
//! Contains all the widget rendering logic (View).

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span, Text},
    widgets::{Block, Borders, Gauge, List, ListItem, Padding, Paragraph, Tabs, Wrap},
};

use crate::app::{App, Field, Focus, LogEntry, PacketInfo, Tab};
use canflash_core::SessionState;
use canflash_core::events::{LogLevel, PacketDirection};

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &App) {
    let area = frame.area();

    // Create main layout
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header/tabs
            Constraint::Min(10),   // Main content
            Constraint::Length(3), // Footer/status bar
        ])
        .split(area);

    draw_header(frame, chunks[0], app);

    match app.current_tab {
        Tab::Main => draw_main_view(frame, chunks[1], app),
        Tab::Logs => draw_logs_view(frame, chunks[1], app),
        Tab::Bus => draw_bus_view(frame, chunks[1], app),
        Tab::Help => draw_help_view(frame, chunks[1]),
    }

    draw_footer(frame, chunks[2], app);
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let titles = vec!["Main", "Logs (F2)", "Bus (F3)", "Help (F1)"];
    let selected = match app.current_tab {
        Tab::Main => 0,
        Tab::Logs => 1,
        Tab::Bus => 2,
        Tab::Help => 3,
    };

    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" canflash ")
                .title_style(
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
        )
        .select(selected)
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
        .divider(symbols::DOT);

    frame.render_widget(tabs, area);
}

fn draw_footer(frame: &mut Frame, area: Rect, app: &App) {
    let bus = if app.bus_muted {
        Span::styled(" ● Bus muted ", Style::default().fg(Color::Yellow))
    } else {
        Span::styled(" ○ Bus live ", Style::default().fg(Color::Green))
    };

    let state = Span::styled(format!(" {} ", app.state), Style::default().fg(Color::Cyan));

    let help = Span::styled(
        " Ctrl+Q: Quit | Enter: Start | Ctrl+X: Cancel | F5: Unmute | Ctrl+S: Save ",
        Style::default().fg(Color::DarkGray),
    );

    let line = Line::from(vec![bus, state, help]);

    let footer = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );

    frame.render_widget(footer, area);
}

fn draw_main_view(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(40), // Config
            Constraint::Percentage(60), // Status & Progress
        ])
        .split(area);

    draw_config_panel(frame, chunks[0], app);
    draw_status_panel(frame, chunks[1], app);
}

fn draw_config_panel(frame: &mut Frame, area: Rect, app: &App) {
    let is_focused = app.focus == Focus::Config;
    let border_color = if is_focused {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Upload ")
        .title_style(Style::default().fg(if is_focused {
            Color::Yellow
        } else {
            Color::White
        }))
        .padding(Padding::horizontal(1));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let fields_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            Field::ALL
                .iter()
                .map(|_| Constraint::Length(2))
                .chain(std::iter::once(Constraint::Min(1))) // Start button
                .collect::<Vec<_>>(),
        )
        .split(inner);

    for (i, field) in Field::ALL.iter().enumerate() {
        let is_active = is_focused && app.input_focus == i;
        let style = if is_active {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::White)
        };

        let value = app.field_value(*field);
        let width = (fields_layout[i].width as usize).saturating_sub(field.label().len() + 2);
        let display_value = if value.chars().count() > width && width > 3 {
            let tail: String = value
                .chars()
                .skip(value.chars().count() - (width - 3))
                .collect();
            format!("...{}", tail)
        } else {
            value
        };

        let cursor = if is_active && !field.is_choice() {
            "▏"
        } else {
            ""
        };

        let input = Paragraph::new(Line::from(vec![
            Span::styled(field.label(), Style::default().fg(Color::Cyan)),
            Span::raw(" "),
            Span::styled(display_value, style),
            Span::styled(cursor, Style::default().fg(Color::Yellow)),
        ]))
        .block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_style(if is_active {
                    Style::default().fg(Color::Yellow)
                } else {
                    Style::default().fg(Color::DarkGray)
                }),
        );

        frame.render_widget(input, fields_layout[i]);
    }

    // Start button
    let button_style = if app.is_running {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Green)
    };

    let button_text = if app.is_running {
        "⟳ Running... (Ctrl+X to cancel)"
    } else {
        "▶ Enter to start"
    };
    let button = Paragraph::new(button_text)
        .style(button_style)
        .alignment(Alignment::Center);

    if let Some(slot) = fields_layout.get(Field::ALL.len()) {
        frame.render_widget(button, *slot);
    }
}

fn draw_status_panel(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Progress
            Constraint::Length(6), // Firmware info
            Constraint::Min(5),    // Recent logs
        ])
        .split(area);

    draw_progress(frame, chunks[0], app);
    draw_firmware_info(frame, chunks[1], app);
    draw_recent_logs(frame, chunks[2], app);
}

fn draw_firmware_info(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Firmware ");

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let content = if let Some(info) = &app.image_info {
        vec![
            Line::from(vec![
                Span::styled("Size: ", Style::default().fg(Color::Cyan)),
                Span::styled(
                    format!("{} bytes ({:.1} KB)", info.bytes, info.bytes as f64 / 1024.0),
                    Style::default().fg(Color::White),
                ),
            ]),
            Line::from(vec![
                Span::styled("Base: ", Style::default().fg(Color::Cyan)),
                Span::styled(
                    format!("0x{:08X}", info.base_address),
                    Style::default().fg(Color::White),
                ),
                Span::raw("  "),
                Span::styled("Frames: ", Style::default().fg(Color::Cyan)),
                Span::styled(info.chunks.to_string(), Style::default().fg(Color::White)),
            ]),
            Line::from(vec![
                Span::styled("Lost: ", Style::default().fg(Color::Cyan)),
                Span::styled(
                    app.packets_lost.to_string(),
                    Style::default().fg(if app.packets_lost > 0 {
                        Color::Yellow
                    } else {
                        Color::White
                    }),
                ),
            ]),
        ]
    } else {
        vec![
            Line::from(Span::styled(
                "No firmware loaded",
                Style::default().fg(Color::DarkGray),
            )),
            Line::from(Span::styled(
                "Enter a .hex or .bin path",
                Style::default().fg(Color::DarkGray),
            )),
        ]
    };

    frame.render_widget(Paragraph::new(content), inner);
}

fn draw_progress(frame: &mut Frame, area: Rect, app: &App) {
    let color = match app.state {
        SessionState::Done => Color::Green,
        SessionState::Failed => Color::Red,
        _ => Color::Cyan,
    };

    let percent = app.progress.clamp(0.0, 100.0);
    let label = if app.operation.is_empty() {
        format!("{:.1}%", percent)
    } else {
        format!("{}: {:.1}%", app.operation, percent)
    };

    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(" Progress "),
        )
        .gauge_style(Style::default().fg(color).bg(Color::Black))
        .ratio(percent / 100.0)
        .label(label);

    frame.render_widget(gauge, area);
}

fn draw_recent_logs(frame: &mut Frame, area: Rect, app: &App) {
    let is_focused = app.focus == Focus::Logs;
    let border_color = if is_focused {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let mut items: Vec<ListItem> = app
        .logs
        .iter()
        .rev()
        .take(area.height.saturating_sub(2) as usize)
        .map(|entry| log_to_list_item(entry, area.width))
        .collect();
    items.reverse();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border_color))
                .title(" Recent Logs "),
        )
        .style(Style::default().fg(Color::White));

    frame.render_widget(list, area);
}

fn draw_logs_view(frame: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .logs
        .iter()
        .skip(app.log_scroll)
        .take(area.height.saturating_sub(2) as usize)
        .map(|entry| log_to_list_item(entry, area.width))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(format!(
                    " Logs ({}/{}) ",
                    app.log_scroll + 1,
                    app.logs.len().max(1)
                )),
        )
        .style(Style::default().fg(Color::White));

    frame.render_widget(list, area);
}

fn draw_bus_view(frame: &mut Frame, area: Rect, app: &App) {
    let rows = area.height.saturating_sub(2) as usize;
    // Keep the scrolled-to frame on the last visible row
    let first = (app.packet_scroll + 1).saturating_sub(rows);

    let items: Vec<ListItem> = app
        .packets
        .iter()
        .skip(first)
        .take(rows)
        .map(packet_to_list_item)
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(format!(" Bus Trace ({} frames) ", app.packets.len())),
    );

    frame.render_widget(list, area);
}

fn packet_to_list_item(packet: &PacketInfo) -> ListItem<'static> {
    let (arrow, color) = match packet.direction {
        PacketDirection::Tx => ("→", Color::Green),
        PacketDirection::Rx => ("←", Color::Magenta),
    };

    ListItem::new(Line::from(vec![
        Span::styled(
            format!("{} ", packet.timestamp),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("{} {} ", arrow, packet.direction),
            Style::default().fg(color),
        ),
        Span::styled(format!("{} ", packet.id), Style::default().fg(Color::Cyan)),
        Span::styled(
            format!("[{}] ", packet.length),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(packet.data_preview.clone(), Style::default().fg(Color::White)),
    ]))
}

fn draw_help_view(frame: &mut Frame, area: Rect) {
    let help_text = vec![
        "",
        "  canflash - CAN bus firmware uploader",
        "",
        "  KEYBOARD SHORTCUTS:",
        "",
        "  Ctrl+Q, Ctrl+C, Esc    Quit application",
        "  F1                     Show this help",
        "  F2                     View full logs",
        "  F3                     View bus trace",
        "  F5                     Send the unmute sequence",
        "  Ctrl+S                 Save the form to canflash.toml",
        "  Ctrl+X                 Cancel a running upload",
        "  Tab                    Switch focus between panels",
        "  Up/Down                Navigate input fields",
        "  Left/Right, Space      Change interface, target, unmute",
        "  Enter                  Start the upload",
        "",
        "  IN LOGS AND BUS VIEWS:",
        "",
        "  j/k, Up/Down           Scroll",
        "  Page Up/Down           Scroll by page",
        "  Home/End               Go to start/end",
        "",
        "  USAGE:",
        "",
        "  1. Pick the interface and target node",
        "  2. Enter the firmware path (.hex or .bin)",
        "  3. Press Enter and watch the progress and logs",
        "  4. If the target never answers the bus stays muted; F5 restores it",
        "",
        "  Press any key to return...",
    ];

    let text: Vec<Line> = help_text.iter().map(|s| Line::from(*s)).collect();

    let help = Paragraph::new(Text::from(text))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Help "),
        )
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: false });

    frame.render_widget(help, area);
}

fn log_to_list_item(entry: &LogEntry, width: u16) -> ListItem<'static> {
    let (icon, color) = match entry.level {
        LogLevel::Error => ("✗", Color::Red),
        LogLevel::Warn => ("⚠", Color::Yellow),
        LogLevel::Info => ("●", Color::Green),
        LogLevel::Debug => ("○", Color::Blue),
        LogLevel::Trace => ("·", Color::DarkGray),
    };

    let time_len = entry.timestamp.len() + 1; // +1 for space
    let icon_len = 2; // 1 char + 1 space
    let msg_width = (width.saturating_sub((time_len + icon_len + 4) as u16) as usize).max(1);

    let chars: Vec<char> = entry.message.chars().collect();
    let mut lines = Vec::new();
    for (i, chunk) in chars.chunks(msg_width).enumerate() {
        let text: String = chunk.iter().collect();
        if i == 0 {
            lines.push(Line::from(vec![
                Span::styled(
                    format!("{} ", entry.timestamp),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(format!("{} ", icon), Style::default().fg(color)),
                Span::styled(text, Style::default().fg(Color::White)),
            ]));
        } else {
            lines.push(Line::from(vec![
                Span::raw(" ".repeat(time_len + icon_len)), // Indent
                Span::styled(text, Style::default().fg(Color::White)),
            ]));
        }
    }
    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("{} ", entry.timestamp),
            Style::default().fg(Color::DarkGray),
        )));
    }
    ListItem::new(Text::from(lines))
}
