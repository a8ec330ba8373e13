use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use bomberlan::world::{HEIGHT, Tile, TileWorld, WIDTH};
use bomberlan::{ClientState, Color32};

use crate::app::{App, InputMode, LoginField};

const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

fn color(c: Color32) -> Color {
    Color::Rgb(c.r, c.g, c.b)
}

pub fn render(frame: &mut Frame, app: &App, frame_count: u64) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(HEIGHT as u16 + 2),
            Constraint::Length(8),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(WIDTH as u16 * 2 + 2),
            Constraint::Min(20),
        ])
        .split(chunks[1]);

    render_status(frame, chunks[0], app, frame_count);
    render_board(frame, middle[0], app);
    render_sidebar(frame, middle[1], app);
    render_chat(frame, chunks[2], app);
    render_input(frame, chunks[3], app);
}

fn render_status(frame: &mut Frame, area: Rect, app: &App, frame_count: u64) {
    let ui = app.session().ui();
    let mut text = ui.status.clone();
    if ui.status_animated {
        text.push(' ');
        text.push(SPINNER[(frame_count / 8) as usize % SPINNER.len()]);
    }

    let title = if app.is_hosting() {
        " Bomberlan (hosting) "
    } else {
        " Bomberlan "
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(color(ui.status_color)));
    frame.render_widget(paragraph, area);
}

fn render_board(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .title(" Board ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let session = app.session();
    if *session.state() != ClientState::InGame {
        frame.render_widget(Paragraph::new("").block(block), area);
        return;
    }

    let world = session.world();
    let mut cells: Vec<Vec<Span>> = (0..HEIGHT)
        .map(|y| {
            (0..WIDTH)
                .map(|x| match world.tile(x, y) {
                    Some(Tile::Wall) => Span::styled("██", Style::default().fg(Color::Gray)),
                    Some(Tile::WallCracked) => {
                        Span::styled("▒▒", Style::default().fg(Color::Rgb(150, 110, 60)))
                    }
                    Some(Tile::Bomb) => Span::styled("()", Style::default().fg(Color::Red)),
                    _ => Span::raw("  "),
                })
                .collect()
        })
        .collect();

    for peer in session.peers().iter() {
        if let Some((x, y)) = TileWorld::tile_at(peer.position) {
            let (mark, tint) = session
                .roster()
                .get(peer.player_id)
                .map(|p| (p.name.chars().next().unwrap_or('?'), color(p.color)))
                .unwrap_or(('?', Color::White));
            cells[y][x] = Span::styled(
                format!("{} ", mark.to_ascii_uppercase()),
                Style::default().fg(tint).add_modifier(Modifier::BOLD),
            );
        }
    }

    if let Some((x, y)) = TileWorld::tile_at(app.position()) {
        let tint = session
            .roster()
            .local()
            .map(|p| color(p.color))
            .unwrap_or(Color::White);
        cells[y][x] = Span::styled("@ ", Style::default().fg(tint).add_modifier(Modifier::BOLD));
    }

    let lines: Vec<Line> = cells.into_iter().map(Line::from).collect();
    frame.render_widget(Paragraph::new(lines).block(block), area);

    if let Some(text) = session.ui().fade_text() {
        let banner = Rect {
            x: area.x + area.width / 4,
            y: area.y + (area.height / 2).saturating_sub(1),
            width: area.width / 2,
            height: 3.min(area.height),
        };
        frame.render_widget(Clear, banner);
        frame.render_widget(
            Paragraph::new(text)
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL))
                .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
            banner,
        );
    }
}

fn render_sidebar(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(4), Constraint::Length(6)])
        .split(area);

    let names: Vec<Line> = app
        .session()
        .ui()
        .names
        .lines()
        .map(|name| Line::from(name.to_string()))
        .collect();
    frame.render_widget(
        Paragraph::new(names).block(
            Block::default()
                .title(" Players ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Magenta)),
        ),
        chunks[0],
    );

    let net = match app.session().network_stats() {
        Some(stats) => vec![
            Line::from(format!(
                "pkts {} / {}",
                stats.packets_sent, stats.packets_received
            )),
            Line::from(format!("rtt {:.1}ms", stats.rtt_ms)),
            Line::from(format!("resent {:.1}%", stats.resend_percent())),
            Line::from(
                app.session()
                    .local_port()
                    .map(|p| format!("port {}", p))
                    .unwrap_or_default(),
            ),
        ],
        None => vec![Line::from("offline")],
    };
    frame.render_widget(
        Paragraph::new(net).block(
            Block::default()
                .title(" Network ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        ),
        chunks[1],
    );
}

fn render_chat(frame: &mut Frame, area: Rect, app: &App) {
    let visible = area.height.saturating_sub(2) as usize;
    let ui = app.session().ui();

    let mut lines: Vec<Line> = app
        .events()
        .map(|line| Line::styled(line.clone(), Style::default().fg(Color::DarkGray)))
        .collect();
    lines.extend(ui.chat.iter().map(|chat| {
        Line::from(vec![
            Span::styled(
                format!("<{}> ", chat.name),
                Style::default().fg(color(chat.color)),
            ),
            Span::raw(chat.message.clone()),
        ])
    }));
    let skip = lines.len().saturating_sub(visible);

    frame.render_widget(
        Paragraph::new(lines.split_off(skip)).block(
            Block::default()
                .title(" Chat ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Blue)),
        ),
        area,
    );
}

fn render_input(frame: &mut Frame, area: Rect, app: &App) {
    let (title, text) = match app.mode() {
        InputMode::Menu => (" Menu ", String::from("r: search again  |  q: quit")),
        InputMode::Login(field) => {
            let masked = "*".repeat(app.password().chars().count());
            let (name, password) = match field {
                LoginField::Name => (format!("[{}]", app.name()), masked),
                LoginField::Password => (app.name().to_string(), format!("[{}]", masked)),
            };
            (
                " Login (Tab switch, Enter submit) ",
                format!("name: {}  password: {}", name, password),
            )
        }
        InputMode::Play => (
            " Controls ",
            String::from("arrows/wasd move  |  space bomb  |  t chat  |  q quit"),
        ),
        InputMode::Chat => (" Say ", format!("{}_", app.chat_input())),
    };

    frame.render_widget(
        Paragraph::new(text).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        ),
        area,
    );
}
