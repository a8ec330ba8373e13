mod app;
mod console;
mod tui;

use std::fs::File;
use std::io;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use bomberlan::SessionConfig;

use app::App;

#[derive(Parser)]
#[command(name = "bomberlan-client")]
#[command(about = "LAN bomber client; hosts a server when none is found")]
struct Args {
    #[arg(short, long, default_value = "")]
    name: String,

    #[arg(long, default_value = "")]
    password: String,

    #[arg(long, help = "Log in as soon as the server connection is up")]
    auto_login: bool,

    #[arg(short, long, default_value_t = bomberlan::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    #[arg(long, default_value = "255.255.255.255")]
    broadcast: IpAddr,

    #[arg(long, default_value = "bomberlan-client.log")]
    log_file: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // The terminal belongs to the TUI, so logs go to a file.
    let log_file = File::create(&args.log_file)
        .with_context(|| format!("cannot open log file {}", args.log_file))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();

    let config = SessionConfig {
        port: args.port,
        bind_addr: args.bind,
        broadcast_addr: args.broadcast,
        ..Default::default()
    };

    let mut app = App::new(config, args.name, args.password, args.auto_login);
    app.start();

    let result = run_with_tui(&mut app);
    app.shutdown();
    log::info!("Client shutting down");
    result
}

fn run_with_tui(app: &mut App) -> Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut last_frame = Instant::now();
    let mut frame_count = 0u64;
    let mut failure = None;

    while !app.should_quit() {
        let now = Instant::now();
        let dt = (now - last_frame).as_secs_f32();
        last_frame = now;

        if let Err(e) = app.tick(dt) {
            failure = Some(e);
            break;
        }

        frame_count += 1;
        terminal.draw(|frame| tui::render(frame, app, frame_count))?;

        if event::poll(Duration::from_millis(16))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code, key.modifiers);
                }
            }
        }
    }

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    match failure {
        Some(e) => Err(e).context("client session failed"),
        None => Ok(()),
    }
}
