mod config;
mod server;
mod tui;

use std::io;
use std::net::IpAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use bomberlan::{PacketLossSimulation, SessionConfig};
use config::ServerConfig;
use server::GameServer;
use tui::TuiState;

#[derive(Parser)]
#[command(name = "bomberlan-server")]
#[command(about = "Dedicated LAN bomber server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,

    #[arg(short, long, default_value_t = bomberlan::DEFAULT_PORT)]
    port: u16,

    #[arg(long, default_value = "255.255.255.255", help = "Where advertisements are sent")]
    broadcast: IpAddr,

    #[arg(short, long, default_value_t = 60)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = bomberlan::net::DEFAULT_MAX_CONNECTIONS)]
    max_clients: usize,

    #[arg(long, default_value_t = 0.05, help = "Seconds between state updates")]
    state_interval: f32,

    #[arg(long, help = "Seed for the board generator")]
    seed: Option<u64>,

    #[arg(long)]
    headless: bool,

    #[arg(long, help = "Enable packet loss simulation")]
    simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let loss_simulation = args
        .simulate_packet_loss
        .then(|| PacketLossSimulation::new(args.loss_percent));

    let config = ServerConfig {
        tick_rate: args.tick_rate,
        seed: args.seed,
        session: SessionConfig {
            port: args.port,
            bind_addr: args.bind,
            broadcast_addr: args.broadcast,
            max_connections: args.max_clients,
            state_interval: args.state_interval,
            loss_simulation,
            ..Default::default()
        },
    };

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let mut server = GameServer::new(config).context("failed to start server")?;

    if args.headless {
        server.run()?;
        log::info!("Server shutting down");
    } else {
        run_with_tui(&mut server)?;
    }

    Ok(())
}

fn run_with_tui(server: &mut GameServer) -> Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let running = server.running();
    let mut tui_state = TuiState::new();
    let mut failure = None;

    while running.load(Ordering::SeqCst) {
        if let Err(e) = server.tick_once() {
            failure = Some(e);
            break;
        }

        for event in server.drain_events() {
            tui_state.record(event);
        }

        if event::poll(Duration::from_millis(1))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => running.store(false, Ordering::SeqCst),
                        KeyCode::PageUp => tui_state.scroll_up(),
                        KeyCode::PageDown => tui_state.scroll_down(),
                        KeyCode::End => tui_state.scroll_to_bottom(),
                        _ => {}
                    }
                }
            }
        }

        let stats = server.stats();
        let players = server.players();
        terminal.draw(|frame| {
            tui::render(frame, &tui_state, &stats, &players);
        })?;
    }

    server.shutdown();

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    match failure {
        Some(e) => Err(e).context("server loop failed"),
        None => Ok(()),
    }
}
