use anyhow::Result;
use codectl_specui::app::{App, Msg};
use codectl_specui::config::{load_config, Config};
use codectl_specui::runtime::{self, MsgSender};
use codectl_specui::ui;
use codectl_specui::watch::WatchHandle;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event, EventStream},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{fs::OpenOptions, io, sync::Mutex, time::Duration};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TICK: Duration = Duration::from_secs(1);
const RENDER_TICK: Duration = Duration::from_millis(33);

type Term = Terminal<CrosstermBackend<io::Stdout>>;

fn main() -> Result<()> {
    init_logging();
    let config = load_config();
    info!(root = %config.root.display(), "codectl_specui_start");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(config));
    // PTY reads and watch waits may still be parked on blocking threads.
    runtime.shutdown_timeout(Duration::from_millis(250));

    if let Err(err) = &result {
        eprintln!("codectl-specui: {err}");
    }
    result
}

async fn run(config: Config) -> Result<()> {
    let mut app = App::new(&config);
    let (tx, rx) = mpsc::unbounded_channel();

    let mut terminal = setup_terminal()?;
    let size = terminal.size()?;
    let mut pending = app.update(Msg::Resize(size.width, size.height));
    pending.extend(app.init(config.open.as_deref()));
    if config.live_watch {
        match WatchHandle::start(&app.tree.watch_dirs()) {
            Ok(handle) => pending.extend(app.attach_watch(handle)),
            Err(err) => warn!(error = %err, "watch_unavailable_using_fingerprint"),
        }
    }
    for cmd in pending {
        runtime::execute(app.root(), cmd, &tx);
    }

    let result = run_app(&mut terminal, &mut app, &tx, rx).await;
    restore_terminal(&mut terminal)?;
    result
}

fn setup_terminal() -> Result<Term> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Term) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_app(
    terminal: &mut Term,
    app: &mut App,
    tx: &MsgSender,
    mut rx: UnboundedReceiver<Msg>,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut tick = tokio::time::interval(TICK);
    let mut render_tick = tokio::time::interval(RENDER_TICK);
    render_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if app.should_quit() {
            break;
        }
        if app.take_redraw() {
            terminal.draw(|frame| ui::render(frame, app))?;
        }

        let msg = tokio::select! {
            _ = tick.tick() => Msg::Tick,
            _ = render_tick.tick() => Msg::RenderTick,
            Some(msg) = rx.recv() => msg,
            maybe_event = events.next() => match maybe_event {
                Some(Ok(event)) => match event_to_msg(event) {
                    Some(msg) => msg,
                    None => continue,
                },
                Some(Err(err)) => return Err(err.into()),
                None => break,
            },
        };
        for cmd in app.update(msg) {
            runtime::execute(app.root(), cmd, tx);
        }
    }
    info!("codectl_specui_quit");
    Ok(())
}

fn event_to_msg(event: Event) -> Option<Msg> {
    match event {
        Event::Key(key) => Some(Msg::Key(key)),
        Event::Mouse(mouse) => Some(Msg::Mouse(mouse)),
        Event::Resize(width, height) => Some(Msg::Resize(width, height)),
        _ => None,
    }
}

/// The TUI owns stdout, so logs go to `CODECTL_LOG_FILE` or nowhere.
fn init_logging() {
    let filter = std::env::var("CODECTL_LOG_LEVEL")
        .ok()
        .and_then(|level| EnvFilter::try_new(level.trim()).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    let file = std::env::var("CODECTL_LOG_FILE")
        .ok()
        .filter(|path| !path.trim().is_empty())
        .and_then(|path| OpenOptions::new().create(true).append(true).open(path).ok());
    match file {
        Some(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::sink)
                .try_init();
        }
    }
}
