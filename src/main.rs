mod app;
mod components;
mod event;
mod handler;
mod tui;
mod ui;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Parser;
use log::info;

use rbrowser::config::{AppConfig, BrowserConfig, GeneralConfig, LogConfig, SourceConfig};
use rbrowser::error::{AppError, Result};
use rbrowser::logging;
use rbrowser::model::{BrowserModel, FixedTimeout};
use rbrowser::source::dir::DirSource;

use crate::app::App;
use crate::event::{Event, EventHandler, ModelNotifier};
use crate::tui::{install_panic_hook, Tui};

/// Browse a directory tree through a lazily paged, windowed tree model.
#[derive(Parser, Debug)]
#[command(name = "rbrowser", version, about)]
struct Cli {
    /// Root path to browse (defaults to the configured path, then ".")
    path: Option<PathBuf>,

    /// Explicit config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Read the whole tree up front instead of paging
    #[arg(long)]
    full: bool,

    /// Page size and prefetch margin
    #[arg(long)]
    threshold: Option<usize>,

    /// Sort order: "", "direct" or "reverse"
    #[arg(long)]
    sort: Option<String>,

    /// Artificial delay before each reply, in milliseconds
    #[arg(long)]
    latency_ms: Option<u64>,

    /// Log file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "rbrowser=debug"
    #[arg(long)]
    log_level: Option<String>,

    /// Disable mouse capture
    #[arg(long)]
    no_mouse: bool,
}

impl Cli {
    /// Partial config carrying only the flags given on the command line.
    fn overrides(&self) -> AppConfig {
        AppConfig {
            general: GeneralConfig {
                default_path: self.path.as_ref().map(|p| p.display().to_string()),
                mouse: self.no_mouse.then_some(false),
                ..Default::default()
            },
            browser: BrowserConfig {
                threshold: self.threshold,
                sort_order: self.sort.clone(),
                full_model: self.full.then_some(true),
                ..Default::default()
            },
            source: SourceConfig {
                latency_ms: self.latency_ms,
            },
            log: LogConfig {
                level: self.log_level.clone(),
                file: self.log_file.as_ref().map(|p| p.display().to_string()),
            },
        }
    }
}

fn root_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref(), Some(&cli.overrides()));

    if let Err(e) = logging::init(config.log_level(), config.log_file().as_deref()) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    let raw_path = PathBuf::from(config.general.default_path.as_deref().unwrap_or("."));
    let path = raw_path.canonicalize().map_err(|_| {
        AppError::InvalidPath(format!("{} does not exist", raw_path.display()))
    })?;
    info!("browsing {}", path.display());

    let source = DirSource::new(&path, config.show_hidden());

    let mut model = BrowserModel::new().with_threshold(config.threshold());
    if let Some(limit) = config.request_timeout() {
        model = model.with_timeout(Box::new(FixedTimeout(limit)));
    }

    install_panic_hook();
    let mut tui = Tui::new(config.mouse_enabled())?;
    let mut events = EventHandler::new(Duration::from_millis(50));
    let event_tx = events.sender();

    let binding = model.bind_tree("/", Box::new(ModelNotifier::new(event_tx.clone())));
    // No source attached yet, so this only records the order.
    model.change_sort_order(config.sort_order());

    if config.full_model() {
        let depth = config.full_depth();
        let order = config.parsed_sort_order();
        let top = tokio::task::spawn_blocking(move || source.read_hierarchy(depth, order))
            .await
            .map_err(|e| AppError::Source(e.to_string()))??;
        info!("full model: {} nodes", top.count());
        model.set_full_model(&top);
    } else {
        let reply_tx = event_tx.clone();
        let requests = source.spawn(config.latency(), move |text| {
            reply_tx.send(Event::Reply(text)).is_ok()
        });
        model.attach_source(Box::new(requests));
        model.send_first_request();
    }

    let mut app = App::new(model, binding, &root_name(&path));

    loop {
        tui.draw(|frame| ui::render(&mut app, frame))?;

        match events.next().await? {
            Event::Key(key) => handler::handle_key_event(&mut app, key),
            Event::Mouse(mouse) => handler::handle_mouse_event(&mut app, mouse),
            Event::Tick => app.on_tick(Instant::now()),
            Event::Resize(_, _) => {}
            Event::Reply(text) => app.handle_reply(&text),
            Event::ModelChanged => {}
        }

        if app.should_quit {
            break;
        }
    }

    tui.restore()?;
    Ok(())
}
