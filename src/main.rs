use beatscope::{
    App, AppEvent, BoundaryLayer, ConfigManager, Warehouse, APP_NAME, BEAT_KEY_PROPERTY,
};
use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use ratatui::DefaultTerminal;
use std::path::PathBuf;
use std::sync::mpsc::channel;

#[derive(Parser, Debug)]
#[command(version, about = "beatscope")]
struct Args {
    /// Directory holding the precomputed warehouse tables (Parquet)
    #[arg(long = "warehouse")]
    warehouse: Option<PathBuf>,

    /// GeoJSON file with the police beat boundaries
    #[arg(long = "boundary")]
    boundary: Option<PathBuf>,

    /// Route to open at startup
    #[arg(long = "path", default_value = "/home")]
    path: String,

    /// Directory CSV exports are written to
    #[arg(long = "export-dir")]
    export_dir: Option<PathBuf>,

    /// Write the default config file and exit
    #[arg(long = "init-config", action)]
    init_config: bool,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long = "force", action)]
    force: bool,
}

fn render(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
    terminal.draw(|frame| frame.render_widget(app, frame.area()))?;
    Ok(())
}

fn run(mut terminal: DefaultTerminal, args: &Args, config: &beatscope::AppConfig) -> Result<()> {
    let warehouse_dir = args
        .warehouse
        .clone()
        .or_else(|| config.data.warehouse_dir.clone())
        .ok_or_else(|| eyre!("no warehouse directory; pass --warehouse or set data.warehouse_dir"))?;
    let boundary_file = args
        .boundary
        .clone()
        .or_else(|| config.data.boundary_file.clone())
        .ok_or_else(|| eyre!("no boundary file; pass --boundary or set data.boundary_file"))?;

    let warehouse = Warehouse::new(warehouse_dir);
    let boundaries = BoundaryLayer::from_geojson_file(&boundary_file, BEAT_KEY_PROPERTY)?;

    let (tx, rx) = channel::<AppEvent>();
    let mut app = App::new(tx.clone(), warehouse, boundaries, config);
    render(&mut terminal, &mut app)?;
    tx.send(AppEvent::Navigate(args.path.clone()))?;

    loop {
        if crossterm::event::poll(std::time::Duration::from_millis(25))? {
            match crossterm::event::read()? {
                crossterm::event::Event::Key(key) => tx.send(AppEvent::Key(key))?,
                crossterm::event::Event::Resize(cols, rows) => {
                    tx.send(AppEvent::Resize(cols, rows))?
                }
                _ => {}
            }
        }

        let updated = match rx.recv_timeout(std::time::Duration::from_millis(0)) {
            Ok(event) => {
                match event {
                    AppEvent::Exit => break,
                    AppEvent::Crash(msg) => {
                        return Err(eyre!(msg));
                    }
                    event => {
                        if let Some(event) = app.event(&event) {
                            tx.send(event)?;
                        }
                    }
                }
                true
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => false,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        };

        if updated {
            render(&mut terminal, &mut app)?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let config_manager = ConfigManager::new(APP_NAME)?;
    if args.init_config {
        let path = config_manager.write_default_config(args.force)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }
    let mut config = config_manager.load_config()?;
    if let Some(dir) = args.export_dir.clone() {
        config.export.export_dir = Some(dir);
    }

    let terminal = ratatui::init();
    let result = run(terminal, &args, &config);
    ratatui::restore();
    result
}
