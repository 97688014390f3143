use glacier::{CompositorError, Glacier, Result};
use smithay::reexports::{calloop::EventLoop, wayland_server::Display};
use std::{backtrace::Backtrace, fs, path::PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "\
Usage: glacier [OPTION]

  -c <command>           Execute the command after startup.
  -d                     Turn on debug rendering.
  -h                     Show this help message and quit.
";

fn main() -> Result<()> {
    init_backtrace_defaults();
    init_logging()?;
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = Backtrace::force_capture();
        tracing::error!("panic: {panic_info}\n{backtrace}");
        eprintln!("panic: {panic_info}\n{backtrace}");
    }));

    let mut startup_cmd: Option<String> = None;
    let mut debug_render = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" => match args.next() {
                Some(command) => startup_cmd = Some(command),
                None => {
                    eprint!("{USAGE}");
                    std::process::exit(1);
                }
            },
            "-d" => debug_render = true,
            "-h" => {
                print!("{USAGE}");
                return Ok(());
            }
            _ => {
                eprint!("{USAGE}");
                std::process::exit(1);
            }
        }
    }

    let mut event_loop: EventLoop<Glacier> =
        EventLoop::try_new().map_err(|e| CompositorError::EventLoop(e.to_string()))?;

    let display = Display::new().map_err(|e| CompositorError::Backend(e.to_string()))?;
    let mut state = Glacier::new(display, event_loop.handle(), event_loop.get_signal())?;
    state.debug_render = debug_render;

    glacier::backend::winit::init_winit(&mut event_loop, &mut state)?;
    state.start_xwayland();

    if let Some(command) = &startup_cmd {
        state.spawn_command(command);
    }

    event_loop
        .run(None, &mut state, |state| {
            state.popups.cleanup();

            // Flush protocol messages to clients each turn so configures and
            // frame callbacks don't pile up.
            if let Err(err) = state.display_handle.flush_clients() {
                tracing::warn!("failed to flush clients: {err}");
            }
        })
        .map_err(|e| CompositorError::EventLoop(e.to_string()))?;

    Ok(())
}

fn init_backtrace_defaults() {
    if std::env::var_os("RUST_BACKTRACE").is_none() {
        // Safety: called at startup before creating any threads.
        unsafe { std::env::set_var("RUST_BACKTRACE", "1") };
    }
}

const DEFAULT_LOG_FILTER: &str = concat!(
    "glacier=debug,",
    "smithay=info,",
    "smithay::backend::renderer::gles=error"
);

fn init_logging() -> Result<()> {
    let log_dir: PathBuf = std::env::var_os("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join("glacier");
    fs::create_dir_all(&log_dir).map_err(|err| {
        CompositorError::Backend(format!(
            "failed to create log directory {}: {err}",
            log_dir.display()
        ))
    })?;

    let file_appender = tracing_appender::rolling::never(&log_dir, "glacier.log");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(true)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_appender),
        )
        .init();

    tracing::info!(path = %log_dir.join("glacier.log").display(), "logging initialized");

    Ok(())
}
