//! `splash-world`: the master coordinator process.
//!
//! Loads the configuration, spawns/supervises Scene children over their
//! Links, and runs the coordination loop (task queue, periodic tasks,
//! child reaping, buffer replication) until `quit` is requested.

use std::time::Duration;

use splash::world::World;

const COORDINATION_PERIOD: Duration = Duration::from_millis(20);

struct Args {
    config: String,
    silent: bool,
    debug: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut config = None;
    let mut silent = false;
    let mut debug = false;
    let mut args = std::env::args().skip(1);
    while let Some(flag) = args.next() {
        match flag.as_str() {
            "-o" | "--open" => config = Some(args.next().ok_or("-o requires a configuration path")?),
            "-s" | "--silent" => silent = true,
            "-d" => debug = true,
            other => return Err(format!("unrecognized flag {other}")),
        }
    }
    Ok(Args { config: config.ok_or("missing required -o <configuration>")?, silent, debug })
}

fn init_logging(silent: bool, debug: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if silent {
        builder.filter_level(log::LevelFilter::Off);
    } else if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

/// The scene worker binary ships next to this one; fall back to `PATH`
/// lookup when the executable location can't be resolved.
fn scene_exe_path() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("splash-scene")))
        .map_or_else(|| "splash-scene".to_owned(), |path| path.to_string_lossy().into_owned())
}

fn main() -> std::process::ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("splash-world: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };
    init_logging(args.silent, args.debug);

    let mut world = World::new();
    if let Err(err) = world.load_config(&args.config) {
        log::error!("splash-world: failed to load {}: {err}", args.config);
        return std::process::ExitCode::FAILURE;
    }
    if let Err(err) = world.spawn_scenes(&scene_exe_path(), args.debug) {
        log::error!("splash-world: failed to spawn scenes: {err}");
        return std::process::ExitCode::FAILURE;
    }

    log::info!("splash-world: running");
    world.run(COORDINATION_PERIOD);
    std::process::ExitCode::SUCCESS
}
