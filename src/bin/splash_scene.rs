//! `splash-scene`: one per-GPU worker process.
//!
//! Spawned by `splash-world` with its scene name as the positional
//! argument (or launched standalone for an externally-managed Scene), this
//! binary builds a GPU context, binds its Link, applies its own
//! configuration section, and drives the render/upload threads until
//! stopped. The master Scene additionally dials the other Scenes and runs
//! the Blender; workers run the blending follower instead.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use splash::blender::{BLENDING_WAIT, Blender, configured_mode};
use splash::config::Config;
use splash::link;
use splash::scene::gpu::GpuContext;
use splash::scene::{Scene, scheduler};

const DEFAULT_CONFIG_PATH: &str = "splash.json";
const BLENDER_TICK: Duration = Duration::from_millis(100);
const DISPATCH_TICK: Duration = Duration::from_millis(5);
const PEER_DIAL_RETRY: Duration = Duration::from_millis(50);
const PEER_DIAL_ATTEMPTS: u32 = 100;

struct Args {
    name: String,
    config: String,
    silent: bool,
    debug: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut name = None;
    let mut config = DEFAULT_CONFIG_PATH.to_owned();
    let mut silent = false;
    let mut debug = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" | "--open" => config = args.next().ok_or("-o requires a configuration path")?,
            "-s" | "--silent" => silent = true,
            "-d" => debug = true,
            flag if flag.starts_with('-') => return Err(format!("unrecognized flag {flag}")),
            positional => {
                if name.replace(positional.to_owned()).is_some() {
                    return Err("only one scene name may be given".to_owned());
                }
            }
        }
    }
    Ok(Args { name: name.ok_or("missing required scene name")?, config, silent, debug })
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

fn dial_with_retry(scene: &Scene, peer: &str, address: &str) -> bool {
    for attempt in 0..PEER_DIAL_ATTEMPTS {
        let result = scene.with_root(|root| root.link_transport().connect_to(peer, address));
        match result {
            Ok(()) => return true,
            Err(e) => {
                if attempt + 1 == PEER_DIAL_ATTEMPTS {
                    log::warn!("splash-scene: giving up dialing {peer} at {address}: {e}");
                }
                std::thread::sleep(PEER_DIAL_RETRY);
            }
        }
    }
    false
}

fn main() -> std::process::ExitCode {
    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("splash-scene: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };
    init_logging(args.silent, args.debug);

    let gpu = match GpuContext::new_blocking() {
        Ok(gpu) => gpu,
        Err(err) => {
            log::error!("splash-scene[{}]: failed to create GPU context: {err}", args.name);
            return std::process::ExitCode::FAILURE;
        }
    };

    let loaded = Config::load(&args.config).ok();
    let master_name = loaded.as_ref().and_then(Config::master_scene).map(|spec| spec.name.clone());
    let master = master_name.as_deref() == Some(args.name.as_str());

    let scene = Arc::new(Scene::new(args.name.clone(), master, gpu));

    if let Err(err) = scene.with_root(|root| root.link_transport().listen_for(link::WORLD_PEER, &link::world_address(&args.name))) {
        log::warn!("splash-scene[{}]: no World connection: {err}", args.name);
    }

    if let Some(config) = &loaded {
        if let Some(section) = config.scene_configs.get(&args.name) {
            scene.with_root(|root| splash::config::apply_scene_section(root, section));
        }
    }

    let peers: Vec<String> = loaded
        .as_ref()
        .map(|c| c.scenes.iter().map(|spec| spec.name.clone()).filter(|peer| *peer != args.name).collect())
        .unwrap_or_default();

    // Scene-to-scene links carry the Blender's replicated geometry: the
    // master dials every worker, each worker accepts on its own socket.
    // All link setup runs before the render threads exist, so a slow
    // accept never holds the Scene lock against a running frame.
    if master {
        for peer in &peers {
            dial_with_retry(&scene, peer, &link::scene_address(peer));
        }
    } else if let Some(master_name) = &master_name {
        let address = link::scene_address(&args.name);
        if let Err(err) = scene.with_root(|root| root.link_transport().listen_for(master_name, &address)) {
            log::warn!("splash-scene[{}]: no master connection: {err}", args.name);
        }
    }

    let render_handle = std::thread::spawn({
        let scene = Arc::clone(&scene);
        move || scheduler::run_render_thread(scene)
    });
    let upload_handle = std::thread::spawn({
        let scene = Arc::clone(&scene);
        move || scheduler::run_upload_thread(scene)
    });

    let blender_handle = {
        let scene = Arc::clone(&scene);
        let stop = scene.stop_flag();
        if master {
            std::thread::spawn(move || {
                let mut blender = Blender::new();
                while !stop.load(Ordering::Relaxed) {
                    scene.with_root(|root| {
                        if let Some(mode) = configured_mode(root) {
                            blender.set_mode(mode);
                        }
                        blender.update(root, &peers);
                    });
                    std::thread::sleep(BLENDER_TICK);
                }
            })
        } else {
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    scene.follow_blending_update(BLENDING_WAIT);
                    std::thread::sleep(BLENDER_TICK);
                }
            })
        }
    };

    log::info!("splash-scene[{}]: running (master={master})", args.name);
    let stop = scene.stop_flag();
    while !stop.load(Ordering::Relaxed) {
        scene.dispatch_inbound();
        std::thread::sleep(DISPATCH_TICK);
    }

    let _ = render_handle.join();
    let _ = upload_handle.join();
    let _ = blender_handle.join();
    std::process::ExitCode::SUCCESS
}
