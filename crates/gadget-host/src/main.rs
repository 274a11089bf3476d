mod cli;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{info, warn};

use gadget_core::engine;
use gadget_core::{
    DisplayOption, GadgetCallbacks, GadgetEvent, GadgetMode, ModuleLoader, Request, SearchPaths,
    UiGadget, Window,
};

use cli::{CliArgs, Commands};

fn main() -> ExitCode {
    env_logger::init();
    let args = CliArgs::parse();

    let search = if args.module_dirs.is_empty() {
        SearchPaths::standard(args.package.as_deref())
    } else {
        SearchPaths::with_roots(args.module_dirs.clone())
    };

    match args.command {
        Commands::Probe { name } => {
            for candidate in search.candidates(&name) {
                println!("{}", candidate.display());
            }
            ExitCode::SUCCESS
        }
        Commands::Exists { name } => {
            if ModuleLoader::new(search).exists(&name) {
                println!("installed");
                ExitCode::SUCCESS
            } else {
                println!("not installed");
                ExitCode::FAILURE
            }
        }
        Commands::Run {
            name,
            frameview,
            extras,
            engine_path,
        } => match run_gadget(search, &name, frameview, extras, engine_path) {
            Ok(()) => {
                println!("lifecycle complete for '{name}'");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
        },
    }
}

/// Create the gadget, replay a typical host session against it (rotation,
/// background/foreground, teardown) and drain the idle queue after every
/// step, the way a real event loop would.
fn run_gadget(
    search: SearchPaths,
    name: &str,
    frameview: bool,
    extras: Vec<(String, String)>,
    engine_path: Option<PathBuf>,
) -> gadget_core::Result<()> {
    let loader = ModuleLoader::new(search);
    let mut ui = UiGadget::init_with(
        Window::new("gadget-host-window"),
        DisplayOption::default(),
        loader,
    );
    if let Some(path) = engine_path {
        match engine::load_from(&path) {
            Ok(eng) => ui.manager_mut().set_engine(eng),
            Err(e) => warn!("engine load failed, running without transitions: {e}"),
        }
    }

    let request: Request = extras.into_iter().collect();
    let cbs = GadgetCallbacks::new()
        .on_layout(|_man, id, mode| info!("gadget {id} produced its {mode:?} layout"))
        .on_result(|_man, id, reply| {
            info!(
                "result from {id}: {}",
                reply
                    .map(|r| format!("{} extra(s)", r.len()))
                    .unwrap_or_else(|| "empty".into())
            );
        })
        .on_destroy(|man, id| {
            info!("gadget {id} asked to be closed");
            let _ = man.destroy(id);
        })
        .on_end(|_man, id| info!("gadget {id} destruction finished"));

    let mode = if frameview {
        GadgetMode::Frameview
    } else {
        GadgetMode::Fullview
    };
    let id = ui.create(None, name, mode, &request, cbs)?;
    ui.dispatch_pending();
    info!("created '{name}' as {id}, state {:?}", ui.state(id));

    ui.send_event(GadgetEvent::RotateLandscape)?;
    ui.dispatch_pending();

    ui.pause()?;
    ui.dispatch_pending();
    ui.resume()?;
    ui.dispatch_pending();

    ui.destroy(id)?;
    ui.dispatch_pending();

    ui.destroy_all()?;
    ui.dispatch_pending();
    Ok(())
}
