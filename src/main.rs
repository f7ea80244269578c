use std::{
    collections::BTreeSet,
    io,
    net::UdpSocket,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand, arg};
use log::{error, info, warn};
use snafu::Snafu;
use timetrial::{
    Controller, GameRegistry, JsonLinesStorage, JsonSettings, PacketListener, RunDetails,
    RunState, TimeTrialError, format_run_time,
    game::dirt_rally2::{DirtRally2Field, encode_packet},
    settings::load_game_settings,
};

const STATUS_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("{message}"))]
    Control { message: String },
    #[snafu(display("{source}"))]
    TimeTrial { source: TimeTrialError },
    #[snafu(display("Error sending simulated telemetry"))]
    Simulator { source: io::Error },
}

impl From<TimeTrialError> for CliError {
    fn from(source: TimeTrialError) -> Self {
        CliError::TimeTrial { source }
    }
}

fn control(message: String) -> CliError {
    CliError::Control { message }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Settings file, defaults to the user's config directory
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Directory where runs are saved, defaults to the user's data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List supported games
    Games,
    /// Show known and previously saved cars, tracks and tags for a game
    Attributes {
        #[arg(short, long, default_value = "DirtRally2")]
        game: String,
    },
    /// Wait for one run, then process and save it
    Run {
        #[arg(short, long, default_value = "DirtRally2")]
        game: String,
        #[arg(long)]
        car: Option<String>,
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        track: Option<String>,
        #[arg(long)]
        conditions: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// discard, best, last, all, mean or median
        #[arg(short, long, default_value = "all")]
        policy: String,
    },
    /// Print what the game is sending without tracking a run
    Listen {
        #[arg(short, long, default_value = "DirtRally2")]
        game: String,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Send a synthetic DiRT Rally 2.0 run to a port
    Simulate {
        #[arg(long, default_value_t = 20777)]
        port: u16,
        /// Stage time in seconds
        #[arg(short, long, default_value_t = 5.)]
        duration: f32,
        /// Packets per second
        #[arg(short, long, default_value_t = 60)]
        rate: u32,
        /// End the stage without completing it
        #[arg(long)]
        abandon: bool,
    },
}

fn settings_store(path: &Option<PathBuf>) -> Result<JsonSettings, CliError> {
    Ok(match path {
        Some(path) => JsonSettings::new(path.clone()),
        None => JsonSettings::new_default()?,
    })
}

fn run_storage(path: &Option<PathBuf>) -> Result<JsonLinesStorage, CliError> {
    Ok(match path {
        Some(path) => JsonLinesStorage::new(path.clone())?,
        None => JsonLinesStorage::new_default()?,
    })
}

fn games() {
    for name in GameRegistry::builtin().names() {
        println!("{}", name);
    }
}

fn attributes(controller: &Controller, game: &str) -> Result<(), CliError> {
    let attributes = controller.game_attributes(game).map_err(control)?;
    println!("{}", attributes.name);
    println!("  tracks:     {}", attributes.tracks.join(", "));
    println!("  conditions: {}", attributes.track_conditions.join(", "));
    println!("  classes:    {}", attributes.car_classes.join(", "));
    println!("  tags:       {}", attributes.tags.join(", "));
    for car in &attributes.cars {
        println!("  car:        {} ({})", car.name, car.class);
    }
    println!(
        "  identifiable: {} cars, {} tracks",
        attributes.known_cars.len(),
        attributes.known_tracks.len()
    );
    Ok(())
}

fn run(
    controller: &mut Controller,
    game: &str,
    details: RunDetails,
    policy: &str,
    stop: &AtomicBool,
) -> Result<(), CliError> {
    let addr = controller.start_run(game, Some(details)).map_err(control)?;
    println!("Waiting for a {} run on {} (Ctrl-C to stop)", game, addr);

    let mut last_state = RunState::WaitingForStart;
    loop {
        if stop.swap(false, Ordering::AcqRel) {
            controller.stop_run().map_err(control)?;
        }
        let status = controller.status();
        if status.state != last_state {
            println!("{:?}", status.state);
            last_state = status.state;
        }
        if status.state.is_terminal() {
            break;
        }
        thread::sleep(STATUS_INTERVAL);
    }

    let status = controller.status();
    if let Some(cause) = &status.abort_cause {
        warn!("Run aborted: {}", cause);
    }
    if let Some(result) = &status.result {
        println!(
            "{} in {} on {}: {}",
            result.car_name,
            result.car_class,
            result.track_name,
            result
                .segment_times
                .iter()
                .map(|t| format_run_time(*t))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    // an aborted run has nothing worth keeping
    let policy = if status.state == RunState::Aborted {
        "discard"
    } else {
        policy
    };
    match controller.process_run(policy, None).map_err(control)? {
        Some(saved) => println!("Saved {} time(s) with policy {}", saved.segment_times.len(), policy),
        None => println!("Run discarded"),
    }
    Ok(())
}

fn listen(
    settings: &mut JsonSettings,
    game: &str,
    port: Option<u16>,
    stop: &AtomicBool,
) -> Result<(), CliError> {
    let title = GameRegistry::builtin()
        .get(game)
        .ok_or_else(|| TimeTrialError::UnknownGame {
            name: game.to_string(),
        })?;
    let game_settings = load_game_settings(settings, title.name(), title.default_settings())?;
    let mut listener = PacketListener::new();
    let addr = listener.start(
        port.unwrap_or(game_settings.udp_port),
        game_settings.udp_buffer_size,
    )?;
    println!("Listening on {} (Ctrl-C to stop)", addr);

    while !stop.load(Ordering::Acquire) {
        let payload = listener.latest();
        let sample = title.decode(payload.as_deref());
        println!(
            "packets: {:>6}  size: {:>4}  time: {}  last: {}  laps: {}/{}",
            listener.slot().received(),
            payload.as_ref().map_or(0, |p| p.len()),
            format_run_time(sample.run_time_s),
            format_run_time(sample.last_run_time_s),
            sample.laps_completed,
            sample.laps_total
        );
        if let Some(cause) = listener.slot().failure() {
            error!("Listener stopped: {}", cause);
            break;
        }
        thread::sleep(Duration::from_millis(500));
    }
    listener.stop();
    Ok(())
}

fn simulate(port: u16, duration: f32, rate: u32, abandon: bool) -> Result<(), CliError> {
    let socket =
        UdpSocket::bind("127.0.0.1:0").map_err(|e| CliError::Simulator { source: e })?;
    let target = ("127.0.0.1", port);
    let interval = Duration::from_secs_f32(1. / rate.max(1) as f32);
    let send = |lap_time: f32, last_lap_time: f32, laps_completed: f32| {
        let packet = encode_packet(&[
            (DirtRally2Field::RunTime, lap_time),
            (DirtRally2Field::LapTime, lap_time),
            (DirtRally2Field::LastLapTime, last_lap_time),
            (DirtRally2Field::LapsCompleted, laps_completed),
            (DirtRally2Field::TotalLaps, 1.),
            (DirtRally2Field::TrackLength, 8251.67),
            (DirtRally2Field::PosZ, -2296.9),
            (DirtRally2Field::MaxRpm, 890.12),
            (DirtRally2Field::IdleRpm, 167.55),
            (DirtRally2Field::MaxGears, 5.),
        ]);
        socket
            .send_to(&packet, target)
            .map_err(|e| CliError::Simulator { source: e })
    };

    info!("Simulating a {:.1}s stage to port {}", duration, port);
    for _ in 0..rate {
        send(0., 0., 0.)?;
        thread::sleep(interval);
    }
    let start = Instant::now();
    while start.elapsed().as_secs_f32() < duration {
        send(start.elapsed().as_secs_f32(), 0., 0.)?;
        thread::sleep(interval);
    }
    let (last_lap_time, laps_completed) = if abandon { (0., 0.) } else { (duration, 1.) };
    for _ in 0..rate {
        send(0., last_lap_time, laps_completed)?;
        thread::sleep(interval);
    }
    println!(
        "Sent a {} stage of {}",
        if abandon { "abandoned" } else { "finished" },
        format_run_time(duration)
    );
    Ok(())
}

fn execute(args: Args, stop: Arc<AtomicBool>) -> Result<(), CliError> {
    match args.command {
        Commands::Games => {
            games();
            Ok(())
        }
        Commands::Attributes { game } => {
            let controller = Controller::new(
                GameRegistry::builtin(),
                Box::new(settings_store(&args.settings)?),
                Box::new(run_storage(&args.data_dir)?),
            );
            attributes(&controller, &game)
        }
        Commands::Run {
            game,
            car,
            class,
            track,
            conditions,
            tags,
            policy,
        } => {
            let mut controller = Controller::new(
                GameRegistry::builtin(),
                Box::new(settings_store(&args.settings)?),
                Box::new(run_storage(&args.data_dir)?),
            );
            let details = RunDetails {
                car_name: car,
                car_class: class,
                track_name: track,
                track_conditions: conditions,
                tags: (!tags.is_empty()).then(|| tags.into_iter().collect::<BTreeSet<_>>()),
            };
            run(&mut controller, &game, details, &policy, &stop)
        }
        Commands::Listen { game, port } => {
            listen(&mut settings_store(&args.settings)?, &game, port, &stop)
        }
        Commands::Simulate {
            port,
            duration,
            rate,
            abandon,
        } => simulate(port, duration, rate, abandon),
    }
}

fn main() {
    colog::init();

    let args = Args::parse();
    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("Stopping...");
        handler_stop.store(true, Ordering::Release);
    }) {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    if let Err(e) = execute(args, stop) {
        error!("{}", e);
        std::process::exit(1);
    }
}
