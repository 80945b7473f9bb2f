//! Command-line surface (§6.5): `train`/`eval`/`gen`, thin argument parsing
//! over the library's public API. Not part of the library's contract — it
//! exists only to wire config, logging, a data loader, and a `Classifier`
//! together.

use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use byteorder::{LittleEndian, ReadBytesExt};
use clap::{Parser, Subcommand};

use richard::gpu::GpuRuntime;
use richard::io::{CsvDataLoader, DataDetails, LabelledDataSet};
use richard::{parse_config, Classifier, Config, Event, EventBus, Network, RichardError, Shape3};

#[derive(Parser)]
#[command(name = "richard", about = "Richard is gaining power")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log file path. Defaults to stderr.
    #[arg(long, global = true)]
    log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Train a classifier.
    Train {
        #[arg(long)]
        samples: PathBuf,
        #[arg(long)]
        network: PathBuf,
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        gpu: bool,
    },
    /// Evaluate a previously trained classifier against test data.
    Eval {
        #[arg(long)]
        samples: PathBuf,
        #[arg(long)]
        network: PathBuf,
        #[arg(long)]
        gpu: bool,
    },
    /// Print an example JSON configuration file for the named app type.
    Gen {
        /// Only "train" is recognised.
        app_type: String,
    },
}

fn init_logging(log: &Option<PathBuf>) -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt().with_max_level(tracing::Level::INFO);
    match log {
        Some(path) => {
            let file = File::create(path)?;
            subscriber.with_writer(move || file.try_clone().expect("log file handle")).init();
        }
        None => subscriber.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

/// Spawns the stdin `q`-key monitor (§6.5, §9 "Coroutine-style prefetch"
/// sibling note: out-of-scope input handling gets the same thin-stub
/// treatment). Reads one line at a time; any line starting with `q` raises
/// the abort flag.
fn spawn_abort_monitor(abort: std::sync::Arc<std::sync::atomic::AtomicBool>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            if stdin.read_line(&mut line).unwrap_or(0) == 0 {
                break;
            }
            if line.trim_start().starts_with('q') {
                abort.store(true, Ordering::SeqCst);
                break;
            }
        }
    });
}

fn read_to_string(path: &PathBuf) -> anyhow::Result<String> {
    let mut s = String::new();
    File::open(path)?.read_to_string(&mut s)?;
    Ok(s)
}

fn run_train(samples: PathBuf, network_path: PathBuf, config_path: PathBuf, gpu: bool) -> anyhow::Result<()> {
    let config_json = read_to_string(&config_path)?;
    let cfg = parse_config(&config_json)?;

    let details = DataDetails::from_config(cfg.get_child("data")?)?;
    let fetch_size = cfg.get_child("dataLoader")?.get_usize("fetchSize")?;
    let network_cfg = cfg.get_child("network")?;

    let network = Network::fresh(network_cfg, details.shape)?;
    let mut classifier = Classifier::new(network, details.clone());
    spawn_abort_monitor(classifier.abort_handle());

    let data: Box<dyn LabelledDataSet> = Box::new(CsvDataLoader::open(&samples, fetch_size, &details)?);
    let events = EventBus::new();
    let _log_sub = events.listen(Event::EPOCH_COMPLETED, |event| {
        if let Event::EpochCompleted { epoch, total, cost } = event {
            tracing::info!(epoch, total, cost, "epoch completed");
        }
    });

    if gpu {
        let max_workgroup_size = network_cfg.get_child("gpu").ok().and_then(|g| g.get_u32_opt("maxWorkgroupSize"));
        let mut runtime = GpuRuntime::new("shaders", max_workgroup_size)?;
        classifier.train_gpu(&mut runtime, network_cfg, data, &events)?;
    } else {
        classifier.train(data, &events)?;
    }

    let mut sink = BufWriter::new(File::create(&network_path)?);
    classifier.write_to_stream(&config_json, &mut sink)?;
    sink.flush()?;
    Ok(())
}

fn peek_input_shape(bytes: &[u8]) -> anyhow::Result<Shape3> {
    let mut cursor = Cursor::new(bytes);
    let len = cursor.read_u64::<LittleEndian>()?;
    let mut buf = vec![0u8; len as usize];
    cursor.read_exact(&mut buf)?;
    let cfg: Config = parse_config(&String::from_utf8(buf)?)?;
    let details = DataDetails::from_config(cfg.get_child("data")?)?;
    Ok(details.shape)
}

fn run_eval(samples: PathBuf, network_path: PathBuf, _gpu: bool) -> anyhow::Result<()> {
    let bytes = std::fs::read(&network_path)?;
    let shape = peek_input_shape(&bytes)?;

    let mut cursor = Cursor::new(&bytes);
    let (full_cfg, network) = richard::persist::read_artifact(shape, &mut cursor)?;
    let details = DataDetails::from_config(full_cfg.get_child("data")?)?;
    let fetch_size = full_cfg.get_child("dataLoader")?.get_usize("fetchSize")?;

    let classifier = Classifier::new(network, details.clone());
    let data = CsvDataLoader::open(&samples, fetch_size, &details)?;
    let results = classifier.test(Box::new(data))?;

    println!("Good: {}", results.good);
    println!("Bad: {}", results.bad);
    println!("Cost: {}", results.cost);
    Ok(())
}

fn example_config_json() -> &'static str {
    r#"{
  "data": {
    "normalization": { "min": 0.0, "max": 255.0 },
    "classes": ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"],
    "shape": [28, 28, 1]
  },
  "dataLoader": {
    "fetchSize": 100
  },
  "network": {
    "hyperparams": { "epochs": 10, "batchSize": 1000, "miniBatchSize": 10 },
    "hiddenLayers": [
      { "type": "convolutional", "depth": 8, "kernelSize": [3, 3], "learnRate": 0.1, "learnRateDecay": 1.0, "dropoutRate": 0.0 },
      { "type": "maxPooling", "regionSize": [2, 2] },
      { "type": "dense", "size": 64, "learnRate": 0.1, "learnRateDecay": 1.0, "dropoutRate": 0.2 }
    ],
    "outputLayer": { "type": "output", "size": 10, "learnRate": 0.1, "learnRateDecay": 1.0 }
  }
}"#
}

fn run_gen(app_type: &str) -> anyhow::Result<()> {
    if app_type != "train" {
        anyhow::bail!("Expected app type to be one of ['train'], got '{app_type}'");
    }
    println!("{}", example_config_json());
    Ok(())
}

fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Train { samples, network, config, gpu } => run_train(samples, network, config, gpu),
        Command::Eval { samples, network, gpu } => run_eval(samples, network, gpu),
        Command::Gen { app_type } => run_gen(&app_type),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli.log) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

impl From<RichardError> for anyhow::Error {
    fn from(e: RichardError) -> Self {
        anyhow::anyhow!(e)
    }
}
