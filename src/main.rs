use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::process::ExitCode;
use std::sync::Arc;

use atlas_annotation::{AnnotationEngine, AnnotationError, Config, Table};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage:
  atlas-annotation label <x> <y> <z>
  atlas-annotation label-table <input.json> <output.json>
  atlas-annotation mask <abbreviation> <output.nii[.gz]>";

/// Returns `Ok(false)` when the arguments match no command.
fn run(config: &Config, args: &[String]) -> Result<bool, AnnotationError> {
    let mut engine = AnnotationEngine::from_files(&config.volume_path, &config.terminology_path)?;
    if let Some(threads) = config.batch_threads {
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => engine = engine.with_thread_pool(Arc::new(pool)),
            Err(e) => warn!("falling back to the global thread pool: {e}"),
        }
    }

    match args {
        [command, x, y, z] if command == "label" => {
            let mut coordinate = [0.0; 3];
            for (axis, raw) in [x, y, z].into_iter().enumerate() {
                coordinate[axis] = raw.parse().map_err(|_| AnnotationError::InvalidCoordinate {
                    row: 0,
                    column: ["x", "y", "z"][axis].to_string(),
                })?;
            }
            let (abbreviation, name) = engine.label_point(coordinate, config.coordinate_mode)?;
            println!("{abbreviation}\t{name}");
        }
        [command, input, output] if command == "label-table" => {
            let table = Table::from_json_reader(BufReader::new(File::open(input)?))?;
            let labeled = engine.label_table(&table, config.coordinate_mode)?;
            labeled.to_json_writer(BufWriter::new(File::create(output)?))?;
            info!(rows = labeled.len(), output = %output, "labeled coordinate table");
        }
        [command, abbreviation, output] if command == "mask" => {
            engine.write_region_mask(abbreviation, output)?;
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atlas_annotation=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();
    info!(
        volume = %config.volume_path.display(),
        terminology = %config.terminology_path.display(),
        mode = %config.coordinate_mode,
        "loaded configuration"
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    }

    match run(&config, &args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            eprintln!("{USAGE}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
