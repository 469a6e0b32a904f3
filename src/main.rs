//! Command line driver: reads settings, loads the schema definition, and
//! writes the perspective and interval DDL files next to it. Exit code 1
//! means the run aborted, 2 that it finished but abandoned documents.

use std::fs;
use std::process;

use serde::Deserialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use anchorite::error::Result;
use anchorite::interval::IntervalGenerator;
use anchorite::perspective::{FailureMode, Generated, PerspectiveGenerator};
use anchorite::schema::Schema;

#[derive(Debug, Deserialize)]
struct Settings {
    schema: String,
    perspectives: String,
    intervals: String,
    fail_fast: bool,
    log: String,
}

impl Settings {
    // Defaults first, overridden by anchorite.json when present, then by
    // ANCHORITE_* environment variables.
    fn load() -> Result<Settings> {
        let settings = config::Config::builder()
            .set_default("schema", "schema.json")?
            .set_default("perspectives", "create_anchor_perspectives.sql")?
            .set_default("intervals", "create_attribute_intervals.sql")?
            .set_default("fail_fast", false)?
            .set_default("log", "info")?
            .add_source(config::File::with_name("anchorite").required(false))
            .add_source(config::Environment::with_prefix("ANCHORITE"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

fn write_documents(generated: &Generated, path: &str, what: &str) -> Result<usize> {
    fs::write(path, &generated.sql)?;
    info!(path, bytes = generated.sql.len(), "{what} written");
    Ok(generated.failures.len())
}

fn run(settings: &Settings) -> Result<usize> {
    let mode = if settings.fail_fast {
        FailureMode::FailFast
    } else {
        FailureMode::Isolate
    };
    let definition = fs::read_to_string(&settings.schema)?;
    let schema = Schema::load_str(&definition)?;
    info!(
        anchors = schema.anchors().len(),
        knots = schema.knots().len(),
        "schema loaded"
    );

    let perspectives = PerspectiveGenerator::new(&schema)?.generate(mode)?;
    let mut failed = write_documents(&perspectives, &settings.perspectives, "perspective DDL")?;
    let intervals = IntervalGenerator::new(&schema)?.generate(mode)?;
    failed += write_documents(&intervals, &settings.intervals, "interval DDL")?;
    Ok(failed)
}

fn main() {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(error) => {
            eprintln!("anchorite: {error}");
            process::exit(1);
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&settings.log).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    match run(&settings) {
        Ok(0) => {}
        Ok(failed) => {
            error!(failed, "run completed with abandoned documents");
            process::exit(2);
        }
        Err(error) => {
            error!(%error, "run aborted");
            process::exit(1);
        }
    }
}
