use std::path::{Path, PathBuf};

use batchload::{db, import};

fn main() {
    // Diagnostics go to stderr via tracing; operator progress and the final
    // report stay on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut csv_path: Option<PathBuf> = None;
    let mut db_path = PathBuf::from("batchload.sqlite3");
    let mut json_report = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--db" => {
                i += 1;
                match args.get(i) {
                    Some(v) => db_path = PathBuf::from(v),
                    None => {
                        eprintln!("--db requires a path");
                        std::process::exit(2);
                    }
                }
            }
            "--json" => json_report = true,
            other if csv_path.is_none() && !other.starts_with('-') => {
                csv_path = Some(PathBuf::from(other));
            }
            other => {
                eprintln!("unexpected argument: {}", other);
                std::process::exit(2);
            }
        }
        i += 1;
    }

    let Some(csv_path) = csv_path else {
        eprintln!("usage: batchload <csv-file> [--db <path>] [--json]");
        std::process::exit(2);
    };

    if let Err(e) = run(&csv_path, &db_path, json_report) {
        eprintln!("Error during import: {:#}", e);
        std::process::exit(1);
    }
}

fn run(csv_path: &Path, db_path: &Path, json_report: bool) -> anyhow::Result<()> {
    // The connection is dropped on every exit path of this function, so the
    // store is released whether the run succeeds or fails.
    let conn = db::open_db(db_path)?;
    let opts = import::ImportOptions::from_env();
    let report = import::run_import(&conn, csv_path, &opts)?;

    if json_report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        import::print_report(&report);
    }
    Ok(())
}
