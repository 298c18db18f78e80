use std::error::Error;

use clap::Parser;
use dslogs::db::dsdev::lib_dsdev::ReqwestGetter;
use dslogs::db::prod_db::ProdDb;
use jiff::civil::Date;
use jiff::Zoned;
use log::{error, info};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Day to ingest, e.g., 2022-01-23.  Defaults to yesterday.
    #[arg(short, long)]
    date: Option<Date>,
}

/// Run this job every day shortly after midnight
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let date = match args.date {
        Some(date) => date,
        None => Zoned::now().date().yesterday()?,
    };

    let archive = ProdDb::dsdev_logs();
    let getter = ReqwestGetter::new();
    match archive.get_logs(&getter, date) {
        Ok(0) => info!("No entries saved for {}", date),
        Ok(count) => info!("Saved {} log entries for {}", count, date),
        Err(e) => error!("Failed to get {} logs: {}", date, e),
    }

    Ok(())
}
