use crate::db::dsdev::logs_archive::DsdevLogsArchive;

pub struct ProdDb {}

impl ProdDb {
    pub fn dsdev_logs() -> DsdevLogsArchive {
        DsdevLogsArchive {
            base_url: "http://www.dsdev.tech/logs/".to_string(),
            duckdb_path: "/home/graffit/Downloads/Archive/DuckDB/dsdev/logs.duckdb".to_string(),
        }
    }
}
