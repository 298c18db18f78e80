pub mod dsdev;
pub mod prod_db;
