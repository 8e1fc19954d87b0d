pub mod tmc;
