pub mod health_probe;
pub mod recording;
pub mod remote_import;
