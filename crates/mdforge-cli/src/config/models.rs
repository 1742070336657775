use mdforge::engine::config::RunConfig;
use std::path::PathBuf;

pub struct AppConfig {
    pub identifiers_path: PathBuf,
    pub run: RunConfig,
}
