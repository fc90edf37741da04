use confique::Config as _;
use std::sync::OnceLock;

#[derive(confique::Config)]
pub struct Config {
    #[config(env = "SQLSTUB_VERBOSE", default = false)]
    pub verbose: bool,
    #[config(env = "SQLSTUB_TIME_LAYOUT")]
    pub time_layout: Option<String>,
}

pub fn config() -> &'static Config {
    static CONFIG: OnceLock<Config> = OnceLock::new();
    CONFIG.get_or_init(|| {
        Config::builder()
            .env()
            .load()
            .expect("Failed to load one or more value configuration from the current environment")
    })
}
