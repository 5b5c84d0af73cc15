const DEFAULT_INTERVAL_SECS: u64 = 60;

pub fn get_default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

const INTERVAL_OVERRIDE: &str = "PLANT_MONITOR_INTERVAL";

/// Evaluation interval from the environment, ignored unless it parses to a
/// positive number of seconds
pub fn get_interval_override() -> Option<u64> {
    let interval_from_env = std::env::var(INTERVAL_OVERRIDE).ok()?;
    interval_from_env.parse().ok().filter(|secs| *secs > 0)
}

const CONFIG_PATH: &str = "PLANT_MONITOR_CONFIG";

pub fn get_config_path() -> Option<String> {
    std::env::var(CONFIG_PATH).ok()
}
