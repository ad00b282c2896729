use std::{env, path::Path};
use log::LevelFilter;
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};

pub const LOG_CONFIG_PATH: &str = "log4rs.yaml";

pub const VAR_API_BASE_URL: &str = "API_BASE_URL";
pub const VAR_VAPID_KEY: &str = "VAPID_KEY";
pub const VAR_DEVICE_TYPE: &str = "DEVICE_TYPE";
pub const VAR_SESSION_PATH: &str = "SESSION_PATH";
pub const VAR_LANGUAGE: &str = "LANGUAGE";
pub const VAR_LOG_LEVEL: &str = "LOG_LEVEL";

/// Uses `log4rs.yaml` when present, otherwise logs to stderr at `LOG_LEVEL` (default warn).
pub fn init_logging() {
    if Path::new(LOG_CONFIG_PATH).exists() {
        match log4rs::init_file(LOG_CONFIG_PATH, Default::default()) {
            Ok(_) => return,
            Err(e) => eprintln!("Failed to load {LOG_CONFIG_PATH}, falling back to stderr logging: {e}"),
        }
    }

    let level = env::var(VAR_LOG_LEVEL)
        .ok()
        .and_then(|l| l.parse().ok())
        .unwrap_or(LevelFilter::Warn);

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} {h({l})} {t} - {m}{n}")))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level));

    match config {
        Ok(config) => {
            if let Err(e) = log4rs::init_config(config) {
                eprintln!("Failed to initialise logging: {e}");
            }
        }
        Err(e) => eprintln!("Invalid logging config: {e}"),
    }
}

/// Last few characters of a token, safe to put in logs.
pub fn get_short_token(token: &str) -> &str {
    let start = token
        .char_indices()
        .rev()
        .nth(7)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &token[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_token_keeps_the_tail() {
        assert_eq!(get_short_token("dQw4w9WgXcQ:APA91bHun4MxP5egoKMwt2KZFBaFUH"), "KZFBaFUH");
        assert_eq!(get_short_token("short"), "short");
        assert_eq!(get_short_token(""), "");
    }
}
