//! Logging infrastructure using `log` + `log4rs`.
//!
//! Console output goes to stderr; an optional log directory adds a rolling
//! file appender plus a warn-and-up error file. External crates are filtered
//! out unless opted in via `<crate>=<level>` (or `root=<level>` for all).

use log::LevelFilter;
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        rolling_file::{
            policy::compound::{roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy},
            RollingFileAppender,
        },
    },
    config::{Appender, Logger, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
    Config,
};
use std::path::PathBuf;

const CONSOLE_APPENDER: &str = "stderr";
const LOG_FILE_APPENDER: &str = "log_file";
const ERR_LOG_FILE_APPENDER: &str = "err_log_file";

const LOG_FILE_NAME: &str = "vigil.log";
const ERR_LOG_FILE_NAME: &str = "vigil_err.log";
const LOG_FILE_MAX_SIZE: u64 = 32 * 1024 * 1024;
const LOG_FILE_MAX_ROLLS: u32 = 8;
const LOG_LINE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f%:z)} [{({l}):5.5}] {m}{n}";

const WHITELISTED_CRATES: &[&str] = &["vigil_core", "vigil_service", "vigild"];

/// Initialize the global logger. Repeated calls are ignored.
pub fn init_logger(log_dir: Option<&str>, filters: &str) {
    let app_level = parse_app_level(filters);
    let root_level = parse_root_override(filters).unwrap_or(LevelFilter::Off);
    let module_levels = parse_module_levels(filters);

    let console = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(LOG_LINE_PATTERN)))
        .build();

    let mut config_builder = Config::builder().appender(Appender::builder().build(CONSOLE_APPENDER, Box::new(console)));
    let mut root_appenders: Vec<&str> = vec![CONSOLE_APPENDER];

    if let Some(dir) = log_dir.filter(|s| !s.trim().is_empty()) {
        let dir = dir.trim();
        if let Some(appender) = rolling_appender(dir, LOG_FILE_NAME) {
            config_builder = config_builder.appender(Appender::builder().build(LOG_FILE_APPENDER, Box::new(appender)));
            root_appenders.push(LOG_FILE_APPENDER);
        }
        if let Some(appender) = rolling_appender(dir, ERR_LOG_FILE_NAME) {
            config_builder = config_builder.appender(
                Appender::builder()
                    .filter(Box::new(ThresholdFilter::new(LevelFilter::Warn)))
                    .build(ERR_LOG_FILE_APPENDER, Box::new(appender)),
            );
            root_appenders.push(ERR_LOG_FILE_APPENDER);
        }
    }

    let appender_names: Vec<String> = root_appenders.iter().map(|name| (*name).to_string()).collect();

    for crate_name in WHITELISTED_CRATES {
        if !module_levels.iter().any(|(m, _)| m == *crate_name) {
            config_builder = config_builder
                .logger(Logger::builder().appenders(appender_names.clone()).additive(false).build(*crate_name, app_level));
        }
    }

    for (module, level) in &module_levels {
        config_builder =
            config_builder.logger(Logger::builder().appenders(appender_names.clone()).additive(false).build(module, *level));
    }

    if let Ok(config) = config_builder.build(Root::builder().appenders(root_appenders).build(root_level)) {
        let _ = log4rs::init_config(config);
    }
}

fn rolling_appender(dir: &str, file_name: &str) -> Option<RollingFileAppender> {
    let log_path = PathBuf::from(dir).join(file_name);
    let archive_pattern = PathBuf::from(dir).join(format!("{file_name}.{{}}.gz"));
    let roller = FixedWindowRoller::builder().base(1).build(archive_pattern.to_str()?, LOG_FILE_MAX_ROLLS).ok()?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(LOG_FILE_MAX_SIZE)), Box::new(roller));
    RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_LINE_PATTERN)))
        .build(log_path, Box::new(policy))
        .ok()
}

fn parse_app_level(filters: &str) -> LevelFilter {
    for part in filters.split(',') {
        let part = part.trim();
        if part.is_empty() || part.contains('=') {
            continue;
        }
        if let Ok(level) = part.parse() {
            return level;
        }
    }
    LevelFilter::Info
}

fn parse_root_override(filters: &str) -> Option<LevelFilter> {
    for part in filters.split(',') {
        let Some((module, level_str)) = part.trim().split_once('=') else {
            continue;
        };
        if module.trim() == "root" {
            if let Ok(level) = level_str.trim().parse() {
                return Some(level);
            }
        }
    }
    None
}

fn parse_module_levels(filters: &str) -> Vec<(String, LevelFilter)> {
    let mut result = Vec::new();
    for part in filters.split(',') {
        if let Some((module, level_str)) = part.trim().split_once('=') {
            let module = module.trim();
            if module.is_empty() || module == "root" {
                continue;
            }
            if let Ok(level) = level_str.trim().parse() {
                result.push((module.to_string(), level));
            }
        }
    }
    result
}
