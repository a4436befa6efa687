//! Logging for the command-line tools.
//!
//! An aggregation is a long batch pipeline, so every line carries its
//! log target: `ncagg::granule` while inputs are inspected,
//! `ncagg::plan` while the plan is built, `ncagg::evaluate` while data
//! streams into the output. That makes it obvious from a captured log
//! which stage a warning (a skipped one-shot variable, a dropped
//! granule) came from without line-number noise.
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    Config,
};

pub fn init_logging(level: log::LevelFilter) {
    // stderr only, so aggregation output piped to stdout stays clean
    let stderr = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{h({d(%Y-%m-%dT%H:%M:%S)} {l:<5})} [{t}] {m}{n}",
        )))
        .target(Target::Stderr)
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .expect("Failed to configure logger");

    log4rs::init_config(config).expect("Failed to initialize logger");
}
