use std::io::Write;
use std::thread;

use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};

pub fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Error, // default: only errors
        1 => LevelFilter::Info,  // -v: info and up
        2 => LevelFilter::Debug, // -vv: debug and up
        _ => LevelFilter::Trace, // -vvv: trace and up
    };

    let mut builder = Builder::new();
    builder.filter_level(level);
    // HTTP internals are only interesting when something is badly wrong.
    builder.filter_module("reqwest", level.min(LevelFilter::Warn));
    builder.filter_module("hyper_util", level.min(LevelFilter::Warn));

    builder.format(|buf, record| {
        let level_label = match record.level() {
            Level::Error => "ERROR".red().bold(),
            Level::Warn  => "WARN ".yellow().bold(),
            Level::Info  => "INFO ".white().bold(),
            Level::Debug => "DEBUG".bright_black(),
            Level::Trace => "TRACE".bright_black(),
        };

        let current = thread::current();
        match current.name() {
            Some(name) if name != "main" => {
                writeln!(buf, "{} [{}] {}", level_label, name.bright_black(), record.args())
            }
            _ => writeln!(buf, "{} {}", level_label, record.args()),
        }
    });

    builder.init();
}
