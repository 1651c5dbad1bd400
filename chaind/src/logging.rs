//! Logging backend (section 6, `--log-level`/`--log-dir`/`--log-color`/
//! `--log-datetime`). The engine crate only logs through the `log` facade
//! (`chain-engine`'s crate doc comment); this is the one place a concrete
//! subscriber is installed, matching the teacher's convention of leaving
//! subscriber selection to the host binary rather than to `fvm` itself.

use std::fs::OpenOptions;
use std::io::Write;

use env_logger::fmt::Color;
use env_logger::Target;

use crate::config::NodeConfig;

pub fn init(config: &NodeConfig) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(parse_level(&config.log_level));

    if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.log", config.instance_id));
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(Target::Pipe(Box::new(file)));
        // File output is never colorized regardless of `--log-color`.
        builder.write_style(env_logger::WriteStyle::Never);
    } else {
        builder.write_style(if config.log_color {
            env_logger::WriteStyle::Always
        } else {
            env_logger::WriteStyle::Never
        });
    }

    let datetime = config.log_datetime;
    let instance_id = config.instance_id.clone();
    builder.format(move |buf, record| {
        let mut level_style = buf.style();
        level_style.set_color(level_color(record.level())).set_bold(true);
        if datetime {
            write!(buf, "[{} ", buf.timestamp_millis())?;
        } else {
            write!(buf, "[")?;
        }
        writeln!(
            buf,
            "{} {instance_id} {}] {}",
            level_style.value(record.level()),
            record.target(),
            record.args()
        )
    });

    builder.try_init()?;
    Ok(())
}

fn level_color(level: log::Level) -> Color {
    match level {
        log::Level::Error => Color::Red,
        log::Level::Warn => Color::Yellow,
        log::Level::Info => Color::Green,
        log::Level::Debug => Color::Blue,
        log::Level::Trace => Color::Cyan,
    }
}

fn parse_level(s: &str) -> log::LevelFilter {
    match s.to_ascii_lowercase().as_str() {
        "off" => log::LevelFilter::Off,
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    }
}
