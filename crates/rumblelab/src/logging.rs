// Colorized wrappers for logging

use fern::Dispatch;

#[inline(always)]
pub fn format_log(message: &str) -> String {
    let now = chrono::Local::now().format("%Y.%m.%d %H:%M:%S").to_string();
    format!("[{now}] {message}")
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        let message = $crate::logging::format_log(&format!($($arg)*));
        log::error!("{}", message.bright_red());
    }
}

#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        let message = $crate::logging::format_log(&format!($($arg)*));
        log::info!("{message}");
    }
}

#[macro_export]
macro_rules! print_debug {
    ($($arg:tt)*) => {
        let message = $crate::logging::format_log(&format!($($arg)*));
        log::debug!("{}", message.dimmed());
    }
}

#[macro_export]
macro_rules! print_warning {
    ($($arg:tt)*) => {
        let message = $crate::logging::format_log(&format!($($arg)*));
        log::warn!("{}", message.bright_yellow());
    }
}

/// Setup the logger.
///
/// Library crates log through `log` directly; their records are timestamped
/// here so they line up with the console output.
pub fn setup(verbose: bool, no_color: bool) {
    let log_level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    Dispatch::new()
        .format(|out, message, record| {
            if record.target().starts_with("rumblelab::") || record.target() == "rumblelab" {
                out.finish(format_args!("{message}"));
            } else {
                out.finish(format_args!("{}", format_log(&message.to_string())));
            }
        })
        .level(log::LevelFilter::Error)
        .level_for("rumblelab", log_level)
        .level_for("rumblelab_session", log_level)
        .level_for("rumblelab_sdl", log_level)
        .chain(std::io::stdout())
        .apply()
        .expect("Unable to set up logger");

    if no_color {
        colored::control::set_override(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_log_prefixes_timestamp() {
        let line = format_log("device selected");
        assert!(line.starts_with('['));
        assert!(line.ends_with("] device selected"));
        // [YYYY.MM.DD HH:MM:SS]
        assert_eq!(line.find(']'), Some(20));
    }
}
