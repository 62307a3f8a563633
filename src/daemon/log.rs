use chrono::Local;
use global_placeholders::global;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};

pub struct Logger {
    file: File,
}

/// Formats arguments into a string for logging
pub fn format_args(args: &HashMap<String, String>) -> String {
    args.iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<String>>()
        .join(", ")
}

impl Logger {
    pub fn new() -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(global!("gopm2.daemon.log"))?;
        Ok(Logger { file })
    }

    pub fn write(&mut self, message: &str, args: HashMap<String, String>) {
        let msg = if args.is_empty() {
            message.to_string()
        } else {
            format!("{message} ({})", format_args(&args))
        };

        // ::log:: references the external log crate, not this module.
        ::log::info!("{msg}");
        // Silently ignore write errors to prevent panics
        let _ = writeln!(
            &mut self.file,
            "[{}] {msg}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f")
        );
    }
}

macro_rules! log {
    ($msg:expr $(, $key:expr => $value:expr)* $(,)?) => {{
        let mut args = std::collections::HashMap::new();
        $(args.insert($key.to_string(), format!("{}", $value));)*
        if let Ok(mut logger) = crate::daemon::log::Logger::new() {
            logger.write($msg, args)
        } else {
            let args_str = crate::daemon::log::format_args(&args);
            ::log::info!("{} ({})", $msg, args_str);
        }
    }};
}
