//! Diagnostic log of one batch, with file and callback output.
//!
//! Each batch gets its own logger that:
//! - Writes to a dedicated log file (`FindPeaks<exp>.log`, `integrate.log`)
//! - Sends lines to a callback (if provided)
//! - Supports compact mode with progress filtering
//! - Maintains a tail buffer for error diagnosis

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use crate::models::{UnitKey, UnitLog};

use super::types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

/// Per-batch logger with dual output (file + callback).
pub struct BatchLogger {
    /// Batch name for identification.
    name: String,
    /// Path to log file.
    log_path: PathBuf,
    /// File writer (buffered).
    file_writer: Mutex<Option<BufWriter<File>>>,
    /// Callback for each formatted line.
    callback: Option<LogCallback>,
    /// Logging configuration.
    config: LogConfig,
    /// Tail buffer for recent lines.
    tail_buffer: Mutex<VecDeque<String>>,
    /// Last progress percentage logged (for compact mode filtering).
    last_progress: Mutex<Option<u32>>,
}

impl BatchLogger {
    /// Create a logger writing `<log_dir>/<name>.log`, truncating any old log.
    pub fn new(
        name: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        callback: Option<LogCallback>,
    ) -> std::io::Result<Self> {
        let name = name.into();
        let log_dir = log_dir.as_ref();

        fs::create_dir_all(log_dir)?;

        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&name)));
        let file = File::create(&log_path)?;

        Ok(Self {
            name,
            log_path,
            file_writer: Mutex::new(Some(BufWriter::new(file))),
            callback,
            tail_buffer: Mutex::new(VecDeque::with_capacity(config.error_tail)),
            config,
            last_progress: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Log a message at the specified level.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }

        let formatted = self.format_message(message);
        self.remember(&formatted);
        self.output(&formatted);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        let msg = MessagePrefix::Warning.format(message);
        self.log(LogLevel::Warn, &msg);
    }

    pub fn error(&self, message: &str) {
        let msg = MessagePrefix::Error.format(message);
        self.log(LogLevel::Error, &msg);
    }

    /// Log a phase marker.
    pub fn phase(&self, phase_name: &str) {
        let msg = MessagePrefix::Phase.format(phase_name);
        self.log(LogLevel::Info, &msg);
    }

    /// Log a section marker.
    pub fn section(&self, section_name: &str) {
        let msg = MessagePrefix::Section.format(section_name);
        self.log(LogLevel::Info, &msg);
    }

    pub fn success(&self, message: &str) {
        let msg = MessagePrefix::Success.format(message);
        self.log(LogLevel::Info, &msg);
    }

    /// Copy one finished unit's own log lines into the batch log.
    pub fn unit_log(&self, key: UnitKey, log: &UnitLog) {
        for line in log.lines() {
            self.info(&format!("[{}] {}", key, line));
        }
    }

    /// Log how many units have finished.
    ///
    /// In compact mode only every `progress_step` percent is written.
    /// Returns true if the line was logged.
    pub fn progress(&self, finished: usize, total: usize) -> bool {
        let percent = if total == 0 {
            100
        } else {
            (finished * 100 / total) as u32
        };

        {
            let mut last = self.last_progress.lock();
            if self.config.compact {
                let step = self.config.progress_step.max(1);
                let current_step = percent / step;
                if let Some(previous) = *last {
                    if current_step <= previous / step && percent < 100 {
                        return false;
                    }
                }
            }
            if *last == Some(percent) {
                return false;
            }
            *last = Some(percent);
        }

        self.info(&format!(
            "Progress: {} of {} detectors finished ({}%)",
            finished, total, percent
        ));
        true
    }

    /// Replay the tail buffer (typically after a failure).
    ///
    /// The lines are already in the log file, so they only go to the
    /// callback and to tracing.
    pub fn show_tail(&self, header: &str) {
        let lines = self.get_tail();
        if lines.is_empty() {
            return;
        }

        let title = self.format_message(&format!("[{}/tail]", header));
        tracing::warn!(batch = %self.name, "{}", title);
        if let Some(ref callback) = self.callback {
            callback(&title);
        }
        for line in &lines {
            tracing::warn!(batch = %self.name, "{}", line);
            if let Some(ref callback) = self.callback {
                callback(line);
            }
        }
    }

    /// Get the current tail buffer contents.
    pub fn get_tail(&self) -> Vec<String> {
        self.tail_buffer.lock().iter().cloned().collect()
    }

    /// Flush the log file.
    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    /// Close the logger and release the file.
    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }

    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            let timestamp = Local::now().format("%H:%M:%S");
            format!("[{}] {}", timestamp, message)
        } else {
            message.to_string()
        }
    }

    fn remember(&self, formatted: &str) {
        if self.config.error_tail == 0 {
            return;
        }
        let mut buffer = self.tail_buffer.lock();
        if buffer.len() >= self.config.error_tail {
            buffer.pop_front();
        }
        buffer.push_back(formatted.to_string());
    }

    fn output(&self, formatted: &str) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writeln!(writer, "{}", formatted);
        }

        if let Some(ref callback) = self.callback {
            callback(formatted);
        }
    }
}

impl Drop for BatchLogger {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sanitize a string to be safe for use as a filename.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

/// Builder for creating a BatchLogger with fluent API.
pub struct BatchLoggerBuilder {
    name: String,
    log_dir: PathBuf,
    config: LogConfig,
    callback: Option<LogCallback>,
}

impl BatchLoggerBuilder {
    pub fn new(name: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            log_dir: log_dir.into(),
            config: LogConfig::default(),
            callback: None,
        }
    }

    /// Set the logging configuration.
    pub fn config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the per-line callback.
    pub fn callback(mut self, callback: Option<LogCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn build(self) -> std::io::Result<BatchLogger> {
        BatchLogger::new(self.name, self.log_dir, self.config, self.callback)
    }
}
