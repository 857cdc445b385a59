//! File-backed logger for the spectral transport.
//!
//! Logging is controlled by the `SLOG_DIR` environment variable: when it is
//! set, records are appended to a randomly named file inside that directory;
//! when it is absent, [`init`] installs nothing and logging stays disabled.
//! Records are formatted on the calling thread and handed to a background
//! writer thread, so call sites never block on disk I/O.

use chrono::Local;
use log::{Level, Log, SetLoggerError, set_boxed_logger, set_max_level};
use rand::RngCore;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

pub enum LogCommand {
    Record(String),
    Flush,
    Terminate,
}

pub struct SpectralLogger {
    max_level: Level,
    sender: mpsc::SyncSender<LogCommand>,
}

impl SpectralLogger {
    pub fn new(max_level: Level, buffer_size: usize) -> (Self, mpsc::Receiver<LogCommand>) {
        let (sender, receiver) = mpsc::sync_channel(buffer_size);

        let logger = SpectralLogger { max_level, sender };
        (logger, receiver)
    }

    /// Installs the logger if `SLOG_DIR` is set; a no-op otherwise.
    pub fn init(max_level: Level, buffer_size: usize) -> Result<(), SetLoggerError> {
        let Some(path) = log_file_path() else {
            return Ok(());
        };

        let file = match OpenOptions::new().append(true).create(true).open(&path) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("[SpectralLogger] Failed to open {}: {}", path.display(), e);
                return Ok(());
            }
        };

        let (logger, receiver) = SpectralLogger::new(max_level, buffer_size);
        spawn_writer(file, receiver);
        set_boxed_logger(Box::new(logger))?;
        set_max_level(max_level.to_level_filter());
        Ok(())
    }
}

fn log_file_path() -> Option<PathBuf> {
    let dir = std::env::var("SLOG_DIR").ok().filter(|dir| !dir.is_empty())?;
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("[SpectralLogger] Failed to create {}: {}", dir, e);
        return None;
    }

    let mut name = [0u8; 20];
    rand::rng().fill_bytes(&mut name);
    Some(PathBuf::from(dir).join(format!("{}.log", hex::encode(name))))
}

fn spawn_writer(file: File, receiver: mpsc::Receiver<LogCommand>) {
    let _handle = thread::Builder::new()
        .name("spectral-log-writer".into())
        .spawn(move || {
            let mut writer = BufWriter::new(file);
            while let Ok(command) = receiver.recv() {
                match command {
                    LogCommand::Record(message) => {
                        if let Err(e) = writer.write_all(message.as_bytes()) {
                            eprintln!("[SpectralLogger] Failed to write log record: {}", e);
                        }
                    }
                    LogCommand::Flush => {
                        if let Err(e) = writer.flush() {
                            eprintln!("[SpectralLogger] Failed to flush log: {}", e);
                        }
                    }
                    LogCommand::Terminate => {
                        let _ = writer.flush();
                        break;
                    }
                }
            }
            // Channel closed or termination requested. Ensure final flush.
            let _ = writer.flush();
        })
        .expect("Failed to spawn logger thread");
}

impl Log for SpectralLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let now = Local::now();
            let message = format!(
                "{} {} [{}] {}\n",
                now.format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            );

            if let Err(e) = self.sender.try_send(LogCommand::Record(message)) {
                eprintln!("[SpectralLogger] Failed to send log message: {}", e);
            }
        }
    }

    fn flush(&self) {
        let _ = self.sender.send(LogCommand::Flush);
    }
}
