use ::log::{Log, Metadata, Record};
use spin::Mutex;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// Logger that writes one timestamped, tagged line per record.
///
/// Lines look like `[<nanos>][<LEVEL>][<target>] message`, where the
/// timestamp counts from the creation of the logger. Each record is written
/// under a lock that only guards the output stream.
pub struct TraceLogger {
    start: Instant,
    output: Mutex<Box<dyn Write + Send>>,
}

impl TraceLogger {
    pub fn new(output: Box<dyn Write + Send>) -> TraceLogger {
        TraceLogger {
            start: Instant::now(),
            output: Mutex::new(output),
        }
    }

    pub fn stdout() -> TraceLogger {
        Self::new(Box::new(io::stdout()))
    }

    /// Log into the file at `path`, truncating it.
    pub fn to_file(path: impl AsRef<Path>) -> io::Result<TraceLogger> {
        let file = File::create(path)?;
        Ok(Self::new(Box::new(BufWriter::new(file))))
    }
}

impl Log for TraceLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let timestamp = self.start.elapsed().as_nanos();
        let mut output = self.output.lock();
        // A failing sink must not affect the caller.
        let _ = writeln!(
            output,
            "[{}][{}][{}] {}",
            timestamp,
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = self.output.lock().flush();
    }
}
