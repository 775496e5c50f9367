//! Embedded-code extractor: pulls the IR section out of each object file.
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crossbeam::channel::{self, RecvTimeoutError};

use crate::{
    ext::diag::Diagnostics,
    magic::{IR_SECTION_NAME, IR_SECTION_NAME_MACHO},
    muwarn, objfile,
    parallel::{Task, TaskExecutor},
    utils::{
        conf::Configuration,
        error::{InputError, MuResult},
    },
};

/// Raw IR payload of one object file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedBuffer {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

/// Read a whole file, giving up after `timeout`.
///
/// The read runs on a helper thread. On timeout the thread is abandoned and
/// its result discarded.
pub fn read_with_timeout(path: &Path, timeout: Duration) -> Result<Vec<u8>, InputError> {
    let (sender, receiver) = channel::bounded(1);
    let owned = path.to_path_buf();
    std::thread::Builder::new()
        .name("mu-read".to_string())
        .spawn(move || {
            let _ = sender.send(std::fs::read(&owned));
        })
        .map_err(|source| InputError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

    match receiver.recv_timeout(timeout) {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(source)) => Err(InputError::Unreadable {
            path: path.to_path_buf(),
            source,
        }),
        Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
            Err(InputError::ReadTimeout {
                path: path.to_path_buf(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

/// Extract the embedded IR of a single object file.
pub fn extract_embedded_ir(path: &Path, timeout: Duration) -> Result<EmbeddedBuffer, InputError> {
    let data = read_with_timeout(path, timeout)?;
    let section = objfile::read_section(&data, &[IR_SECTION_NAME, IR_SECTION_NAME_MACHO])
        .map_err(|source| InputError::NotAnObject {
            path: path.to_path_buf(),
            source,
        })?;

    match section {
        Some(bytes) if !bytes.is_empty() => Ok(EmbeddedBuffer {
            path: path.to_path_buf(),
            bytes,
        }),
        _ => Err(InputError::MissingSection {
            path: path.to_path_buf(),
            section: IR_SECTION_NAME.to_string(),
        }),
    }
}

struct ExtractTask {
    timeout: Duration,
}

impl Task for ExtractTask {
    type Input = PathBuf;
    type Output = EmbeddedBuffer;

    fn run(&mut self, path: &mut PathBuf, diag: &Diagnostics) -> MuResult<Option<EmbeddedBuffer>> {
        match extract_embedded_ir(path, self.timeout) {
            Ok(buffer) => Ok(Some(buffer)),
            Err(e) => {
                muwarn!(diag, "{}", e);
                Ok(None)
            }
        }
    }
}

/// Buffers extracted from a batch of files.
#[derive(Debug, Default)]
pub struct Extraction {
    /// One buffer per successful input, in input order.
    pub buffers: Vec<EmbeddedBuffer>,
    /// Inputs that did not yield a buffer.
    pub skipped: Vec<PathBuf>,
}

pub struct EmbeddedCodeExtractor<'a> {
    config: &'a Configuration,
    diag: &'a Diagnostics,
}

impl<'a> EmbeddedCodeExtractor<'a> {
    pub fn new(config: &'a Configuration, diag: &'a Diagnostics) -> Self {
        Self { config, diag }
    }

    /// Extract every input in parallel. Per-file failures are reported and
    /// the file is left out of the result.
    pub fn extract(&self, paths: &[PathBuf]) -> MuResult<Extraction> {
        let mut inputs = paths.to_vec();
        let timeout = self.config.read_timeout();
        let outputs = TaskExecutor::new(
            self.diag,
            "Extracting bitcode from executable",
            self.config.workers,
            |_| ExtractTask { timeout },
        )
        .execute(&mut inputs)?;

        let mut extraction = Extraction::default();
        for (path, output) in inputs.into_iter().zip(outputs) {
            match output {
                Some(buffer) => extraction.buffers.push(buffer),
                None => extraction.skipped.push(path),
            }
        }
        Ok(extraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objfile::{ObjectTarget, write_sections};

    #[test]
    fn missing_file_is_unreadable() {
        let err = extract_embedded_ir(
            Path::new("/nonexistent/mu/input.o"),
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(err.is_unreadable());
    }

    #[test]
    fn object_without_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.o");
        let bytes = write_sections(ObjectTarget::default(), &[(".data", b"1234")]).unwrap();
        std::fs::write(&path, bytes).unwrap();

        let err = extract_embedded_ir(&path, Duration::from_secs(5)).unwrap_err();
        assert!(err.is_missing_section());
    }

    #[test]
    fn non_object_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();

        let err = extract_embedded_ir(&path, Duration::from_secs(5)).unwrap_err();
        assert!(err.is_not_an_object());
    }
}
