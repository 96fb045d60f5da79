//! Worker side of the process-based backends.
//!
//! The pool writes a `WorkRequest` JSON file, launches the worker
//! program with `--request <file> --output <file>`, and waits for the
//! `WorkResponse` file to appear. The response is written atomically
//! (temp file + rename), so a file that exists is always complete.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::algorithm::UnitRunner;
use crate::models::{UnitKey, UnitOutput, WorkUnit};

use super::cancel::CancelToken;
use super::errors::{ExecutionError, ExecutionResult};

/// Input file of one worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkRequest {
    pub batch_id: String,
    pub unit: WorkUnit,
}

/// Output file of one worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkResponse {
    pub key: UnitKey,
    pub output: UnitOutput,
}

/// Run one unit from a request file and write its response file.
///
/// Unit-level failures (load, algorithm, panic) are written into the
/// response; only an unreadable request or an unwritable response is
/// returned as an error.
pub fn run_worker<D: 'static>(
    request_path: &Path,
    output_path: &Path,
    runner: &UnitRunner<D>,
) -> ExecutionResult<WorkResponse> {
    let request = read_request(request_path)?;
    tracing::info!(
        batch = %request.batch_id,
        unit = %request.unit.key,
        "Worker starting"
    );

    let output = runner.run(&request.unit, &CancelToken::new());
    let response = WorkResponse {
        key: request.unit.key,
        output,
    };
    write_json(output_path, &response)?;

    tracing::info!(
        unit = %response.key,
        outcome = response.output.outcome.as_str(),
        "Worker finished"
    );
    Ok(response)
}

pub(crate) fn write_request(path: &Path, request: &WorkRequest) -> ExecutionResult<()> {
    write_json(path, request)
}

pub(crate) fn read_request(path: &Path) -> ExecutionResult<WorkRequest> {
    let content = fs::read_to_string(path)
        .map_err(|e| ExecutionError::io(format!("reading {}", path.display()), e))?;
    serde_json::from_str(&content).map_err(|e| ExecutionError::corrupt_output(path, e.to_string()))
}

/// Read a response and check it belongs to `expected`.
pub(crate) fn read_response(path: &Path, expected: UnitKey) -> ExecutionResult<UnitOutput> {
    let content = fs::read_to_string(path)
        .map_err(|e| ExecutionError::io(format!("reading {}", path.display()), e))?;
    let response: WorkResponse = serde_json::from_str(&content)
        .map_err(|e| ExecutionError::corrupt_output(path, e.to_string()))?;

    if response.key != expected {
        return Err(ExecutionError::corrupt_output(
            path,
            format!("response is for {}, expected {}", response.key, expected),
        ));
    }
    Ok(response.output)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> ExecutionResult<()> {
    let json = serde_json::to_string(value)
        .map_err(|e| ExecutionError::corrupt_output(path, e.to_string()))?;

    let temp_path = path.with_extension("json.tmp");
    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    };
    write().map_err(|e| ExecutionError::io(format!("writing {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Peak, PeakSearchParams, UnitParams};
    use crate::testing::{scripted_runner, MemoryLoader, ScriptedAlgorithm};
    use tempfile::tempdir;

    fn request(run: u32) -> WorkRequest {
        WorkRequest {
            batch_id: "batch-1".to_string(),
            unit: WorkUnit::new(
                UnitKey::new(run, 4),
                UnitParams::FindPeaks(PeakSearchParams::default()),
            ),
        }
    }

    #[test]
    fn worker_writes_response_for_request() {
        let dir = tempdir().unwrap();
        let request_path = dir.path().join("8_4.request.json");
        let output_path = dir.path().join("8_4.response.json");
        write_request(&request_path, &request(8)).unwrap();

        let loader = MemoryLoader::new().with_peaks(
            UnitKey::new(8, 4),
            vec![Peak::new(8, 4, 3.0, 4.0, 5.0)],
        );
        let runner = scripted_runner(loader, ScriptedAlgorithm::new());
        run_worker(&request_path, &output_path, &runner).unwrap();

        let output = read_response(&output_path, UnitKey::new(8, 4)).unwrap();
        assert_eq!(output.outcome.peaks().map(|p| p.len()), Some(1));
        assert!(!output_path.with_extension("json.tmp").exists());
    }

    #[test]
    fn load_failure_is_written_not_returned() {
        let dir = tempdir().unwrap();
        let request_path = dir.path().join("req.json");
        let output_path = dir.path().join("out.json");
        write_request(&request_path, &request(9)).unwrap();

        let runner = scripted_runner(MemoryLoader::new(), ScriptedAlgorithm::new());
        let response = run_worker(&request_path, &output_path, &runner).unwrap();
        assert!(response.output.outcome.is_failed());
        assert!(output_path.exists());
    }

    #[test]
    fn response_for_other_unit_is_rejected() {
        let dir = tempdir().unwrap();
        let request_path = dir.path().join("req.json");
        let output_path = dir.path().join("out.json");
        write_request(&request_path, &request(9)).unwrap();

        let runner = scripted_runner(MemoryLoader::new(), ScriptedAlgorithm::new());
        run_worker(&request_path, &output_path, &runner).unwrap();

        assert!(matches!(
            read_response(&output_path, UnitKey::new(1, 1)),
            Err(ExecutionError::CorruptOutput { .. })
        ));
    }

    #[test]
    fn missing_request_is_an_error() {
        let dir = tempdir().unwrap();
        let runner = scripted_runner(MemoryLoader::new(), ScriptedAlgorithm::new());
        let result = run_worker(
            &dir.path().join("missing.json"),
            &dir.path().join("out.json"),
            &runner,
        );
        assert!(matches!(result, Err(ExecutionError::Io { .. })));
    }
}
