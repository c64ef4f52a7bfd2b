/*!
 * Script Failure Tests
 * Every failure is recovered locally and reported exactly once
 */

use jskern::monitoring::{DiagnosticKind, MemorySink};
use jskern::process::{Process, ProcessSpec, ProcessState};
use jskern::{ExitStatus, ProcessError, ScriptError};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;

fn script(source: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".js").tempfile().unwrap();
    file.write_all(source.as_bytes()).unwrap();
    file
}

fn spawn_at(pid: u16, path: &std::path::Path) -> (Arc<Process>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let process = Process::builder(ProcessSpec::new(pid, path))
        .sink(sink.clone())
        .spawn()
        .unwrap();
    (process, sink)
}

#[test]
fn test_missing_function_reports_once() {
    let file = script("function main() {}");
    let (process, sink) = spawn_at(1, file.path());
    process.execute();

    assert_eq!(process.invoke("nonexistent", vec![]), None);
    assert_eq!(sink.len(), 1);
    let entry = &sink.entries()[0];
    assert_eq!(entry.kind, DiagnosticKind::SymbolNotFound);
    assert_eq!(entry.message, "process 1: function nonexistent not found");
}

#[test]
fn test_exception_is_not_attributed_to_next_call() {
    let file = script(
        "function boom() { throw new TypeError('nope'); }\n\
         function fine() { return { ok: true }; }",
    );
    let (process, sink) = spawn_at(2, file.path());
    process.load_script(file.path());

    assert_eq!(process.invoke("boom", vec![]), None);
    assert_eq!(process.invoke("fine", vec![]), Some(json!({ "ok": true })));
    assert_eq!(sink.len(), 1);
    assert_eq!(
        sink.entries()[0].message,
        "process 2: JavaScript Error in function boom: TypeError: nope"
    );
}

#[test]
fn test_try_invoke_returns_typed_error() {
    let file = script("function fail() { throw 'plain'; }");
    let (process, sink) = spawn_at(3, file.path());
    process.load_script(file.path());

    assert_eq!(
        process.try_invoke("fail", vec![]),
        Err(ProcessError::Script(ScriptError::Call {
            pid: 3,
            name: "fail".to_string(),
            exception: "plain".to_string(),
        }))
    );
    assert_eq!(sink.count(DiagnosticKind::Call), 1);
}

#[test]
fn test_syntax_error_keeps_process_alive() {
    let file = script("function main( {");
    let (process, sink) = spawn_at(4, file.path());
    process.execute();

    assert_eq!(sink.count(DiagnosticKind::Evaluation), 1);
    assert_eq!(sink.count(DiagnosticKind::SymbolNotFound), 1);
    assert_eq!(process.state(), ProcessState::Ready);
    assert!(matches!(process.status(), ExitStatus::Faulted(_)));

    // the namespace is still usable
    assert_eq!(process.invoke("getpid", vec![]), Some(json!(4)));
}

#[test]
fn test_partial_evaluation_is_visible() {
    let file = script(
        "function early() { return 'defined'; }\n\
         throw new Error('halfway');\n\
         function main() { return 'never'; }",
    );
    let (process, sink) = spawn_at(5, file.path());
    assert!(matches!(
        process.try_load_script(file.path()),
        Err(ProcessError::Script(ScriptError::Evaluation { .. }))
    ));
    assert_eq!(process.invoke("early", vec![]), Some(json!("defined")));
    assert_eq!(sink.count(DiagnosticKind::Evaluation), 1);
}

#[test]
fn test_missing_script_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.js");
    let (process, sink) = spawn_at(6, &path);

    process.load_script(&path);
    assert_eq!(sink.count(DiagnosticKind::Load), 1);
    assert!(sink.entries()[0].message.starts_with("Kernel Exec Error"));

    assert_eq!(process.invoke("main", vec![]), None);
    assert_eq!(sink.count(DiagnosticKind::SymbolNotFound), 1);
    assert!(process.is_alive());
}

#[test]
fn test_failed_main_marks_status_faulted() {
    let file = script("function main() { null.field; }");
    let (process, sink) = spawn_at(7, file.path());
    process.execute();

    assert_eq!(sink.count(DiagnosticKind::Call), 1);
    match process.status() {
        ExitStatus::Faulted(message) => assert!(message.contains("TypeError")),
        other => panic!("unexpected status {:?}", other),
    }
    assert_eq!(process.state(), ProcessState::Ready);
}
