/*!
 * Process Lifecycle Tests
 * Construction, serialized execution, termination and exit
 */

use jskern::core::limits::FD_TABLE_SIZE;
use jskern::monitoring::{DiagnosticKind, MemorySink};
use jskern::process::{
    BufferTerminal, Process, ProcessEvent, ProcessSpec, ProcessState, TerminalRef,
};
use jskern::syscalls::SyscallTable;
use jskern::{ExitStatus, KernelConfig, ProcessError, ScriptError};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn script(source: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".js").tempfile().unwrap();
    file.write_all(source.as_bytes()).unwrap();
    file
}

type Spawned = (Arc<Process>, Arc<MemorySink>, Arc<BufferTerminal>);

fn spawn(pid: u16, file: &tempfile::NamedTempFile, args: &[&str]) -> Spawned {
    let sink = Arc::new(MemorySink::new());
    let terminal = BufferTerminal::new();
    let spec = ProcessSpec::new(pid, file.path()).with_args(args.iter().copied());
    let process = Process::builder(spec)
        .terminal(TerminalRef::new(&terminal))
        .sink(sink.clone())
        .spawn()
        .unwrap();
    (process, sink, terminal)
}

fn wait_for_state(process: &Process, state: ProcessState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while process.state() != state {
        assert!(Instant::now() < deadline, "process never reached {:?}", state);
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_fresh_process_has_empty_fd_table() {
    let file = script("");
    let (process, _, _) = spawn(1, &file, &[]);
    let (len, used) = process
        .with_fd(|fd| (fd.len(), fd.iter_used().count()))
        .unwrap();
    assert_eq!(len, FD_TABLE_SIZE);
    assert_eq!(used, 0);
}

#[test]
fn test_symbols_are_bound_before_evaluation() {
    let file = script(
        "var kinds = ['print','write','read','close','getenv','setenv','getpid','getargs','exit']\n\
           .map(function (n) { return typeof globalThis[n]; });\n\
         function seen() { return kinds; }",
    );
    let (process, sink, _) = spawn(2, &file, &[]);
    assert_eq!(process.symbols().len(), SyscallTable::standard().len());

    process.load_script(file.path());
    let kinds = process.invoke("seen", vec![]).unwrap();
    assert_eq!(kinds, json!(vec!["function"; 9]));
    assert!(sink.is_empty());
}

#[test]
fn test_main_receives_args_array() {
    let file = script("function main(args) { return args.length; }");
    let (process, _, _) = spawn(3, &file, &["a", "b"]);
    process.execute();
    assert_eq!(process.invoke("main", vec![json!(["a", "b"])]), Some(json!(2)));
}

#[test]
fn test_execute_twice_does_not_deadlock() {
    // each execute reloads the file, so the counter must survive re-evaluation
    let file = script(
        "globalThis.runs = globalThis.runs || 0;\n\
         function main() { runs++; }\n\
         function count() { return runs; }",
    );
    let (process, sink, _) = spawn(4, &file, &[]);
    process.execute();
    process.execute();
    assert_eq!(process.invoke("count", vec![]), Some(json!(2)));
    assert!(sink.is_empty());
}

#[test]
fn test_terminate_is_idempotent() {
    let file = script("function main() { return 1; }");
    let (process, _, terminal) = spawn(5, &file, &[]);
    process.execute();

    process.terminate();
    process.terminate();

    assert_eq!(process.state(), ProcessState::Terminated);
    assert_eq!(
        process.try_invoke("main", vec![]),
        Err(ProcessError::Terminated(5))
    );
    assert_eq!(process.invoke("main", vec![]), None);
    let terminated = terminal
        .events(5)
        .into_iter()
        .filter(|e| *e == ProcessEvent::Terminated)
        .count();
    assert_eq!(terminated, 1);
}

#[test]
fn test_runaway_main_hits_call_timeout() {
    let file = script("function main() { for (;;) {} } function ping() { return 'pong'; }");
    let sink = Arc::new(MemorySink::new());
    let process = Process::builder(ProcessSpec::new(6, file.path()))
        .config(KernelConfig::default().with_call_timeout(Some(Duration::from_millis(100))))
        .sink(sink.clone())
        .spawn()
        .unwrap();

    process.execute();
    assert_eq!(sink.count(DiagnosticKind::Timeout), 1);
    assert!(matches!(process.status(), ExitStatus::Faulted(_)));
    assert_eq!(process.invoke("ping", vec![]), Some(json!("pong")));
}

#[test]
fn test_terminate_cancels_running_call() {
    let file = script("function spin() { for (;;) {} }");
    let sink = Arc::new(MemorySink::new());
    let process = Process::builder(ProcessSpec::new(7, file.path()))
        .config(KernelConfig::default().with_call_timeout(None))
        .sink(sink.clone())
        .spawn()
        .unwrap();
    process.load_script(file.path());

    let caller = {
        let process = Arc::clone(&process);
        thread::spawn(move || process.try_invoke("spin", vec![]))
    };
    wait_for_state(&process, ProcessState::Running);
    process.terminate();

    let result = caller.join().unwrap();
    assert!(matches!(
        result,
        Err(ProcessError::Script(ScriptError::Cancelled { pid: 7, .. }))
    ));
    assert_eq!(process.state(), ProcessState::Terminated);
    assert_eq!(sink.count(DiagnosticKind::Cancelled), 1);
}

#[test]
fn test_exit_clears_descriptors_and_reports_code() {
    let file = script("function main() { write(9, 'data'); exit(4); }");
    let (process, sink, terminal) = spawn(8, &file, &[]);
    process.execute();

    assert_eq!(process.state(), ProcessState::Exited);
    assert_eq!(process.status(), ExitStatus::Exited(4));
    assert!(sink.is_empty());
    assert!(terminal.events(8).contains(&ProcessEvent::Exited { code: 4 }));
    assert_eq!(
        process.with_fd(|fd| fd.len()),
        Err(ProcessError::Terminated(8))
    );
}

#[test]
fn test_caught_exit_gets_no_more_syscalls() {
    let file = script(
        "function main() {\n\
           try { exit(3); } catch (e) {}\n\
           print('after-exit');\n\
           write(5, 'late');\n\
         }",
    );
    let (process, sink, terminal) = spawn(12, &file, &[]);
    process.execute();

    assert_eq!(process.state(), ProcessState::Exited);
    assert_eq!(process.status(), ExitStatus::Exited(3));
    assert_eq!(terminal.stdout(12), "");
    assert!(sink.is_empty());
    assert_eq!(
        terminal.events(12),
        vec![ProcessEvent::Started, ProcessEvent::Exited { code: 3 }]
    );
}

#[test]
fn test_execute_after_terminate_emits_nothing() {
    let file = script("function main() { print('ran'); }");
    let (process, _, terminal) = spawn(13, &file, &[]);

    process.terminate();
    process.execute();

    assert_eq!(process.state(), ProcessState::Terminated);
    assert_eq!(terminal.events(13), vec![ProcessEvent::Terminated]);
    assert_eq!(terminal.stdout(13), "");
}

#[test]
fn test_duplicate_syscalls_fail_construction() {
    let file = script("");
    let table = SyscallTable::standard().register_fn("print", |_, _| Ok(json!(null)));
    let err = Process::builder(ProcessSpec::new(9, file.path()))
        .syscalls(table)
        .spawn()
        .unwrap_err();
    match err {
        ProcessError::Construction { pid, reason } => {
            assert_eq!(pid, 9);
            assert!(reason.contains("print"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_invalid_syscall_name_fails_construction() {
    let file = script("");
    let table = SyscallTable::new().register_fn("not-valid", |_, _| Ok(json!(null)));
    assert!(matches!(
        Process::builder(ProcessSpec::new(10, file.path()))
            .syscalls(table)
            .spawn(),
        Err(ProcessError::Construction { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_execute_async() {
    let file = script("function main(args) { print(args.join('+')); }");
    let (process, sink, terminal) = spawn(11, &file, &["x", "y"]);
    process.execute_async().await;
    assert_eq!(terminal.stdout(11), "x+y\n");
    assert!(sink.is_empty());
    assert_eq!(process.invoke_async("main", vec![json!(["z"])]).await, Some(json!(null)));
}
