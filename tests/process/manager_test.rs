/*!
 * Process Manager Tests
 * Session pid table, signals and reaping
 */

use jskern::monitoring::{DiagnosticKind, MemorySink};
use jskern::process::{BufferTerminal, ProcessEvent, ProcessManager, ProcessState, TerminalRef};
use jskern::signals::{Signal, SignalOutcome};
use jskern::ProcessError;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

fn script(source: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".js").tempfile().unwrap();
    file.write_all(source.as_bytes()).unwrap();
    file
}

fn manager() -> (ProcessManager, Arc<BufferTerminal>, Arc<MemorySink>) {
    let terminal = BufferTerminal::new();
    let sink = Arc::new(MemorySink::new());
    let manager = ProcessManager::new(TerminalRef::new(&terminal)).with_sink(sink.clone());
    (manager, terminal, sink)
}

#[test]
fn test_spawn_and_execute() {
    let file = script("function main(args) { print('hello', args[0], getenv('USER')); }");
    let (manager, terminal, sink) = manager();
    let envp = HashMap::from([("USER".to_string(), "ada".to_string())]);

    let pid = manager
        .spawn(file.path(), vec!["world".to_string()], envp)
        .unwrap();
    manager.execute(pid).unwrap();

    assert_eq!(terminal.stdout(pid), "hello world ada\n");
    assert!(sink.is_empty());
    assert_eq!(manager.list()[0].symbols.len(), 9);
}

#[test]
fn test_processes_are_isolated() {
    let file = script("var n = 0; function bump() { return ++n; }");
    let (manager, _, _) = manager();
    let a = manager.spawn(file.path(), vec![], HashMap::new()).unwrap();
    let b = manager.spawn(file.path(), vec![], HashMap::new()).unwrap();
    for pid in [a, b] {
        manager.get(pid).unwrap().load_script(file.path());
    }

    manager.invoke(a, "bump", vec![]).unwrap();
    manager.invoke(a, "bump", vec![]).unwrap();
    assert_eq!(manager.invoke(a, "bump", vec![]).unwrap(), Some(json!(3)));
    assert_eq!(manager.invoke(b, "bump", vec![]).unwrap(), Some(json!(1)));
}

#[test]
fn test_signal_handler_receives_number() {
    let file = script("var got = []; function onsignal(n) { got.push(n); return got.length; }");
    let (manager, _, _) = manager();
    let pid = manager.spawn(file.path(), vec![], HashMap::new()).unwrap();
    manager.get(pid).unwrap().load_script(file.path());

    assert_eq!(
        manager.signal(pid, Signal::SIGUSR1.number()).unwrap(),
        SignalOutcome::Handled(json!(1))
    );
    // a handled SIGTERM does not terminate
    assert_eq!(
        manager.signal(pid, Signal::SIGTERM.number()).unwrap(),
        SignalOutcome::Handled(json!(2))
    );
    assert_eq!(manager.get(pid).unwrap().state(), ProcessState::Ready);
}

#[test]
fn test_unhandled_signals() {
    let file = script("function main() {}");
    let (manager, terminal, _) = manager();
    let pid = manager.spawn(file.path(), vec![], HashMap::new()).unwrap();
    manager.execute(pid).unwrap();

    assert_eq!(manager.signal(pid, 10).unwrap(), SignalOutcome::Ignored);
    assert!(matches!(
        manager.signal(pid, 3),
        Err(ProcessError::Signal(_))
    ));
    assert_eq!(manager.signal(pid, 15).unwrap(), SignalOutcome::Terminated);
    assert_eq!(
        manager.signal(pid, 15),
        Err(ProcessError::Terminated(pid))
    );
    assert_eq!(terminal.events(pid).last(), Some(&ProcessEvent::Terminated));
}

#[test]
fn test_sigkill_ignores_handler() {
    let file = script("function onsignal() { return 'caught'; }");
    let (manager, _, _) = manager();
    let pid = manager.spawn(file.path(), vec![], HashMap::new()).unwrap();
    manager.get(pid).unwrap().load_script(file.path());

    assert_eq!(manager.signal(pid, 9).unwrap(), SignalOutcome::Terminated);
    assert_eq!(manager.reap(), vec![pid]);
    assert!(manager.is_empty());
}

#[test]
fn test_exited_process_is_reaped_and_pid_reused() {
    let file = script("function main() { exit(0); }");
    let (manager, _, sink) = manager();
    let pid = manager.spawn(file.path(), vec![], HashMap::new()).unwrap();
    manager.execute(pid).unwrap();
    assert_eq!(manager.get(pid).unwrap().state(), ProcessState::Exited);

    assert_eq!(manager.reap(), vec![pid]);
    assert_eq!(manager.spawn(file.path(), vec![], HashMap::new()).unwrap(), pid);
    assert_eq!(sink.count(DiagnosticKind::Call), 0);
}

#[test]
fn test_construction_failure_is_reported() {
    let file = script("");
    let terminal = BufferTerminal::new();
    let sink = Arc::new(MemorySink::new());
    let manager = ProcessManager::new(TerminalRef::new(&terminal))
        .with_sink(sink.clone())
        .with_syscalls(jskern::SyscallTable::new().register_fn("Math", |_, _| Ok(json!(0))));

    assert!(matches!(
        manager.spawn(file.path(), vec![], HashMap::new()),
        Err(ProcessError::Construction { pid: 1, .. })
    ));
    assert_eq!(sink.count(DiagnosticKind::Construction), 1);
    assert!(manager.is_empty());
}
