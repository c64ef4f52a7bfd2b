/*!
 * Capability Tests
 * Standard and custom syscalls as seen from scripts
 */

use jskern::core::types::Stream;
use jskern::process::{BufferTerminal, Process, ProcessSpec, TerminalRef};
use jskern::syscalls::{SyscallError, SyscallTable};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn script(source: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".js").tempfile().unwrap();
    file.write_all(source.as_bytes()).unwrap();
    file
}

#[test]
fn test_custom_syscall_is_callable() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let syscalls = SyscallTable::standard().register_fn("double", move |_ctx, args| {
        counter.fetch_add(1, Ordering::SeqCst);
        let n = args
            .first()
            .and_then(|v| v.as_i64())
            .ok_or_else(|| SyscallError::invalid_argument("expected integer"))?;
        Ok(json!(n * 2))
    });

    let file = script(
        "function run(n) { return double(n); }\n\
         function misuse() { try { double('x'); } catch (e) { return e.name; } }",
    );
    let process = Process::builder(ProcessSpec::new(1, file.path()))
        .syscalls(syscalls)
        .spawn()
        .unwrap();
    process.load_script(file.path());

    assert!(process.symbols().iter().any(|s| s == "double"));
    assert_eq!(process.invoke("run", vec![json!(21)]), Some(json!(42)));
    assert_eq!(process.invoke("misuse", vec![]), Some(json!("TypeError")));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_custom_syscall_sees_process_context() {
    let syscalls = SyscallTable::new().register_fn("whoami", |ctx, _args| {
        ctx.write_terminal(Stream::Stderr, "asked\n")?;
        Ok(json!({ "pid": ctx.pid, "argc": ctx.args.len() }))
    });
    let terminal = BufferTerminal::new();
    let file = script("function main() { return whoami(); }");
    let spec = ProcessSpec::new(9, file.path()).with_args(["a", "b"]);
    let process = Process::builder(spec)
        .terminal(TerminalRef::new(&terminal))
        .syscalls(syscalls)
        .spawn()
        .unwrap();
    process.load_script(file.path());

    assert_eq!(process.symbols(), ["whoami".to_string()]);
    assert_eq!(
        process.invoke("main", vec![]),
        Some(json!({ "pid": 9, "argc": 2 }))
    );
    // stderr is not part of the stdout capture
    assert_eq!(terminal.stdout(9), "");
}

#[test]
fn test_environment_is_shared_with_host() {
    let file = script(
        "function lookup(name) { return getenv(name); }\n\
         function store(name, value) { setenv(name, value); }\n\
         function bad() { try { setenv('A=B', 'x'); } catch (e) { return e.name + ': ' + e.message; } }",
    );
    let spec = ProcessSpec::new(2, file.path()).with_env([("HOME", "/home/ada")]);
    let process = Process::builder(spec).spawn().unwrap();
    process.load_script(file.path());

    assert_eq!(process.invoke("lookup", vec![json!("HOME")]), Some(json!("/home/ada")));
    assert_eq!(process.invoke("lookup", vec![json!("MISSING")]), Some(json!(null)));

    process.set_env("FROM_HOST", "1");
    assert_eq!(process.invoke("lookup", vec![json!("FROM_HOST")]), Some(json!("1")));

    process.invoke("store", vec![json!("FROM_SCRIPT"), json!(7)]);
    assert_eq!(process.get_env("FROM_SCRIPT"), Some("7".to_string()));

    assert_eq!(
        process.invoke("bad", vec![]),
        Some(json!(format!(
            "TypeError: setenv: {}",
            SyscallError::invalid_argument("invalid variable name \"A=B\"")
        )))
    );
}

#[test]
fn test_print_joins_arguments() {
    let terminal = BufferTerminal::new();
    let file = script("function main() { print('a', 1, true, null, {k: [1]}); print(); }");
    let process = Process::builder(ProcessSpec::new(3, file.path()))
        .terminal(TerminalRef::new(&terminal))
        .spawn()
        .unwrap();
    process.load_script(file.path());
    process.invoke("main", vec![]);

    assert_eq!(terminal.stdout(3), "a 1 true null {\"k\":[1]}\n\n");
}

#[test]
fn test_identity_syscalls() {
    let file = script("function main() { return [getpid(), getargs()]; }");
    let spec = ProcessSpec::new(77, file.path()).with_args(["x", "y z"]);
    let process = Process::builder(spec).spawn().unwrap();
    process.load_script(file.path());

    assert_eq!(
        process.invoke("main", vec![]),
        Some(json!([77, ["x", "y z"]]))
    );
}

#[test]
fn test_getargs_returns_a_copy() {
    let file = script("function main() { var a = getargs(); a.push('extra'); return getargs().length; }");
    let spec = ProcessSpec::new(4, file.path()).with_args(["one"]);
    let process = Process::builder(spec).spawn().unwrap();
    process.load_script(file.path());

    assert_eq!(process.invoke("main", vec![]), Some(json!(1)));
}

#[test]
fn test_print_without_terminal_throws() {
    let file = script(
        "function main() { try { print('lost'); return 'printed'; } catch (e) { return e.message; } }",
    );
    let process = Process::builder(ProcessSpec::new(5, file.path()))
        .terminal(TerminalRef::detached())
        .spawn()
        .unwrap();
    process.load_script(file.path());

    assert_eq!(
        process.invoke("main", vec![]),
        Some(json!(format!(
            "print: {}",
            SyscallError::unavailable("terminal detached")
        )))
    );
}

#[test]
fn test_dropped_terminal_detaches() {
    let terminal = BufferTerminal::new();
    let file = script("function main() { try { print('x'); return true; } catch (e) { return false; } }");
    let process = Process::builder(ProcessSpec::new(6, file.path()))
        .terminal(TerminalRef::new(&terminal))
        .spawn()
        .unwrap();
    process.load_script(file.path());

    assert_eq!(process.invoke("main", vec![]), Some(json!(true)));
    drop(terminal);
    assert_eq!(process.invoke("main", vec![]), Some(json!(false)));
}
