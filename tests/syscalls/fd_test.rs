/*!
 * File Descriptor Tests
 * Table invariants and script-level descriptor operations
 */

use jskern::core::limits::FD_TABLE_SIZE;
use jskern::monitoring::{DiagnosticKind, MemorySink};
use jskern::process::{Process, ProcessSpec};
use jskern::syscalls::{Fd, FdTable, SyscallError};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;

fn script(source: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".js").tempfile().unwrap();
    file.write_all(source.as_bytes()).unwrap();
    file
}

proptest! {
    #[test]
    fn prop_fd_accepts_exactly_table_indices(raw in 0usize..1024) {
        prop_assert_eq!(Fd::new(raw).is_some(), raw < FD_TABLE_SIZE);
    }

    #[test]
    fn prop_table_size_never_changes(ops in prop::collection::vec((0usize..FD_TABLE_SIZE, ".{0,8}", 0u8..4), 0..64)) {
        let mut table = FdTable::new();
        for (raw, text, op) in ops {
            let fd = Fd::new(raw).unwrap();
            match op {
                0 => table.append(fd, &text),
                1 => table.set(fd, text),
                2 => { table.take(fd); }
                _ => table.clear(fd),
            }
            prop_assert_eq!(table.len(), FD_TABLE_SIZE);
        }
        table.clear_all();
        prop_assert_eq!(table.iter_used().count(), 0);
    }

    #[test]
    fn prop_appends_concatenate(parts in prop::collection::vec("[a-z]{0,5}", 0..10)) {
        let mut table = FdTable::new();
        let fd = Fd::new(17).unwrap();
        for part in &parts {
            table.append(fd, part);
        }
        prop_assert_eq!(table.take(fd), parts.concat());
        prop_assert!(table.is_empty_slot(fd));
    }
}

#[test]
fn test_script_descriptor_round_trip() {
    let file = script(
        "function main() {\n\
           write(3, 'ab');\n\
           var n = write(3, 'cd');\n\
           write(4, 'keep');\n\
           return [n, read(3), read(3)];\n\
         }",
    );
    let process = Process::builder(ProcessSpec::new(1, file.path())).spawn().unwrap();
    process.load_script(file.path());

    assert_eq!(process.invoke("main", vec![]), Some(json!([2, "abcd", ""])));
    let used = process
        .with_fd(|fd| {
            fd.iter_used()
                .map(|(fd, text)| (fd.index(), text.to_string()))
                .collect::<Vec<_>>()
        })
        .unwrap();
    assert_eq!(used, vec![(4, "keep".to_string())]);
}

#[test]
fn test_host_and_script_share_table() {
    let file = script("function take(fd) { return read(fd); } function drop(fd) { close(fd); }");
    let process = Process::builder(ProcessSpec::new(2, file.path())).spawn().unwrap();
    process.load_script(file.path());

    process
        .with_fd_mut(|fd| fd.set(Fd::new(200).unwrap(), "from host"))
        .unwrap();
    assert_eq!(process.invoke("take", vec![json!(200)]), Some(json!("from host")));

    process
        .with_fd_mut(|fd| fd.set(Fd::new(201).unwrap(), "x"))
        .unwrap();
    process.invoke("drop", vec![json!(201)]);
    assert!(process
        .with_fd(|fd| fd.is_empty_slot(Fd::new(201).unwrap()))
        .unwrap());
}

#[test]
fn test_out_of_range_descriptor_throws() {
    let file = script(
        "function probe(fd) {\n\
           try { write(fd, 'x'); return 'ok'; } catch (e) { return e.name + ': ' + e.message; }\n\
         }\n\
         function unguarded() { return read(256); }",
    );
    let sink = Arc::new(MemorySink::new());
    let process = Process::builder(ProcessSpec::new(3, file.path()))
        .sink(sink.clone())
        .spawn()
        .unwrap();
    process.load_script(file.path());

    assert_eq!(
        process.invoke("probe", vec![json!(FD_TABLE_SIZE)]),
        Some(json!(format!("RangeError: write: {}", SyscallError::BadFd("256".into()))))
    );
    assert_eq!(process.invoke("probe", vec![json!(255)]), Some(json!("ok")));
    let fractional = process.invoke("probe", vec![json!(1.5)]).unwrap();
    assert!(fractional.as_str().unwrap().starts_with("RangeError"));

    assert_eq!(process.invoke("unguarded", vec![]), None);
    assert_eq!(sink.count(DiagnosticKind::Call), 1);
}
