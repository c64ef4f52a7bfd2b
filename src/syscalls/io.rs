/*!
 * Terminal I/O Syscalls
 */

use super::fd::text_arg;
use super::handler::{Syscall, SyscallContext};
use super::types::SyscallResult;
use crate::core::types::Stream;
use serde_json::Value;

/// `print(...values)`: space-joined line on the terminal's stdout
pub struct Print;

impl Syscall for Print {
    fn name(&self) -> &str {
        "print"
    }

    fn call(&self, ctx: &mut SyscallContext<'_>, args: &[Value]) -> SyscallResult<Value> {
        let mut line = args.iter().map(text_arg).collect::<Vec<_>>().join(" ");
        line.push('\n');
        ctx.write_terminal(Stream::Stdout, &line)?;
        Ok(Value::Null)
    }
}
