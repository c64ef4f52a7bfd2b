/*!
 * Process Syscalls
 * Identity, arguments and voluntary exit
 */

use super::handler::{arg, Syscall, SyscallContext};
use super::types::{SyscallError, SyscallResult};
use crate::core::types::ExitCode;
use serde_json::Value;
use tracing::info;

/// `getpid()`
pub struct GetPid;

impl Syscall for GetPid {
    fn name(&self) -> &str {
        "getpid"
    }

    fn call(&self, ctx: &mut SyscallContext<'_>, _args: &[Value]) -> SyscallResult<Value> {
        Ok(Value::from(ctx.pid))
    }
}

/// `getargs()`: copy of the process arguments
pub struct GetArgs;

impl Syscall for GetArgs {
    fn name(&self) -> &str {
        "getargs"
    }

    fn call(&self, ctx: &mut SyscallContext<'_>, _args: &[Value]) -> SyscallResult<Value> {
        Ok(Value::from(ctx.args.to_vec()))
    }
}

/// `exit(code = 0)`: stop the script; the process exits once the call unwinds
pub struct Exit;

impl Syscall for Exit {
    fn name(&self) -> &str {
        "exit"
    }

    fn call(&self, ctx: &mut SyscallContext<'_>, args: &[Value]) -> SyscallResult<Value> {
        let code = exit_code(arg(args, 0)?)?;
        info!(pid = ctx.pid, code, "Script requested exit");
        ctx.request_exit(code);
        Ok(Value::Null)
    }
}

fn exit_code(value: &Value) -> SyscallResult<ExitCode> {
    match value {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .and_then(|code| ExitCode::try_from(code).ok())
            .ok_or_else(|| SyscallError::invalid_argument(format!("bad exit code {}", n))),
        other => Err(SyscallError::invalid_argument(format!(
            "exit code must be a number, got {}",
            other
        ))),
    }
}
