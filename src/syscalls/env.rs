/*!
 * Environment Syscalls
 */

use super::fd::text_arg;
use super::handler::{arg, string_arg, Syscall, SyscallContext};
use super::types::{SyscallError, SyscallResult};
use serde_json::Value;

/// `getenv(name)`: the value, or `null` when unset
pub struct GetEnv;

impl Syscall for GetEnv {
    fn name(&self) -> &str {
        "getenv"
    }

    fn call(&self, ctx: &mut SyscallContext<'_>, args: &[Value]) -> SyscallResult<Value> {
        let name = string_arg(args, 0)?;
        Ok(ctx.env.get(name).map(Value::String).unwrap_or(Value::Null))
    }
}

/// `setenv(name, value)`
pub struct SetEnv;

impl Syscall for SetEnv {
    fn name(&self) -> &str {
        "setenv"
    }

    fn call(&self, ctx: &mut SyscallContext<'_>, args: &[Value]) -> SyscallResult<Value> {
        let name = string_arg(args, 0)?;
        if name.is_empty() || name.contains('=') {
            return Err(SyscallError::invalid_argument(format!(
                "invalid variable name {:?}",
                name
            )));
        }
        let value = text_arg(arg(args, 1)?);
        ctx.env.set(name, value);
        Ok(Value::Null)
    }
}
