/*!
 * Virtual File Descriptors
 *
 * A fixed table of string buffers per process. Scripts address slots by
 * integer; the integer is validated into an `Fd` at the capability
 * boundary and the table only ever sees validated indices.
 */

use super::handler::{arg, Syscall, SyscallContext};
use super::types::{SyscallError, SyscallResult};
use crate::core::limits::FD_TABLE_SIZE;
use serde_json::Value;
use std::fmt;

/// A descriptor index known to be inside the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fd(usize);

impl Fd {
    pub const fn new(raw: usize) -> Option<Self> {
        if raw < FD_TABLE_SIZE {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub const fn index(self) -> usize {
        self.0
    }

    /// Validate a script-supplied descriptor
    pub fn from_value(value: &Value) -> SyscallResult<Self> {
        value
            .as_u64()
            .and_then(|raw| usize::try_from(raw).ok())
            .and_then(Self::new)
            .or_else(|| {
                // integral floats such as 3.0 are fine
                value
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                    .and_then(|f| Self::new(f as usize))
            })
            .ok_or_else(|| SyscallError::BadFd(value.to_string()))
    }
}

impl TryFrom<i64> for Fd {
    type Error = SyscallError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        usize::try_from(raw)
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| SyscallError::BadFd(raw.to_string()))
    }
}

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed-size descriptor table; an empty string marks an unused slot
#[derive(Clone, PartialEq, Eq)]
pub struct FdTable {
    slots: Box<[String]>,
}

impl FdTable {
    pub fn new() -> Self {
        Self {
            slots: vec![String::new(); FD_TABLE_SIZE].into_boxed_slice(),
        }
    }

    /// Always `FD_TABLE_SIZE`
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, fd: Fd) -> &str {
        &self.slots[fd.index()]
    }

    pub fn set(&mut self, fd: Fd, payload: impl Into<String>) {
        self.slots[fd.index()] = payload.into();
    }

    pub fn append(&mut self, fd: Fd, payload: &str) {
        self.slots[fd.index()].push_str(payload);
    }

    /// Return the slot's payload and leave it empty
    pub fn take(&mut self, fd: Fd) -> String {
        std::mem::take(&mut self.slots[fd.index()])
    }

    pub fn clear(&mut self, fd: Fd) {
        self.slots[fd.index()].clear();
    }

    pub fn clear_all(&mut self) {
        self.slots.iter_mut().for_each(String::clear);
    }

    pub fn is_empty_slot(&self, fd: Fd) -> bool {
        self.slots[fd.index()].is_empty()
    }

    /// Slots currently holding data
    pub fn iter_used(&self) -> impl Iterator<Item = (Fd, &str)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_empty())
            .map(|(i, s)| (Fd(i), s.as_str()))
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FdTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FdTable")
            .field("slots", &self.len())
            .field("used", &self.iter_used().count())
            .finish()
    }
}

/// `write(fd, text)`: append to a slot, returns characters written
pub struct WriteFd;

impl Syscall for WriteFd {
    fn name(&self) -> &str {
        "write"
    }

    fn call(&self, ctx: &mut SyscallContext<'_>, args: &[Value]) -> SyscallResult<Value> {
        let fd = Fd::from_value(arg(args, 0)?)?;
        let text = text_arg(arg(args, 1)?);
        ctx.fd.append(fd, &text);
        Ok(Value::from(text.chars().count()))
    }
}

/// `read(fd)`: drain a slot
pub struct ReadFd;

impl Syscall for ReadFd {
    fn name(&self) -> &str {
        "read"
    }

    fn call(&self, ctx: &mut SyscallContext<'_>, args: &[Value]) -> SyscallResult<Value> {
        let fd = Fd::from_value(arg(args, 0)?)?;
        Ok(Value::String(ctx.fd.take(fd)))
    }
}

/// `close(fd)`: reset a slot to unused
pub struct CloseFd;

impl Syscall for CloseFd {
    fn name(&self) -> &str {
        "close"
    }

    fn call(&self, ctx: &mut SyscallContext<'_>, args: &[Value]) -> SyscallResult<Value> {
        let fd = Fd::from_value(arg(args, 0)?)?;
        ctx.fd.clear(fd);
        Ok(Value::Null)
    }
}

/// Strings pass through verbatim, anything else is written as JSON
pub(crate) fn text_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
