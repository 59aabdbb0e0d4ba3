//! Native-function registry: the integration point for host capabilities
//! callable from the VM via `native name`.

use std::collections::HashMap;
use std::fmt;

use crate::vm::Vm;

/// Raised by a native function body when it cannot complete.
#[derive(Debug, Clone)]
pub struct NativeError(pub String);

impl std::error::Error for NativeError {}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type NativeFn = fn(&mut Vm) -> Result<(), NativeError>;

/// name -> (function pointer, declared argument count).
#[derive(Default)]
pub struct Registry {
    entries: HashMap<String, (NativeFn, usize)>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry { entries: HashMap::new() }
    }

    /// Register `name`. A later call with the same name overwrites the
    /// earlier one.
    pub fn register(&mut self, name: impl Into<String>, f: NativeFn, argc: usize) {
        self.entries.insert(name.into(), (f, argc));
    }

    pub fn get(&self, name: &str) -> Option<(NativeFn, usize)> {
        self.entries.get(name).copied()
    }

    /// A registry seeded with the always-available example natives.
    pub fn with_stdlib() -> Registry {
        let mut reg = Registry::new();
        stdlib::register_all(&mut reg);
        reg
    }
}

/// Illustrative natives exercising the registration contract end to end.
/// These are not a graphics or OS binding — a host embedding the VM for
/// anything real supplies its own.
pub mod stdlib {
    use super::{NativeError, Registry};
    use crate::value::{Tag, Value};
    use crate::vm::Vm;
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn register_all(reg: &mut Registry) {
        reg.register("clock_ms", clock_ms, 0);
        reg.register("rand_u8", rand_u8, 0);
    }

    /// Pushes the current Unix time in milliseconds as an I64.
    fn clock_ms(vm: &mut Vm) -> Result<(), NativeError> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| NativeError(e.to_string()))?
            .as_millis() as i64;
        vm.push_value(Value::from_i64(Tag::I64, millis)).map_err(|e| NativeError(e.to_string()))
    }

    /// Pushes a random byte as a U8.
    fn rand_u8(vm: &mut Vm) -> Result<(), NativeError> {
        let byte: u8 = rand::random();
        vm.push_value(Value::from_u64(Tag::U8, byte as u64)).map_err(|e| NativeError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_get() {
        fn dummy(_vm: &mut Vm) -> Result<(), NativeError> {
            Ok(())
        }
        let mut reg = Registry::new();
        reg.register("dummy", dummy, 2);
        let (_f, argc) = reg.get("dummy").unwrap();
        assert_eq!(argc, 2);
    }

    #[test]
    fn later_registration_overwrites() {
        fn a(_vm: &mut Vm) -> Result<(), NativeError> {
            Ok(())
        }
        fn b(_vm: &mut Vm) -> Result<(), NativeError> {
            Ok(())
        }
        let mut reg = Registry::new();
        reg.register("n", a, 0);
        reg.register("n", b, 1);
        assert_eq!(reg.get("n").unwrap().1, 1);
    }

    #[test]
    fn unknown_name_is_none() {
        let reg = Registry::new();
        assert!(reg.get("nope").is_none());
    }
}
