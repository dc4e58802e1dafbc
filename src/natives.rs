// File: src/natives.rs
//
// Native (host-implemented) functions exposed to Glint scripts. Each
// native is a plain `fn(&[Value]) -> Result<Value, String>`; the VM
// registers them as globals before running any user code.

use std::sync::OnceLock;
use std::time::Instant;

use crate::value::{ObjNative, Value};

static START: OnceLock<Instant> = OnceLock::new();

fn start_instant() -> &'static Instant {
    START.get_or_init(Instant::now)
}

/// Seconds elapsed since the VM process started, matching the single
/// mandatory native the core language ships: `clock()`.
fn clock(_args: &[Value]) -> Result<Value, String> {
    let elapsed = start_instant().elapsed().as_secs_f64();
    Ok(Value::Number(elapsed))
}

/// Every native function the VM installs as a global before running a
/// script, paired with its name and arity.
pub fn builtins() -> Vec<(&'static str, u8, crate::value::NativeFn)> {
    vec![("clock", 0, clock)]
}

pub fn make_native(name: &'static str, arity: u8, function: crate::value::NativeFn) -> ObjNative {
    ObjNative { name: std::rc::Rc::from(name), arity, function }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_returns_a_nonnegative_number() {
        let result = clock(&[]).expect("clock never fails");
        match result {
            Value::Number(n) => assert!(n >= 0.0),
            _ => panic!("clock must return a number"),
        }
    }

    #[test]
    fn builtins_list_includes_clock_with_zero_arity() {
        let list = builtins();
        let clock_entry = list.iter().find(|(name, _, _)| *name == "clock");
        assert!(clock_entry.is_some());
        assert_eq!(clock_entry.unwrap().1, 0);
    }
}
