//! Properties of values crossing the boundary through real calls, in both
//! directions.

use luastack::prelude::*;
use proptest::prelude::*;

fn echo(vm: &Vm) -> Function {
    vm.load_buffer("return function(...) return ... end", None)
        .unwrap()
        .call(())
        .unwrap()
}

proptest! {
    #[test]
    fn integers_survive_a_lua_call(value in any::<i64>()) {
        let vm = Vm::new().unwrap();
        let back: i64 = echo(&vm).call((value,)).unwrap();
        prop_assert_eq!(back, value);
        prop_assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn strings_survive_a_lua_call(text in ".*") {
        let vm = Vm::new().unwrap();
        let back: String = echo(&vm).call((text.as_str(),)).unwrap();
        prop_assert_eq!(back, text);
    }

    #[test]
    fn unsigned_out_of_range_is_rejected(value in (u32::MAX as i64 + 1)..i64::MAX) {
        let vm = Vm::new().unwrap();
        let err = echo(&vm).call::<u32, _>((value,)).unwrap_err();
        let is_overflow = matches!(err, BridgeError::IntegerOverflow { .. });
        prop_assert!(is_overflow);
        prop_assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn captured_values_precede_call_arguments(a in -1000i64..1000, b in -1000i64..1000, c in -1000i64..1000) {
        let vm = Vm::new().unwrap();
        let direct = |a: i64, b: i64, c: i64| a * 1_000_000 + b * 1_000 + c;

        let all_captured = Function::create(&vm, direct, (a, b, c)).unwrap();
        prop_assert_eq!(all_captured.call::<i64, _>(()).unwrap(), direct(a, b, c));

        let partly_captured = Function::create(&vm, direct, (a,)).unwrap();
        prop_assert_eq!(partly_captured.call::<i64, _>((b, c)).unwrap(), direct(a, b, c));
        prop_assert_eq!(vm.stack_depth(), 0);
    }
}

#[test]
fn floats_keep_their_exact_value() {
    let vm = Vm::new().unwrap();
    let echo = echo(&vm);
    for value in [0.0, -0.0, 0.1, f64::MIN_POSITIVE, f64::MAX, f64::INFINITY] {
        let back: f64 = echo.call((value,)).unwrap();
        assert_eq!(back.to_bits(), value.to_bits());
    }
    let back: f64 = echo.call((f64::NAN,)).unwrap();
    assert!(back.is_nan());
}

#[test]
fn integers_widen_to_floats_but_not_back() {
    let vm = Vm::new().unwrap();
    let echo = echo(&vm);
    assert_eq!(echo.call::<f64, _>((7i64,)).unwrap(), 7.0);
    assert!(matches!(
        echo.call::<i64, _>((7.5f64,)),
        Err(BridgeError::TypeMismatch { .. })
    ));
}

#[test]
fn missing_results_read_as_nil() {
    let vm = Vm::new().unwrap();
    let nothing: Function = vm
        .load_buffer("return function() end", None)
        .unwrap()
        .call(())
        .unwrap();
    assert_eq!(nothing.call::<Option<i64>, _>(()).unwrap(), None);
    assert_eq!(nothing.call::<Value, _>(()).unwrap(), Value::Nil);
    assert!(nothing.call::<i64, _>(()).is_err());
    assert_eq!(vm.stack_depth(), 0);
}
