//! Adapter tests: wrapped functions keep their contract while being measured

use fluentai_profiler::prelude::*;
use std::panic;

fn parse_port(input: &str) -> std::result::Result<u16, String> {
    input
        .trim()
        .parse::<u16>()
        .map_err(|e| format!("invalid port '{}': {}", input, e))
}

#[test]
fn test_wrapped_function_returns_its_value() {
    let parse = profile_function_decorator(parse_port).with_name("parse_port");

    assert_eq!(parse.invoke("8080"), Ok(8080));
    assert_eq!(parse.call(" 443 "), Ok(443));

    let history = parse.profiler().get_profile_history();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|r| r.function_name == "parse_port"));
    assert_eq!(history[0].return_value(), Some("8080"));
}

#[test]
fn test_wrapped_function_returns_its_error() {
    let parse = profile_function_decorator(parse_port);

    let err = parse.invoke("not-a-port").unwrap_err();
    assert!(err.starts_with("invalid port"));

    let recorded = parse.profiler().get_profile_history();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].error(), Some(err.as_str()));
}

#[test]
fn test_wrapped_panic_is_resumed_after_recording() {
    let boom = profile_function_decorator(|_: ()| -> std::result::Result<(), String> {
        panic!("wrapped panic");
    })
    .with_name("boom");

    let caught = panic::catch_unwind(panic::AssertUnwindSafe(|| boom.invoke(())));
    let payload = caught.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"wrapped panic"));

    let recorded = boom.profiler().get_function_profile("boom").unwrap();
    assert_eq!(recorded.error(), Some("wrapped panic"));
}

#[test]
fn test_default_name_comes_from_the_function() {
    let parse = profile_function_decorator(parse_port);
    assert!(parse.name().ends_with("parse_port"));

    parse.invoke("1").unwrap();
    let recorded = parse.profiler().get_profile_history();
    assert_eq!(recorded[0].function_name, parse.name());
}

#[test]
fn test_memory_decorator_records_no_cpu() {
    let parse = profile_memory_decorator(parse_port);
    assert!(parse.profiler().config().memory_enabled);
    assert!(!parse.profiler().config().cpu_enabled);

    parse.invoke("22").unwrap();
    let recorded = parse.profiler().get_profile_history();
    assert!(recorded[0].cpu_percent.is_none());
    assert!(recorded[0].cpu_profile().is_none());
    // This binary does not install the tracking allocator.
    assert!(recorded[0].memory_usage.is_none());
}

#[test]
fn test_tuple_arguments_and_shared_profiler() {
    let profiler = Profiler::new(false, false);
    let add = Profiled::new(
        "add",
        |(a, b): (i32, i32)| Ok::<_, String>(a + b),
        profiler,
    );

    for i in 0..5 {
        assert_eq!(add.invoke((i, i)), Ok(2 * i));
    }

    let slowest = add.profiler().get_slowest_functions(1);
    assert_eq!(slowest[0].call_count, 5);
}
